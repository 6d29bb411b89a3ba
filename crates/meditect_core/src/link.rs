//! Parsing of email verification deep links.
//!
//! The auth service redirects to `<scheme>://...#access_token=..&refresh_token=..&expires_in=..&type=signup`.

use chrono::{DateTime, Duration, Utc};
use url::{form_urlencoded, Url};

use crate::domain::SessionTokens;
use crate::error::AuthError;

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

pub fn parse_confirmation_link(link: &str, now: DateTime<Utc>) -> Result<SessionTokens, AuthError> {
    let url = Url::parse(link).map_err(|_| AuthError::InvalidConfirmationLink)?;
    let fragment = url.fragment().ok_or(AuthError::InvalidConfirmationLink)?;

    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_in = None;
    let mut kind = None;

    for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "refresh_token" => refresh_token = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse::<i64>().ok(),
            "type" => kind = Some(value.into_owned()),
            _ => {}
        }
    }

    let access_token = access_token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidConfirmationLink)?;
    if kind.as_deref() != Some("signup") {
        return Err(AuthError::InvalidConfirmationLink);
    }

    let expires_at = Duration::try_seconds(expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or(AuthError::InvalidConfirmationLink)?;

    Ok(SessionTokens {
        access_token,
        refresh_token: refresh_token.unwrap_or_default(),
        expires_at,
    })
}
