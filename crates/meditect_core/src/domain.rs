//! crates/meditect_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! Persisted shapes (the stored session blob) derive serde; nothing here knows
//! about a database or an HTTP API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Authentication
//=========================================================================================

/// The auth service's record of an identity. Distinct from the application profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: Option<String>,
    /// Set once the user has followed the verification link.
    pub email_confirmed_at: Option<DateTime<Utc>>,
    /// Display name captured at sign-up and kept as auxiliary metadata.
    pub display_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn is_email_verified(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Auxiliary metadata attached to a principal at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalMetadata {
    pub name: String,
}

/// Token pair issued by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful password sign-in or token refresh.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub principal: Principal,
    pub tokens: SessionTokens,
}

/// The locally persisted bundle of tokens plus the resolved profile.
///
/// Written as one JSON value under a single credential-store key, so it is
/// either fully present or absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(flatten)]
    pub tokens: SessionTokens,
    pub user: UserProfile,
}

//=========================================================================================
// Profiles
//=========================================================================================

/// The application-level user record, keyed by the principal's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A profile row about to be written. Server-assigned fields come back on re-fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl NewProfile {
    /// Builds the first profile for a verified principal.
    ///
    /// The name falls back from the sign-up metadata to the local part of the
    /// email and finally to `"User"`.
    pub fn from_principal(principal: &Principal, now: DateTime<Utc>) -> Self {
        let email = principal.email.clone().unwrap_or_default();
        Self {
            id: principal.id,
            name: fallback_display_name(principal.display_name.as_deref(), &email),
            email,
            created_at: principal.created_at.unwrap_or(now),
        }
    }
}

pub const DEFAULT_DISPLAY_NAME: &str = "User";

fn fallback_display_name(metadata_name: Option<&str>, email: &str) -> String {
    if let Some(name) = metadata_name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    email
        .split('@')
        .next()
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .unwrap_or(DEFAULT_DISPLAY_NAME)
        .to_string()
}

//=========================================================================================
// Medicines
//=========================================================================================

/// One catalogued medicine belonging to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Medicine {
    pub id: Uuid,
    pub name: String,
    pub manufacturer: String,
    pub expiry_date: NaiveDate,
    pub batch_number: String,
    pub dosage: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub scanned_at: DateTime<Utc>,
}

/// A medicine record about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMedicine {
    pub name: String,
    pub manufacturer: String,
    pub expiry_date: NaiveDate,
    pub batch_number: String,
    pub dosage: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub user_id: Uuid,
    pub scanned_at: DateTime<Utc>,
}

/// The recogniser's best guess at a medicine's attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedicineGuess {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub batch_number: Option<String>,
    pub dosage: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub medicine: MedicineGuess,
    /// Always within `[0, 1]`.
    pub confidence: f32,
}

impl ScanResult {
    pub fn new(medicine: MedicineGuess, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self { medicine, confidence }
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_score(self.confidence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.9 {
            Self::High
        } else if score >= 0.7 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// How close a medicine is to its expiry date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    Expired,
    ExpiringSoon { days: i64 },
    Valid { days: i64 },
}

/// Medicines expiring within this many days are flagged.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

impl ExpiryStatus {
    pub fn on(expiry_date: NaiveDate, today: NaiveDate) -> Self {
        let days = (expiry_date - today).num_days();
        if days <= 0 {
            Self::Expired
        } else if days <= EXPIRY_WARNING_DAYS {
            Self::ExpiringSoon { days }
        } else {
            Self::Valid { days }
        }
    }
}

impl Medicine {
    pub fn expiry_status(&self, today: NaiveDate) -> ExpiryStatus {
        ExpiryStatus::on(self.expiry_date, today)
    }
}

/// Sort order for medicine listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MedicineOrder {
    #[default]
    ScannedNewestFirst,
    ExpiringSoonestFirst,
}

/// Filter, ordering and limit for a medicine listing. Always scoped to one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedicineQuery {
    pub expiring_from: Option<NaiveDate>,
    pub expiring_until: Option<NaiveDate>,
    pub order: MedicineOrder,
    pub limit: Option<i64>,
}
