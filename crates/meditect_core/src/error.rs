//! crates/meditect_core/src/error.rs
//!
//! Typed failures surfaced to the screen layer.

/// Failures of the session & profile reconciliation workflow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Please verify your email address before signing in. Check your inbox for the verification link.")]
    EmailNotVerified,

    #[error("Failed to fetch user profile: {0}")]
    ProfileFetchFailed(String),

    #[error("Failed to create user profile: {0}")]
    ProfileCreationFailed(String),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Could not request a password reset. Please try again later.")]
    ResetRequestFailed,

    /// Local state has already been cleared when this is returned.
    #[error("Signed out locally, but the server could not be reached: {0}")]
    SignOutFailed(String),

    #[error("Credential store error: {0}")]
    CredentialStore(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("The authentication service is unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid confirmation link")]
    InvalidConfirmationLink,

    #[error("Failed to verify email: {0}")]
    ConfirmationFailed(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Failed to refresh session: {0}")]
    SessionRefreshFailed(String),
}

/// Failures of medicine catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("You must be signed in to manage medicines")]
    NotSignedIn,

    #[error("Medicine not found")]
    NotFound,

    #[error("The scan is missing required information: {0}")]
    IncompleteScan(&'static str),

    #[error("Medicine recognition is not configured")]
    RecognitionUnavailable,

    #[error("Medicine recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("Data service error: {0}")]
    Service(String),
}
