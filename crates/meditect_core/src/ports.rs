//! crates/meditect_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the secure
//! credential store, the hosted auth and data service, and the recogniser are
//! all reached only through them.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AuthGrant, Medicine, MedicineQuery, NewMedicine, NewProfile, Principal, PrincipalMetadata,
    ScanResult, SessionTokens, UserProfile,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A write collided with an existing row (uniqueness violation).
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The remote service understood the request and refused it.
    #[error("Rejected: {0}")]
    Rejected(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// The principal exists but has not verified its email address yet.
    #[error("Email address not verified")]
    Unverified,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Encrypted-at-rest key/value store. Each key is a single slot: `set` overwrites
/// the whole value.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> PortResult<()>;

    /// Deleting a key that does not exist succeeds.
    async fn delete(&self, key: &str) -> PortResult<()>;
}

/// Password authentication surface of the hosted service.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Bad credentials come back as `Rejected` or `Unauthorized`. Services that
    /// refuse unverified principals outright answer `Unverified`.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthGrant>;

    /// Registers a principal. Never establishes a session, even when the service
    /// would hand one out.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &PrincipalMetadata,
    ) -> PortResult<Principal>;

    async fn sign_out(&self) -> PortResult<()>;

    async fn reset_password_for_email(&self, email: &str) -> PortResult<()>;

    async fn current_principal(&self) -> PortResult<Option<Principal>>;

    async fn refresh_session(&self, refresh_token: &str) -> PortResult<AuthGrant>;

    /// Installs previously persisted tokens in the client without a round-trip.
    async fn adopt_tokens(&self, tokens: &SessionTokens);

    /// Drops the client's tokens locally without revoking them remotely.
    async fn discard_tokens(&self);

    /// Resolves the principal a token pair belongs to, without adopting it.
    async fn verify_tokens(&self, tokens: &SessionTokens) -> PortResult<Principal>;
}

/// Table-backed storage for profiles and medicines.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Profiles ---
    /// A missing row is `NotFound`.
    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile>;

    /// A row with the same id already existing is `Conflict`.
    async fn insert_profile(&self, profile: &NewProfile) -> PortResult<UserProfile>;

    /// Idempotent write keyed by id. An existing row keeps its name and creation time.
    async fn upsert_profile(&self, profile: &NewProfile) -> PortResult<()>;

    // --- Medicines (always scoped to the owner) ---
    async fn list_medicines(&self, owner: Uuid, query: &MedicineQuery)
        -> PortResult<Vec<Medicine>>;

    async fn get_medicine(&self, owner: Uuid, medicine_id: Uuid) -> PortResult<Medicine>;

    async fn insert_medicine(&self, medicine: &NewMedicine) -> PortResult<Medicine>;

    async fn delete_medicine(&self, owner: Uuid, medicine_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Produces a best-effort guess of the medicine shown in a captured image.
    async fn recognize(&self, image: &[u8], content_type: &str) -> PortResult<ScanResult>;
}
