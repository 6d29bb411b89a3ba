pub mod catalog;
pub mod domain;
pub mod error;
pub mod link;
pub mod ports;
pub mod session;
pub mod validation;

pub use catalog::{search, MedicineCatalog};
pub use domain::{
    AuthGrant, ConfidenceLevel, ExpiryStatus, Medicine, MedicineGuess, MedicineOrder, MedicineQuery,
    NewMedicine, NewProfile, Principal, PrincipalMetadata, ScanResult, SessionTokens, StoredSession,
    UserProfile,
};
pub use error::{AuthError, CatalogError};
pub use ports::{
    AuthService, CredentialStore, DatabaseService, PortError, PortResult, RecognitionService,
};
pub use session::{AuthSnapshot, SessionWorkflow, SESSION_KEY};
