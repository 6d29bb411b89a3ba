pub mod auth;
pub mod credential_store;
pub mod db;
pub mod recognition;

pub use auth::SupabaseAuthAdapter;
pub use credential_store::{FileCredentialStore, MemoryCredentialStore};
pub use db::DbAdapter;
pub use recognition::OpenAiRecognitionAdapter;
