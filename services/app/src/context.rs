//! services/app/src/context.rs
//!
//! Builds the shared application context: every adapter wired behind its port,
//! the session workflow, and a medicine catalog following the workflow's state.

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use meditect_core::catalog::MedicineCatalog;
use meditect_core::ports::{AuthService, CredentialStore, DatabaseService, RecognitionService};
use meditect_core::session::SessionWorkflow;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::adapters::{DbAdapter, FileCredentialStore, OpenAiRecognitionAdapter, SupabaseAuthAdapter};
use crate::config::Config;
use crate::error::AppError;

/// The application context, created once at startup and handed to the screens.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub workflow: Arc<SessionWorkflow>,
    pub catalog: Arc<MedicineCatalog>,
}

impl AppContext {
    /// Connects every adapter described by `config`.
    pub async fn bootstrap(config: Config) -> Result<Self, AppError> {
        let config = Arc::new(config);

        // --- Database ---
        info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(config.http_timeout)
            .connect(&config.database_url)
            .await?;
        let db_adapter = Arc::new(DbAdapter::new(db_pool));
        if config.run_migrations {
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
        }

        // --- Auth and local credentials ---
        let auth_adapter = Arc::new(SupabaseAuthAdapter::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            config.http_timeout,
        )?);
        let credential_store = Arc::new(FileCredentialStore::open(&config.credential_store_dir).await?);
        info!(dir = %credential_store.dir().display(), "Credential store ready.");

        // --- Recognition (optional) ---
        let recognizer: Option<Arc<dyn RecognitionService>> = match &config.openai_api_key {
            Some(key) => {
                let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(key));
                info!(model = %config.recognition_model, "Medicine recognition enabled.");
                Some(Arc::new(OpenAiRecognitionAdapter::new(
                    openai_client,
                    config.recognition_model.clone(),
                )))
            }
            None => {
                info!("OPENAI_API_KEY not set; medicine recognition disabled.");
                None
            }
        };

        Ok(Self::from_parts(
            config,
            auth_adapter,
            db_adapter,
            credential_store,
            recognizer,
        ))
    }

    /// Wires already-built adapters together.
    pub fn from_parts(
        config: Arc<Config>,
        auth: Arc<dyn AuthService>,
        db: Arc<dyn DatabaseService>,
        store: Arc<dyn CredentialStore>,
        recognizer: Option<Arc<dyn RecognitionService>>,
    ) -> Self {
        let workflow = Arc::new(SessionWorkflow::new(auth, db.clone(), store));
        let catalog = Arc::new(MedicineCatalog::new(db, recognizer, workflow.subscribe()));
        Self {
            config,
            workflow,
            catalog,
        }
    }
}
