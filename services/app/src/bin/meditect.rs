//! services/app/src/bin/meditect.rs

use app_lib::{config::Config, context::AppContext, error::AppError, telemetry::init_tracing};
use chrono::Utc;
use meditect_core::domain::ExpiryStatus;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    init_tracing(&config);
    info!("Configuration loaded. Starting Meditect...");

    // --- 2. Wire Adapters ---
    let context = AppContext::bootstrap(config).await?;

    // --- 3. Restore Any Persisted Session ---
    context.workflow.restore_session().await;

    let Some(user) = context.workflow.current_user() else {
        info!("No active session. Sign in to continue.");
        return Ok(());
    };
    info!(user_id = %user.id, name = %user.name, "Signed in.");

    // --- 4. Report What Needs Attention ---
    let today = Utc::now().date_naive();
    match context.catalog.upcoming_expirations(today).await {
        Ok(medicines) if medicines.is_empty() => info!("Nothing expires in the next 90 days."),
        Ok(medicines) => {
            for medicine in medicines {
                match medicine.expiry_status(today) {
                    ExpiryStatus::Expired => warn!(name = %medicine.name, "Expired."),
                    ExpiryStatus::ExpiringSoon { days } => {
                        warn!(name = %medicine.name, days, "Expiring soon.")
                    }
                    ExpiryStatus::Valid { days } => info!(name = %medicine.name, days, "Upcoming expiry."),
                }
            }
        }
        Err(e) => warn!(error = %e, "Could not load upcoming expirations."),
    }

    Ok(())
}
