//! crates/meditect_core/src/catalog.rs
//!
//! The medicine catalog: listing, searching, saving accepted scans and deleting
//! records for the signed-in user.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Medicine, MedicineGuess, MedicineOrder, MedicineQuery, NewMedicine, ScanResult};
use crate::error::CatalogError;
use crate::ports::{DatabaseService, PortError, RecognitionService};
use crate::session::AuthSnapshot;

pub const RECENT_LIMIT: i64 = 5;
pub const UPCOMING_LIMIT: i64 = 5;
pub const UPCOMING_WINDOW_DAYS: i64 = 90;

pub struct MedicineCatalog {
    db: Arc<dyn DatabaseService>,
    recognizer: Option<Arc<dyn RecognitionService>>,
    auth_state: watch::Receiver<AuthSnapshot>,
}

impl MedicineCatalog {
    /// `auth_state` comes from `SessionWorkflow::subscribe`; the catalog acts on
    /// behalf of whichever user it currently reports.
    pub fn new(
        db: Arc<dyn DatabaseService>,
        recognizer: Option<Arc<dyn RecognitionService>>,
        auth_state: watch::Receiver<AuthSnapshot>,
    ) -> Self {
        Self {
            db,
            recognizer,
            auth_state,
        }
    }

    fn owner(&self) -> Result<Uuid, CatalogError> {
        self.auth_state
            .borrow()
            .user_id()
            .ok_or(CatalogError::NotSignedIn)
    }

    /// The most recently scanned medicines, newest first.
    pub async fn recent(&self) -> Result<Vec<Medicine>, CatalogError> {
        let owner = self.owner()?;
        let query = MedicineQuery {
            order: MedicineOrder::ScannedNewestFirst,
            limit: Some(RECENT_LIMIT),
            ..MedicineQuery::default()
        };
        self.list(owner, &query).await
    }

    /// Medicines expiring within the next 90 days, soonest first.
    pub async fn upcoming_expirations(&self, today: NaiveDate) -> Result<Vec<Medicine>, CatalogError> {
        let owner = self.owner()?;
        let query = MedicineQuery {
            expiring_from: Some(today),
            expiring_until: Some(today + Duration::days(UPCOMING_WINDOW_DAYS)),
            order: MedicineOrder::ExpiringSoonestFirst,
            limit: Some(UPCOMING_LIMIT),
        };
        self.list(owner, &query).await
    }

    /// Every medicine the user has scanned, newest first.
    pub async fn history(&self) -> Result<Vec<Medicine>, CatalogError> {
        let owner = self.owner()?;
        self.list(owner, &MedicineQuery::default()).await
    }

    #[instrument(skip(self))]
    pub async fn details(&self, medicine_id: Uuid) -> Result<Medicine, CatalogError> {
        let owner = self.owner()?;
        self.db
            .get_medicine(owner, medicine_id)
            .await
            .map_err(|e| service_error(e, "get medicine"))
    }

    #[instrument(skip(self, image), fields(bytes = image.len()))]
    pub async fn recognize(&self, image: &[u8], content_type: &str) -> Result<ScanResult, CatalogError> {
        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or(CatalogError::RecognitionUnavailable)?;
        let result = recognizer.recognize(image, content_type).await.map_err(|e| {
            warn!(error = %e, "recognition failed");
            CatalogError::RecognitionFailed(e.to_string())
        })?;
        info!(confidence = result.confidence, level = ?result.confidence_level(), "medicine recognised");
        Ok(result)
    }

    /// Persists a scan the user accepted. A name and an expiry date are required.
    #[instrument(skip(self, guess))]
    pub async fn save_scan(
        &self,
        guess: &MedicineGuess,
        scanned_at: DateTime<Utc>,
    ) -> Result<Medicine, CatalogError> {
        let owner = self.owner()?;
        let draft = draft_from_guess(guess, owner, scanned_at)?;
        let saved = self
            .db
            .insert_medicine(&draft)
            .await
            .map_err(|e| service_error(e, "insert medicine"))?;
        info!(user_id = %owner, medicine_id = %saved.id, "medicine saved");
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, medicine_id: Uuid) -> Result<(), CatalogError> {
        let owner = self.owner()?;
        self.db
            .delete_medicine(owner, medicine_id)
            .await
            .map_err(|e| service_error(e, "delete medicine"))?;
        info!(user_id = %owner, medicine_id = %medicine_id, "medicine deleted");
        Ok(())
    }

    async fn list(&self, owner: Uuid, query: &MedicineQuery) -> Result<Vec<Medicine>, CatalogError> {
        self.db
            .list_medicines(owner, query)
            .await
            .map_err(|e| service_error(e, "list medicines"))
    }
}

/// Case-insensitive substring match on name or manufacturer. A blank query
/// matches everything.
pub fn search<'a>(medicines: &'a [Medicine], query: &str) -> Vec<&'a Medicine> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return medicines.iter().collect();
    }
    medicines
        .iter()
        .filter(|m| {
            m.name.to_lowercase().contains(&needle)
                || m.manufacturer.to_lowercase().contains(&needle)
        })
        .collect()
}

fn draft_from_guess(
    guess: &MedicineGuess,
    owner: Uuid,
    scanned_at: DateTime<Utc>,
) -> Result<NewMedicine, CatalogError> {
    let name = guess
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(CatalogError::IncompleteScan("name"))?;
    let expiry_date = guess
        .expiry_date
        .ok_or(CatalogError::IncompleteScan("expiry date"))?;
    let text = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or_default().to_string();

    Ok(NewMedicine {
        name: name.to_string(),
        manufacturer: text(&guess.manufacturer),
        expiry_date,
        batch_number: text(&guess.batch_number),
        dosage: text(&guess.dosage),
        description: None,
        image_url: None,
        user_id: owner,
        scanned_at,
    })
}

fn service_error(e: PortError, operation: &'static str) -> CatalogError {
    match e {
        PortError::NotFound(_) => CatalogError::NotFound,
        PortError::Unauthorized => CatalogError::NotSignedIn,
        other => {
            error!(error = %other, operation, "data service call failed");
            CatalogError::Service(other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medicine(name: &str, manufacturer: &str) -> Medicine {
        Medicine {
            id: Uuid::new_v4(),
            name: name.into(),
            manufacturer: manufacturer.into(),
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            batch_number: "B1".into(),
            dosage: "500mg".into(),
            description: None,
            image_url: None,
            user_id: Uuid::new_v4(),
            created_at: Utc::now(),
            scanned_at: Utc::now(),
        }
    }

    #[test]
    fn search_matches_name_or_manufacturer_case_insensitively() {
        let meds = vec![
            medicine("Paracetamol", "Acme Pharma"),
            medicine("Ibuprofen", "Generic Labs"),
        ];
        let hits = search(&meds, "PARA");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Paracetamol");

        let hits = search(&meds, "labs");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Ibuprofen");

        assert_eq!(search(&meds, "   ").len(), 2);
        assert!(search(&meds, "aspirin").is_empty());
    }

    #[test]
    fn draft_requires_name_and_expiry() {
        let owner = Uuid::new_v4();
        let mut guess = MedicineGuess {
            name: Some("  ".into()),
            expiry_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            ..MedicineGuess::default()
        };
        assert!(matches!(
            draft_from_guess(&guess, owner, Utc::now()),
            Err(CatalogError::IncompleteScan("name"))
        ));

        guess.name = Some("Aspirin".into());
        guess.expiry_date = None;
        assert!(matches!(
            draft_from_guess(&guess, owner, Utc::now()),
            Err(CatalogError::IncompleteScan("expiry date"))
        ));
    }

    #[test]
    fn draft_fills_optional_text_with_empty_strings() {
        let owner = Uuid::new_v4();
        let guess = MedicineGuess {
            name: Some(" Aspirin ".into()),
            expiry_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            dosage: Some("100mg".into()),
            ..MedicineGuess::default()
        };
        let draft = draft_from_guess(&guess, owner, Utc::now()).unwrap();
        assert_eq!(draft.name, "Aspirin");
        assert_eq!(draft.dosage, "100mg");
        assert_eq!(draft.manufacturer, "");
        assert_eq!(draft.user_id, owner);
    }
}
