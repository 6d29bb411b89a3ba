//! services/app/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the `profiles` and `medicines` tables in PostgreSQL using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use meditect_core::domain::{
    Medicine, MedicineOrder, MedicineQuery, NewMedicine, NewProfile, UserProfile,
};
use meditect_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const PROFILE_COLUMNS: &str = "id, email, name, avatar_url, created_at";

const MEDICINE_COLUMNS: &str = "id, user_id, name, manufacturer, expiry_date, batch_number, \
     dosage, description, image_url, created_at, scanned_at";

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    email: String,
    name: String,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
}
impl ProfileRecord {
    fn to_domain(self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email,
            name: self.name,
            created_at: self.created_at,
            avatar_url: self.avatar_url,
        }
    }
}

#[derive(FromRow)]
struct MedicineRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    manufacturer: String,
    expiry_date: NaiveDate,
    batch_number: String,
    dosage: String,
    description: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    scanned_at: DateTime<Utc>,
}
impl MedicineRecord {
    fn to_domain(self) -> Medicine {
        Medicine {
            id: self.id,
            name: self.name,
            manufacturer: self.manufacturer,
            expiry_date: self.expiry_date,
            batch_number: self.batch_number,
            dosage: self.dosage,
            description: self.description,
            image_url: self.image_url,
            user_id: self.user_id,
            created_at: self.created_at,
            scanned_at: self.scanned_at,
        }
    }
}

/// Maps a driver error onto the port's vocabulary. Unique violations become
/// `Conflict` so the workflow can fall back to an upsert.
fn map_db_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("row not found".to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(db.message().to_string())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

/// Appends the owner filter, the optional expiry window, ordering and limit.
fn push_medicine_filters(builder: &mut QueryBuilder<'_, Postgres>, owner: Uuid, query: &MedicineQuery) {
    builder.push(" WHERE user_id = ").push_bind(owner);
    if let Some(from) = query.expiring_from {
        builder.push(" AND expiry_date >= ").push_bind(from);
    }
    if let Some(until) = query.expiring_until {
        builder.push(" AND expiry_date <= ").push_bind(until);
    }
    builder.push(match query.order {
        MedicineOrder::ScannedNewestFirst => " ORDER BY scanned_at DESC",
        MedicineOrder::ExpiringSoonestFirst => " ORDER BY expiry_date ASC",
    });
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ").push_bind(limit);
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        record
            .map(ProfileRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Profile for user {} not found", user_id)))
    }

    async fn insert_profile(&self, profile: &NewProfile) -> PortResult<UserProfile> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "INSERT INTO profiles (id, email, name, created_at) VALUES ($1, $2, $3, $4) \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(profile.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(record.to_domain())
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO profiles (id, email, name, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, updated_at = now()",
        )
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn list_medicines(
        &self,
        owner: Uuid,
        query: &MedicineQuery,
    ) -> PortResult<Vec<Medicine>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {MEDICINE_COLUMNS} FROM medicines"));
        push_medicine_filters(&mut builder, owner, query);
        debug!(sql = builder.sql(), "listing medicines");

        let records = builder
            .build_query_as::<MedicineRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(records.into_iter().map(MedicineRecord::to_domain).collect())
    }

    async fn get_medicine(&self, owner: Uuid, medicine_id: Uuid) -> PortResult<Medicine> {
        let record = sqlx::query_as::<_, MedicineRecord>(&format!(
            "SELECT {MEDICINE_COLUMNS} FROM medicines WHERE id = $1 AND user_id = $2"
        ))
        .bind(medicine_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        record
            .map(MedicineRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Medicine {} not found", medicine_id)))
    }

    async fn insert_medicine(&self, medicine: &NewMedicine) -> PortResult<Medicine> {
        let record = sqlx::query_as::<_, MedicineRecord>(&format!(
            "INSERT INTO medicines (id, user_id, name, manufacturer, expiry_date, batch_number, \
             dosage, description, image_url, scanned_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {MEDICINE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(medicine.user_id)
        .bind(&medicine.name)
        .bind(&medicine.manufacturer)
        .bind(medicine.expiry_date)
        .bind(&medicine.batch_number)
        .bind(&medicine.dosage)
        .bind(&medicine.description)
        .bind(&medicine.image_url)
        .bind(medicine.scanned_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(record.to_domain())
    }

    async fn delete_medicine(&self, owner: Uuid, medicine_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM medicines WHERE id = $1 AND user_id = $2")
            .bind(medicine_id)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Medicine {} not found",
                medicine_id
            )));
        }
        Ok(())
    }
}
