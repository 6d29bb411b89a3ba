//! In-memory fakes for the workflow's ports.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use meditect_core::{
    AuthGrant, AuthService, CredentialStore, DatabaseService, Medicine, MedicineOrder,
    MedicineQuery, NewMedicine, NewProfile, PortError, PortResult, Principal, PrincipalMetadata,
    SessionTokens, SessionWorkflow, UserProfile,
};

pub fn principal(email: &str, name: Option<&str>, verified: bool) -> Principal {
    Principal {
        id: Uuid::new_v4(),
        email: Some(email.to_string()),
        email_confirmed_at: verified.then(Utc::now),
        display_name: name.map(str::to_string),
        created_at: Some(Utc::now()),
    }
}

pub fn tokens(tag: &str) -> SessionTokens {
    SessionTokens {
        access_token: format!("access-{tag}"),
        refresh_token: format!("refresh-{tag}"),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

pub fn profile_for(p: &Principal, name: &str) -> UserProfile {
    UserProfile {
        id: p.id,
        email: p.email.clone().unwrap_or_default(),
        name: name.to_string(),
        created_at: Utc::now(),
        avatar_url: None,
    }
}

//=========================================================================================
// Auth
//=========================================================================================

#[derive(Default)]
pub struct FakeAuthState {
    pub accounts: HashMap<String, (String, Principal)>,
    pub current: Option<Principal>,
    /// Overrides what `current_principal` reports.
    pub current_override: Option<Option<Principal>>,
    pub sign_in_error: Option<PortError>,
    pub sign_out_error: Option<PortError>,
    pub reset_error: Option<PortError>,
    pub refresh_error: Option<PortError>,
    /// Principal returned by `refresh_session`; defaults to the current one.
    pub refresh_principal: Option<Principal>,
    pub confirmations: HashMap<String, Principal>,
    pub adopted: Vec<SessionTokens>,
    /// Principal behind every access token this fake handed out.
    pub issued: HashMap<String, Principal>,
    pub registered: Vec<(String, PrincipalMetadata)>,
}

#[derive(Default)]
pub struct FakeAuth {
    pub state: Mutex<FakeAuthState>,
    pub reset_gate: Option<Arc<Notify>>,
    pub sign_out_calls: AtomicUsize,
}

impl FakeAuth {
    pub fn with_account(self, email: &str, password: &str, principal: Principal) -> Self {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(email.to_string(), (password.to_string(), principal));
        self
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, FakeAuthState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthGrant> {
        let mut state = self.lock();
        if let Some(e) = state.sign_in_error.take() {
            return Err(e);
        }
        let principal = match state.accounts.get(email) {
            Some((pw, p)) if pw == password => p.clone(),
            _ => return Err(PortError::Rejected("Invalid login credentials".into())),
        };
        let granted = tokens(&principal.id.to_string());
        state
            .issued
            .insert(granted.access_token.clone(), principal.clone());
        state.current = Some(principal.clone());
        Ok(AuthGrant {
            tokens: granted,
            principal,
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &PrincipalMetadata,
    ) -> PortResult<Principal> {
        let mut state = self.lock();
        if state.accounts.contains_key(email) {
            return Err(PortError::Conflict("User already registered".into()));
        }
        let p = principal(email, Some(&metadata.name), false);
        state
            .accounts
            .insert(email.to_string(), (password.to_string(), p.clone()));
        state.registered.push((email.to_string(), metadata.clone()));
        Ok(p)
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        state.current = None;
        match state.sign_out_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn reset_password_for_email(&self, _email: &str) -> PortResult<()> {
        if let Some(gate) = &self.reset_gate {
            gate.notified().await;
        }
        match self.lock().reset_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn current_principal(&self) -> PortResult<Option<Principal>> {
        let state = self.lock();
        Ok(match &state.current_override {
            Some(over) => over.clone(),
            None => state.current.clone(),
        })
    }

    async fn refresh_session(&self, _refresh_token: &str) -> PortResult<AuthGrant> {
        let mut state = self.lock();
        if let Some(e) = state.refresh_error.take() {
            return Err(e);
        }
        let principal = state
            .refresh_principal
            .clone()
            .or_else(|| state.current.clone())
            .ok_or(PortError::Unauthorized)?;
        let granted = tokens("refreshed");
        state
            .issued
            .insert(granted.access_token.clone(), principal.clone());
        state.current = Some(principal.clone());
        Ok(AuthGrant {
            principal,
            tokens: granted,
        })
    }

    async fn adopt_tokens(&self, tokens: &SessionTokens) {
        let mut state = self.lock();
        state.adopted.push(tokens.clone());
        if let Some(owner) = state.issued.get(&tokens.access_token).cloned() {
            state.current = Some(owner);
        }
    }

    async fn discard_tokens(&self) {
        self.lock().current = None;
    }

    async fn verify_tokens(&self, tokens: &SessionTokens) -> PortResult<Principal> {
        self.lock()
            .confirmations
            .get(&tokens.access_token)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }
}

//=========================================================================================
// Database
//=========================================================================================

#[derive(Default)]
pub struct FakeDb {
    pub profiles: Mutex<HashMap<Uuid, UserProfile>>,
    pub medicines: Mutex<Vec<Medicine>>,
    pub get_profile_error: Mutex<Option<PortError>>,
    pub insert_profile_error: Mutex<Option<PortError>>,
    pub insert_calls: AtomicUsize,
    pub upsert_calls: AtomicUsize,
}

impl FakeDb {
    pub fn with_profile(self, profile: UserProfile) -> Self {
        self.profiles.lock().unwrap().insert(profile.id, profile);
        self
    }

    pub fn profile(&self, id: Uuid) -> Option<UserProfile> {
        self.profiles.lock().unwrap().get(&id).cloned()
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.lock().unwrap().len()
    }
}

#[async_trait]
impl DatabaseService for FakeDb {
    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        if let Some(e) = self.get_profile_error.lock().unwrap().take() {
            return Err(e);
        }
        // Read first, then yield, so concurrent callers can observe the same
        // missing row.
        let found = self.profile(user_id);
        tokio::task::yield_now().await;
        found.ok_or_else(|| PortError::NotFound(format!("profile {user_id}")))
    }

    async fn insert_profile(&self, profile: &NewProfile) -> PortResult<UserProfile> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.insert_profile_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut profiles = self.profiles.lock().unwrap();
        if profiles.contains_key(&profile.id) {
            return Err(PortError::Conflict("duplicate key value violates unique constraint".into()));
        }
        let row = UserProfile {
            id: profile.id,
            email: profile.email.clone(),
            name: profile.name.clone(),
            created_at: profile.created_at,
            avatar_url: None,
        };
        profiles.insert(row.id, row.clone());
        Ok(row)
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> PortResult<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut profiles = self.profiles.lock().unwrap();
        profiles
            .entry(profile.id)
            .and_modify(|row| row.email = profile.email.clone())
            .or_insert_with(|| UserProfile {
                id: profile.id,
                email: profile.email.clone(),
                name: profile.name.clone(),
                created_at: profile.created_at,
                avatar_url: None,
            });
        Ok(())
    }

    async fn list_medicines(
        &self,
        owner: Uuid,
        query: &MedicineQuery,
    ) -> PortResult<Vec<Medicine>> {
        let mut rows: Vec<Medicine> = self
            .medicines
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user_id == owner)
            .filter(|m| query.expiring_from.map_or(true, |from| m.expiry_date >= from))
            .filter(|m| query.expiring_until.map_or(true, |until| m.expiry_date <= until))
            .cloned()
            .collect();
        match query.order {
            MedicineOrder::ScannedNewestFirst => rows.sort_by(|a, b| b.scanned_at.cmp(&a.scanned_at)),
            MedicineOrder::ExpiringSoonestFirst => rows.sort_by_key(|m| m.expiry_date),
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn get_medicine(&self, owner: Uuid, medicine_id: Uuid) -> PortResult<Medicine> {
        self.medicines
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == medicine_id && m.user_id == owner)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("medicine {medicine_id}")))
    }

    async fn insert_medicine(&self, medicine: &NewMedicine) -> PortResult<Medicine> {
        let row = Medicine {
            id: Uuid::new_v4(),
            name: medicine.name.clone(),
            manufacturer: medicine.manufacturer.clone(),
            expiry_date: medicine.expiry_date,
            batch_number: medicine.batch_number.clone(),
            dosage: medicine.dosage.clone(),
            description: medicine.description.clone(),
            image_url: medicine.image_url.clone(),
            user_id: medicine.user_id,
            created_at: Utc::now(),
            scanned_at: medicine.scanned_at,
        };
        self.medicines.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn delete_medicine(&self, owner: Uuid, medicine_id: Uuid) -> PortResult<()> {
        let mut rows = self.medicines.lock().unwrap();
        let before = rows.len();
        rows.retain(|m| !(m.id == medicine_id && m.user_id == owner));
        if rows.len() == before {
            return Err(PortError::NotFound(format!("medicine {medicine_id}")));
        }
        Ok(())
    }
}

//=========================================================================================
// Credential store
//=========================================================================================

#[derive(Default)]
pub struct MemoryStore {
    pub entries: Mutex<HashMap<String, String>>,
    pub fail_writes: Mutex<bool>,
    pub fail_reads: Mutex<bool>,
}

impl MemoryStore {
    pub fn entry(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        if *self.fail_reads.lock().unwrap() {
            return Err(PortError::Unexpected("keychain locked".into()));
        }
        Ok(self.entry(key))
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(PortError::Unexpected("keychain locked".into()));
        }
        self.put(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(PortError::Unexpected("keychain locked".into()));
        }
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

//=========================================================================================
// Wiring
//=========================================================================================

pub struct Harness {
    pub auth: Arc<FakeAuth>,
    pub db: Arc<FakeDb>,
    pub store: Arc<MemoryStore>,
    pub workflow: SessionWorkflow,
}

pub fn harness(auth: FakeAuth, db: FakeDb, store: MemoryStore) -> Harness {
    let auth = Arc::new(auth);
    let db = Arc::new(db);
    let store = Arc::new(store);
    let workflow = SessionWorkflow::new(auth.clone(), db.clone(), store.clone());
    Harness {
        auth,
        db,
        store,
        workflow,
    }
}
