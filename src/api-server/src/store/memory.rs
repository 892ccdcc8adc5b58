//! In-memory implementation of the clinic store.
//!
//! Tables are `BTreeMap`s behind `tokio::sync::RwLock`, so reads run
//! concurrently and writes are serialized per table. Nothing survives a
//! restart. When a write touches two tables the locks are taken in declaration
//! order (accounts, patients, appointments, records, entries).

use super::{ClinicStore, StoreError, StoreResult};
use crate::models::{
    Account, Appointment, ClinicalEntry, EntryDetails, EntryKind, MedicalRecord, PatientProfile,
};
use async_trait::async_trait;
use chrono::Utc;
use clinic_rbac::{Owned, OwnershipScope, PatientId, UserId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Id sequences, one per table, starting at 1
#[derive(Debug)]
struct Sequences {
    accounts: AtomicU64,
    patients: AtomicU64,
    appointments: AtomicU64,
    records: AtomicU64,
    entries: AtomicU64,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            accounts: AtomicU64::new(1),
            patients: AtomicU64::new(1),
            appointments: AtomicU64::new(1),
            records: AtomicU64::new(1),
            entries: AtomicU64::new(1),
        }
    }
}

fn next(seq: &AtomicU64) -> u64 {
    seq.fetch_add(1, Ordering::Relaxed)
}

/// Apply the ownership scope to a lookup result
fn scoped<T: Owned>(scope: OwnershipScope, found: Option<T>) -> StoreResult<T> {
    let record = found.ok_or(StoreError::NotFound)?;
    scope.check(record).map_err(|_| StoreError::NotFound)
}

#[derive(Default)]
pub struct InMemoryStore {
    seq: Sequences,
    accounts: Arc<RwLock<BTreeMap<UserId, Account>>>,
    patients: Arc<RwLock<BTreeMap<PatientId, PatientProfile>>>,
    appointments: Arc<RwLock<BTreeMap<u64, Appointment>>>,
    records: Arc<RwLock<BTreeMap<u64, MedicalRecord>>>,
    entries: Arc<RwLock<BTreeMap<u64, ClinicalEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_username(
        accounts: &BTreeMap<UserId, Account>,
        account: &Account,
    ) -> StoreResult<()> {
        let taken = accounts
            .values()
            .any(|a| a.id() != account.id() && a.username() == account.username());
        if taken {
            return Err(StoreError::Conflict(
                "A user with that username already exists.".to_string(),
            ));
        }
        Ok(())
    }

    /// Point the profile link at `account`, clearing any previous link it held
    fn link_profile(
        patients: &mut BTreeMap<PatientId, PatientProfile>,
        account: UserId,
        profile: Option<PatientId>,
    ) -> StoreResult<()> {
        if let Some(id) = profile {
            let target = patients
                .get(&id)
                .ok_or_else(|| StoreError::Validation("Unknown patient profile.".to_string()))?;
            if matches!(target.user, Some(other) if other != account) {
                return Err(StoreError::Conflict(
                    "Patient profile is already linked to another account.".to_string(),
                ));
            }
        }

        for p in patients.values_mut() {
            if p.user == Some(account) && Some(p.id) != profile {
                p.user = None;
            }
        }
        if let Some(p) = profile.and_then(|id| patients.get_mut(&id)) {
            p.user = Some(account);
        }
        Ok(())
    }

    fn check_ssn(
        patients: &BTreeMap<PatientId, PatientProfile>,
        profile: &PatientProfile,
    ) -> StoreResult<()> {
        let Some(ssn) = &profile.social_security_number else {
            return Ok(());
        };
        let taken = patients
            .values()
            .any(|p| p.id != profile.id && p.social_security_number.as_ref() == Some(ssn));
        if taken {
            return Err(StoreError::Conflict(
                "A patient with this social security number already exists.".to_string(),
            ));
        }
        Ok(())
    }

    fn check_slot(
        appointments: &BTreeMap<u64, Appointment>,
        appointment: &Appointment,
    ) -> StoreResult<()> {
        let Some(doctor) = appointment.doctor else {
            return Ok(());
        };
        let taken = appointments.values().any(|a| {
            a.id != appointment.id
                && a.doctor == Some(doctor)
                && a.start_time == appointment.start_time
                && a.end_time == appointment.end_time
        });
        if taken {
            return Err(StoreError::Conflict(
                "This doctor already has an appointment at this time.".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ClinicStore for InMemoryStore {
    async fn create_account(&self, mut account: Account) -> StoreResult<Account> {
        let mut accounts = self.accounts.write().await;
        let mut patients = self.patients.write().await;

        account.identity.id = UserId(0);
        Self::check_username(&accounts, &account)?;

        account.identity.id = UserId(next(&self.seq.accounts));
        account.identity.prepare_for_save();
        Self::link_profile(&mut patients, account.id(), account.identity.patient_profile)?;

        debug!(
            user_id = %account.id(),
            username = %account.username(),
            role = %account.identity.role_label(),
            "account created"
        );
        accounts.insert(account.id(), account.clone());
        Ok(account)
    }

    async fn save_account(&self, mut account: Account) -> StoreResult<Account> {
        let mut accounts = self.accounts.write().await;
        let mut patients = self.patients.write().await;

        let existing = accounts.get(&account.id()).ok_or(StoreError::NotFound)?;
        account.date_joined = existing.date_joined;
        Self::check_username(&accounts, &account)?;

        account.identity.prepare_for_save();
        Self::link_profile(&mut patients, account.id(), account.identity.patient_profile)?;

        accounts.insert(account.id(), account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: UserId) -> StoreResult<Account> {
        self.accounts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_account(&self, username: &str) -> StoreResult<Account> {
        self.accounts
            .read()
            .await
            .values()
            .find(|a| a.username() == username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        Ok(self.accounts.read().await.values().cloned().collect())
    }

    async fn create_patient(&self, mut profile: PatientProfile) -> StoreResult<PatientProfile> {
        let mut patients = self.patients.write().await;

        profile.id = PatientId(0);
        profile.user = None;
        Self::check_ssn(&patients, &profile)?;

        profile.id = PatientId(next(&self.seq.patients));
        patients.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn create_patient_account(
        &self,
        mut profile: PatientProfile,
        mut account: Account,
    ) -> StoreResult<(PatientProfile, Account)> {
        let mut accounts = self.accounts.write().await;
        let mut patients = self.patients.write().await;

        profile.id = PatientId(0);
        profile.user = None;
        account.identity.id = UserId(0);
        Self::check_username(&accounts, &account)?;
        Self::check_ssn(&patients, &profile)?;

        profile.id = PatientId(next(&self.seq.patients));
        account.identity.id = UserId(next(&self.seq.accounts));
        account.identity.patient_profile = Some(profile.id);
        account.identity.prepare_for_save();
        profile.user = Some(account.id());

        debug!(
            patient = %profile.id,
            username = %account.username(),
            "patient account created"
        );
        patients.insert(profile.id, profile.clone());
        accounts.insert(account.id(), account.clone());
        Ok((profile, account))
    }

    async fn get_patient(&self, scope: OwnershipScope, id: PatientId) -> StoreResult<PatientProfile> {
        let patients = self.patients.read().await;
        scoped(scope, patients.get(&id)).cloned()
    }

    async fn list_patients(&self, scope: OwnershipScope) -> StoreResult<Vec<PatientProfile>> {
        let mut list: Vec<PatientProfile> = self
            .patients
            .read()
            .await
            .values()
            .filter(|p| scope.permits(p.owner()))
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
        });
        Ok(list)
    }

    async fn update_patient(
        &self,
        scope: OwnershipScope,
        mut profile: PatientProfile,
    ) -> StoreResult<PatientProfile> {
        let mut patients = self.patients.write().await;

        let existing = scoped(scope, patients.get(&profile.id))?;
        profile.user = existing.user;
        profile.patient_uid = existing.patient_uid;
        profile.date_registered = existing.date_registered;
        profile.last_updated = Utc::now();
        Self::check_ssn(&patients, &profile)?;

        patients.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn create_appointment(&self, mut appointment: Appointment) -> StoreResult<Appointment> {
        let patients = self.patients.read().await;
        let mut appointments = self.appointments.write().await;

        if !patients.contains_key(&appointment.patient) {
            return Err(StoreError::Validation("Invalid patient ID.".to_string()));
        }
        appointment.id = 0;
        Self::check_slot(&appointments, &appointment)?;

        let now = Utc::now();
        appointment.id = next(&self.seq.appointments);
        appointment.date_created = now;
        appointment.last_updated = now;
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get_appointment(&self, scope: OwnershipScope, id: u64) -> StoreResult<Appointment> {
        let appointments = self.appointments.read().await;
        scoped(scope, appointments.get(&id)).cloned()
    }

    async fn list_appointments(&self, scope: OwnershipScope) -> StoreResult<Vec<Appointment>> {
        let mut list: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| scope.permits(a.owner()))
            .cloned()
            .collect();
        list.sort_by_key(|a| (a.start_time, a.id));
        Ok(list)
    }

    async fn update_appointment(
        &self,
        scope: OwnershipScope,
        mut appointment: Appointment,
    ) -> StoreResult<Appointment> {
        let mut appointments = self.appointments.write().await;

        let existing = scoped(scope, appointments.get(&appointment.id))?;
        appointment.patient = existing.patient;
        appointment.date_created = existing.date_created;
        appointment.last_updated = Utc::now();
        Self::check_slot(&appointments, &appointment)?;

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn delete_appointment(&self, scope: OwnershipScope, id: u64) -> StoreResult<()> {
        let mut appointments = self.appointments.write().await;
        scoped(scope, appointments.get(&id))?;
        appointments.remove(&id);
        Ok(())
    }

    async fn create_record(&self, mut record: MedicalRecord) -> StoreResult<MedicalRecord> {
        let patients = self.patients.read().await;
        let mut records = self.records.write().await;

        if !patients.contains_key(&record.patient) {
            return Err(StoreError::Validation("Invalid patient ID.".to_string()));
        }

        record.id = next(&self.seq.records);
        record.record_date = Utc::now();
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_record(&self, scope: OwnershipScope, id: u64) -> StoreResult<MedicalRecord> {
        let records = self.records.read().await;
        scoped(scope, records.get(&id)).cloned()
    }

    async fn list_records(&self, scope: OwnershipScope) -> StoreResult<Vec<MedicalRecord>> {
        let mut list: Vec<MedicalRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| scope.permits(r.owner()))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.record_date.cmp(&a.record_date).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn update_record(
        &self,
        scope: OwnershipScope,
        mut record: MedicalRecord,
    ) -> StoreResult<MedicalRecord> {
        let mut records = self.records.write().await;

        let existing = scoped(scope, records.get(&record.id))?;
        record.patient = existing.patient;
        record.record_date = existing.record_date;

        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete_record(&self, scope: OwnershipScope, id: u64) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let mut entries = self.entries.write().await;

        scoped(scope, records.get(&id))?;
        records.remove(&id);
        entries.retain(|_, e| e.medical_record != id);
        Ok(())
    }

    async fn create_entry(
        &self,
        scope: OwnershipScope,
        record_id: u64,
        details: EntryDetails,
    ) -> StoreResult<ClinicalEntry> {
        let records = self.records.read().await;
        let mut entries = self.entries.write().await;

        scoped(scope, records.get(&record_id))?;

        let entry = ClinicalEntry {
            id: next(&self.seq.entries),
            medical_record: record_id,
            created_at: Utc::now(),
            details,
        };
        entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn list_entries(
        &self,
        scope: OwnershipScope,
        record_id: u64,
        kind: Option<EntryKind>,
    ) -> StoreResult<Vec<ClinicalEntry>> {
        let records = self.records.read().await;
        let entries = self.entries.read().await;

        scoped(scope, records.get(&record_id))?;

        Ok(entries
            .values()
            .rev()
            .filter(|e| e.medical_record == record_id)
            .filter(|e| kind.map_or(true, |k| e.details.kind() == k))
            .cloned()
            .collect())
    }

    async fn entries_in_scope(
        &self,
        scope: OwnershipScope,
        kind: Option<EntryKind>,
    ) -> StoreResult<Vec<ClinicalEntry>> {
        let records = self.records.read().await;
        let entries = self.entries.read().await;

        Ok(entries
            .values()
            .rev()
            .filter(|e| {
                records
                    .get(&e.medical_record)
                    .is_some_and(|r| scope.permits(r.owner()))
            })
            .filter(|e| kind.map_or(true, |k| e.details.kind() == k))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
