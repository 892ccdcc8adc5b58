//! Persistence boundary for clinic data
//!
//! Every lookup of a patient-owned resource takes the caller's
//! [`OwnershipScope`]. Backends apply it inside the lookup itself, so a record
//! outside the scope and a missing record both come back as
//! [`StoreError::NotFound`].

use crate::models::{
    Account, Appointment, ClinicalEntry, EntryDetails, EntryKind, MedicalRecord, PatientProfile,
};
use async_trait::async_trait;
use clinic_rbac::{OwnershipScope, PatientId, UserId};
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Absent, or outside the caller's scope; the two are not distinguished
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid: {0}")]
    Validation(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Backing store for accounts and clinical data
///
/// `create_*` methods assign the id; any id on the input is ignored.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    // Accounts. Implementations call `Identity::prepare_for_save` on every write.
    async fn create_account(&self, account: Account) -> StoreResult<Account>;
    async fn save_account(&self, account: Account) -> StoreResult<Account>;
    async fn get_account(&self, id: UserId) -> StoreResult<Account>;
    async fn find_account(&self, username: &str) -> StoreResult<Account>;
    async fn list_accounts(&self) -> StoreResult<Vec<Account>>;

    // Patient profiles
    async fn create_patient(&self, profile: PatientProfile) -> StoreResult<PatientProfile>;
    /// Create a profile and the account linked to it; on error neither is stored
    async fn create_patient_account(
        &self,
        profile: PatientProfile,
        account: Account,
    ) -> StoreResult<(PatientProfile, Account)>;
    async fn get_patient(&self, scope: OwnershipScope, id: PatientId) -> StoreResult<PatientProfile>;
    async fn list_patients(&self, scope: OwnershipScope) -> StoreResult<Vec<PatientProfile>>;
    async fn update_patient(
        &self,
        scope: OwnershipScope,
        profile: PatientProfile,
    ) -> StoreResult<PatientProfile>;

    // Appointments
    async fn create_appointment(&self, appointment: Appointment) -> StoreResult<Appointment>;
    async fn get_appointment(&self, scope: OwnershipScope, id: u64) -> StoreResult<Appointment>;
    async fn list_appointments(&self, scope: OwnershipScope) -> StoreResult<Vec<Appointment>>;
    async fn update_appointment(
        &self,
        scope: OwnershipScope,
        appointment: Appointment,
    ) -> StoreResult<Appointment>;
    async fn delete_appointment(&self, scope: OwnershipScope, id: u64) -> StoreResult<()>;

    // Medical records and their entries
    async fn create_record(&self, record: MedicalRecord) -> StoreResult<MedicalRecord>;
    async fn get_record(&self, scope: OwnershipScope, id: u64) -> StoreResult<MedicalRecord>;
    async fn list_records(&self, scope: OwnershipScope) -> StoreResult<Vec<MedicalRecord>>;
    async fn update_record(
        &self,
        scope: OwnershipScope,
        record: MedicalRecord,
    ) -> StoreResult<MedicalRecord>;
    async fn delete_record(&self, scope: OwnershipScope, id: u64) -> StoreResult<()>;
    async fn create_entry(
        &self,
        scope: OwnershipScope,
        record_id: u64,
        details: EntryDetails,
    ) -> StoreResult<ClinicalEntry>;
    async fn list_entries(
        &self,
        scope: OwnershipScope,
        record_id: u64,
        kind: Option<EntryKind>,
    ) -> StoreResult<Vec<ClinicalEntry>>;
    /// Entries across every record in scope
    async fn entries_in_scope(
        &self,
        scope: OwnershipScope,
        kind: Option<EntryKind>,
    ) -> StoreResult<Vec<ClinicalEntry>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
