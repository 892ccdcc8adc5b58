//! Domain entities and request/response bodies

use chrono::{DateTime, NaiveDate, Utc};
use clinic_rbac::{Identity, Owned, PatientId, Role, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// ACCOUNTS
// ============================================================================

/// Stored user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(flatten)]
    pub identity: Identity,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    /// Salted password digest; `None` until the account is activated
    #[serde(skip)]
    pub password_digest: Option<String>,

    pub is_active: bool,

    pub date_joined: DateTime<Utc>,
}

impl Account {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            email: None,
            first_name: String::new(),
            last_name: String::new(),
            password_digest: None,
            is_active: true,
            date_joined: Utc::now(),
        }
    }

    pub fn id(&self) -> UserId {
        self.identity.id
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// Whether a password has been set
    pub fn has_usable_password(&self) -> bool {
        self.password_digest.is_some()
    }
}

// ============================================================================
// PATIENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

/// Patient profile, optionally linked to one user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: PatientId,
    pub user: Option<UserId>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub address: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub blood_group: Option<BloodGroup>,
    pub medical_history: Option<String>,
    /// Public identifier, generated at creation
    pub patient_uid: Uuid,
    pub social_security_number: Option<String>,
    pub emergency_contact_name: String,
    pub emergency_contact_phone: String,
    pub emergency_contact_relationship: Option<String>,
    pub date_registered: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl PatientProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Owned for PatientProfile {
    fn owner(&self) -> PatientId {
        self.id
    }
}

/// Body for creating or editing a patient profile
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PatientRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100))]
    pub last_name: String,

    pub date_of_birth: NaiveDate,

    pub gender: Gender,

    #[validate(length(min = 1))]
    pub address: String,

    #[validate(length(min = 1, max = 20))]
    pub phone_number: String,

    #[validate(email)]
    pub email: Option<String>,

    pub blood_group: Option<BloodGroup>,

    pub medical_history: Option<String>,

    #[validate(length(min = 1, max = 50))]
    pub social_security_number: Option<String>,

    #[validate(length(min = 1, max = 200))]
    pub emergency_contact_name: String,

    #[validate(length(min = 1, max = 20))]
    pub emergency_contact_phone: String,

    #[validate(length(max = 50))]
    pub emergency_contact_relationship: Option<String>,

    /// Create a passwordless patient account with this username, to be
    /// activated through patient registration. Ignored on edits.
    #[validate(length(min = 1, max = 150))]
    pub username: Option<String>,
}

impl PatientRequest {
    /// Checks that span fields or depend on the clock
    pub fn check(&self) -> Result<(), String> {
        if self.date_of_birth > Utc::now().date_naive() {
            return Err("Date of birth cannot be in the future.".to_string());
        }
        Ok(())
    }

    /// Apply the request onto an existing or fresh profile
    pub fn apply(self, profile: &mut PatientProfile) {
        profile.first_name = self.first_name;
        profile.last_name = self.last_name;
        profile.date_of_birth = self.date_of_birth;
        profile.gender = self.gender;
        profile.address = self.address;
        profile.phone_number = self.phone_number;
        profile.email = self.email;
        profile.blood_group = self.blood_group;
        profile.medical_history = self.medical_history;
        profile.social_security_number = self.social_security_number;
        profile.emergency_contact_name = self.emergency_contact_name;
        profile.emergency_contact_phone = self.emergency_contact_phone;
        profile.emergency_contact_relationship = self.emergency_contact_relationship;
        profile.last_updated = Utc::now();
    }

    pub fn into_profile(self) -> PatientProfile {
        let now = Utc::now();
        let mut profile = PatientProfile {
            id: PatientId(0),
            user: None,
            first_name: String::new(),
            last_name: String::new(),
            date_of_birth: self.date_of_birth,
            gender: self.gender,
            address: String::new(),
            phone_number: String::new(),
            email: None,
            blood_group: None,
            medical_history: None,
            patient_uid: Uuid::new_v4(),
            social_security_number: None,
            emergency_contact_name: String::new(),
            emergency_contact_phone: String::new(),
            emergency_contact_relationship: None,
            date_registered: now,
            last_updated: now,
        };
        self.apply(&mut profile);
        profile
    }
}

// ============================================================================
// APPOINTMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    Rescheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: u64,
    pub patient: PatientId,
    pub doctor: Option<UserId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub date_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Owned for Appointment {
    fn owner(&self) -> PatientId {
        self.patient
    }
}

impl Appointment {
    /// Time window checks shared by create and update
    pub fn check_times(&self, now: DateTime<Utc>) -> Result<(), String> {
        if self.start_time < now {
            return Err("Appointment start time cannot be in the past.".to_string());
        }
        if self.end_time <= self.start_time {
            return Err("End time must be after start time.".to_string());
        }
        Ok(())
    }
}

/// Body for booking an appointment
///
/// Patients send `date` and `reason` only. Clinicians and staff send
/// `patient`, `start_time` and `end_time`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppointmentRequest {
    pub patient: Option<PatientId>,
    pub doctor: Option<UserId>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub date: Option<NaiveDate>,

    #[validate(length(min = 1))]
    pub reason: String,

    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppointmentUpdate {
    pub doctor: Option<UserId>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    #[validate(length(min = 1))]
    pub reason: Option<String>,

    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

// ============================================================================
// MEDICAL RECORDS
// ============================================================================

/// A patient's medical dossier; clinical entries hang off it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: u64,
    pub patient: PatientId,
    pub record_date: DateTime<Utc>,
    pub recorded_by: Option<UserId>,
    pub chief_complaint: Option<String>,
    pub current_symptoms: Option<String>,
    pub allergies: Option<String>,
}

impl Owned for MedicalRecord {
    fn owner(&self) -> PatientId {
        self.patient
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecordRequest {
    /// Raw id; checked against the store before the record is created
    pub patient: u64,
    pub chief_complaint: Option<String>,
    pub current_symptoms: Option<String>,
    pub allergies: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicalRecordUpdate {
    pub chief_complaint: Option<String>,
    pub current_symptoms: Option<String>,
    pub allergies: Option<String>,
}

/// Record with its clinical entries
#[derive(Debug, Clone, Serialize)]
pub struct MedicalRecordDetail {
    #[serde(flatten)]
    pub record: MedicalRecord,
    pub entries: Vec<ClinicalEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Consultation,
    LabResult,
    Prescription,
    ImagingResult,
    HospitalizationReport,
    DiseaseEvolution,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryKind::Consultation => "consultation",
            EntryKind::LabResult => "lab_result",
            EntryKind::Prescription => "prescription",
            EntryKind::ImagingResult => "imaging_result",
            EntryKind::HospitalizationReport => "hospitalization_report",
            EntryKind::DiseaseEvolution => "disease_evolution",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagingType {
    Xray,
    Ultrasound,
    Mri,
    CtScan,
    Other,
}

fn signed() -> bool {
    true
}

/// Per-kind payload of a clinical entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDetails {
    Consultation {
        consultation_date: DateTime<Utc>,
        doctor: Option<UserId>,
        diagnosis: String,
        notes: Option<String>,
        follow_up_date: Option<NaiveDate>,
    },
    LabResult {
        analysis_type: String,
        measured_value: String,
        reference_value: Option<String>,
        conclusion: Option<String>,
        sample_collection_date: DateTime<Utc>,
        laboratory_name: Option<String>,
        technician: Option<UserId>,
    },
    Prescription {
        doctor: Option<UserId>,
        medications: String,
        complementary_exams: Option<String>,
        medical_advice: Option<String>,
        #[serde(default = "signed")]
        is_signed: bool,
    },
    ImagingResult {
        imaging_type: ImagingType,
        scan_date: NaiveDate,
        conclusion: String,
        radiologist: Option<UserId>,
    },
    HospitalizationReport {
        admission_date: NaiveDate,
        discharge_date: Option<NaiveDate>,
        reason_for_admission: String,
        procedure_performed: Option<String>,
        report_details: String,
        attending_doctor: Option<UserId>,
    },
    DiseaseEvolution {
        observations: String,
        doctor: Option<UserId>,
    },
}

impl EntryDetails {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryDetails::Consultation { .. } => EntryKind::Consultation,
            EntryDetails::LabResult { .. } => EntryKind::LabResult,
            EntryDetails::Prescription { .. } => EntryKind::Prescription,
            EntryDetails::ImagingResult { .. } => EntryKind::ImagingResult,
            EntryDetails::HospitalizationReport { .. } => EntryKind::HospitalizationReport,
            EntryDetails::DiseaseEvolution { .. } => EntryKind::DiseaseEvolution,
        }
    }

    /// Required text fields must not be blank
    pub fn check(&self) -> Result<(), String> {
        let required: Vec<(&str, &str)> = match self {
            EntryDetails::Consultation { diagnosis, .. } => vec![("diagnosis", diagnosis.as_str())],
            EntryDetails::LabResult {
                analysis_type,
                measured_value,
                ..
            } => vec![
                ("analysis_type", analysis_type.as_str()),
                ("measured_value", measured_value.as_str()),
            ],
            EntryDetails::Prescription { medications, .. } => {
                vec![("medications", medications.as_str())]
            }
            EntryDetails::ImagingResult { conclusion, .. } => vec![("conclusion", conclusion.as_str())],
            EntryDetails::HospitalizationReport {
                admission_date,
                discharge_date,
                reason_for_admission,
                report_details,
                ..
            } => {
                if matches!(discharge_date, Some(d) if d < admission_date) {
                    return Err("Discharge date cannot be before admission date.".to_string());
                }
                vec![
                    ("reason_for_admission", reason_for_admission.as_str()),
                    ("report_details", report_details.as_str()),
                ]
            }
            EntryDetails::DiseaseEvolution { observations, .. } => {
                vec![("observations", observations.as_str())]
            }
        };

        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(format!("{}: This field is required.", field)),
            None => Ok(()),
        }
    }

    /// Fill the author with the calling doctor when left blank
    pub fn default_author(&mut self, author: Option<UserId>) {
        let slot = match self {
            EntryDetails::Consultation { doctor, .. }
            | EntryDetails::Prescription { doctor, .. }
            | EntryDetails::DiseaseEvolution { doctor, .. } => doctor,
            EntryDetails::LabResult { technician, .. } => technician,
            EntryDetails::ImagingResult { radiologist, .. } => radiologist,
            EntryDetails::HospitalizationReport {
                attending_doctor, ..
            } => attending_doctor,
        };
        if slot.is_none() {
            *slot = author;
        }
    }
}

/// Sub-record of a medical record; owned through its parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalEntry {
    pub id: u64,
    pub medical_record: u64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: EntryDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryQuery {
    pub kind: Option<EntryKind>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientRecordsQuery {
    #[serde(rename = "type")]
    pub record_type: Option<String>,
}

// ============================================================================
// ACCOUNT REQUESTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,

    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: String,
    pub redirect: String,
}

/// Self-service signup; always creates a patient-role account
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,

    #[validate(length(min = 8))]
    pub password: String,

    #[validate(email)]
    pub email: Option<String>,

    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: String,

    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: String,
}

/// Activation of a clinician-created patient account
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PatientRegisterRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,

    #[validate(length(min = 8))]
    pub password1: String,

    pub password2: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UserCreateRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,

    #[validate(length(min = 8))]
    pub password: Option<String>,

    pub role: Role,

    #[serde(default)]
    pub is_superuser: bool,

    #[validate(email)]
    pub email: Option<String>,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    pub patient_profile: Option<PatientId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UserUpdateRequest {
    pub role: Option<Role>,
    pub is_superuser: Option<bool>,
    pub is_active: Option<bool>,

    #[validate(email)]
    pub email: Option<String>,

    pub patient_profile: Option<PatientId>,
}

/// A doctor's edit of their own account; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DoctorProfileUpdate {
    #[validate(length(max = 150))]
    pub first_name: Option<String>,

    #[validate(length(max = 150))]
    pub last_name: Option<String>,

    #[validate(email)]
    pub email: Option<String>,
}

impl DoctorProfileUpdate {
    pub fn apply(self, account: &mut Account) {
        if let Some(first_name) = self.first_name {
            account.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            account.last_name = last_name;
        }
        if let Some(email) = self.email {
            account.email = Some(email);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub username: Option<String>,
    pub limit: Option<usize>,
}

/// Role-specific landing page data
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardResponse {
    pub username: String,
    pub role: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub upcoming_appointments_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_records_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub todays_patients_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_appointments_count: Option<usize>,

    /// Set when the counts cannot be computed for this account
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}
