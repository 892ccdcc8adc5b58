//! Demo data for local runs (`--seed-demo`)

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clinic_rbac::{Identity, OwnershipScope, Role, UserId};
use tracing::{info, warn};

use crate::auth::hash_password;
use crate::models::{Account, Appointment, AppointmentStatus, Gender, MedicalRecord, PatientRequest};
use crate::store::ClinicStore;

/// Password shared by every demo account
pub const DEMO_PASSWORD: &str = "clinic-demo";

async fn account(
    store: &dyn ClinicStore,
    identity: Identity,
    first_name: &str,
    last_name: &str,
) -> Result<Account> {
    let username = identity.username.clone();
    let mut account = Account::new(identity);
    account.first_name = first_name.to_string();
    account.last_name = last_name.to_string();
    account.password_digest = Some(hash_password(DEMO_PASSWORD)?);

    store
        .create_account(account)
        .await
        .with_context(|| format!("failed to seed account {}", username))
}

/// Populate an empty store with one account per role, a linked patient
/// profile, an appointment and a medical record
pub async fn seed_demo(store: &dyn ClinicStore) -> Result<Vec<String>> {
    let admin = account(
        store,
        Identity::new(UserId(0), "admin", Role::Admin).with_superuser(true),
        "Ada",
        "Admin",
    )
    .await?;
    let doctor = account(
        store,
        Identity::new(UserId(0), "dr_grey", Role::Doctor),
        "Meredith",
        "Grey",
    )
    .await?;
    let staff = account(
        store,
        Identity::new(UserId(0), "frontdesk", Role::Staff),
        "Sam",
        "Desk",
    )
    .await?;

    let profile = store
        .create_patient(
            PatientRequest {
                first_name: "Alice".to_string(),
                last_name: "Martin".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1988, 4, 12).unwrap_or_default(),
                gender: Gender::Female,
                address: "12 Rue des Lilas".to_string(),
                phone_number: "555-0142".to_string(),
                email: Some("alice@example.com".to_string()),
                blood_group: None,
                medical_history: None,
                social_security_number: None,
                emergency_contact_name: "Paul Martin".to_string(),
                emergency_contact_phone: "555-0143".to_string(),
                emergency_contact_relationship: Some("Spouse".to_string()),
                username: None,
            }
            .into_profile(),
        )
        .await
        .context("failed to seed patient profile")?;
    let patient = account(
        store,
        Identity::new(UserId(0), "alice", Role::Patient).with_patient_profile(profile.id),
        "Alice",
        "Martin",
    )
    .await?;

    let start = Utc::now() + Duration::days(1);
    store
        .create_appointment(Appointment {
            id: 0,
            patient: profile.id,
            doctor: Some(doctor.id()),
            start_time: start,
            end_time: start + Duration::minutes(30),
            reason: "Annual checkup".to_string(),
            status: AppointmentStatus::Scheduled,
            notes: None,
            date_created: Utc::now(),
            last_updated: Utc::now(),
        })
        .await
        .context("failed to seed appointment")?;
    store
        .create_record(MedicalRecord {
            id: 0,
            patient: profile.id,
            record_date: Utc::now(),
            recorded_by: Some(doctor.id()),
            chief_complaint: Some("Seasonal allergies".to_string()),
            current_symptoms: None,
            allergies: Some("Pollen".to_string()),
        })
        .await
        .context("failed to seed medical record")?;

    let seeded = vec![
        admin.username().to_string(),
        doctor.username().to_string(),
        staff.username().to_string(),
        patient.username().to_string(),
    ];
    let patients = store.list_patients(OwnershipScope::Unscoped).await?.len();
    info!(accounts = ?seeded, patients, "demo data seeded");
    warn!("demo accounts share a well-known password; do not expose this server");

    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_seed_demo_links_patient() {
        let store = InMemoryStore::new();
        let seeded = seed_demo(&store).await.unwrap();
        assert_eq!(seeded, vec!["admin", "dr_grey", "frontdesk", "alice"]);

        let alice = store.find_account("alice").await.unwrap();
        let profile = alice.identity.patient_profile.unwrap();
        let own = store
            .list_appointments(OwnershipScope::OwnedBy(profile))
            .await
            .unwrap();
        assert_eq!(own.len(), 1);

        let admin = store.find_account("admin").await.unwrap();
        assert_eq!(admin.identity.role, Some(Role::Admin));
    }
}
