//! Ownership resolver: which records an identity may see
//!
//! The resolver turns `(identity, resource class)` into an [`OwnershipScope`]
//! that the store applies inside its lookups. A record outside the scope is
//! never loaded, so callers cannot distinguish it from a missing id.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AccessError;
use crate::identity::{Identity, PatientId, Role, UserId};

/// Class of patient-owned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Appointment,
    /// Medical records and every clinical entry under them
    MedicalRecord,
    PatientProfile,
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceClass::Appointment => "appointment",
            ResourceClass::MedicalRecord => "medical_record",
            ResourceClass::PatientProfile => "patient_profile",
        };
        f.write_str(name)
    }
}

/// Query filter derived from an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "patient", rename_all = "snake_case")]
pub enum OwnershipScope {
    /// Every record of the class
    Unscoped,
    /// Only records owned by this patient profile
    OwnedBy(PatientId),
}

impl OwnershipScope {
    /// Whether a record owned by `owner` passes the filter
    pub fn permits(&self, owner: PatientId) -> bool {
        match self {
            OwnershipScope::Unscoped => true,
            OwnershipScope::OwnedBy(profile) => *profile == owner,
        }
    }

    /// Filter a record, answering `NotFound` when it is outside the scope
    pub fn check<T: Owned>(&self, record: T) -> Result<T, AccessError> {
        if self.permits(record.owner()) {
            Ok(record)
        } else {
            Err(AccessError::NotFound)
        }
    }
}

/// A record with an owning patient
pub trait Owned {
    fn owner(&self) -> PatientId;
}

impl<T: Owned + ?Sized> Owned for &T {
    fn owner(&self) -> PatientId {
        (**self).owner()
    }
}

/// Resolve the scope `identity` gets for `class`
///
/// The caller is expected to have passed the path gate already; an identity
/// without a recognized role still resolves to `InvalidRole` here.
pub fn resolve_scope(identity: &Identity, class: ResourceClass) -> Result<OwnershipScope, AccessError> {
    match identity.role {
        None => Err(AccessError::InvalidRole),
        Some(Role::Patient) => identity
            .patient_profile
            .map(OwnershipScope::OwnedBy)
            .ok_or(AccessError::MissingProfile),
        Some(Role::Doctor) | Some(Role::Admin) => Ok(OwnershipScope::Unscoped),
        Some(Role::Staff) => match class {
            ResourceClass::Appointment => Ok(OwnershipScope::Unscoped),
            ResourceClass::MedicalRecord | ResourceClass::PatientProfile => {
                Err(AccessError::RoleForbidden)
            }
        },
    }
}

/// Doctor assigned by default when `identity` books an appointment
pub fn default_assignee(identity: &Identity) -> Option<UserId> {
    identity.has_role(Role::Doctor).then_some(identity.id)
}
