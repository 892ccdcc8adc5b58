//! Identity types: roles, user identities and request principals

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Unique patient profile identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity classification
///
/// Roles are mutually exclusive: an identity holds exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
    Staff,
}

impl Role {
    /// All roles, in declaration order
    pub const ALL: [Role; 4] = [Role::Patient, Role::Doctor, Role::Admin, Role::Staff];

    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }

    /// Human-readable plural, used in denial messages
    pub fn plural(&self) -> &'static str {
        match self {
            Role::Patient => "Patients",
            Role::Doctor => "Doctors",
            Role::Admin => "Admins",
            Role::Staff => "Staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role tag is not recognized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role tag: {:?}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Stored role tags that do not parse become `None` instead of failing the
/// whole record, so the gate can reject the account explicitly.
fn lenient_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let tag: Option<String> = Option::deserialize(deserializer)?;
    Ok(tag.and_then(|t| t.parse().ok()))
}

/// Authenticated user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// User identifier
    pub id: UserId,

    /// Login name
    pub username: String,

    /// Role tag; `None` when the stored tag is missing or unrecognized
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: Option<Role>,

    /// Superuser flag
    #[serde(default)]
    pub is_superuser: bool,

    /// Linked patient profile (one-to-one, optional)
    #[serde(default)]
    pub patient_profile: Option<PatientId>,
}

impl Identity {
    /// Create an identity with the given role
    pub fn new(id: UserId, username: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            role: Some(role),
            is_superuser: false,
            patient_profile: None,
        }
    }

    /// Create an identity whose role tag is missing or unrecognized
    pub fn without_role(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            role: None,
            is_superuser: false,
            patient_profile: None,
        }
    }

    /// Set the superuser flag
    pub fn with_superuser(mut self, is_superuser: bool) -> Self {
        self.is_superuser = is_superuser;
        self
    }

    /// Link a patient profile
    pub fn with_patient_profile(mut self, profile: PatientId) -> Self {
        self.patient_profile = Some(profile);
        self
    }

    /// Normalize the identity before it is persisted.
    ///
    /// Superusers always carry the `admin` role, whatever was requested. Stores
    /// must call this on every save, not only on creation.
    pub fn prepare_for_save(&mut self) {
        if self.is_superuser {
            self.role = Some(Role::Admin);
        }
    }

    /// Whether the identity holds the given role
    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    /// Role name for logs and audit entries
    pub fn role_label(&self) -> &'static str {
        self.role.map(|r| r.as_str()).unwrap_or("unknown")
    }
}

/// Caller of a request: anonymous or an authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Principal {
    #[default]
    Anonymous,
    Authenticated(Identity),
}

impl Principal {
    /// Authenticated identity, if any
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Principal::Anonymous => None,
            Principal::Authenticated(identity) => Some(identity),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::Authenticated(_))
    }

    /// Username for logs, `anonymous` when unauthenticated
    pub fn username(&self) -> &str {
        match self {
            Principal::Anonymous => "anonymous",
            Principal::Authenticated(identity) => &identity.username,
        }
    }
}

impl From<Identity> for Principal {
    fn from(identity: Identity) -> Self {
        Principal::Authenticated(identity)
    }
}
