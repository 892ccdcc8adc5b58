//! Path policy: which roles may enter which URL-path prefixes
//!
//! The table is built once at startup (from defaults or a JSON file), validated,
//! and shared read-only behind an `Arc` for the life of the process.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{RbacError, Result};
use crate::identity::Role;

/// Locations the gate redirects to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locations {
    /// Login page
    pub login: String,

    /// Role-aware landing page
    pub dashboard: String,
}

impl Default for Locations {
    fn default() -> Self {
        Self {
            login: "/accounts/login/".to_string(),
            dashboard: "/dashboard/".to_string(),
        }
    }
}

/// Path access granted to a single role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "access", rename_all = "snake_case")]
pub enum RoleAccess {
    /// Every path is open to the role
    Unrestricted,

    /// Access limited to the listed prefixes
    Scoped(ScopedAccess),
}

/// Allowed and restricted prefixes for a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedAccess {
    /// Prefixes the role may enter
    pub allowed: Vec<String>,

    /// Prefixes always denied; checked before `allowed`
    #[serde(default)]
    pub restricted: Vec<String>,

    /// Superusers skip the restricted check
    #[serde(default)]
    pub superuser_bypass: bool,

    /// Message shown on a restricted hit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_message: Option<String>,
}

/// Static rule derived from the table: a prefix and the roles admitted under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathRule {
    pub prefix: String,
    pub allowed_roles: BTreeSet<Role>,
}

/// Classification of a path for a given role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathVerdict {
    /// Matches the public allowlist
    Public,
    /// Role may enter; carries the matching prefix (`*` for unrestricted roles)
    Allowed(String),
    /// Role is explicitly barred by the given prefix
    Restricted(String),
    /// No allowed prefix matches; wrong area for the role
    OutsideArea,
}

/// Role-to-prefix policy table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPolicy {
    /// Redirect locations
    #[serde(default)]
    pub locations: Locations,

    /// Prefixes open to everyone, including anonymous callers
    pub public_prefixes: Vec<String>,

    /// Paths open to everyone only on an exact match (the site root)
    #[serde(default)]
    pub public_exact: Vec<String>,

    /// Per-role access
    pub roles: BTreeMap<Role, RoleAccess>,
}

impl Default for PathPolicy {
    fn default() -> Self {
        let prefixes = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut roles = BTreeMap::new();
        roles.insert(
            Role::Patient,
            RoleAccess::Scoped(ScopedAccess {
                allowed: prefixes(&["/dashboard/", "/patients/", "/appointments/", "/accounts/"]),
                restricted: prefixes(&["/doctors/", "/medical-records/", "/admin/"]),
                superuser_bypass: false,
                restricted_message: Some("Access denied. Patients cannot access this area.".to_string()),
            }),
        );
        roles.insert(
            Role::Doctor,
            RoleAccess::Scoped(ScopedAccess {
                allowed: prefixes(&[
                    "/dashboard/",
                    "/patients/",
                    "/appointments/",
                    "/medical-records/",
                    "/accounts/",
                ]),
                restricted: prefixes(&["/admin/"]),
                superuser_bypass: true,
                restricted_message: Some("Access denied. Doctors cannot access admin areas.".to_string()),
            }),
        );
        roles.insert(
            Role::Staff,
            RoleAccess::Scoped(ScopedAccess {
                allowed: prefixes(&["/dashboard/", "/appointments/", "/accounts/"]),
                restricted: Vec::new(),
                superuser_bypass: false,
                restricted_message: None,
            }),
        );
        roles.insert(Role::Admin, RoleAccess::Unrestricted);

        Self {
            locations: Locations::default(),
            public_prefixes: prefixes(&[
                "/admin/login/",
                "/accounts/login/",
                "/accounts/register/",
                "/accounts/patient-register/",
                "/accounts/password_reset/",
                "/api/",
                "/static/",
                "/media/",
            ]),
            public_exact: prefixes(&["/"]),
            roles,
        }
    }
}

/// Longest prefix in `prefixes` that `path` starts with
fn longest_match<'a>(prefixes: &'a [String], path: &str) -> Option<&'a str> {
    prefixes
        .iter()
        .filter(|p| path.starts_with(p.as_str()))
        .max_by_key(|p| p.len())
        .map(|p| p.as_str())
}

impl PathPolicy {
    /// Parse and validate a policy from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let policy: PathPolicy = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load and validate a policy from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check the table for structural problems
    pub fn validate(&self) -> Result<()> {
        for location in [&self.locations.login, &self.locations.dashboard] {
            if !location.starts_with('/') {
                return Err(RbacError::InvalidPolicy(format!(
                    "redirect location '{}' must start with '/'",
                    location
                )));
            }
        }

        for prefix in self.public_prefixes.iter().chain(self.public_exact.iter()) {
            if !prefix.starts_with('/') {
                return Err(RbacError::InvalidPolicy(format!(
                    "public path '{}' must start with '/'",
                    prefix
                )));
            }
        }

        // A public prefix of "/" would open every path.
        if self.public_prefixes.iter().any(|p| p == "/") {
            return Err(RbacError::InvalidPolicy(
                "'/' may only be listed as an exact public path".to_string(),
            ));
        }

        for role in Role::ALL {
            let Some(access) = self.roles.get(&role) else {
                return Err(RbacError::InvalidPolicy(format!(
                    "role '{}' has no access entry",
                    role
                )));
            };

            if let RoleAccess::Scoped(scoped) = access {
                for prefix in scoped.allowed.iter().chain(scoped.restricted.iter()) {
                    if !prefix.starts_with('/') {
                        return Err(RbacError::InvalidPolicy(format!(
                            "prefix '{}' for role '{}' must start with '/'",
                            prefix, role
                        )));
                    }
                }

                if longest_match(&scoped.allowed, &self.locations.dashboard).is_none() {
                    return Err(RbacError::InvalidPolicy(format!(
                        "role '{}' cannot reach the dashboard '{}'",
                        role, self.locations.dashboard
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether the path is open to everyone
    pub fn is_public(&self, path: &str) -> bool {
        self.public_exact.iter().any(|p| p == path)
            || self.public_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Access entry for a role
    pub fn access_for(&self, role: Role) -> Option<&RoleAccess> {
        self.roles.get(&role)
    }

    /// Classify `path` for a role. Restricted prefixes win over allowed ones,
    /// even when both match.
    pub fn classify(&self, role: Role, is_superuser: bool, path: &str) -> PathVerdict {
        if self.is_public(path) {
            return PathVerdict::Public;
        }

        match self.access_for(role) {
            None => PathVerdict::OutsideArea,
            Some(RoleAccess::Unrestricted) => PathVerdict::Allowed("*".to_string()),
            Some(RoleAccess::Scoped(scoped)) => {
                match longest_match(&scoped.restricted, path) {
                    Some(_) if scoped.superuser_bypass && is_superuser => {
                        return PathVerdict::Allowed("superuser".to_string());
                    }
                    Some(prefix) => return PathVerdict::Restricted(prefix.to_string()),
                    None => {}
                }

                match longest_match(&scoped.allowed, path) {
                    Some(prefix) => PathVerdict::Allowed(prefix.to_string()),
                    None => PathVerdict::OutsideArea,
                }
            }
        }
    }

    /// Message shown when a role hits one of its restricted prefixes
    pub fn restricted_message(&self, role: Role) -> String {
        match self.access_for(role) {
            Some(RoleAccess::Scoped(ScopedAccess {
                restricted_message: Some(message),
                ..
            })) => message.clone(),
            _ => format!("Access denied. {} cannot access this area.", role.plural()),
        }
    }

    /// Flattened rules, longest prefix first
    pub fn rules(&self) -> Vec<PathRule> {
        let mut prefixes: BTreeSet<String> = BTreeSet::new();

        for access in self.roles.values() {
            if let RoleAccess::Scoped(scoped) = access {
                for prefix in scoped.allowed.iter().chain(scoped.restricted.iter()) {
                    prefixes.insert(prefix.clone());
                }
            }
        }

        let mut rules: Vec<PathRule> = prefixes
            .into_iter()
            .map(|prefix| {
                let allowed_roles = Role::ALL
                    .into_iter()
                    .filter(|role| {
                        matches!(self.classify(*role, false, &prefix), PathVerdict::Allowed(_))
                    })
                    .collect();
                PathRule { prefix, allowed_roles }
            })
            .collect();

        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()).then(a.prefix.cmp(&b.prefix)));
        rules
    }

    /// Roles admitted at `path` for non-superuser identities
    pub fn roles_for(&self, path: &str) -> BTreeSet<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| {
                matches!(
                    self.classify(*role, false, path),
                    PathVerdict::Allowed(_) | PathVerdict::Public
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        PathPolicy::default().validate().unwrap();
    }

    #[test]
    fn test_site_root_is_exact_match_only() {
        let policy = PathPolicy::default();
        assert!(policy.is_public("/"));
        assert!(!policy.is_public("/dashboard/"));
        assert!(policy.is_public("/static/css/site.css"));
    }

    #[test]
    fn test_restricted_beats_allowed() {
        let mut policy = PathPolicy::default();
        if let Some(RoleAccess::Scoped(scoped)) = policy.roles.get_mut(&Role::Patient) {
            scoped.allowed.push("/medical-records/".to_string());
        }

        assert_eq!(
            policy.classify(Role::Patient, false, "/medical-records/3/"),
            PathVerdict::Restricted("/medical-records/".to_string())
        );
    }

    #[test]
    fn test_doctor_superuser_bypass() {
        let policy = PathPolicy::default();
        assert_eq!(
            policy.classify(Role::Doctor, false, "/admin/users/"),
            PathVerdict::Restricted("/admin/".to_string())
        );
        assert!(matches!(
            policy.classify(Role::Doctor, true, "/admin/users/"),
            PathVerdict::Allowed(_)
        ));
    }

    #[test]
    fn test_staff_outside_area() {
        let policy = PathPolicy::default();
        assert_eq!(
            policy.classify(Role::Staff, false, "/medical-records/"),
            PathVerdict::OutsideArea
        );
        assert!(matches!(
            policy.classify(Role::Staff, false, "/appointments/4/"),
            PathVerdict::Allowed(_)
        ));
    }

    #[test]
    fn test_longest_prefix_reported() {
        let mut policy = PathPolicy::default();
        if let Some(RoleAccess::Scoped(scoped)) = policy.roles.get_mut(&Role::Staff) {
            scoped.allowed.push("/appointments/calendar/".to_string());
        }

        assert_eq!(
            policy.classify(Role::Staff, false, "/appointments/calendar/week/"),
            PathVerdict::Allowed("/appointments/calendar/".to_string())
        );
    }

    #[test]
    fn test_rules_list_roles_per_prefix() {
        let rules = PathPolicy::default().rules();
        let records = rules
            .iter()
            .find(|r| r.prefix == "/medical-records/")
            .unwrap();

        assert!(records.allowed_roles.contains(&Role::Doctor));
        assert!(records.allowed_roles.contains(&Role::Admin));
        assert!(!records.allowed_roles.contains(&Role::Patient));
        assert!(!records.allowed_roles.contains(&Role::Staff));

        // Longest first
        assert!(rules.windows(2).all(|w| w[0].prefix.len() >= w[1].prefix.len()));
    }

    #[test]
    fn test_validate_rejects_missing_role() {
        let mut policy = PathPolicy::default();
        policy.roles.remove(&Role::Staff);
        assert!(matches!(policy.validate(), Err(RbacError::InvalidPolicy(_))));
    }

    #[test]
    fn test_validate_rejects_public_root_prefix() {
        let mut policy = PathPolicy::default();
        policy.public_prefixes.push("/".to_string());
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_preserves_table() {
        let policy = PathPolicy::default();
        let json = serde_json::to_string(&policy).unwrap();
        let parsed = PathPolicy::from_json_str(&json).unwrap();
        assert_eq!(parsed, policy);
    }

    #[test]
    fn test_restricted_message_fallback() {
        let policy = PathPolicy::default();
        assert_eq!(
            policy.restricted_message(Role::Staff),
            "Access denied. Staff cannot access this area."
        );
        assert_eq!(
            policy.restricted_message(Role::Doctor),
            "Access denied. Doctors cannot access admin areas."
        );
    }
}
