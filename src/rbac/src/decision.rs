//! Access decision types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AccessError;

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a denied request is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectTarget {
    Login,
    Dashboard,
}

/// Redirect produced by a denial or a soft correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    /// Logical destination
    pub target: RedirectTarget,

    /// Concrete location resolved from the policy
    pub location: String,

    /// Why the request was redirected
    pub reason: DenialReason,

    /// Message shown to the user
    pub message: String,

    /// Notification severity
    pub severity: Severity,
}

/// Classification of a redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// No session on a protected path
    Unauthenticated,
    /// Authenticated identity without a recognized role
    InvalidRole,
    /// Role excluded from the path or operation
    RoleForbidden,
    /// Patient without a linked profile
    MissingProfile,
    /// Wrong area for the role; navigational, not a denial
    WrongArea,
}

impl DenialReason {
    /// Whether this is a hard denial rather than a soft redirect
    pub fn is_denial(&self) -> bool {
        !matches!(self, DenialReason::WrongArea)
    }
}

impl AccessError {
    /// Redirect classification; `NotFound` is answered in place, not redirected
    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            AccessError::Unauthenticated => Some(DenialReason::Unauthenticated),
            AccessError::InvalidRole => Some(DenialReason::InvalidRole),
            AccessError::RoleForbidden => Some(DenialReason::RoleForbidden),
            AccessError::MissingProfile => Some(DenialReason::MissingProfile),
            AccessError::NotFound => None,
        }
    }
}

/// Output of the gate, created fresh per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    DenyRedirect(Redirect),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    /// Redirect details when the request was not allowed
    pub fn redirect(&self) -> Option<&Redirect> {
        match self {
            AccessDecision::Allow => None,
            AccessDecision::DenyRedirect(redirect) => Some(redirect),
        }
    }

    /// Logical redirect destination, if any
    pub fn target(&self) -> Option<RedirectTarget> {
        self.redirect().map(|r| r.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_area_is_not_a_denial() {
        assert!(!DenialReason::WrongArea.is_denial());
        assert!(DenialReason::InvalidRole.is_denial());
    }

    #[test]
    fn test_decision_accessors() {
        let decision = AccessDecision::DenyRedirect(Redirect {
            target: RedirectTarget::Login,
            location: "/accounts/login/".to_string(),
            reason: DenialReason::Unauthenticated,
            message: "Please log in to access this page.".to_string(),
            severity: Severity::Error,
        });

        assert!(!decision.is_allowed());
        assert_eq!(decision.target(), Some(RedirectTarget::Login));
        assert!(AccessDecision::Allow.redirect().is_none());
    }

    #[test]
    fn test_not_found_has_no_redirect_reason() {
        assert!(AccessError::NotFound.denial_reason().is_none());
        assert_eq!(
            AccessError::MissingProfile.denial_reason(),
            Some(DenialReason::MissingProfile)
        );
    }
}
