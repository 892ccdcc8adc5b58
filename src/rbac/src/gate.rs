//! RBAC gate: path-level and operation-level access policies
//!
//! # Architecture
//!
//! ```text
//! Request → PathGate ──────────→ RoleRequirement ──→ handler → OwnershipResolver
//!             │ public? allow        │ declared roles          │ scoped lookup
//!             │ anonymous? login     │                         │
//!             │ no role? login       ↓                         ↓
//!             │ restricted? dash  [AuditSink]             NotFound / MissingProfile
//!             │ outside area? dash
//!             ↓
//!          [AuditSink]
//! ```
//!
//! Each layer implements [`AccessPolicy`]; the dispatcher composes them in a
//! [`PolicyChain`] and the first denial wins.

use std::sync::Arc;
use tracing::debug;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::decision::{AccessDecision, DenialReason, Redirect, RedirectTarget, Severity};
use crate::error::AccessError;
use crate::identity::{Identity, Principal, Role};
use crate::ownership::{resolve_scope, OwnershipScope, ResourceClass};
use crate::policy::{Locations, PathPolicy, PathVerdict};

/// Shown to anonymous callers on protected pages
pub const LOGIN_REQUIRED_MESSAGE: &str = "Please log in to access this page.";

/// Shown when the path gate finds no recognized role
pub const INVALID_ROLE_MESSAGE: &str = "Invalid user type. Please contact support.";

/// Shown when an operation finds no recognized role
pub const INVALID_ACCOUNT_MESSAGE: &str = "Invalid user account. Please contact support.";

/// Shown on a soft redirect
pub const WRONG_AREA_MESSAGE: &str = "Redirecting to your dashboard.";

/// Shown when a patient account has no linked profile
pub const MISSING_PROFILE_MESSAGE: &str = "Your user profile is not linked to a patient profile.";

/// Shown when a record class is closed to the caller's role
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied.";

/// What a policy sees of the request
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub principal: &'a Principal,
    pub path: &'a str,
    pub method: &'a str,
}

impl<'a> RequestContext<'a> {
    pub fn new(principal: &'a Principal, path: &'a str, method: &'a str) -> Self {
        Self {
            principal,
            path,
            method,
        }
    }
}

/// A single access-control capability
pub trait AccessPolicy: Send + Sync {
    /// Name used in audit entries
    fn name(&self) -> &str;

    fn evaluate(&self, ctx: &RequestContext<'_>) -> AccessDecision;
}

fn build_redirect(
    locations: &Locations,
    target: RedirectTarget,
    reason: DenialReason,
    message: impl Into<String>,
    severity: Severity,
) -> Redirect {
    let location = match target {
        RedirectTarget::Login => locations.login.clone(),
        RedirectTarget::Dashboard => locations.dashboard.clone(),
    };

    Redirect {
        target,
        location,
        reason,
        message: message.into(),
        severity,
    }
}

fn redirect(
    locations: &Locations,
    target: RedirectTarget,
    reason: DenialReason,
    message: impl Into<String>,
    severity: Severity,
) -> AccessDecision {
    AccessDecision::DenyRedirect(build_redirect(locations, target, reason, message, severity))
}

/// Coarse, path-level gate run on every request
#[derive(Clone)]
pub struct PathGate {
    policy: Arc<PathPolicy>,
    audit: Arc<dyn AuditSink>,
}

impl PathGate {
    pub fn new(policy: Arc<PathPolicy>, audit: Arc<dyn AuditSink>) -> Self {
        Self { policy, audit }
    }

    pub fn policy(&self) -> &Arc<PathPolicy> {
        &self.policy
    }

    /// Decide whether `principal` may enter `path`
    ///
    /// # Evaluation order
    ///
    /// 1. Public allowlist → allow, no identity check
    /// 2. Anonymous → login
    /// 3. No recognized role → login
    /// 4. Admin → allow, audited
    /// 5. Restricted prefix → dashboard with an error
    /// 6. No allowed prefix → dashboard with an informational message
    pub fn authorize_path(&self, principal: &Principal, path: &str) -> AccessDecision {
        if self.policy.is_public(path) {
            debug!(path = %path, "public path");
            return AccessDecision::Allow;
        }

        let Some(identity) = principal.identity() else {
            self.audit.record(AuditEvent::new(
                AuditKind::AnonymousDenied,
                "anonymous",
                None,
                path,
                self.name(),
                format!("Unauthenticated access attempt to {}", path),
            ));
            return redirect(
                &self.policy.locations,
                RedirectTarget::Login,
                DenialReason::Unauthenticated,
                LOGIN_REQUIRED_MESSAGE,
                Severity::Error,
            );
        };

        let Some(role) = identity.role else {
            self.audit.record(AuditEvent::new(
                AuditKind::InvalidRole,
                identity.username.clone(),
                Some(identity.role_label().to_string()),
                path,
                self.name(),
                format!("User {} has invalid user type", identity.username),
            ));
            return redirect(
                &self.policy.locations,
                RedirectTarget::Login,
                DenialReason::InvalidRole,
                INVALID_ROLE_MESSAGE,
                Severity::Error,
            );
        };

        match self.policy.classify(role, identity.is_superuser, path) {
            PathVerdict::Public => AccessDecision::Allow,
            PathVerdict::Allowed(prefix) => {
                if role == Role::Admin {
                    self.audit.record(AuditEvent::new(
                        AuditKind::AdminAccess,
                        identity.username.clone(),
                        Some(role.to_string()),
                        path,
                        self.name(),
                        format!("Admin {} accessed {}", identity.username, path),
                    ));
                }
                debug!(path = %path, role = %role, prefix = %prefix, "path allowed");
                AccessDecision::Allow
            }
            PathVerdict::Restricted(prefix) => {
                self.audit.record(AuditEvent::new(
                    AuditKind::RoleMismatch,
                    identity.username.clone(),
                    Some(role.to_string()),
                    path,
                    self.name(),
                    format!(
                        "{} {} attempted to access restricted area {}",
                        role, identity.username, prefix
                    ),
                ));
                redirect(
                    &self.policy.locations,
                    RedirectTarget::Dashboard,
                    DenialReason::RoleForbidden,
                    self.policy.restricted_message(role),
                    Severity::Error,
                )
            }
            PathVerdict::OutsideArea => {
                self.audit.record(AuditEvent::new(
                    AuditKind::SoftRedirect,
                    identity.username.clone(),
                    Some(role.to_string()),
                    path,
                    self.name(),
                    format!("{} {} redirected to dashboard", role, identity.username),
                ));
                redirect(
                    &self.policy.locations,
                    RedirectTarget::Dashboard,
                    DenialReason::WrongArea,
                    WRONG_AREA_MESSAGE,
                    Severity::Info,
                )
            }
        }
    }

    /// Resolve the ownership scope for a request, auditing refusals
    pub fn scope_for(
        &self,
        identity: &Identity,
        class: ResourceClass,
        path: &str,
    ) -> Result<OwnershipScope, AccessError> {
        let result = resolve_scope(identity, class);
        if let Err(err) = &result {
            let kind = match err {
                AccessError::MissingProfile => AuditKind::MissingProfile,
                AccessError::InvalidRole => AuditKind::InvalidRole,
                _ => AuditKind::RoleMismatch,
            };
            self.audit.record(AuditEvent::new(
                kind,
                identity.username.clone(),
                Some(identity.role_label().to_string()),
                path,
                "ownership",
                format!("{} scope refused for {}: {}", class, identity.username, err),
            ));
        }
        result
    }

    /// Redirect that answers an access error; `NotFound` has none
    pub fn redirect_for(&self, err: &AccessError) -> Option<Redirect> {
        let reason = err.denial_reason()?;
        let (target, message) = match err {
            AccessError::Unauthenticated => (RedirectTarget::Login, LOGIN_REQUIRED_MESSAGE),
            AccessError::InvalidRole => (RedirectTarget::Login, INVALID_ACCOUNT_MESSAGE),
            AccessError::MissingProfile => (RedirectTarget::Dashboard, MISSING_PROFILE_MESSAGE),
            AccessError::RoleForbidden | AccessError::NotFound => {
                (RedirectTarget::Dashboard, ACCESS_DENIED_MESSAGE)
            }
        };

        Some(build_redirect(
            &self.policy.locations,
            target,
            reason,
            message,
            Severity::Error,
        ))
    }

    /// Operation-level requirement sharing this gate's locations and audit sink
    pub fn requirement(&self, operation: impl Into<String>, roles: &[Role]) -> RoleRequirement {
        RoleRequirement {
            operation: operation.into(),
            roles: roles.to_vec(),
            locations: self.policy.locations.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl AccessPolicy for PathGate {
    fn name(&self) -> &str {
        "path"
    }

    fn evaluate(&self, ctx: &RequestContext<'_>) -> AccessDecision {
        self.authorize_path(ctx.principal, ctx.path)
    }
}

/// Roles an operation admits, declared where the operation is registered
#[derive(Clone)]
pub struct RoleRequirement {
    operation: String,
    roles: Vec<Role>,
    locations: Locations,
    audit: Arc<dyn AuditSink>,
}

impl RoleRequirement {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    fn roles_label(&self) -> String {
        self.roles
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Debug for RoleRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleRequirement")
            .field("operation", &self.operation)
            .field("roles", &self.roles)
            .finish()
    }
}

impl AccessPolicy for RoleRequirement {
    fn name(&self) -> &str {
        &self.operation
    }

    fn evaluate(&self, ctx: &RequestContext<'_>) -> AccessDecision {
        let Some(identity) = ctx.principal.identity() else {
            self.audit.record(AuditEvent::new(
                AuditKind::AnonymousDenied,
                "anonymous",
                None,
                ctx.path,
                self.name(),
                format!("Unauthenticated call to {}", self.operation),
            ));
            return redirect(
                &self.locations,
                RedirectTarget::Login,
                DenialReason::Unauthenticated,
                LOGIN_REQUIRED_MESSAGE,
                Severity::Error,
            );
        };

        let Some(role) = identity.role else {
            self.audit.record(AuditEvent::new(
                AuditKind::InvalidRole,
                identity.username.clone(),
                Some(identity.role_label().to_string()),
                ctx.path,
                self.name(),
                format!("User {} has no recognized role", identity.username),
            ));
            return redirect(
                &self.locations,
                RedirectTarget::Login,
                DenialReason::InvalidRole,
                INVALID_ACCOUNT_MESSAGE,
                Severity::Error,
            );
        };

        if self.roles.contains(&role) {
            return AccessDecision::Allow;
        }

        let required = self.roles_label();
        self.audit.record(AuditEvent::new(
            AuditKind::RoleMismatch,
            identity.username.clone(),
            Some(role.to_string()),
            ctx.path,
            self.name(),
            format!("{} requires one of [{}]", self.operation, required),
        ));
        redirect(
            &self.locations,
            RedirectTarget::Dashboard,
            DenialReason::RoleForbidden,
            format!("Access denied. This area is restricted to {}.", required),
            Severity::Error,
        )
    }
}

/// Ordered composition of policies; the first denial wins
#[derive(Clone, Default)]
pub struct PolicyChain {
    links: Vec<Arc<dyn AccessPolicy>>,
}

impl PolicyChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.links.push(policy);
        self
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl AccessPolicy for PolicyChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn evaluate(&self, ctx: &RequestContext<'_>) -> AccessDecision {
        for link in &self.links {
            let decision = link.evaluate(ctx);
            if !decision.is_allowed() {
                debug!(policy = %link.name(), path = %ctx.path, "denied by policy");
                return decision;
            }
        }
        AccessDecision::Allow
    }
}
