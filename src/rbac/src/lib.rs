//! # Clinic RBAC
//!
//! Role-based access control for the clinical records service.
//!
//! ## Features
//!
//! - **Path gate** evaluated on every request against an immutable prefix table
//! - **Per-operation role requirements** composed with the gate in a policy chain
//! - **Ownership scoping** applied inside store lookups
//! - **Audit trail** of denials, soft redirects and admin access
//! - **Route coverage audit** reporting where the two guard layers disagree
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use clinic_rbac::{Identity, PathGate, PathPolicy, Principal, Role, TracingAuditSink, UserId};
//!
//! let gate = PathGate::new(Arc::new(PathPolicy::default()), Arc::new(TracingAuditSink));
//!
//! let doctor: Principal = Identity::new(UserId(1), "house", Role::Doctor).into();
//! assert!(gate.authorize_path(&doctor, "/medical-records/").is_allowed());
//!
//! let denied = gate.authorize_path(&doctor, "/admin/users/");
//! assert_eq!(
//!     denied.redirect().map(|r| r.message.as_str()),
//!     Some("Access denied. Doctors cannot access admin areas.")
//! );
//! ```

pub mod audit;
pub mod coverage;
pub mod decision;
pub mod error;
pub mod gate;
pub mod identity;
pub mod notify;
pub mod ownership;
pub mod policy;

// Re-export commonly used types
pub use audit::{
    AuditEvent, AuditKind, AuditLevel, AuditSink, AuditStats, FanoutAuditSink, MemoryAuditSink,
    TracingAuditSink,
};
pub use coverage::{audit_routes, CoverageIssue, RouteDecl};
pub use decision::{AccessDecision, DenialReason, Redirect, RedirectTarget, Severity};
pub use error::{AccessError, RbacError, Result};
pub use gate::{AccessPolicy, PathGate, PolicyChain, RequestContext, RoleRequirement};
pub use identity::{Identity, PatientId, Principal, Role, UserId};
pub use notify::{FlashMessage, FlashStore, Notifier};
pub use ownership::{default_assignee, resolve_scope, Owned, OwnershipScope, ResourceClass};
pub use policy::{Locations, PathPolicy, PathRule, PathVerdict, RoleAccess, ScopedAccess};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
