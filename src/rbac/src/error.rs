//! Error types for the access-control core

use thiserror::Error;

/// Errors raised while building or loading access policy
#[derive(Debug, Error)]
pub enum RbacError {
    /// Invalid policy definition
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Policy file could not be parsed
    #[error("Policy parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, RbacError>;

/// Outcome taxonomy of an access check
///
/// Every variant is recoverable at the gate boundary; callers convert it into
/// a redirect or a not-found response, never an unhandled fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Caller has no session
    #[error("authentication required")]
    Unauthenticated,

    /// Authenticated identity carries no recognized role tag
    #[error("account has no recognized role")]
    InvalidRole,

    /// Valid role, but excluded from this path or operation
    #[error("role is not permitted here")]
    RoleForbidden,

    /// Patient-role identity without a linked patient profile
    #[error("user is not linked to a patient profile")]
    MissingProfile,

    /// Record is absent or outside the caller's ownership scope
    #[error("not found")]
    NotFound,
}
