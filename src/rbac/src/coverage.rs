//! Route coverage audit
//!
//! Cross-checks the routes a service declares against the path policy. Two
//! layers guard every request (the path gate and the per-operation role
//! requirement) and this audit reports where they disagree.

use serde::Serialize;
use std::fmt;

use crate::identity::Role;
use crate::policy::PathPolicy;

/// A route as registered by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecl {
    pub method: String,
    /// Route pattern; `:name` segments stand for path parameters
    pub path: String,
    pub operation: String,
    /// Roles the operation admits; `None` when no requirement is attached
    pub roles: Option<Vec<Role>>,
}

impl RouteDecl {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        operation: impl Into<String>,
        roles: Option<&[Role]>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            operation: operation.into(),
            roles: roles.map(<[Role]>::to_vec),
        }
    }

    /// Concrete path used for prefix matching, with parameters filled in
    fn sample_path(&self) -> String {
        self.path
            .split('/')
            .map(|segment| if segment.starts_with(':') { "1" } else { segment })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// A disagreement between a route and the path policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum CoverageIssue {
    /// Protected path with no operation-level requirement
    Unguarded { method: String, path: String, operation: String },

    /// The operation admits a role the path gate never lets through
    Unreachable {
        method: String,
        path: String,
        operation: String,
        role: Role,
    },
}

impl fmt::Display for CoverageIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverageIssue::Unguarded { method, path, operation } => write!(
                f,
                "{} {} ({}) relies on the path gate alone",
                method, path, operation
            ),
            CoverageIssue::Unreachable {
                method,
                path,
                operation,
                role,
            } => write!(
                f,
                "{} {} ({}) admits {} but the path gate never lets it through",
                method, path, operation, role
            ),
        }
    }
}

/// Check every route against the policy
pub fn audit_routes(policy: &PathPolicy, routes: &[RouteDecl]) -> Vec<CoverageIssue> {
    let mut issues = Vec::new();

    for route in routes {
        let path = route.sample_path();

        let Some(roles) = &route.roles else {
            if !policy.is_public(&path) {
                issues.push(CoverageIssue::Unguarded {
                    method: route.method.clone(),
                    path: route.path.clone(),
                    operation: route.operation.clone(),
                });
            }
            continue;
        };

        let admitted = policy.roles_for(&path);
        for role in roles {
            if !admitted.contains(role) {
                issues.push(CoverageIssue::Unreachable {
                    method: route.method.clone(),
                    path: route.path.clone(),
                    operation: route.operation.clone(),
                    role: *role,
                });
            }
        }
    }

    issues
}
