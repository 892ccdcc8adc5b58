//! Prometheus metrics for access decisions

use anyhow::{Context, Result};
use clinic_rbac::{AccessDecision, DenialReason};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Access-decision counters, registered on a per-process registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    access_decisions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let access_decisions = IntCounterVec::new(
            Opts::new(
                "clinic_access_decisions_total",
                "Access decisions by outcome and role",
            ),
            &["outcome", "role"],
        )
        .context("failed to create access decision counter")?;
        registry
            .register(Box::new(access_decisions.clone()))
            .context("failed to register access decision counter")?;

        Ok(Self {
            registry,
            access_decisions,
        })
    }

    /// Count a decision under its outcome label
    pub fn observe(&self, decision: &AccessDecision, role: &str) {
        let outcome = match decision.redirect().map(|r| r.reason) {
            None => "allow",
            Some(DenialReason::WrongArea) => "soft_redirect",
            Some(DenialReason::Unauthenticated) => "unauthenticated",
            Some(DenialReason::InvalidRole) => "invalid_role",
            Some(DenialReason::RoleForbidden) => "role_forbidden",
            Some(DenialReason::MissingProfile) => "missing_profile",
        };
        self.access_decisions.with_label_values(&[outcome, role]).inc();
    }

    pub fn count(&self, outcome: &str, role: &str) -> u64 {
        self.access_decisions.with_label_values(&[outcome, role]).get()
    }

    /// Render every metric in the text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("metrics output was not UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_rbac::{Redirect, RedirectTarget, Severity};

    #[test]
    fn test_observe_and_render() {
        let metrics = Metrics::new().unwrap();
        metrics.observe(&AccessDecision::Allow, "doctor");
        metrics.observe(
            &AccessDecision::DenyRedirect(Redirect {
                target: RedirectTarget::Dashboard,
                location: "/dashboard/".to_string(),
                reason: DenialReason::RoleForbidden,
                message: "Access denied. Doctors cannot access admin areas.".to_string(),
                severity: Severity::Error,
            }),
            "doctor",
        );

        assert_eq!(metrics.count("allow", "doctor"), 1);
        assert_eq!(metrics.count("role_forbidden", "doctor"), 1);

        let text = metrics.render().unwrap();
        assert!(text.contains("clinic_access_decisions_total"));
    }
}
