use anyhow::Result;
use clinic_rbac::{
    AccessError, AuditSink, FanoutAuditSink, FlashStore, Identity, MemoryAuditSink, Notifier,
    OwnershipScope, PathGate, PathPolicy, ResourceClass, Severity, TracingAuditSink,
};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::SessionStore;
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::middleware::Session;
use crate::store::{ClinicStore, InMemoryStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Accounts and clinical data
    pub store: Arc<dyn ClinicStore>,

    /// Path gate; also mints per-operation requirements
    pub gate: PathGate,

    /// Queryable copy of the audit trail
    pub audit_log: Arc<MemoryAuditSink>,

    /// Flash messages keyed by session token
    pub flash: Arc<FlashStore>,

    pub sessions: Arc<SessionStore>,

    pub metrics: Metrics,

    /// Server start time for uptime calculation
    pub start_time: Instant,

    /// Application version
    pub version: String,
}

impl AppState {
    pub fn new(policy: PathPolicy, store: Arc<dyn ClinicStore>) -> Result<Self> {
        let audit_log = Arc::new(MemoryAuditSink::new());
        let sink: Arc<dyn AuditSink> = Arc::new(
            FanoutAuditSink::new()
                .with(audit_log.clone())
                .with(Arc::new(TracingAuditSink)),
        );

        Ok(Self {
            store,
            gate: PathGate::new(Arc::new(policy), sink),
            audit_log,
            flash: Arc::new(FlashStore::new()),
            sessions: Arc::new(SessionStore::new()),
            metrics: Metrics::new()?,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Default policy over an empty in-memory store
    pub fn in_memory() -> Result<Self> {
        Self::new(PathPolicy::default(), Arc::new(InMemoryStore::new()))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Identity behind the session, or a login redirect
    pub fn identity<'a>(&self, session: &'a Session) -> Result<&'a Identity, ApiError> {
        session
            .principal
            .identity()
            .ok_or_else(|| self.deny(&AccessError::Unauthenticated))
    }

    /// Ownership scope for the caller, audited and converted on refusal
    pub fn scope(
        &self,
        identity: &Identity,
        class: ResourceClass,
        path: &str,
    ) -> Result<OwnershipScope, ApiError> {
        self.gate
            .scope_for(identity, class, path)
            .map_err(|err| self.deny(&err))
    }

    /// Response for an access error: a redirect, or a plain 404
    pub fn deny(&self, err: &AccessError) -> ApiError {
        match self.gate.redirect_for(err) {
            Some(redirect) => ApiError::Redirect(redirect),
            None => ApiError::NotFound,
        }
    }

    /// Queue a flash message for the caller's session, if it has one
    pub fn notify(&self, session: &Session, text: &str, severity: Severity) {
        if let Some(token) = &session.token {
            self.flash.notify(token, text, severity);
        }
    }
}
