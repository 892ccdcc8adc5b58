//! Audit trail for access decisions
//!
//! Sinks receive an [`AuditEvent`] for every denial, soft redirect and admin
//! access. Recording is fire-and-forget: sinks cannot fail the request and the
//! gate never branches on whether an event was stored.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events kept by [`MemoryAuditSink`] before the oldest are dropped
const DEFAULT_CAPACITY: usize = 10_000;

/// Kind of audited access event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Anonymous caller on a protected path
    AnonymousDenied,
    /// Authenticated caller whose role is excluded
    RoleMismatch,
    /// Authenticated account with no recognized role
    InvalidRole,
    /// Patient account with no linked profile
    MissingProfile,
    /// Caller outside their role's area, sent to the dashboard
    SoftRedirect,
    /// Admin request, recorded for the trail
    AdminAccess,
}

/// How loudly an event is logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl AuditKind {
    /// Severity proportional to how surprising the event is
    pub fn level(&self) -> AuditLevel {
        match self {
            AuditKind::AnonymousDenied | AuditKind::RoleMismatch | AuditKind::MissingProfile => {
                AuditLevel::Warning
            }
            AuditKind::InvalidRole => AuditLevel::Error,
            AuditKind::SoftRedirect | AuditKind::AdminAccess => AuditLevel::Info,
        }
    }

    /// Whether the event records a refused request
    pub fn is_denial(&self) -> bool {
        !matches!(self, AuditKind::SoftRedirect | AuditKind::AdminAccess)
    }
}

/// A single audited access event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: String,

    /// When the event happened
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub kind: AuditKind,

    /// Who: username or `anonymous`
    pub username: String,

    /// Role name, `unknown` for invalid accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Request path
    pub path: String,

    /// Which layer produced the event (`path` or an operation name)
    pub source: String,

    /// Why
    pub reason: String,
}

impl AuditEvent {
    pub fn new(
        kind: AuditKind,
        username: impl Into<String>,
        role: Option<String>,
        path: impl Into<String>,
        source: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            username: username.into(),
            role,
            path: path.into(),
            source: source.into(),
            reason: reason.into(),
        }
    }

    pub fn level(&self) -> AuditLevel {
        self.kind.level()
    }
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events to `tracing` at their severity
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let role = event.role.as_deref().unwrap_or("-");
        match event.level() {
            AuditLevel::Info => info!(
                target: "clinic::audit",
                kind = ?event.kind,
                username = %event.username,
                role = %role,
                path = %event.path,
                source = %event.source,
                "{}", event.reason
            ),
            AuditLevel::Warning => warn!(
                target: "clinic::audit",
                kind = ?event.kind,
                username = %event.username,
                role = %role,
                path = %event.path,
                source = %event.source,
                "{}", event.reason
            ),
            AuditLevel::Error => error!(
                target: "clinic::audit",
                kind = ?event.kind,
                username = %event.username,
                role = %role,
                path = %event.path,
                source = %event.source,
                "{}", event.reason
            ),
        }
    }
}

/// Audit statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub total_events: usize,
    pub denials: usize,
    pub soft_redirects: usize,
    pub admin_accesses: usize,
}

/// Bounded in-memory audit buffer
pub struct MemoryAuditSink {
    buffer: RwLock<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(capacity.min(1_024))),
            capacity: capacity.max(1),
        }
    }

    /// Most recent events for a username, newest first
    pub fn query_by_username(&self, username: &str, limit: usize) -> Vec<AuditEvent> {
        self.buffer
            .read()
            .iter()
            .rev()
            .filter(|e| e.username == username)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Most recent events, newest first
    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        self.buffer.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> AuditStats {
        let buffer = self.buffer.read();
        let mut stats = AuditStats {
            total_events: buffer.len(),
            ..AuditStats::default()
        };

        for event in buffer.iter() {
            match event.kind {
                AuditKind::SoftRedirect => stats.soft_redirects += 1,
                AuditKind::AdminAccess => stats.admin_accesses += 1,
                _ => stats.denials += 1,
            }
        }

        stats
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut buffer = self.buffer.write();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event);
    }
}

/// Forwards each event to several sinks
#[derive(Default, Clone)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(event.clone());
            }
            last.record(event);
        }
    }
}
