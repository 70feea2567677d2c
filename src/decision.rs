//! The decision gate.
//!
//! Aggregates rule outcomes into a per-request cacheability decision. Rules
//! are injected into the engine at construction; the gate itself never errors
//! and degrades to "not cacheable" on any deny.

use crate::fingerprint::RequestState;

/// Outcome of a single cache rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Allow,
    Deny(String),
}

impl RuleOutcome {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny(reason.into())
    }
}

/// Pluggable cacheability rule evaluated against normalized request state.
pub trait CacheRule: Send + Sync {
    fn evaluate(&self, request: &RequestState) -> RuleOutcome;
}

/// The aggregated, request-scoped cacheability decision.
///
/// Transient by design: it lives for one request and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    allowed: bool,
    note: Option<String>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            note: None,
        }
    }

    pub fn deny(note: impl Into<String>) -> Self {
        Self {
            allowed: false,
            note: Some(note.into()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

/// Built-in rule: only GET requests produce cacheable responses.
pub struct MethodRule;

impl CacheRule for MethodRule {
    fn evaluate(&self, request: &RequestState) -> RuleOutcome {
        if request.method == "GET" {
            RuleOutcome::Allow
        } else {
            RuleOutcome::deny(format!("method {} is not cacheable", request.method))
        }
    }
}

/// Deny caching for any path under a prefix (admin areas, preview routes).
pub struct DenyPathPrefix {
    prefix: String,
}

impl DenyPathPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl CacheRule for DenyPathPrefix {
    fn evaluate(&self, request: &RequestState) -> RuleOutcome {
        if request.path.starts_with(&self.prefix) {
            RuleOutcome::deny(format!("path under {}", self.prefix))
        } else {
            RuleOutcome::Allow
        }
    }
}

/// Evaluate all rules in order; the first deny wins.
pub(crate) fn evaluate(rules: &[Box<dyn CacheRule>], request: &RequestState) -> Decision {
    for rule in rules {
        if let RuleOutcome::Deny(reason) = rule.evaluate(request) {
            return Decision::deny(reason);
        }
    }
    Decision::allow()
}
