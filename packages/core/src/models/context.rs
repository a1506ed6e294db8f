//! Access Context
//!
//! Every operation that validates, notifies or mutates carries an explicit
//! [`AccessContext`] parameter; there is no ambient per-thread state. The
//! context identifies who is acting so validators and hooks can distinguish
//! internal maintenance from user traffic.

use serde::{Deserialize, Serialize};

/// Identifies the actor a transaction or lookup runs on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessContext {
    /// Acting principal; `None` marks internal system work.
    pub principal: Option<String>,
}

impl AccessContext {
    /// Context for internal maintenance. System contexts may write properties
    /// a read-only validator would otherwise reject.
    pub fn system() -> Self {
        Self { principal: None }
    }

    /// Context acting on behalf of a named principal.
    pub fn for_principal(principal: impl Into<String>) -> Self {
        Self {
            principal: Some(principal.into()),
        }
    }

    pub fn is_system(&self) -> bool {
        self.principal.is_none()
    }
}

impl std::fmt::Display for AccessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.principal {
            Some(principal) => write!(f, "{principal}"),
            None => write!(f, "system"),
        }
    }
}
