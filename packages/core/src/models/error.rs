//! Validation Error Tokens
//!
//! Failures inside a commit are not surfaced as bare strings: each one is an
//! [`ErrorToken`] carrying an HTTP-style status, the affected type and
//! property, and a stable machine-readable token clients can switch on.
//! Tokens accumulate in an [`ErrorBuffer`] while the pipeline keeps
//! processing; the transaction aborts at the end if the buffer is non-empty.
//!
//! # Examples
//!
//! ```rust
//! use graft_core::models::{ErrorBuffer, ErrorToken, STATUS_FORBIDDEN, TOKEN_READ_ONLY};
//!
//! let mut errors = ErrorBuffer::new();
//! errors.add(ErrorToken::for_property(
//!     STATUS_FORBIDDEN,
//!     "Page",
//!     "uuid",
//!     TOKEN_READ_ONLY,
//! ));
//!
//! assert_eq!(errors.len(), 1);
//! assert_eq!(errors.tokens()[0].token, TOKEN_READ_ONLY);
//! ```

use serde::Serialize;

use crate::models::types::TypeName;

/// Mutation rejected for the acting principal.
pub const STATUS_FORBIDDEN: u16 = 403;

/// Payload understood but semantically invalid.
pub const STATUS_UNPROCESSABLE: u16 = 422;

/// Internal failure without a recorded cause.
pub const STATUS_INTERNAL: u16 = 500;

/// Property may not be written outside a system context.
pub const TOKEN_READ_ONLY: &str = "is_read_only_property";

/// Property requires a non-empty value.
pub const TOKEN_MUST_NOT_BE_EMPTY: &str = "must_not_be_empty";

/// Property value has the wrong JSON kind.
pub const TOKEN_TYPE_MISMATCH: &str = "type_mismatch";

/// Property value does not match the required pattern.
pub const TOKEN_PATTERN_MISMATCH: &str = "does_not_match_pattern";

/// External index call exceeded its budget.
pub const TOKEN_INDEX_TIMEOUT: &str = "index_timeout";

/// Transaction rolled back without a recorded failure.
pub const TOKEN_ROLLED_BACK: &str = "transaction_rolled_back";

/// One structured validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorToken {
    /// HTTP-style status classifying the failure.
    pub status: u16,

    /// Entity type the failure occurred on.
    pub entity_type: TypeName,

    /// External name of the property involved, if the failure is
    /// property-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,

    /// Stable machine-readable token (`is_read_only_property`, ...).
    pub token: String,

    /// Optional structured context, e.g. the expected value kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ErrorToken {
    /// Failure scoped to a whole entity type.
    pub fn new(status: u16, entity_type: impl Into<TypeName>, token: impl Into<String>) -> Self {
        Self {
            status,
            entity_type: entity_type.into(),
            property: None,
            token: token.into(),
            detail: None,
        }
    }

    /// Failure scoped to one property of a type.
    pub fn for_property(
        status: u16,
        entity_type: impl Into<TypeName>,
        property: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            property: Some(property.into()),
            ..Self::new(status, entity_type, token)
        }
    }

    /// Attach structured context to the token.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl std::fmt::Display for ErrorToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.property {
            Some(property) => write!(
                f,
                "{} on {}.{} ({})",
                self.token, self.entity_type, property, self.status
            ),
            None => write!(f, "{} on {} ({})", self.token, self.entity_type, self.status),
        }
    }
}

/// Ordered accumulation of [`ErrorToken`]s for one transaction.
///
/// Validators, hooks and listeners append; the pipeline decides at the end of
/// processing whether the accumulated buffer aborts the commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ErrorBuffer {
    tokens: Vec<ErrorToken>,
}

impl ErrorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, token: ErrorToken) {
        self.tokens.push(token);
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn tokens(&self) -> &[ErrorToken] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<ErrorToken> {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_display() {
        let token = ErrorToken::for_property(STATUS_FORBIDDEN, "Page", "uuid", TOKEN_READ_ONLY);

        assert_eq!(token.to_string(), "is_read_only_property on Page.uuid (403)");
    }

    #[test]
    fn test_type_scoped_token_display() {
        let token = ErrorToken::new(STATUS_UNPROCESSABLE, "Page", "invalid_page");

        assert_eq!(token.to_string(), "invalid_page on Page (422)");
    }

    #[test]
    fn test_buffer_accumulates_in_order() {
        let mut errors = ErrorBuffer::new();
        assert!(errors.is_empty());

        errors.add(ErrorToken::new(STATUS_UNPROCESSABLE, "Page", "first"));
        errors.add(ErrorToken::new(STATUS_FORBIDDEN, "Page", "second"));

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.tokens()[0].token, "first");
        assert_eq!(errors.tokens()[1].token, "second");
    }

    #[test]
    fn test_token_serialization() {
        let token = ErrorToken::for_property(STATUS_UNPROCESSABLE, "Person", "email", TOKEN_PATTERN_MISMATCH)
            .with_detail(json!({"pattern": ".+@.+"}));
        let value = serde_json::to_value(&token).unwrap();

        assert_eq!(value["status"], 422);
        assert_eq!(value["entityType"], "Person");
        assert_eq!(value["property"], "email");
        assert_eq!(value["token"], TOKEN_PATTERN_MISMATCH);
        assert_eq!(value["detail"]["pattern"], ".+@.+");
    }

    #[test]
    fn test_buffer_serializes_as_plain_array() {
        let mut errors = ErrorBuffer::new();
        errors.add(ErrorToken::new(STATUS_UNPROCESSABLE, "Page", "first"));

        let value = serde_json::to_value(&errors).unwrap();
        assert!(value.is_array());
        assert_eq!(value.as_array().unwrap().len(), 1);
    }
}
