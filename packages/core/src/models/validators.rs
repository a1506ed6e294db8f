//! Property Validators
//!
//! Validators are registered per `(type, property)` pair and run inside the
//! commit pipeline against every assigned value. A validator appends
//! [`ErrorToken`]s to the shared buffer and reports pass/fail; the pipeline
//! keeps processing either way and aborts at the end if anything failed.
//!
//! # Examples
//!
//! ```rust
//! use graft_core::models::{
//!     AccessContext, ErrorBuffer, GraphEntity, NodeEntity, NodeId, NonEmptyValidator,
//!     PropertyKey, PropertyMap, PropertyValidator,
//! };
//! use serde_json::json;
//!
//! let entity: GraphEntity = NodeEntity::from_parts(NodeId(1), PropertyMap::new()).into();
//! let key = PropertyKey::new("Page", "title");
//! let mut errors = ErrorBuffer::new();
//!
//! let ok = NonEmptyValidator.is_valid(
//!     &AccessContext::system(),
//!     &entity,
//!     &key,
//!     Some(&json!("Home")),
//!     &mut errors,
//! );
//! assert!(ok);
//! assert!(errors.is_empty());
//! ```

use regex::Regex;
use serde_json::json;

use crate::models::context::AccessContext;
use crate::models::entity::GraphEntity;
use crate::models::error::{
    ErrorBuffer, ErrorToken, STATUS_FORBIDDEN, STATUS_UNPROCESSABLE, TOKEN_MUST_NOT_BE_EMPTY,
    TOKEN_PATTERN_MISMATCH, TOKEN_READ_ONLY, TOKEN_TYPE_MISMATCH,
};
use crate::models::property::PropertyKey;

/// Per-property validation hook run by the commit pipeline.
pub trait PropertyValidator: Send + Sync {
    /// Check a candidate value. `value` is `None` when the assignment carries
    /// no value. Implementations append tokens for every failure they report.
    fn is_valid(
        &self,
        ctx: &AccessContext,
        entity: &GraphEntity,
        key: &PropertyKey,
        value: Option<&serde_json::Value>,
        errors: &mut ErrorBuffer,
    ) -> bool;
}

/// Rejects every write outside a system context.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadOnlyValidator;

impl PropertyValidator for ReadOnlyValidator {
    fn is_valid(
        &self,
        ctx: &AccessContext,
        entity: &GraphEntity,
        key: &PropertyKey,
        _value: Option<&serde_json::Value>,
        errors: &mut ErrorBuffer,
    ) -> bool {
        if ctx.is_system() {
            return true;
        }
        errors.add(ErrorToken::for_property(
            STATUS_FORBIDDEN,
            entity.type_name(),
            key.rest_name.clone(),
            TOKEN_READ_ONLY,
        ));
        false
    }
}

/// Rejects missing values, JSON null and empty strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonEmptyValidator;

impl PropertyValidator for NonEmptyValidator {
    fn is_valid(
        &self,
        _ctx: &AccessContext,
        entity: &GraphEntity,
        key: &PropertyKey,
        value: Option<&serde_json::Value>,
        errors: &mut ErrorBuffer,
    ) -> bool {
        let empty = match value {
            None | Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if !empty {
            return true;
        }
        errors.add(ErrorToken::for_property(
            STATUS_UNPROCESSABLE,
            entity.type_name(),
            key.rest_name.clone(),
            TOKEN_MUST_NOT_BE_EMPTY,
        ));
        false
    }
}

/// JSON value kinds a [`TypeValidator`] can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    String,
    Number,
    Bool,
    Array,
    Object,
}

impl JsonKind {
    fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            JsonKind::String => value.is_string(),
            JsonKind::Number => value.is_number(),
            JsonKind::Bool => value.is_boolean(),
            JsonKind::Array => value.is_array(),
            JsonKind::Object => value.is_object(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            JsonKind::String => "string",
            JsonKind::Number => "number",
            JsonKind::Bool => "bool",
            JsonKind::Array => "array",
            JsonKind::Object => "object",
        }
    }
}

/// Requires present values to have a specific JSON kind. Absent values pass;
/// pair with [`NonEmptyValidator`] to require presence.
#[derive(Debug, Clone, Copy)]
pub struct TypeValidator {
    expected: JsonKind,
}

impl TypeValidator {
    pub fn new(expected: JsonKind) -> Self {
        Self { expected }
    }
}

impl PropertyValidator for TypeValidator {
    fn is_valid(
        &self,
        _ctx: &AccessContext,
        entity: &GraphEntity,
        key: &PropertyKey,
        value: Option<&serde_json::Value>,
        errors: &mut ErrorBuffer,
    ) -> bool {
        let Some(value) = value else {
            return true;
        };
        if value.is_null() || self.expected.matches(value) {
            return true;
        }
        errors.add(
            ErrorToken::for_property(
                STATUS_UNPROCESSABLE,
                entity.type_name(),
                key.rest_name.clone(),
                TOKEN_TYPE_MISMATCH,
            )
            .with_detail(json!({ "expected": self.expected.label() })),
        );
        false
    }
}

/// Requires present string values to match a regular expression. Absent or
/// null values pass; non-string values fail.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    pattern: Regex,
}

impl PatternValidator {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl PropertyValidator for PatternValidator {
    fn is_valid(
        &self,
        _ctx: &AccessContext,
        entity: &GraphEntity,
        key: &PropertyKey,
        value: Option<&serde_json::Value>,
        errors: &mut ErrorBuffer,
    ) -> bool {
        let matched = match value {
            None | Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::String(s)) => self.pattern.is_match(s),
            Some(_) => false,
        };
        if matched {
            return true;
        }
        errors.add(
            ErrorToken::for_property(
                STATUS_UNPROCESSABLE,
                entity.type_name(),
                key.rest_name.clone(),
                TOKEN_PATTERN_MISMATCH,
            )
            .with_detail(json!({ "pattern": self.pattern.as_str() })),
        );
        false
    }
}
