//! # Optimistic Concurrency
//!
//! Every mutable row carries a `row_version` that the store increments on
//! each write. Callers receive it as an opaque base64 token and must send it
//! back unchanged when updating.
//!
//! ```text
//! stored row_version = 3 ──► token "AAAAAAAAAAM=" ──► client
//!                                                        │
//! update(token) ◄────────────────────────────────────────┘
//!      │
//!      ├── token decodes to 3 and row is still 3 → write, row_version = 4
//!      └── anything else → ConcurrencyConflict, nothing written
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};

/// Version stamp of a stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowVersion(i64);

impl RowVersion {
    /// Version assigned on insert.
    pub const INITIAL: RowVersion = RowVersion(1);

    #[inline]
    pub const fn new(value: i64) -> Self {
        RowVersion(value)
    }

    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Version the row carries after one more write.
    #[inline]
    pub const fn next(self) -> Self {
        RowVersion(self.0 + 1)
    }

    /// Opaque token handed to callers.
    pub fn to_token(self) -> String {
        STANDARD.encode(self.0.to_be_bytes())
    }

    /// Decodes a caller-supplied token.
    pub fn from_token(token: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "rowVersion".to_string(),
            reason: reason.to_string(),
        };

        let bytes = STANDARD
            .decode(token.trim())
            .map_err(|_| invalid("not valid base64"))?;
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|_| invalid("unexpected token length"))?;
        Ok(RowVersion(i64::from_be_bytes(bytes)))
    }

    /// Checks a caller-supplied token against this stored version.
    ///
    /// An empty token is a validation error; any other mismatch, including
    /// an undecodable token, is a concurrency conflict.
    pub fn ensure_matches(self, token: &str, entity: &'static str, id: i64) -> CoreResult<()> {
        if token.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "rowVersion".to_string(),
            }
            .into());
        }

        match RowVersion::from_token(token) {
            Ok(supplied) if supplied == self => Ok(()),
            _ => Err(CoreError::conflict(entity, id)),
        }
    }
}

impl Default for RowVersion {
    fn default() -> Self {
        RowVersion::INITIAL
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let version = RowVersion::new(3);
        let token = version.to_token();
        assert_eq!(token, "AAAAAAAAAAM=");
        assert_eq!(RowVersion::from_token(&token).unwrap(), version);
    }

    #[test]
    fn test_next_changes_token() {
        let v1 = RowVersion::INITIAL;
        let v2 = v1.next();
        assert_eq!(v2.value(), 2);
        assert_ne!(v1.to_token(), v2.to_token());
    }

    #[test]
    fn test_ensure_matches() {
        let stored = RowVersion::new(5);
        assert!(stored.ensure_matches(&stored.to_token(), "Invoice", 1).is_ok());

        let stale = RowVersion::new(4).to_token();
        assert!(matches!(
            stored.ensure_matches(&stale, "Invoice", 1),
            Err(CoreError::ConcurrencyConflict { entity: "Invoice", id: 1 })
        ));

        assert!(matches!(
            stored.ensure_matches("%%%", "Invoice", 1),
            Err(CoreError::ConcurrencyConflict { .. })
        ));

        assert!(matches!(
            stored.ensure_matches("", "Invoice", 1),
            Err(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(RowVersion::from_token("AAAA").is_err());
    }
}
