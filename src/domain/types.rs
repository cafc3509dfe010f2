//! Validated newtypes for the audit proxy domain
//!
//! Values that arrive from configuration or the network are checked once at
//! the boundary, so the rest of the proxy can rely on them.

use nutype::nutype;
#[allow(unused_imports)] // These are used by nutype derive macros
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Base URL of the upstream target that every exchange is relayed to
#[nutype(
    sanitize(trim),
    validate(predicate = |s: &str| s.starts_with("http://") || s.starts_with("https://")),
    derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsRef, Display, TryFrom)
)]
pub struct TargetUrl(String);

/// Shared secret expected in `Authorization: Bearer <token>` on the control endpoint
#[nutype(
    validate(not_empty),
    derive(Clone, PartialEq, Eq, Deserialize, AsRef, TryFrom)
)]
pub struct ControlToken(String);

impl std::fmt::Debug for ControlToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ControlToken(<redacted>)")
    }
}

/// Path prefix that receives the `base + path` mapping (`/api/` by default)
#[nutype(
    validate(predicate = |s: &str| s.starts_with('/')),
    derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsRef, Display, TryFrom)
)]
pub struct PathPrefix(String);

/// Unique identifier of one persisted exchange
#[nutype(derive(
    Clone,
    Copy,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    From,
    AsRef
))]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    /// Create a fresh time-ordered identifier
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }

    pub fn into_uuid(self) -> Uuid {
        self.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_url_validation() {
        assert!(TargetUrl::try_new("http://up.example/").is_ok());
        assert!(TargetUrl::try_new("  https://up.example  ").is_ok());
        assert!(TargetUrl::try_new("ftp://up.example").is_err());
        assert!(TargetUrl::try_new("").is_err());
    }

    #[test]
    fn test_target_url_is_trimmed() {
        let url = TargetUrl::try_new(" http://up.example/ ").unwrap();
        assert_eq!(url.as_ref(), "http://up.example/");
    }

    #[test]
    fn test_control_token_debug_is_redacted() {
        let token = ControlToken::try_new("s3cret").unwrap();
        assert!(!format!("{token:?}").contains("s3cret"));
        assert!(ControlToken::try_new("").is_err());
    }

    #[test]
    fn test_path_prefix_requires_leading_slash() {
        assert!(PathPrefix::try_new("/api/").is_ok());
        assert!(PathPrefix::try_new("api/").is_err());
    }

    #[test]
    fn test_exchange_ids_are_unique_v7() {
        let a = ExchangeId::generate();
        let b = ExchangeId::generate();
        assert_ne!(a, b);
        assert_eq!(a.into_uuid().get_version_num(), 7);
    }
}
