// Path: crates/gateway/src/authz.rs
//! The authorization matrix: principal → ordered permitted signer ids.

use quill_types::config::AuthorizationConfig;
use quill_types::error::AuthError;
use std::collections::HashMap;

/// A read-only snapshot of the authorization matrix, built at startup.
///
/// The ordered signer list is preserved from configuration; the first
/// entry is the principal's default signer.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationMatrix {
    permitted: HashMap<String, Vec<String>>,
}

impl AuthorizationMatrix {
    /// Builds the matrix from validated configuration rows.
    pub fn from_config(rows: &[AuthorizationConfig]) -> Self {
        let mut permitted = HashMap::with_capacity(rows.len());
        for row in rows {
            permitted.insert(row.principal.clone(), row.signers.clone());
        }
        Self { permitted }
    }

    /// Resolves the signer a request addresses.
    ///
    /// A named signer must appear in the principal's permitted set; an
    /// unnamed request selects the principal's default (first) signer.
    pub fn resolve(&self, principal: &str, requested: Option<&str>) -> Result<String, AuthError> {
        let forbidden = |signer: &str| AuthError::ForbiddenSigner {
            principal: principal.to_string(),
            signer: signer.to_string(),
        };
        let permitted = self
            .permitted
            .get(principal)
            .ok_or_else(|| forbidden(requested.unwrap_or("<default>")))?;
        match requested {
            Some(id) => {
                if permitted.iter().any(|s| s == id) {
                    Ok(id.to_string())
                } else {
                    Err(forbidden(id))
                }
            }
            // Validation guarantees a non-empty list for every row.
            None => permitted
                .first()
                .cloned()
                .ok_or_else(|| forbidden("<default>")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> AuthorizationMatrix {
        AuthorizationMatrix::from_config(&[
            AuthorizationConfig {
                principal: "alice".into(),
                signers: vec!["appkey1".into(), "rsakey1".into()],
            },
            AuthorizationConfig {
                principal: "bob".into(),
                signers: vec!["rsakey1".into()],
            },
        ])
    }

    #[test]
    fn named_signer_must_be_permitted() {
        let m = matrix();
        assert_eq!(m.resolve("alice", Some("rsakey1")).unwrap(), "rsakey1");
        let err = m.resolve("bob", Some("appkey1")).unwrap_err();
        assert!(matches!(
            err,
            AuthError::ForbiddenSigner { principal, signer }
                if principal == "bob" && signer == "appkey1"
        ));
    }

    #[test]
    fn unnamed_request_selects_the_default() {
        let m = matrix();
        assert_eq!(m.resolve("alice", None).unwrap(), "appkey1");
        assert_eq!(m.resolve("bob", None).unwrap(), "rsakey1");
    }

    #[test]
    fn unknown_principal_is_forbidden() {
        let m = matrix();
        assert!(m.resolve("mallory", None).is_err());
        assert!(m.resolve("mallory", Some("appkey1")).is_err());
    }
}
