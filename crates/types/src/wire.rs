// Path: crates/types/src/wire.rs
//! JSON bodies for the signing routes.
//!
//! A request body is an array of [`SignatureRequest`] tasks; the response is
//! an array of [`SignatureResponse`] records in the same order.

use serde::{Deserialize, Serialize};

/// One signing task.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignatureRequest {
    /// Base64 of the bytes to sign (file and data routes), or the hex
    /// digest to sign (hash route).
    pub input: String,
    /// Target signer id. When absent, the principal's default signer is
    /// used.
    #[serde(default)]
    pub keyid: Option<String>,
    /// Signer-specific options, merged over the signer's defaults.
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

/// One signed result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureResponse {
    /// Opaque per-task reference, unique within the response.
    #[serde(rename = "ref")]
    pub reference: String,
    /// The signer's algorithm type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// The signer's mode discriminator, empty when the type has only one.
    pub mode: String,
    /// The signer that produced this result.
    pub signer_id: String,
    /// The signer's public key, PEM or base64 SPKI, when it publishes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// The detached signature. Base64 standard encoding unless the signer's
    /// on-wire format dictates otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Base64 of the rewritten container, for file signers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_file: Option<String>,
    /// URL of the PEM certificate chain authenticating the signature, for
    /// PKI-backed signers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5u: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_minimal_task() {
        let body = r#"[{"input": "aGVsbG8="}]"#;
        let tasks: Vec<SignatureRequest> = serde_json::from_str(body).unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].keyid.is_none());
        assert!(tasks[0].options.is_none());
    }

    #[test]
    fn response_omits_absent_fields() {
        let resp = SignatureResponse {
            reference: "abcd".into(),
            kind: "contentsignature".into(),
            mode: "p256ecdsa".into(),
            signer_id: "appkey1".into(),
            public_key: None,
            signature: Some("sig".into()),
            signed_file: None,
            x5u: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["ref"], "abcd");
        assert_eq!(json["type"], "contentsignature");
        assert!(json.get("signed_file").is_none());
        assert!(json.get("x5u").is_none());
    }
}
