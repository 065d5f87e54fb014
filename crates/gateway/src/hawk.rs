// Path: crates/gateway/src/hawk.rs
//! Hawk request authentication.
//!
//! Verifies the `Authorization: Hawk …` header against the canonical
//! request: the payload hash covers `content-type` and body, the MAC
//! covers timestamp, nonce, method, path, host, port, payload hash and
//! `ext`. Both comparisons are constant-time. The authenticator never
//! modifies state; replay suppression happens in the nonce cache stage.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use quill_types::error::AuthError;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The parsed attributes of a Hawk authorization header.
#[derive(Debug, Clone)]
pub struct HawkHeader {
    /// The principal identifier.
    pub id: String,
    /// Client timestamp, unix seconds.
    pub ts: i64,
    /// Client-chosen nonce.
    pub nonce: String,
    /// The request MAC, still base64 as received.
    pub mac: String,
    /// The payload hash attribute, when a body was hashed.
    pub hash: Option<String>,
    /// Application extension data covered by the MAC.
    pub ext: Option<String>,
}

impl HawkHeader {
    /// Parses an `Authorization` header value in the Hawk scheme.
    pub fn parse(header: &str) -> Result<Self, AuthError> {
        let rest = header
            .strip_prefix("Hawk ")
            .ok_or_else(|| AuthError::MalformedHeader("not a Hawk header".into()))?;

        let mut id = None;
        let mut ts = None;
        let mut nonce = None;
        let mut mac = None;
        let mut hash = None;
        let mut ext = None;

        for attribute in rest.split(',') {
            let attribute = attribute.trim();
            if attribute.is_empty() {
                continue;
            }
            let (key, value) = attribute
                .split_once('=')
                .ok_or_else(|| AuthError::MalformedHeader(format!("bad attribute {}", attribute)))?;
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .ok_or_else(|| AuthError::MalformedHeader(format!("unquoted value for {}", key)))?;
            if value.contains('"') {
                return Err(AuthError::MalformedHeader(format!(
                    "embedded quote in {}",
                    key
                )));
            }
            match key {
                "id" => id = Some(value.to_string()),
                "ts" => {
                    ts = Some(value.parse::<i64>().map_err(|_| {
                        AuthError::MalformedHeader(format!("bad ts {}", value))
                    })?)
                }
                "nonce" => nonce = Some(value.to_string()),
                "mac" => mac = Some(value.to_string()),
                "hash" => hash = Some(value.to_string()),
                "ext" => ext = Some(value.to_string()),
                // app/dlg and unknown attributes are tolerated but unused.
                _ => {}
            }
        }

        Ok(Self {
            id: id.ok_or_else(|| AuthError::MalformedHeader("missing id".into()))?,
            ts: ts.ok_or_else(|| AuthError::MalformedHeader("missing ts".into()))?,
            nonce: nonce.ok_or_else(|| AuthError::MalformedHeader("missing nonce".into()))?,
            mac: mac.ok_or_else(|| AuthError::MalformedHeader("missing mac".into()))?,
            hash,
            ext,
        })
    }
}

/// The canonical request attributes the MAC is computed over.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Uppercase HTTP method.
    pub method: &'a str,
    /// Path including the query string.
    pub path: &'a str,
    /// Host, taken from `Host` or trusted `X-Forwarded-Host`.
    pub host: &'a str,
    /// Port, from the host header or the forwarded scheme's default.
    pub port: u16,
    /// The request `Content-Type`, empty when absent.
    pub content_type: &'a str,
    /// The raw request body.
    pub body: &'a [u8],
}

/// Normalizes a content type the way the payload hash expects it:
/// parameters stripped, trimmed, lowercase.
fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// `BASE64(SHA256("hawk.1.payload\n" + content_type + "\n" + body + "\n"))`
pub fn payload_hash(content_type: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"hawk.1.payload\n");
    hasher.update(normalize_content_type(content_type).as_bytes());
    hasher.update(b"\n");
    hasher.update(body);
    hasher.update(b"\n");
    BASE64.encode(hasher.finalize())
}

/// `BASE64(HMAC-SHA256(secret, "hawk.1.header\n" + …))`
#[allow(clippy::too_many_arguments)]
pub fn header_mac(
    secret: &str,
    ts: i64,
    nonce: &str,
    method: &str,
    path: &str,
    host: &str,
    port: u16,
    hash: &str,
    ext: &str,
) -> String {
    let canonical = format!(
        "hawk.1.header\n{ts}\n{nonce}\n{method}\n{path}\n{host}\n{port}\n{hash}\n{ext}\n",
        ts = ts,
        nonce = nonce,
        method = method.to_ascii_uppercase(),
        path = path,
        host = host.to_ascii_lowercase(),
        port = port,
        hash = hash,
        ext = ext,
    );
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Stateless Hawk verification.
pub struct Authenticator {
    /// Tolerated deviation between `ts` and the server clock, in seconds.
    pub max_skew_secs: u64,
}

impl Authenticator {
    /// Verifies `header` for the given shared `secret` against the
    /// canonical request, per the fixed order: payload hash, MAC,
    /// timestamp skew.
    pub fn verify(
        &self,
        header: &HawkHeader,
        secret: &str,
        request: &RequestContext<'_>,
        now_unix: i64,
    ) -> Result<(), AuthError> {
        // Payload hash covers every request that carries a body.
        if !request.body.is_empty() || header.hash.is_some() {
            let claimed = header
                .hash
                .as_deref()
                .ok_or_else(|| AuthError::MalformedHeader("hash required with a body".into()))?;
            let computed = payload_hash(request.content_type, request.body);
            if !bool::from(computed.as_bytes().ct_eq(claimed.as_bytes())) {
                return Err(AuthError::BadPayloadHash);
            }
        }

        let expected = header_mac(
            secret,
            header.ts,
            &header.nonce,
            request.method,
            request.path,
            request.host,
            request.port,
            header.hash.as_deref().unwrap_or(""),
            header.ext.as_deref().unwrap_or(""),
        );
        if !bool::from(expected.as_bytes().ct_eq(header.mac.as_bytes())) {
            return Err(AuthError::BadMac);
        }

        if (now_unix - header.ts).unsigned_abs() > self.max_skew_secs {
            return Err(AuthError::StaleTimestamp);
        }

        Ok(())
    }
}

/// Builds a complete `Authorization` header value for a request. This is
/// the client half of the protocol, used by the test suite and by
/// monitoring callers.
#[allow(clippy::too_many_arguments)]
pub fn build_authorization_header(
    id: &str,
    secret: &str,
    method: &str,
    path: &str,
    host: &str,
    port: u16,
    content_type: &str,
    body: Option<&[u8]>,
    ts: i64,
    nonce: &str,
) -> String {
    let hash = body.map(|b| payload_hash(content_type, b));
    let mac = header_mac(
        secret,
        ts,
        nonce,
        method,
        path,
        host,
        port,
        hash.as_deref().unwrap_or(""),
        "",
    );
    match hash {
        Some(hash) => format!(
            "Hawk id=\"{}\", ts=\"{}\", nonce=\"{}\", hash=\"{}\", mac=\"{}\"",
            id, ts, nonce, hash, mac
        ),
        None => format!(
            "Hawk id=\"{}\", ts=\"{}\", nonce=\"{}\", mac=\"{}\"",
            id, ts, nonce, mac
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn request<'a>(body: &'a [u8]) -> RequestContext<'a> {
        RequestContext {
            method: "POST",
            path: "/sign/data",
            host: "localhost",
            port: 8000,
            content_type: "application/json",
            body,
        }
    }

    fn signed_header(secret: &str, body: &[u8], ts: i64) -> HawkHeader {
        let value = build_authorization_header(
            "alice",
            secret,
            "POST",
            "/sign/data",
            "localhost",
            8000,
            "application/json",
            Some(body),
            ts,
            "nonce-1",
        );
        HawkHeader::parse(&value).unwrap()
    }

    #[test]
    fn valid_request_verifies() {
        let auth = Authenticator { max_skew_secs: 60 };
        let body = br#"[{"input":"aGVsbG8="}]"#;
        let header = signed_header("secret", body, now());
        auth.verify(&header, "secret", &request(body), now()).unwrap();
    }

    #[test]
    fn tampered_body_is_bad_payload_hash() {
        let auth = Authenticator { max_skew_secs: 60 };
        let body = br#"[{"input":"aGVsbG8="}]"#;
        let header = signed_header("secret", body, now());
        let mut tampered = body.to_vec();
        tampered[3] ^= 0x01;
        let err = auth
            .verify(&header, "secret", &request(&tampered), now())
            .unwrap_err();
        assert!(matches!(err, AuthError::BadPayloadHash));
    }

    #[test]
    fn any_mac_bit_flip_is_bad_mac() {
        let auth = Authenticator { max_skew_secs: 60 };
        let body = br#"[{"input":"aGVsbG8="}]"#;
        let mut header = signed_header("secret", body, now());
        // Flip one bit in the first base64 character of the MAC.
        let mut chars: Vec<u8> = header.mac.clone().into_bytes();
        chars[0] = if chars[0] == b'A' { b'B' } else { b'A' };
        header.mac = String::from_utf8(chars).unwrap();
        let err = auth
            .verify(&header, "secret", &request(body), now())
            .unwrap_err();
        assert!(matches!(err, AuthError::BadMac));
    }

    #[test]
    fn wrong_secret_is_bad_mac() {
        let auth = Authenticator { max_skew_secs: 60 };
        let body = b"body";
        let header = signed_header("secret", body, now());
        let err = auth
            .verify(&header, "other-secret", &request(body), now())
            .unwrap_err();
        assert!(matches!(err, AuthError::BadMac));
    }

    #[test]
    fn stale_timestamp_is_rejected_in_both_directions() {
        let auth = Authenticator { max_skew_secs: 60 };
        let body = b"body";
        for offset in [-120i64, 120] {
            let ts = now() + offset;
            let header = signed_header("secret", body, ts);
            let err = auth
                .verify(&header, "secret", &request(body), now())
                .unwrap_err();
            assert!(matches!(err, AuthError::StaleTimestamp));
        }
    }

    #[test]
    fn missing_hash_with_body_is_malformed() {
        let auth = Authenticator { max_skew_secs: 60 };
        let body = b"body";
        let mut header = signed_header("secret", body, now());
        header.hash = None;
        let err = auth
            .verify(&header, "secret", &request(body), now())
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader(_)));
    }

    #[test]
    fn bodyless_request_skips_payload_hash() {
        let auth = Authenticator { max_skew_secs: 60 };
        let value = build_authorization_header(
            "monitor",
            "secret",
            "GET",
            "/__monitor__",
            "localhost",
            8000,
            "",
            None,
            now(),
            "nonce-2",
        );
        let header = HawkHeader::parse(&value).unwrap();
        let context = RequestContext {
            method: "GET",
            path: "/__monitor__",
            host: "localhost",
            port: 8000,
            content_type: "",
            body: b"",
        };
        auth.verify(&header, "secret", &context, now()).unwrap();
    }

    #[test]
    fn content_type_parameters_do_not_affect_the_hash() {
        assert_eq!(
            payload_hash("application/json; charset=utf-8", b"x"),
            payload_hash("APPLICATION/JSON", b"x")
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(HawkHeader::parse("Bearer abc").is_err());
        assert!(HawkHeader::parse("Hawk id=alice").is_err());
        assert!(HawkHeader::parse("Hawk ts=\"1\", nonce=\"n\", mac=\"m\"").is_err());
    }
}
