// Path: crates/crypto/src/hsm/uri.rs
//! RFC 7512 PKCS#11 URI parsing (the subset the factory consumes).
//!
//! `pkcs11:token=prod;object=appkey1;slot-id=3?module-path=/usr/lib/p11.so&pin-value=1234`

use crate::error::CryptoError;

/// The attributes of a parsed `pkcs11:` URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pkcs11Uri {
    /// `token` path attribute: the token label to select.
    pub token: Option<String>,
    /// `object` path attribute: the key label to use.
    pub object: Option<String>,
    /// `slot-id` path attribute, when the slot is addressed directly.
    pub slot_id: Option<u64>,
    /// `module-path` query attribute: the PKCS#11 shared object to load.
    pub module_path: Option<String>,
    /// `pin-value` query attribute. Prefer `pin-source` style indirection
    /// in production configurations.
    pub pin_value: Option<String>,
}

fn percent_decode(input: &str) -> Result<String, CryptoError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = *bytes
            .get(i)
            .ok_or_else(|| CryptoError::InvalidInput("bad percent encoding".into()))?;
        if b == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .ok_or_else(|| CryptoError::InvalidInput("truncated percent escape".into()))?;
            let hex = std::str::from_utf8(hex)
                .map_err(|_| CryptoError::InvalidInput("bad percent escape".into()))?;
            let value = u8::from_str_radix(hex, 16)
                .map_err(|_| CryptoError::InvalidInput("bad percent escape".into()))?;
            out.push(value);
            i += 3;
        } else {
            out.push(b);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| CryptoError::InvalidInput("URI is not UTF-8".into()))
}

impl Pkcs11Uri {
    /// Parses a `pkcs11:` URI string.
    pub fn parse(uri: &str) -> Result<Self, CryptoError> {
        let rest = uri
            .strip_prefix("pkcs11:")
            .ok_or_else(|| CryptoError::InvalidInput("missing pkcs11: scheme".into()))?;

        let (path_part, query_part) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };

        let mut parsed = Self::default();

        for attr in path_part.split(';').filter(|a| !a.is_empty()) {
            let (key, value) = attr
                .split_once('=')
                .ok_or_else(|| CryptoError::InvalidInput(format!("bad attribute: {}", attr)))?;
            let value = percent_decode(value)?;
            match key {
                "token" => parsed.token = Some(value),
                "object" => parsed.object = Some(value),
                "slot-id" => {
                    let id = value.parse::<u64>().map_err(|_| {
                        CryptoError::InvalidInput(format!("bad slot-id: {}", value))
                    })?;
                    parsed.slot_id = Some(id);
                }
                // Unrecognized path attributes (serial, id, …) are ignored.
                _ => {}
            }
        }

        if let Some(query) = query_part {
            for attr in query.split('&').filter(|a| !a.is_empty()) {
                let (key, value) = attr
                    .split_once('=')
                    .ok_or_else(|| CryptoError::InvalidInput(format!("bad attribute: {}", attr)))?;
                let value = percent_decode(value)?;
                match key {
                    "module-path" => parsed.module_path = Some(value),
                    "pin-value" => parsed.pin_value = Some(value),
                    _ => {}
                }
            }
        }

        if parsed.object.is_none() {
            return Err(CryptoError::InvalidInput(
                "pkcs11 URI must carry an object attribute".into(),
            ));
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri() {
        let uri = Pkcs11Uri::parse(
            "pkcs11:token=prod;object=appkey1;slot-id=3?module-path=/usr/lib/p11.so&pin-value=1234",
        )
        .unwrap();
        assert_eq!(uri.token.as_deref(), Some("prod"));
        assert_eq!(uri.object.as_deref(), Some("appkey1"));
        assert_eq!(uri.slot_id, Some(3));
        assert_eq!(uri.module_path.as_deref(), Some("/usr/lib/p11.so"));
        assert_eq!(uri.pin_value.as_deref(), Some("1234"));
    }

    #[test]
    fn percent_decoding_applies() {
        let uri = Pkcs11Uri::parse("pkcs11:token=my%20token;object=a%2Fb").unwrap();
        assert_eq!(uri.token.as_deref(), Some("my token"));
        assert_eq!(uri.object.as_deref(), Some("a/b"));
    }

    #[test]
    fn object_is_required() {
        assert!(Pkcs11Uri::parse("pkcs11:token=prod").is_err());
    }

    #[test]
    fn wrong_scheme_rejected() {
        assert!(Pkcs11Uri::parse("https://example.com").is_err());
    }
}
