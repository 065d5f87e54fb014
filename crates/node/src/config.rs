// Path: crates/node/src/config.rs
//! Configuration loading for `quilld`.

use quill_types::config::ServiceConfig;
use quill_types::error::ConfigError;
use std::path::Path;

/// Reads and parses the TOML configuration file.
pub fn load(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    toml::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_full_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(
            &path,
            r#"
                [server]
                listen_address = "127.0.0.1:8000"
                body_limit_kb = 4096
                trusted_proxies = ["10.0.0.0/8"]

                [server.nonce]
                capacity = 32768

                [monitor]
                secret = "monitorsecret"

                [[signer]]
                id = "appkey1"
                type = "contentsignature"
                mode = "p256ecdsa"
                key = { file = "/etc/quill/appkey1.pem" }

                [[principal]]
                id = "alice"
                secret = "fqm4brz7cvbnwvq8sl5pykrs"

                [[authorization]]
                principal = "alice"
                signers = ["appkey1"]
            "#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.listen_address, "127.0.0.1:8000");
        assert_eq!(config.server.nonce.capacity, 32768);
        assert_eq!(config.monitor.unwrap().secret, "monitorsecret");
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load(Path::new("/nonexistent/quill.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
