// Path: crates/chainstore/src/fetch.rs
//! X5U retrieval.

use quill_types::error::ChainError;

/// Fetches the PEM chain body behind an X5U URL.
///
/// `https://` (and `http://`) go through the HTTP client; `file://` reads
/// straight from disk, which is the transport tests and single-host
/// deployments use.
pub async fn fetch_chain_pem(x5u: &str) -> Result<Vec<u8>, ChainError> {
    if let Some(path) = x5u.strip_prefix("file://") {
        return tokio::fs::read(path)
            .await
            .map_err(|e| ChainError::Unavailable(format!("read {}: {}", path, e)));
    }

    let response = reqwest::get(x5u)
        .await
        .map_err(|e| ChainError::Unavailable(format!("GET {}: {}", x5u, e)))?;
    if !response.status().is_success() {
        return Err(ChainError::Unavailable(format!(
            "GET {}: status {}",
            x5u,
            response.status()
        )));
    }
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| ChainError::Unavailable(format!("GET {}: {}", x5u, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_scheme_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.pem");
        std::fs::write(&path, b"PEM").unwrap();
        let url = format!("file://{}", path.display());
        assert_eq!(fetch_chain_pem(&url).await.unwrap(), b"PEM");
    }

    #[tokio::test]
    async fn missing_file_reports_unavailable() {
        let err = fetch_chain_pem("file:///nonexistent/chain.pem")
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Unavailable(_)));
    }
}
