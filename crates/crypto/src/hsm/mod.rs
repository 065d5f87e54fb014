// Path: crates/crypto/src/hsm/mod.rs
//! HSM-resident keys behind a bounded session pool.
//!
//! PKCS#11 sessions are not thread-safe and are costly to create, so each
//! HSM-backed signer owns a [`SessionPool`]: a small set of reusable
//! sessions with bounded concurrency. Session-open failure is treated as
//! transient until it has persisted past a threshold of consecutive
//! attempts.
//!
//! The interface is swappable: [`SoftHsm`] is a software stand-in used by
//! tests and development configurations; the loadable-module backend lives
//! in `pkcs11.rs` behind the `pkcs11-module` feature.

use crate::error::CryptoError;
use crate::keys::{PrivateKey, SignatureScheme};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

#[cfg(feature = "pkcs11-module")]
pub mod pkcs11;

mod uri;
pub use uri::Pkcs11Uri;

/// Number of consecutive session-open failures after which the pool stops
/// reporting the condition as transient.
const OPEN_FAILURE_THRESHOLD: u32 = 3;

/// One live HSM session. Exclusive access is enforced by the pool.
pub trait HsmSession: Send {
    /// Signs an already-computed digest under `scheme`. ECDSA output is the
    /// raw `r || s` concatenation, matching software signers.
    fn sign_digest(&mut self, scheme: SignatureScheme, digest: &[u8])
        -> Result<Vec<u8>, CryptoError>;

    /// The DER-encoded SubjectPublicKeyInfo of the resident key.
    fn public_key_der(&mut self) -> Result<Vec<u8>, CryptoError>;
}

/// A source of sessions against one token/object pair.
pub trait HsmBackend: Send + Sync {
    /// Opens a fresh session. Called only when the pool has no idle one.
    fn open_session(&self) -> Result<Box<dyn HsmSession>, CryptoError>;

    /// A short label for diagnostics (token/object, never the PIN).
    fn describe(&self) -> String;
}

/// A bounded pool of reusable HSM sessions for one signer.
pub struct SessionPool {
    backend: Box<dyn HsmBackend>,
    idle: Mutex<Vec<Box<dyn HsmSession>>>,
    permits: Semaphore,
    consecutive_open_failures: AtomicU32,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("backend", &self.backend.describe())
            .finish_non_exhaustive()
    }
}

impl SessionPool {
    /// Creates a pool admitting at most `max_sessions` concurrent sessions.
    pub fn new(backend: Box<dyn HsmBackend>, max_sessions: usize) -> Self {
        Self {
            backend,
            idle: Mutex::new(Vec::new()),
            permits: Semaphore::new(max_sessions.max(1)),
            consecutive_open_failures: AtomicU32::new(0),
        }
    }

    fn take_idle(&self) -> Option<Box<dyn HsmSession>> {
        match self.idle.lock() {
            Ok(mut idle) => idle.pop(),
            Err(_) => None,
        }
    }

    fn put_idle(&self, session: Box<dyn HsmSession>) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(session);
        }
    }

    /// Runs `f` with exclusive access to one session.
    ///
    /// The session is returned to the pool on success and discarded on
    /// failure, so a wedged session handle is never reused.
    pub async fn with_session<T>(
        &self,
        f: impl FnOnce(&mut dyn HsmSession) -> Result<T, CryptoError>,
    ) -> Result<T, CryptoError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CryptoError::HsmSession("session pool closed".into()))?;

        let mut session = match self.take_idle() {
            Some(s) => s,
            None => match self.backend.open_session() {
                Ok(s) => {
                    self.consecutive_open_failures.store(0, Ordering::Relaxed);
                    s
                }
                Err(e) => {
                    let failures =
                        self.consecutive_open_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if failures >= OPEN_FAILURE_THRESHOLD {
                        tracing::error!(
                            target: "hsm",
                            backend = %self.backend.describe(),
                            failures,
                            "session open keeps failing"
                        );
                        return Err(CryptoError::HsmSession(format!(
                            "session open failed {} consecutive times: {}",
                            failures, e
                        )));
                    }
                    tracing::warn!(
                        target: "hsm",
                        backend = %self.backend.describe(),
                        failures,
                        "transient session open failure"
                    );
                    return Err(CryptoError::HsmSession(format!(
                        "transient session open failure: {}",
                        e
                    )));
                }
            },
        };

        match f(session.as_mut()) {
            Ok(value) => {
                self.put_idle(session);
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    /// Liveness probe: opens or reuses a session and fetches the public key.
    pub async fn probe(&self) -> Result<(), CryptoError> {
        self.with_session(|s| s.public_key_der().map(|_| ())).await
    }
}

/// Software stand-in for an HSM token, keyed like a PKCS#11 object.
pub struct SoftHsm {
    object: String,
    key: PrivateKey,
}

impl SoftHsm {
    /// Wraps a software key under an object label.
    pub fn new(object: impl Into<String>, key: PrivateKey) -> Self {
        Self {
            object: object.into(),
            key,
        }
    }
}

struct SoftSession {
    key: PrivateKey,
}

impl HsmSession for SoftSession {
    fn sign_digest(
        &mut self,
        scheme: SignatureScheme,
        digest: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.key.sign_digest(scheme, digest)
    }

    fn public_key_der(&mut self) -> Result<Vec<u8>, CryptoError> {
        self.key.public_key_der()
    }
}

impl HsmBackend for SoftHsm {
    fn open_session(&self) -> Result<Box<dyn HsmSession>, CryptoError> {
        Ok(Box::new(SoftSession {
            key: self.key.clone(),
        }))
    }

    fn describe(&self) -> String {
        format!("soft:{}", self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::sha256;
    use rand::rngs::OsRng;
    use std::sync::Arc;

    fn soft_pool() -> SessionPool {
        let key = PrivateKey::EcdsaP256(p256::SecretKey::random(&mut OsRng).into());
        SessionPool::new(Box::new(SoftHsm::new("testkey", key)), 2)
    }

    #[tokio::test]
    async fn signs_through_pooled_session() {
        let pool = soft_pool();
        let digest = sha256(b"payload");
        let sig = pool
            .with_session(|s| s.sign_digest(SignatureScheme::EcdsaP256Sha256, &digest))
            .await
            .unwrap();
        assert_eq!(sig.len(), 64);
        pool.probe().await.unwrap();
    }

    #[tokio::test]
    async fn sessions_are_reused() {
        struct CountingBackend {
            inner: SoftHsm,
            opens: Arc<AtomicU32>,
        }
        impl HsmBackend for CountingBackend {
            fn open_session(&self) -> Result<Box<dyn HsmSession>, CryptoError> {
                self.opens.fetch_add(1, Ordering::Relaxed);
                self.inner.open_session()
            }
            fn describe(&self) -> String {
                self.inner.describe()
            }
        }

        let key = PrivateKey::EcdsaP256(p256::SecretKey::random(&mut OsRng).into());
        let opens = Arc::new(AtomicU32::new(0));
        let backend = CountingBackend {
            inner: SoftHsm::new("k", key),
            opens: opens.clone(),
        };
        let pool = SessionPool::new(Box::new(backend), 2);
        for _ in 0..5 {
            pool.probe().await.unwrap();
        }
        // Serial probes reuse the single idle session after the first open.
        assert_eq!(opens.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn open_failures_become_fatal_past_threshold() {
        struct Failing;
        impl HsmBackend for Failing {
            fn open_session(&self) -> Result<Box<dyn HsmSession>, CryptoError> {
                Err(CryptoError::HsmSession("token gone".into()))
            }
            fn describe(&self) -> String {
                "failing".into()
            }
        }

        let pool = SessionPool::new(Box::new(Failing), 1);
        for attempt in 1..=OPEN_FAILURE_THRESHOLD + 1 {
            let err = pool.probe().await.unwrap_err();
            let msg = err.to_string();
            if attempt < OPEN_FAILURE_THRESHOLD {
                assert!(msg.contains("transient"), "attempt {}: {}", attempt, msg);
            } else {
                assert!(msg.contains("consecutive"), "attempt {}: {}", attempt, msg);
            }
        }
    }
}
