// Path: crates/api/src/registry.rs
//! Read-only access to the signers bound at startup.

use crate::signer::Signer;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A read-only signer locator, built once at startup.
///
/// Lookups are O(1); iteration is deterministic (lexicographic by signer
/// id), which the monitor endpoint relies on for stable output.
#[derive(Clone, Default)]
pub struct SignerDirectory {
    /// A deterministically ordered list of signers.
    ordered: Arc<Vec<Arc<dyn Signer>>>,
    /// A map for fast id-based lookups.
    by_id: Arc<HashMap<String, Arc<dyn Signer>>>,
}

impl fmt::Debug for SignerDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerDirectory")
            .field("signer_count", &self.ordered.len())
            .finish()
    }
}

impl SignerDirectory {
    /// Creates a new directory from a list of signers.
    ///
    /// Signers are sorted lexicographically by their `id()` to ensure
    /// deterministic iteration order. Ids are unique by configuration
    /// validation; a duplicate here would mean the factory was bypassed.
    pub fn new(mut signers: Vec<Arc<dyn Signer>>) -> Self {
        signers.sort_by(|a, b| a.id().cmp(b.id()));
        let mut by_id = HashMap::with_capacity(signers.len());
        for s in &signers {
            by_id.insert(s.id().to_string(), s.clone());
        }
        Self {
            ordered: Arc::new(signers),
            by_id: Arc::new(by_id),
        }
    }

    /// Gets a signer by its id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Signer>> {
        self.by_id.get(id).cloned()
    }

    /// Returns a deterministically ordered iterator over all signers.
    pub fn signers(&self) -> impl Iterator<Item = &Arc<dyn Signer>> {
        self.ordered.iter()
    }

    /// The number of registered signers.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether the directory holds no signers.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
