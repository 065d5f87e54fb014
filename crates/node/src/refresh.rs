// Path: crates/node/src/refresh.rs
//! Background end-entity refresh for PKI signers.
//!
//! The signer itself owns the atomic swap; this task only drives the
//! check on an interval so a long-lived process re-issues before its
//! end-entity certificate enters the refresh window's tail.

use quill_api::{Signer as _, SignerDirectory};
use quill_signers::content_signature_pki::ContentSignaturePki;
use std::time::Duration;
use tokio::sync::watch;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically refreshes every PKI signer until shutdown.
pub async fn run(registry: SignerDirectory, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => return,
        }
        for signer in registry.signers() {
            let Some(pki) = signer.as_any().downcast_ref::<ContentSignaturePki>() else {
                continue;
            };
            match pki.refresh().await {
                Ok(true) => {
                    tracing::info!(target: "node", signer = %signer.id(), "chain refreshed");
                }
                Ok(false) => {}
                // A failed refresh is retried on the next tick; the
                // current end-entity keeps serving until it expires.
                Err(e) => {
                    tracing::error!(target: "node", signer = %signer.id(), "chain refresh failed: {}", e);
                }
            }
        }
    }
}
