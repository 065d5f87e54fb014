// Path: crates/telemetry/src/lib.rs
#![forbid(unsafe_code)]

//! Observability plumbing for the Quill signing service.

mod init;

pub use init::init_tracing;
