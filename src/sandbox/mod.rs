//! Isolated, time- and size-bounded execution of untrusted node code.
//!
//! User JavaScript runs on a dedicated worker thread inside a stripped-down
//! `boa_engine` context. The host communicates with the worker strictly by
//! message passing ([`protocol`]): a `Ready` handshake, one request, then a
//! console stream and a single success/error response. A watchdog races the
//! response; when it fires the worker is torn down and a
//! [`SandboxError::Timeout`] is reported.
//!
//! Invariants this module must never lose:
//! - no ambient capability leak: the sandbox sees only the allow-listed
//!   globals plus `input` and a frozen copy of `variables`;
//! - hard kill on timeout: after the watchdog fires, nothing sent by the
//!   worker is observable and the interpreter's own limits stop it.

mod error;
mod protocol;
mod runner;

pub use error::SandboxError;
pub use protocol::{SandboxRequest, WorkerMessage};
pub use runner::{SandboxConfig, SandboxOutcome, SandboxRunner};
