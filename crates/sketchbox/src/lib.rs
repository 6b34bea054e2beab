//! Sketchbox: a sandboxed execution engine for kid-authored sketches.
//!
//! Takes a block of untrusted drawing-library code (or a complete HTML page),
//! turns it into a self-contained artifact, and runs it inside an injected
//! isolation boundary under a wall-clock guard and a per-frame ceiling. The
//! artifact reports back over a one-directional message channel; the
//! [`host::HostController`] reacts and tears the boundary down when a sketch
//! never produces its first frame.

#![forbid(unsafe_code)]
// Library documentation is in progress. Public API types have docs;
// internal types will be documented in future releases.
#![allow(missing_docs)]

pub mod artifact;
pub mod channel;
pub mod detect;
pub mod error;
pub mod host;
pub mod model;
pub mod policy;
pub mod shim;

pub use crate::error::{ErrorCode, SandboxError, SandboxResult};
pub use crate::model::*;
