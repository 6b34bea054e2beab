//! In-process doubles for sketchbox host tests.
//!
//! A browser is not available in tests, so this crate stands in for the
//! collaborators a [`sketchbox::host::HostController`] needs:
//!
//! - [`ScriptedFactory`] / [`ScriptedBoundary`] - boundaries that play a
//!   [`SketchScript`] through the Rust lifecycle shim and post the resulting
//!   events on the real channel
//! - [`RecordingSurface`] - remembers placeholders and diagnostic panels
//! - [`CollectingObserver`] - remembers every host event
//! - [`temp_dir`] / [`write_policy`] - file helpers for policy loading tests
//!
//! # Example
//!
//! ```ignore
//! use sketchbox::host::HostController;
//! use sketchbox::{LanguageHint, SandboxPolicy};
//! use sketchbox_fixtures::{RecordingSurface, ScriptedFactory, SketchScript};
//!
//! let factory = ScriptedFactory::new(SketchScript::Animated { frames: 3 });
//! let surface = RecordingSurface::new();
//! let mut host = HostController::new(
//!     SandboxPolicy::default(),
//!     Box::new(factory.clone()),
//!     Box::new(surface.clone()),
//! );
//! host.run("function draw() { circle(10, 10, 5); }", &LanguageHint::parse("p5js"));
//! host.drain();
//! assert_eq!(factory.loaded().len(), 1);
//! ```

// Test fixtures crate - relaxed lints for test utilities
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]
#![allow(missing_docs)]

mod boundary;
mod helpers;
mod surface;

pub use boundary::{LoadRecord, ScriptedBoundary, ScriptedFactory, SketchScript};
pub use helpers::{temp_dir, write_policy};
pub use surface::{CollectingObserver, RecordingSurface};
