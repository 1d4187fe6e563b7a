//! Shared test fixtures for motorcade crates.
//!
//! Provides scripted implementations of the simulation-side traits so the
//! bridge can be exercised without a running simulation.

pub mod mocks;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use mocks::{CapturingSink, MockHost, RecordingController, ScriptedPlayer, ScriptedWorld};
