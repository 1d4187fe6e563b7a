// motorcade-core: Types, traits, settings, sim clock, and errors for the
// motorcade session bridge.

pub mod config;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;
