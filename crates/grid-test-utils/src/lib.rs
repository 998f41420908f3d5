//! Shared test utilities for the GRID Cloud client workspace.
//!
//! A dev-dependency only; never published.
//!
//! # Modules
//!
//! - [`workspace`]: [`TestWorkspace`] builder for on-disk workspace fixtures

pub mod workspace;

pub use workspace::TestWorkspace;
