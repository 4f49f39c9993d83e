//! # Tabletop Test
//! Harness for driving several peers over an in-process hub with one shared
//! manual clock, used by the integration tests of this workspace.

pub mod helpers;

pub use helpers::{cursor_name, TestCluster, ROUNDS_TO_SETTLE};
