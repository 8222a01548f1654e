//! CLI command implementations.

pub mod batch;
pub mod common;
pub mod gates;
pub mod run;
pub mod version;
