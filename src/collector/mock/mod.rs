//! Mock filesystem for testing.
//!
//! `MockFs` scripts the `/proc` files the memory collector reads, so tests
//! run without a real procfs.

mod filesystem;

pub use filesystem::{MockFs, status_content};
