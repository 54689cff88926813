//! Test utilities for the Verba crates.
//!
//! This crate provides:
//! - Synthetic document text generation
//! - Temporary index directories
//! - A fault-injecting [`Directory`](verba_io::Directory) wrapper
//! - Analyzers for failure, ordering and payload scenarios
//!
//! It is intended for use by the test suites of the other crates only.

pub mod analyzers;
pub mod data_gen;
pub mod dirs;
pub mod faulty_dir;
