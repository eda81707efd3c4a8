//! Deterministic, pure logic shared by the cycle controller.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data (model responses, file snapshots, cycle state) and return deterministic
//! outputs suitable for tests.

pub mod edit;
pub mod parse;
pub mod path;
pub mod snapshot;
pub mod state;
pub mod types;
