//! Shared utilities.
//!
//! Test helpers live here so unit tests across modules can share them.

#[cfg(test)]
pub mod testutil;
