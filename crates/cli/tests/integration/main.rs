//! End-to-end tests of the omnirig binary against real shell commands.

#![cfg(unix)]

mod build_tests;
mod common;
mod verify_tests;
