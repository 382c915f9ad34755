//! omnirig-lib: declarative build-and-verify orchestration.
//!
//! A target definition describes how to fetch, pin and compile a native
//! artifact into an install root, and how to check the result afterwards:
//!
//! - [`target`]: definitions, TOML loading and lookup
//! - [`env`]: the scoped environment of a target run
//! - [`plan`]: declared steps resolved into process invocations
//! - [`execute`]: sequential, fail-fast step execution
//! - [`verify`]: accumulate-all verification with diagnostics
//! - [`report`]: verdicts, exit codes and diagnostic text
//! - [`pipeline`]: the entry points tying these together

pub mod consts;
pub mod env;
pub mod execute;
pub mod pipeline;
pub mod placeholder;
pub mod plan;
pub mod platform;
pub mod report;
pub mod target;
mod util;
pub mod verify;
