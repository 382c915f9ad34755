//! Library tests that run real processes through the public pipeline API.

#![cfg(unix)]

mod pipeline_tests;
