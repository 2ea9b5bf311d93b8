//! Integration tests that run real builds through the binary.

#![cfg(unix)]

mod build_tests;
mod common;
