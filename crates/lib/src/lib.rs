//! wheelwright-lib: build-matrix resolution and wheel building.
//!
//! - [`selector`]: which identifiers to build, from build/skip patterns
//! - [`configs`]: the platform table and build plans
//! - [`options`]: config-file loading and per-identifier options
//! - [`cache`]: the lock-guarded toolchain cache
//! - [`install`]: interpreter installers
//! - [`build`]: the orchestrator that runs each build

pub mod build;
pub mod cache;
pub mod configs;
pub mod consts;
pub mod constraints;
pub mod exec;
pub mod install;
pub mod options;
pub mod platform;
pub mod selector;
pub mod template;
