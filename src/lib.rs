//! tabxfer - Move one table between SQLite files
//!
//! This crate replaces a named table in an application database with the
//! same table from an external SQLite file (import), or writes that table
//! into a fresh SQLite file (export). Both directions run inside a single
//! transaction and leave the destination either fully replaced or untouched.
//!
//! # Architecture
//!
//! - [`staging`] - Staging files between external locations and the engine
//! - [`storage`] - Attach-merge engine and table introspection
//! - [`transfer`] - Coordinator sequencing stage → merge → cleanup
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Path resolution and transfer configuration
//! - [`validate`] - Table name validation and identifier quoting
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod staging;
pub mod storage;
pub mod transfer;
pub mod validate;

pub use error::{Error, Result};
pub use transfer::{Coordinator, Outcome, TransferFailure, TransferReport};
