//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the file sync core:
//! - Logging and tracing bootstrap
//! - Event bus system used for change notifications and completion events
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the sync crates depend on. It
//! establishes the logging conventions and the event broadcasting mechanism
//! used throughout the system: the hosting record-sync engine publishes
//! store-operation completions here, and the file sync context both consumes
//! those and publishes its own file-operation completions.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
