//! # fable-core
//!
//! Core types and primitives for the Fable presentation engine.
//! This crate contains foundational types shared across all Fable crates:
//! durations, lifetimes, content kinds, configuration, and error types.

pub mod config;
pub mod error;
pub mod lifetime;
pub mod time;
pub mod types;

pub use config::*;

pub use error::{FableError, FableResult};
pub use lifetime::Lifetime;
pub use time::Duration;
pub use types::{ContentKind, ResourceKind};
