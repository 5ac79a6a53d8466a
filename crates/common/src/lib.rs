//! Shared types, error definitions, and utilities used across all selfbot crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result, SelfbotError},
    types::{ChatKind, Direction, Event, EventKind, RawEvent},
};
