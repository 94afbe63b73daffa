//! clipcast library crate.
//!
//! Composes a finished video from a principal clip, branding graphics and
//! surrounding segments, then streams it to a live endpoint while reporting
//! lifecycle status to a coordinator.

pub mod acquisition;
pub mod broadcast;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod pipeline;
pub mod utils;

#[doc(hidden)]
pub mod test_utils;

pub use error::{Error, Result};
