//! dd-core: shared error type and configuration for all dd-* crates.
//!
//! Every library in the workspace reports failures through [`Error`], and the
//! server, recorder and packager all read their settings from [`config`].

pub mod config;
pub mod error;

pub use error::{Error, Result};
