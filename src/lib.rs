//! dvrdash: DVR stream recorder, DASH packager and origin server.
//!
//! The binary is a thin shell over the `dd-*` crates; this library holds the
//! glue it needs so integration tests can drive it directly.

pub mod config;
pub mod ingest;
pub mod probe;
