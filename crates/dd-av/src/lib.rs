//! # dd-av
//!
//! External tool boundary for dvrdash.
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find the MP4Box executable,
//!   honouring a configured override before searching `PATH`.
//! - **Process runs** ([`Invocation`]) -- one bounded run of a program with
//!   captured output.
//! - **DASH packaging** ([`DashPackager`], [`Mp4BoxPackager`]) -- turn a
//!   finished MP4 into `manifest.mpd` plus `segment_*.m4s` files.

pub mod command;
pub mod packager;
pub mod tools;

pub use command::{Invocation, RunOutput};
pub use packager::{validate_stream_name, DashPackager, Mp4BoxPackager, PackagedStream};
pub use tools::{Tool, ToolRegistry, ToolStatus, MP4BOX};
