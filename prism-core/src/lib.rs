//! Domain models and version lineage rules for PRISM sessions.
//!
//! This crate has no I/O. It describes what a session and its versions look
//! like, the wire shapes exchanged with the generation backend, and the rules
//! that keep a session's version forest well formed.

pub mod lineage;
pub mod models;
pub mod timestamp;

pub use lineage::{version_id, LineageError, VersionNode};
