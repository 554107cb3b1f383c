//! PRISM: iterative prompt refinement with a branching version history.
//!
//! The [`store::LineageStore`] keeps one session's version forest in memory
//! and folds authoritative backend responses into it. It talks to the backend
//! through [`client::PrismBackend`] and remembers the last-active session
//! through [`db::SessionPointer`].

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod store;
pub mod tree_render;

pub use prism_core::{lineage, models, version_id, LineageError, VersionNode};
