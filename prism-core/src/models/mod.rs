//! Domain models for PRISM.
//!
//! # Core Concepts
//!
//! - [`Session`]: A named unit of iterative work. Owns an ordered list of
//!   versions in arrival order.
//! - [`Version`]: One immutable attempt within a session. Numbers are
//!   allocated by the backend; the parent reference forms a branching forest.
//! - [`SessionSummary`]: The coarse listing record kept for session pickers.
//!
//! # Wire Types
//!
//! Request and response bodies exchanged with the generation backend live in
//! [`wire`] and are re-exported here.

mod prompt;
mod session;
mod version;
pub mod wire;

pub use prompt::*;
pub use session::*;
pub use version::*;
pub use wire::*;
