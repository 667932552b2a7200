//! study-forum/crates/sf-core/src/lib.rs
//!
//! The central domain model and interface definitions for the study forum.

pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;
