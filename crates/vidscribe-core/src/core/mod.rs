//! vidscribe Core Engine
//!
//! Inference clients, the frame analyzer and the stage pipeline.

pub mod ai;
pub mod analysis;
pub mod events;
pub mod fs;
pub mod media;
pub mod pipeline;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
