//! vidscribe Core Library
//!
//! Describes a video by sampling frames, asking a vision model about each one
//! in order, and reconstructing a single narrative from the notes and the
//! audio transcript.

pub mod core;

pub use crate::core::{CoreError, CoreResult};
