//! HTTP surface for the voxtext transcription engine.

pub mod handlers;
pub mod router;
pub mod state;
