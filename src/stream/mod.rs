//! Session-bound frame streaming.
//!
//! A [`FrameProducer`] repeatedly captures a [`FrameSource`] and hands each
//! frame to a [`FrameSink`]. The interval is trailing: the wait starts after
//! the previous capture and delivery have finished, so a slow capture
//! stretches the period instead of piling up work.

// ============================================================================
// Submodules
// ============================================================================

/// Capture loop and its handle.
pub mod producer;

// ============================================================================
// Re-exports
// ============================================================================

pub use producer::{DEFAULT_FRAME_INTERVAL, FrameProducer, FrameSink, FrameSource, StreamHandle};
