//! Browser sessions.
//!
//! A session pairs a [`SessionId`](crate::identifiers::SessionId) with a
//! renderable [`Surface`] and at most one running frame stream.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `surface` | `Surface` and `SurfaceLauncher` traits |
//! | `registry` | Session bookkeeping and stream lifecycle |

// ============================================================================
// Submodules
// ============================================================================

/// Session bookkeeping.
pub mod registry;

/// Surface abstraction.
pub mod surface;

// ============================================================================
// Re-exports
// ============================================================================

pub use registry::{Session, SessionRegistry};
pub use surface::{Surface, SurfaceLauncher};
