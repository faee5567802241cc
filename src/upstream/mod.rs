//! Upstream connection management.
//!
//! The relay keeps exactly one outbound channel to its downstream consumer.
//! Everything the relay emits (control events and frames) goes through the
//! [`ConnectionManager`] that owns it.
//!
//! # State Machine
//!
//! ```text
//!                connect()                 handshake ok
//! Disconnected ───────────► Connecting ───────────────► Connected
//!      ▲                        │                           │
//!      │      handshake failed  │    remote close / error   │
//!      └────────────────────────┴───────────────────────────┘
//!                                  (fires on_disconnect handlers)
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `manager` | Connection ownership, gated send, disconnect fan-out |
//! | `reconnect` | Retry loop with exponential backoff |
//! | `retry` | Backoff policy |

// ============================================================================
// Submodules
// ============================================================================

/// Connection ownership and send gating.
pub mod manager;

/// Retry loop.
pub mod reconnect;

/// Backoff policy.
pub mod retry;

// ============================================================================
// Re-exports
// ============================================================================

pub use manager::{ConnectionManager, ConnectionState, InboundMessage, ManagerConfig, SendStats};
pub use reconnect::ConnectOutcome;
pub use retry::RetryPolicy;
