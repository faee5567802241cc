//! Wire message types.
//!
//! This module defines every message shape the crate puts on a socket.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Channel | Purpose |
//! |--------------|-----------|---------|---------|
//! | [`ControlEvent`] | Relay → Consumer | Upstream (text) | Session lifecycle and metadata |
//! | Frame | Relay → Consumer | Upstream (binary) | Raw captured image bytes |
//! | [`CdpRequest`] | Relay → Browser | DevTools | Command request |
//! | [`CdpMessage`] | Browser → Relay | DevTools | Command response or event |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `control` | Control events and inbound decoding |
//! | `metadata` | Page metadata snapshot |
//! | `cdp` | Chrome DevTools Protocol envelopes |

// ============================================================================
// Submodules
// ============================================================================

/// Chrome DevTools Protocol message envelopes.
pub mod cdp;

/// Control events sent to the downstream consumer.
pub mod control;

/// Page metadata snapshot.
pub mod metadata;

// ============================================================================
// Re-exports
// ============================================================================

pub use cdp::{CdpEvent, CdpMessage, CdpRequest};
pub use control::{ControlEvent, InitialSessionData, decode_inbound};
pub use metadata::PageMetadata;
