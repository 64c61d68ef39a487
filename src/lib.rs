//! Spice Rack - kiosk controller for a spice-dispensing rack
//!
//! Positions are named and selected by touch or by voice; state is mirrored to a
//! remote JSON document store. This library exports the core modules for the
//! binary and for tests.

/// Audio capture and processing
pub mod audio;
/// Configuration management
pub mod config;
/// Line-oriented console driver
pub mod console;
/// Global listen shortcut
pub mod input;
/// Spoken token to position resolution
pub mod matcher;
/// Kiosk panel: grid, gestures, edit dialog
pub mod panel;
/// Position names and current selection
pub mod positions;
/// Remote and in-memory document stores
pub mod store;
/// Logging setup
pub mod telemetry;
/// Whisper transcription engine
pub mod transcription;
/// Voice command sessions
pub mod voice;
