//! CLI command implementations.

pub mod common;
pub mod devices;
pub mod info;
pub mod play;
pub mod record;
pub mod render;
pub mod waveform;
