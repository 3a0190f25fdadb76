//! Inkroom Render Library
//!
//! Rendering backends for the Inkroom engine. The engine draws through
//! [`inkroom_core::RenderSurface`]; the default backend records those calls
//! into a Vello scene for GPU-accelerated rendering.

#[cfg(feature = "vello-renderer")]
mod vello_impl;

pub use inkroom_core::render::{DrawCommand, RecordingSurface, RenderSurface, StrokeStyle};

#[cfg(feature = "vello-renderer")]
pub use vello_impl::VelloSurface;
