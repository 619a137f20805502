//! Platform runtime for a scripted game interpreter.
//!
//! This crate contains the platform-agnostic half of the runtime: tick
//! scheduling, the double-buffered audio pipeline, framebuffer presentation,
//! input normalization and the caching filesystem layer over read-only media.
//! Backends (desktop, consoles) provide the hardware seams and drive the
//! interrupt half through [`runtime::Interrupts`].

/// Double-buffered, slot-divided audio streaming with stall recovery.
pub mod audio;

/// Error types shared by the runtime.
pub mod error;

/// Path resolution and single-file caching over slow read-only media.
pub mod fs;

/// Raw controller state normalization.
pub mod input;

/// Owned runtime context and the interrupt entry points.
pub mod runtime;

/// Spin-flag exclusion usable from interrupt context.
pub mod sync;

/// The upward contract consumed by the interpreter.
pub mod system;

/// Wrap-aware tick counter.
pub mod tick;

/// Fixed-capacity deferred callback table.
pub mod timer;

/// Palette conversion, 4bpp blits and vertical-blank frame handoff.
pub mod video;

pub use error::RuntimeError;
pub use runtime::{Backend, Interrupts, Runtime, RuntimeConfig};
pub use system::System;
