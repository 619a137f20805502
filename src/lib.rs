//! Desktop backend for the rawhost runtime: cpal audio, gilrs input, a
//! headless frame sink and a thread standing in for the vertical-blank
//! interrupt.

pub mod audio;
pub mod config;
pub mod display;
pub mod driver;
pub mod input;
pub mod probe;
