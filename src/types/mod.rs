// SmartMarks shared type definitions
// Each submodule defines types used across the engine and the command surface.

pub mod ai;
pub mod bookmark;
pub mod classification;
pub mod errors;
pub mod events;
pub mod session;
pub mod settings;
