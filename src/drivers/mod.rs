//! Device interfaces used by the syscall layer
//!
//! All drivers follow these principles:
//! - The syscall layer sees a trait, never device registers
//! - Input validation happens before a driver is called
//! - No panics on invalid input

pub mod console;
pub mod power;

pub use console::Console;
pub use power::PowerControl;
