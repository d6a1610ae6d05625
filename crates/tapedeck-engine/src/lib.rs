//! Built-in collaborators for the Tapedeck playground
//!
//! Implements the `tapedeck-core` engine traits: a compile front end that
//! splices `#include` directives out of the in-memory file map and a tape
//! VM with optional two-dimensional grid memory. Hosts that bring their own
//! toolchain can ignore this crate entirely.

pub mod compiler;
pub mod interpreter;

pub use compiler::TapeCompiler;
pub use interpreter::TapeVm;
