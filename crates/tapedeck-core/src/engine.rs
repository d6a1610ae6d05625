//! Collaborator traits: the compiler and interpreter boundary
//!
//! The orchestration core never sees inside the language toolchain. It
//! drives these traits from the worker task and converts anything they
//! return (or throw) into terminal protocol responses. Implementations
//! live in `tapedeck-engine`; tests use scripted fakes.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::BuildConfig;
use crate::error::DeckResult;

/// Compiles a file map, starting from the entry label, into runnable code.
///
/// Called at most once per compile operation. Errors are returned as
/// descriptions; the worker boundary also intercepts panics.
pub trait Compiler: Send + Sync {
    fn compile(
        &self,
        file_map: &HashMap<String, String>,
        entry_label: &str,
        config: &BuildConfig,
    ) -> DeckResult<String>;
}

/// Byte I/O handed to the interpreter for one run.
///
/// `write_byte` is invoked once per produced byte and must not block.
/// `read_byte` suspends the run until a byte is available; behind it sits
/// the whole request-input round trip across the worker boundary.
#[async_trait]
pub trait ByteIo: Send {
    fn write_byte(&mut self, byte: u8);
    async fn read_byte(&mut self) -> DeckResult<u8>;
}

/// Executes compiled code, streaming bytes through the supplied I/O.
///
/// Returns the complete accumulated output on success. Implementations own
/// no state across calls; one instance serves every run of a worker.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn run(&self, code: &str, grid_mode: bool, io: &mut dyn ByteIo) -> DeckResult<String>;
}
