//! Tapedeck orchestration core
//!
//! This crate provides the session/worker orchestration for the Tapedeck
//! playground: command dispatch with correlation ids, streamed program
//! output, interactive input supply, and restart-as-cancellation. The
//! language toolchain itself lives behind the [`engine`] traits.

pub mod config;
pub mod documents;
pub mod engine;
pub mod error;
pub mod input;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod worker;

// Re-export commonly used types
pub use config::{BuildConfig, GridLayout};
pub use documents::{Document, DocumentStore};
pub use engine::{ByteIo, Compiler, Interpreter};
pub use error::{DeckError, DeckResult};
pub use input::{InputAnswer, InputBroker, InputBuffer};
pub use protocol::{CommandKind, ResponseKind, WorkerCommand, WorkerResponse};
pub use registry::{Settlement, TransactionRegistry};
pub use session::{OutputRecord, SessionController, SessionStatus};
pub use worker::WorkerChannel;
