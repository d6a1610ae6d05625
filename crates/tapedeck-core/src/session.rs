//! Session controller: the orchestrating-thread façade
//!
//! Owns the document arena, the input broker, the transaction registry and
//! the session status machine; exposes `compile`, `run` and `restart` to
//! the host. The worker influences the session only through the messages a
//! background pump dispatches purely on correlation id, never on arrival
//! order across ids.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BuildConfig;
use crate::documents::DocumentStore;
use crate::engine::{Compiler, Interpreter};
use crate::error::{DeckError, DeckResult};
use crate::input::{InputAnswer, InputBroker, InputBuffer};
use crate::protocol::{ResponseKind, WorkerCommand, WorkerResponse};
use crate::registry::{Settlement, TransactionRegistry};
use crate::worker::WorkerChannel;

/// Where the session currently is in its operation state machine.
///
/// Exactly one value is active at a time and only the session controller
/// mutates it. `InputBlocked` is a sub-state of running: a request is
/// parked and the buffer is dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Idle,
    Compiling,
    Running,
    InputBlocked,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Compiling => "COMPILING",
            Self::Running => "RUNNING",
            Self::InputBlocked => "INPUT_BLOCKED",
        };
        f.write_str(name)
    }
}

/// How the host should interpret the most recent output content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum OutputRecord {
    /// Successful compile: runnable code
    #[serde(rename = "ARTIFACT")]
    CompiledArtifact(String),
    /// A failed compile or run: the error description
    #[serde(rename = "ERROR")]
    ErrorText(String),
    /// A finished run: the complete program output
    #[serde(rename = "OUTPUT")]
    FinalOutput(String),
    /// A run in progress: output accumulated so far
    #[serde(rename = "LIVE_OUTPUT")]
    LiveOutput(String),
}

impl OutputRecord {
    pub fn content(&self) -> &str {
        match self {
            Self::CompiledArtifact(text)
            | Self::ErrorText(text)
            | Self::FinalOutput(text)
            | Self::LiveOutput(text) => text,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.content().len()
    }

    /// True for output that can be fed back into `run`
    pub fn is_artifact(&self) -> bool {
        matches!(self, Self::CompiledArtifact(_))
    }
}

struct SessionInner {
    compiler: Arc<dyn Compiler>,
    interpreter: Arc<dyn Interpreter>,
    registry: TransactionRegistry,
    broker: Mutex<InputBroker>,
    documents: Mutex<DocumentStore>,
    output: Mutex<Option<OutputRecord>>,
    status_tx: watch::Sender<SessionStatus>,
    worker: Mutex<Option<WorkerChannel>>,
}

/// Orchestrates compiles and runs against an isolated worker.
///
/// Cheap to clone; clones share one session. Exactly one logical operation
/// may be in flight at a time, enforced by the status machine rather than
/// a lock, since the worker only ever holds one operation anyway.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

impl SessionController {
    /// Build a session over the given collaborators and spawn its worker.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(compiler: Arc<dyn Compiler>, interpreter: Arc<dyn Interpreter>) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        let controller = Self {
            inner: Arc::new(SessionInner {
                compiler,
                interpreter,
                registry: TransactionRegistry::new(),
                broker: Mutex::new(InputBroker::new()),
                documents: Mutex::new(DocumentStore::new()),
                output: Mutex::new(None),
                status_tx,
                worker: Mutex::new(None),
            }),
        };
        controller.spawn_worker();
        controller
    }

    /// Compile the current documents starting from `entry_id`.
    ///
    /// Fails synchronously, without contacting the worker, when the entry
    /// id does not resolve, and with [`DeckError::Busy`] when another
    /// operation is in flight. Suspends until the terminal response.
    pub async fn compile(&self, entry_id: Uuid, config: BuildConfig) -> DeckResult<String> {
        let (file_map, entry_label) = {
            let documents = self.inner.documents.lock();
            let entry_label = documents
                .resolve_entry(entry_id)
                .ok_or_else(|| DeckError::unknown_entry(entry_id.to_string()))?;
            (documents.file_map(), entry_label)
        };

        self.inner.try_begin(SessionStatus::Compiling)?;

        let id = Uuid::new_v4();
        debug!(%id, entry_label, "dispatching compile");
        let (done_tx, done_rx) = oneshot::channel();
        // Handlers hold the session weakly: a pending entry must not keep a
        // dropped session (and its worker) alive through the registry.
        let weak = Arc::downgrade(&self.inner);
        self.inner.registry.register(
            id,
            Box::new(move |settlement| {
                let result = match settlement {
                    Settlement::Success(artifact) => {
                        if let Some(inner) = weak.upgrade() {
                            inner.record_output(OutputRecord::CompiledArtifact(artifact.clone()));
                            inner.set_status(SessionStatus::Idle);
                        }
                        Ok(artifact)
                    }
                    Settlement::Failure(message) => {
                        if let Some(inner) = weak.upgrade() {
                            inner.record_output(OutputRecord::ErrorText(message.clone()));
                            inner.set_status(SessionStatus::Idle);
                        }
                        Err(DeckError::Compile(message))
                    }
                    // Restart has already reset the session state.
                    Settlement::Cancelled => Err(DeckError::Cancelled),
                };
                let _ = done_tx.send(result);
            }),
            None,
        );

        self.inner
            .dispatch_command(id, WorkerCommand::compile(id, file_map, entry_label, config));

        done_rx.await.unwrap_or(Err(DeckError::Cancelled))
    }

    /// Execute compiled code, streaming output into the live record.
    ///
    /// Suspends until the terminal response; interim output is observable
    /// through [`SessionController::output`] while the run is in flight.
    pub async fn run(&self, code: impl Into<String>, grid_mode: bool) -> DeckResult<String> {
        let code = code.into();
        self.inner.try_begin(SessionStatus::Running)?;

        *self.inner.output.lock() = Some(OutputRecord::LiveOutput(String::new()));

        let id = Uuid::new_v4();
        debug!(%id, grid_mode, "dispatching run");
        let (done_tx, done_rx) = oneshot::channel();
        let weak = Arc::downgrade(&self.inner);
        let stream_weak = weak.clone();
        self.inner.registry.register(
            id,
            Box::new(move |settlement| {
                let result = match settlement {
                    Settlement::Success(output) => {
                        if let Some(inner) = weak.upgrade() {
                            inner.finish_run();
                            inner.record_output(OutputRecord::FinalOutput(output.clone()));
                            inner.set_status(SessionStatus::Idle);
                        }
                        Ok(output)
                    }
                    Settlement::Failure(message) => {
                        if let Some(inner) = weak.upgrade() {
                            inner.finish_run();
                            inner.record_output(OutputRecord::ErrorText(message.clone()));
                            inner.set_status(SessionStatus::Idle);
                        }
                        Err(DeckError::Runtime(message))
                    }
                    Settlement::Cancelled => Err(DeckError::Cancelled),
                };
                let _ = done_tx.send(result);
            }),
            Some(Box::new(move |byte| {
                if let Some(inner) = stream_weak.upgrade() {
                    inner.append_live_byte(byte);
                }
            })),
        );

        self.inner
            .dispatch_command(id, WorkerCommand::run(id, code, grid_mode));

        done_rx.await.unwrap_or(Err(DeckError::Cancelled))
    }

    /// Kill and relaunch the worker, cancelling whatever it was doing.
    ///
    /// The only cancellation primitive: every pending operation settles
    /// with [`DeckError::Cancelled`], the parked input request (if any) is
    /// abandoned, the input cursor clears, and the status is forced back to
    /// idle. Subsequent operations use the fresh worker.
    pub fn restart(&self) {
        info!("restarting worker channel");
        let previous = self.inner.worker.lock().take();
        if let Some(previous) = previous {
            previous.shutdown();
        }

        let aborted = self.inner.registry.abort_all();
        if aborted > 0 {
            debug!(aborted, "cancelled pending operations");
        }

        {
            let mut broker = self.inner.broker.lock();
            broker.abandon_pending();
            broker.reset_cursor();
        }
        self.inner.set_status(SessionStatus::Idle);

        self.spawn_worker();
    }

    /// Current status
    pub fn status(&self) -> SessionStatus {
        *self.inner.status_tx.borrow()
    }

    /// Observe status transitions
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// True while an operation is in flight
    pub fn is_busy(&self) -> bool {
        self.status() != SessionStatus::Idle
    }

    /// The most recent output classification, if any
    pub fn output(&self) -> Option<OutputRecord> {
        self.inner.output.lock().clone()
    }

    /// The source document arena
    pub fn documents(&self) -> parking_lot::MutexGuard<'_, DocumentStore> {
        self.inner.documents.lock()
    }

    /// Grow the input buffer; releases a parked input request if the new
    /// text supplies a character.
    pub fn append_input(&self, text: &str) {
        let released = self.inner.broker.lock().append(text);
        if let Some((nested_id, byte)) = released {
            self.inner.send_input(nested_id, byte);
            self.inner
                .set_status_if(SessionStatus::InputBlocked, SessionStatus::Running);
        }
    }

    /// Replace the input text; rejected while a run has consumed part of it
    pub fn set_input_text(&self, text: impl Into<String>) -> DeckResult<()> {
        self.inner.broker.lock().set_text(text)
    }

    /// Choose between blocking input and the null-byte fallback
    pub fn set_blocking_input(&self, blocking: bool) {
        self.inner.broker.lock().set_blocking(blocking);
    }

    pub fn blocking_input(&self) -> bool {
        self.inner.broker.lock().blocking()
    }

    /// Snapshot of the input text and consumption cursor
    pub fn input_buffer(&self) -> InputBuffer {
        self.inner.broker.lock().buffer().clone()
    }

    fn spawn_worker(&self) {
        let (channel, message_rx) =
            WorkerChannel::spawn(self.inner.compiler.clone(), self.inner.interpreter.clone());
        *self.inner.worker.lock() = Some(channel);
        tokio::spawn(pump(Arc::downgrade(&self.inner), message_rx));
    }
}

/// Drain worker messages for one worker generation. Ends when the worker
/// (old or current) drops its message sender, or when the session itself
/// is gone: the pump holds only a weak reference so it never keeps a
/// dropped session alive.
async fn pump(inner: Weak<SessionInner>, mut message_rx: mpsc::UnboundedReceiver<WorkerResponse>) {
    while let Some(message) = message_rx.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        inner.dispatch(message);
    }
    debug!("worker message pump exited");
}

impl SessionInner {
    fn dispatch(&self, message: WorkerResponse) {
        match message.kind {
            ResponseKind::Terminal { success, message: text } => {
                let settlement = if success {
                    Settlement::Success(text)
                } else {
                    Settlement::Failure(text)
                };
                // A stale terminal from a discarded worker finds no entry
                // here; the registry logs and drops it.
                self.registry.settle(message.id, settlement);
            }
            ResponseKind::OutputByte { byte } => {
                if !self.registry.stream(message.id, byte) {
                    warn!(id = %message.id, "output byte for unknown operation");
                }
            }
            ResponseKind::RequestInput { nested_id } => {
                if !self.registry.is_pending(message.id) {
                    warn!(id = %message.id, "input request for unknown operation");
                    return;
                }
                let answer = self.broker.lock().request(nested_id);
                match answer {
                    InputAnswer::Byte(byte) => self.send_input(nested_id, byte),
                    InputAnswer::Parked => {
                        self.set_status_if(SessionStatus::Running, SessionStatus::InputBlocked);
                    }
                }
            }
        }
    }

    fn dispatch_command(&self, id: Uuid, command: WorkerCommand) {
        let sent = match self.worker.lock().as_ref() {
            Some(worker) => worker.send(command).is_ok(),
            None => false,
        };
        if !sent {
            warn!(%id, "worker unavailable, failing dispatch");
            self.registry
                .settle(id, Settlement::Failure("worker channel is unavailable".into()));
        }
    }

    fn send_input(&self, nested_id: Uuid, byte: u8) {
        let sent = match self.worker.lock().as_ref() {
            Some(worker) => worker.send(WorkerCommand::input_byte(nested_id, byte)).is_ok(),
            None => false,
        };
        if !sent {
            warn!(%nested_id, "worker unavailable, dropping input reply");
        }
    }

    fn record_output(&self, record: OutputRecord) {
        *self.output.lock() = Some(record);
    }

    fn append_live_byte(&self, byte: u8) {
        let mut guard = self.output.lock();
        match guard.as_mut() {
            Some(OutputRecord::LiveOutput(text)) => text.push(char::from(byte)),
            _ => warn!("output byte with no live accumulator"),
        }
    }

    /// Run teardown shared by success and failure: the cursor clears and a
    /// parked request (if the run died underneath it) is abandoned.
    fn finish_run(&self) {
        let mut broker = self.broker.lock();
        broker.abandon_pending();
        broker.reset_cursor();
    }

    fn set_status(&self, status: SessionStatus) {
        self.status_tx.send_replace(status);
    }

    fn set_status_if(&self, from: SessionStatus, to: SessionStatus) -> bool {
        let mut changed = false;
        self.status_tx.send_modify(|status| {
            if *status == from {
                *status = to;
                changed = true;
            }
        });
        changed
    }

    fn try_begin(&self, next: SessionStatus) -> DeckResult<()> {
        if self.set_status_if(SessionStatus::Idle, next) {
            Ok(())
        } else {
            Err(DeckError::busy("another operation is in flight"))
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_displays_like_the_wire_names() {
        assert_eq!(SessionStatus::Idle.to_string(), "IDLE");
        assert_eq!(SessionStatus::InputBlocked.to_string(), "INPUT_BLOCKED");
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_string(&SessionStatus::InputBlocked).unwrap();
        assert_eq!(json, r#""INPUT_BLOCKED""#);
    }

    #[test]
    fn output_record_accessors() {
        let record = OutputRecord::CompiledArtifact("+.".into());
        assert!(record.is_artifact());
        assert_eq!(record.content(), "+.");
        assert_eq!(record.byte_len(), 2);

        let live = OutputRecord::LiveOutput("Hi".into());
        assert!(!live.is_artifact());
        assert_eq!(live.byte_len(), 2);
    }

    #[test]
    fn output_record_tags() {
        let value = serde_json::to_value(OutputRecord::ErrorText("boom".into())).unwrap();
        assert_eq!(value["type"], "ERROR");
        assert_eq!(value["content"], "boom");
    }
}
