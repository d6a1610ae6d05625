//! Worker channel: the isolated execution context
//!
//! A spawned task owns the compiler and interpreter instances and is
//! reachable only through message passing: commands in on one channel,
//! responses out on another, every envelope carrying the correlation id of
//! its operation. During a run the task keeps servicing `InputByte`
//! commands from a `select!` loop while the interpreter future is in
//! flight, so an input request stalls the program without stalling the
//! channel.
//!
//! Collaborator faults, error returns and panics alike, are converted
//! into failed terminal responses at this boundary. A correlation id is
//! never silently dropped.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::{ByteIo, Compiler, Interpreter};
use crate::error::{DeckError, DeckResult};
use crate::protocol::{CommandKind, WorkerCommand, WorkerResponse};

/// Handle to the isolated execution context.
///
/// [`WorkerChannel::shutdown`] is the system's only cancellation
/// primitive: the task is killed outright and a fresh channel must be
/// spawned. There is no per-operation cancel.
pub struct WorkerChannel {
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl WorkerChannel {
    /// Spawn a fresh execution context around the given collaborators.
    ///
    /// Returns the channel handle and the response stream the session
    /// controller pumps.
    pub fn spawn(
        compiler: Arc<dyn Compiler>,
        interpreter: Arc<dyn Interpreter>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerResponse>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker_loop(
            command_rx,
            message_tx,
            compiler,
            interpreter,
            cancel.clone(),
        ));
        (
            Self {
                command_tx,
                cancel,
                handle,
            },
            message_rx,
        )
    }

    pub fn send(&self, command: WorkerCommand) -> DeckResult<()> {
        self.command_tx
            .send(command)
            .map_err(|_| DeckError::channel("worker task is gone"))
    }

    /// Hard-kill the execution context, abandoning whatever it was doing.
    ///
    /// The caller is responsible for settling the correlation ids that were
    /// pending at this moment (see `TransactionRegistry::abort_all`).
    pub fn shutdown(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

async fn worker_loop(
    mut command_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    message_tx: mpsc::UnboundedSender<WorkerResponse>,
    compiler: Arc<dyn Compiler>,
    interpreter: Arc<dyn Interpreter>,
    cancel: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = command_rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command.kind {
            CommandKind::Compile {
                file_map,
                entry_label,
                config,
            } => {
                debug!(id = %command.id, entry_label, "worker compiling");
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    compiler.compile(&file_map, &entry_label, &config)
                }));
                let response = match result {
                    Ok(Ok(code)) => WorkerResponse::terminal(command.id, true, code),
                    Ok(Err(err)) => WorkerResponse::terminal(command.id, false, err.to_string()),
                    Err(panic) => WorkerResponse::terminal(command.id, false, fault_message(panic)),
                };
                if message_tx.send(response).is_err() {
                    break;
                }
            }
            CommandKind::Run { code, grid_mode } => {
                debug!(id = %command.id, grid_mode, "worker running program");
                let finished = run_program(
                    command.id,
                    &code,
                    grid_mode,
                    &mut command_rx,
                    &message_tx,
                    interpreter.as_ref(),
                    &cancel,
                )
                .await;
                if !finished {
                    break;
                }
            }
            CommandKind::InputByte { .. } => {
                // Replies are consumed inside run_program; one arriving here
                // belongs to a run that no longer exists.
                warn!(id = %command.id, "input byte with no run in flight");
            }
        }
    }
    debug!("worker loop exited");
}

/// Drive one run to its terminal response, answering input requests from
/// the command stream along the way. Returns false if the channel closed
/// underneath the run.
async fn run_program(
    run_id: Uuid,
    code: &str,
    grid_mode: bool,
    command_rx: &mut mpsc::UnboundedReceiver<WorkerCommand>,
    message_tx: &mpsc::UnboundedSender<WorkerResponse>,
    interpreter: &dyn Interpreter,
    cancel: &CancellationToken,
) -> bool {
    let pending_input: Arc<PendingInput> = Arc::default();
    let mut io = ChannelIo {
        run_id,
        message_tx: message_tx.clone(),
        pending_input: pending_input.clone(),
    };
    let run = AssertUnwindSafe(interpreter.run(code, grid_mode, &mut io)).catch_unwind();
    tokio::pin!(run);

    let response = loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            result = &mut run => break match result {
                Ok(Ok(output)) => WorkerResponse::terminal(run_id, true, output),
                Ok(Err(err)) => WorkerResponse::terminal(run_id, false, err.to_string()),
                Err(panic) => WorkerResponse::terminal(run_id, false, fault_message(panic)),
            },
            command = command_rx.recv() => match command {
                None => return false,
                Some(WorkerCommand { id, kind: CommandKind::InputByte { byte } }) => {
                    deliver_input(&pending_input, id, byte);
                }
                Some(other) => {
                    // The controller's busy check makes this unreachable in
                    // normal operation; still, never leave an id hanging.
                    warn!(id = %other.id, "command received while a run is in flight");
                    let _ = message_tx.send(WorkerResponse::terminal(
                        other.id,
                        false,
                        "worker is already executing a program",
                    ));
                }
            },
        }
    };

    message_tx.send(response).is_ok()
}

type PendingInput = Mutex<Option<(Uuid, oneshot::Sender<u8>)>>;

fn deliver_input(pending: &PendingInput, nested_id: Uuid, byte: u8) {
    let mut guard = pending.lock();
    match guard.take() {
        Some((expected, reply)) if expected == nested_id => {
            let _ = reply.send(byte);
        }
        Some(other) => {
            warn!(%nested_id, expected = %other.0, "input byte for a different request");
            *guard = Some(other);
        }
        None => warn!(%nested_id, "input byte with no pending request"),
    }
}

/// The interpreter's view of the outside world: output bytes fan out as
/// interim responses; each input read becomes a request/reply round trip
/// on a freshly minted nested id.
struct ChannelIo {
    run_id: Uuid,
    message_tx: mpsc::UnboundedSender<WorkerResponse>,
    pending_input: Arc<PendingInput>,
}

#[async_trait]
impl ByteIo for ChannelIo {
    fn write_byte(&mut self, byte: u8) {
        let _ = self
            .message_tx
            .send(WorkerResponse::output_byte(self.run_id, byte));
    }

    async fn read_byte(&mut self) -> DeckResult<u8> {
        let nested_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        *self.pending_input.lock() = Some((nested_id, reply_tx));
        self.message_tx
            .send(WorkerResponse::request_input(self.run_id, nested_id))
            .map_err(|_| DeckError::channel("worker message channel closed"))?;
        reply_rx
            .await
            .map_err(|_| DeckError::channel("input reply channel dropped"))
    }
}

fn fault_message(panic: Box<dyn Any + Send>) -> String {
    let detail = if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    };
    format!("uncaught fault in the worker: {detail}")
}
