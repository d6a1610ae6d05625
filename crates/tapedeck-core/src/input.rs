//! Input broker: byte supply for a running program
//!
//! The broker owns the session's input buffer and answers every input
//! request exactly once, from one of three paths: an unread buffered byte,
//! an immediate null byte when blocking is disabled, or a parked request
//! that is released by the next buffer growth. It is a pure state machine;
//! the session controller forwards released bytes to the worker and drives
//! the status transitions.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DeckError, DeckResult};

/// The interactive input text and how much of it has been consumed.
///
/// `cursor` is `None` until the first byte is read, then counts consumed
/// bytes and never decreases. Hosts render the consumed prefix read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBuffer {
    text: String,
    cursor: Option<usize>,
}

impl InputBuffer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// True if an unconsumed byte exists
    pub fn has_unread(&self) -> bool {
        self.cursor.unwrap_or(0) < self.text.len()
    }

    /// Consume the next byte, advancing the cursor.
    ///
    /// Two consecutive calls at an exhausted position both return `None`;
    /// consuming never moves the cursor backwards.
    fn pop_byte(&mut self) -> Option<u8> {
        let position = self.cursor.unwrap_or(0);
        let byte = self.text.as_bytes().get(position).copied()?;
        self.cursor = Some(position + 1);
        Some(byte)
    }
}

/// Outcome of an input request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAnswer {
    /// Reply to the worker immediately with this byte
    Byte(u8),
    /// Blocking is enabled and the buffer is dry: the request is parked
    /// until the buffer grows
    Parked,
}

/// Answers input requests from the buffer, a null-byte fallback, or by
/// parking the request against buffer growth.
#[derive(Debug, Default)]
pub struct InputBroker {
    buffer: InputBuffer,
    blocking: bool,
    pending: Option<Uuid>,
}

impl InputBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocking(&self) -> bool {
        self.blocking
    }

    pub fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    pub fn buffer(&self) -> &InputBuffer {
        &self.buffer
    }

    /// Id of the parked request, if any
    pub fn pending(&self) -> Option<Uuid> {
        self.pending
    }

    /// Answer an input request.
    ///
    /// The interpreter never pipelines input requests, so at most one may be
    /// outstanding; a second request while one is parked abandons the first.
    pub fn request(&mut self, nested_id: Uuid) -> InputAnswer {
        if let Some(stale) = self.pending.take() {
            warn!(%stale, %nested_id, "input request while another was parked");
        }

        if let Some(byte) = self.buffer.pop_byte() {
            debug!(%nested_id, byte, "answering input request from buffer");
            return InputAnswer::Byte(byte);
        }
        if !self.blocking {
            // Null-byte fallback: a run can never stall when the user has
            // not opted into interactive waiting.
            debug!(%nested_id, "buffer dry, blocking disabled, answering null byte");
            return InputAnswer::Byte(0);
        }

        debug!(%nested_id, "buffer dry, parking input request");
        self.pending = Some(nested_id);
        InputAnswer::Parked
    }

    /// Grow the buffer.
    ///
    /// If a parked request can now be satisfied, returns it together with
    /// its byte so the caller can reply to the worker and flip the status
    /// back to running.
    pub fn append(&mut self, text: &str) -> Option<(Uuid, u8)> {
        self.buffer.text.push_str(text);
        let nested_id = self.pending?;
        let byte = self.buffer.pop_byte()?;
        self.pending = None;
        debug!(%nested_id, byte, "buffer growth released parked input request");
        Some((nested_id, byte))
    }

    /// Replace the whole buffer text. Legal only while nothing has been
    /// consumed (between runs); appends are the only edits accepted once a
    /// cursor exists.
    pub fn set_text(&mut self, text: impl Into<String>) -> DeckResult<()> {
        if self.buffer.cursor.is_some() {
            return Err(DeckError::invalid_input(
                "input text cannot be replaced while partially consumed",
            ));
        }
        self.buffer.text = text.into();
        Ok(())
    }

    /// Forget consumption state at the end of a run
    pub fn reset_cursor(&mut self) {
        self.buffer.cursor = None;
    }

    /// Drop any parked request (restart); the worker that asked is gone
    pub fn abandon_pending(&mut self) -> Option<Uuid> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_byte_answers_immediately() {
        let mut broker = InputBroker::new();
        broker.set_text("A").unwrap();

        let answer = broker.request(Uuid::new_v4());
        assert_eq!(answer, InputAnswer::Byte(65));
        assert_eq!(broker.buffer().cursor(), Some(1));
    }

    #[test]
    fn null_byte_when_blocking_disabled() {
        let mut broker = InputBroker::new();

        assert_eq!(broker.request(Uuid::new_v4()), InputAnswer::Byte(0));
        assert!(broker.pending().is_none());
        // Cursor untouched: nothing was consumed.
        assert_eq!(broker.buffer().cursor(), None);
    }

    #[test]
    fn parked_request_released_by_append() {
        let mut broker = InputBroker::new();
        broker.set_blocking(true);
        let nested_id = Uuid::new_v4();

        assert_eq!(broker.request(nested_id), InputAnswer::Parked);
        assert_eq!(broker.pending(), Some(nested_id));

        // Growth that supplies a character releases the parked request.
        let released = broker.append("hi");
        assert_eq!(released, Some((nested_id, b'h')));
        assert!(broker.pending().is_none());

        // The next request consumes the rest without parking.
        assert_eq!(broker.request(Uuid::new_v4()), InputAnswer::Byte(b'i'));
    }

    #[test]
    fn append_without_pending_just_grows() {
        let mut broker = InputBroker::new();
        assert_eq!(broker.append("xyz"), None);
        assert_eq!(broker.buffer().text(), "xyz");
    }

    #[test]
    fn cursor_is_monotonic_and_exhaustion_is_idempotent() {
        let mut broker = InputBroker::new();
        broker.set_text("ab").unwrap();

        assert_eq!(broker.request(Uuid::new_v4()), InputAnswer::Byte(b'a'));
        assert_eq!(broker.request(Uuid::new_v4()), InputAnswer::Byte(b'b'));
        assert_eq!(broker.buffer().cursor(), Some(2));

        // Exhausted, non-blocking: same no-character outcome twice, cursor
        // parked past the end.
        assert_eq!(broker.request(Uuid::new_v4()), InputAnswer::Byte(0));
        assert_eq!(broker.request(Uuid::new_v4()), InputAnswer::Byte(0));
        assert_eq!(broker.buffer().cursor(), Some(2));
    }

    #[test]
    fn set_text_rejected_mid_consumption() {
        let mut broker = InputBroker::new();
        broker.set_text("a").unwrap();
        broker.request(Uuid::new_v4());

        assert!(broker.set_text("replaced").is_err());

        broker.reset_cursor();
        assert!(broker.set_text("replaced").is_ok());
    }
}
