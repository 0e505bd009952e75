//! Matching of inbound responses to outstanding requests.
//!
//! The server answers requests strictly in the order they were sent, so a
//! FIFO of handlers is all the correlation needed.

use crate::error::ClientError;
use boltwire_protocol::{Metadata, ProtocolError, Response, Value};
use std::collections::VecDeque;

/// Receives the outcome of one request.
///
/// Terminal callbacks consume the handler, so each one fires at most once.
pub trait ResponseHandler: Send {
    fn on_success(self: Box<Self>, metadata: Metadata);

    fn on_failure(self: Box<Self>, error: ClientError);

    fn on_record(&mut self, _fields: Vec<Value>) {}

    /// `cause` is the failure that put the server into its ignoring state.
    fn on_ignored(self: Box<Self>, cause: Option<ClientError>) {
        self.on_failure(ClientError::Ignored(cause.map(Box::new)));
    }
}

/// FIFO of handlers awaiting a response.
#[derive(Default)]
pub struct DispatchQueue {
    handlers: VecDeque<Box<dyn ResponseHandler>>,
    fatal: Option<ClientError>,
    current_failure: Option<ClientError>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a handler. After a fatal error it fails straight away.
    pub fn enqueue(&mut self, handler: Box<dyn ResponseHandler>) {
        match &self.fatal {
            Some(cause) => handler.on_failure(cause.clone()),
            None => self.handlers.push_back(handler),
        }
    }

    /// Routes one decoded response.
    pub fn dispatch(&mut self, response: Response) -> Result<(), ProtocolError> {
        match response {
            Response::Success(metadata) => self.handle_success(metadata),
            Response::Record(fields) => self.handle_record(fields),
            Response::Failure(failure) => {
                self.handle_failure(ClientError::server(failure.code, failure.message))
            }
            Response::Ignored => self.handle_ignored(),
        }
    }

    pub fn handle_success(&mut self, metadata: Metadata) -> Result<(), ProtocolError> {
        let handler = self.pop("SUCCESS")?;
        // Only a RESET can succeed once the server has started ignoring.
        self.current_failure = None;
        handler.on_success(metadata);
        Ok(())
    }

    pub fn handle_record(&mut self, fields: Vec<Value>) -> Result<(), ProtocolError> {
        let handler = self
            .handlers
            .front_mut()
            .ok_or(ProtocolError::UnexpectedResponse("RECORD"))?;
        handler.on_record(fields);
        Ok(())
    }

    pub fn handle_failure(&mut self, error: ClientError) -> Result<(), ProtocolError> {
        let handler = self.pop("FAILURE")?;
        self.current_failure = Some(error.clone());
        handler.on_failure(error);
        Ok(())
    }

    pub fn handle_ignored(&mut self) -> Result<(), ProtocolError> {
        let handler = self.pop("IGNORED")?;
        handler.on_ignored(self.current_failure.clone());
        Ok(())
    }

    /// Fails every queued handler with `cause`, oldest first, and refuses
    /// all later handlers with the same cause.
    pub fn handle_fatal(&mut self, cause: ClientError) {
        let cause = self.fatal.get_or_insert(cause).clone();
        while let Some(handler) = self.handlers.pop_front() {
            handler.on_failure(cause.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn fatal_error(&self) -> Option<&ClientError> {
        self.fatal.as_ref()
    }

    /// The server failure that later IGNORED responses refer to.
    pub fn current_failure(&self) -> Option<&ClientError> {
        self.current_failure.as_ref()
    }

    fn pop(&mut self, kind: &'static str) -> Result<Box<dyn ResponseHandler>, ProtocolError> {
        self.handlers
            .pop_front()
            .ok_or(ProtocolError::UnexpectedResponse(kind))
    }
}
