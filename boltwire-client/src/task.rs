//! The IO task owning a connection's socket.
//!
//! Every connection runs exactly one task. It is the only place the stream,
//! the dispatch queue and the decoder are touched, so none of them need
//! locking. Handles talk to it through an unbounded command channel.

use crate::address::BoltAddress;
use crate::connection::ConnectionConfig;
use crate::dispatch::{DispatchQueue, ResponseHandler};
use crate::error::ClientError;
use crate::handshake::TERMINATED_MESSAGE;
use crate::stream::BoltStream;
use boltwire_protocol::{Decoder, Encoder, Request};
use bytes::BytesMut;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;

/// A request and the handler awaiting its response. GOODBYE has none.
pub(crate) type Outbound = (Request, Option<Box<dyn ResponseHandler>>);

pub(crate) enum Command {
    /// Encode the requests; send everything buffered when `flush` is set.
    Submit { messages: Vec<Outbound>, flush: bool },
    SetReadTimeout(Option<Duration>),
    /// Say GOODBYE and close the transport.
    Close { done: oneshot::Sender<Result<(), ClientError>> },
}

impl Command {
    /// Fails a command that never reached the task.
    pub(crate) fn reject(self, cause: ClientError) {
        match self {
            Command::Submit { messages, .. } => {
                for (_, handler) in messages {
                    if let Some(handler) = handler {
                        handler.on_failure(cause.clone());
                    }
                }
            }
            Command::SetReadTimeout(_) => {}
            Command::Close { done } => {
                let _ = done.send(Ok(()));
            }
        }
    }
}

pub(crate) struct IoTask {
    stream: BoltStream,
    commands: mpsc::UnboundedReceiver<Command>,
    queue: DispatchQueue,
    decoder: Decoder,
    out: BytesMut,
    read_buf: Vec<u8>,
    read_timeout: Option<Duration>,
    timer: Option<Pin<Box<Sleep>>>,
    /// Bounds the GOODBYE write and shutdown on close.
    close_timeout: Duration,
    open: Arc<AtomicBool>,
    address: BoltAddress,
}

impl IoTask {
    pub(crate) fn new(
        stream: BoltStream,
        commands: mpsc::UnboundedReceiver<Command>,
        config: &ConnectionConfig,
        open: Arc<AtomicBool>,
        address: BoltAddress,
    ) -> Self {
        Self {
            stream,
            commands,
            queue: DispatchQueue::new(),
            decoder: Decoder::with_max_message_size(config.max_message_size),
            out: BytesMut::with_capacity(8 * 1024),
            read_buf: vec![0u8; config.read_buffer_size],
            read_timeout: config.read_timeout,
            timer: None,
            close_timeout: config.connect_timeout,
            open,
            address,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let flow = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::debug!("[{}] All handles dropped, closing", self.address);
                        self.close().await;
                        return;
                    }
                },
                read = self.stream.read(&mut self.read_buf) => match read {
                    Ok(0) => self.fail(ClientError::terminated(TERMINATED_MESSAGE, None)).await,
                    Ok(n) => {
                        self.timer = None;
                        self.decoder.extend(&self.read_buf[..n]);
                        match self.process_inbound() {
                            Ok(()) => ControlFlow::Continue(()),
                            Err(e) => self.fail(e).await,
                        }
                    }
                    Err(e) => {
                        self.fail(ClientError::terminated(
                            "Connection to the database failed",
                            Some(e),
                        ))
                        .await
                    }
                },
                () = expire(&mut self.timer) => {
                    let timeout = self.read_timeout.unwrap_or_default();
                    self.fail(ClientError::terminated(
                        format!(
                            "Connection to the database terminated. Read timed out after {} ms",
                            timeout.as_millis()
                        ),
                        None,
                    ))
                    .await
                }
            };
            if flow.is_break() {
                break;
            }
        }

        self.reject_remaining().await;
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Submit { messages, flush } => {
                for (request, handler) in messages {
                    tracing::trace!("[{}] C: {}", self.address, request);
                    if let Err(e) = Encoder::encode_request(&request, &mut self.out) {
                        // The buffer is untouched on failure; only this request is lost.
                        if let Some(handler) = handler {
                            handler.on_failure(e.into());
                        }
                        continue;
                    }
                    if let Some(handler) = handler {
                        self.queue.enqueue(handler);
                    }
                }
                if flush {
                    if let Err(e) = self.flush().await {
                        return self.fail(e).await;
                    }
                }
                ControlFlow::Continue(())
            }
            Command::SetReadTimeout(timeout) => {
                self.read_timeout = timeout;
                if self.timer.is_some() {
                    self.arm_timer();
                }
                ControlFlow::Continue(())
            }
            Command::Close { done } => {
                self.close().await;
                let _ = done.send(Ok(()));
                ControlFlow::Break(())
            }
        }
    }

    fn process_inbound(&mut self) -> Result<(), ClientError> {
        while let Some(response) = self.decoder.decode_response()? {
            tracing::trace!("[{}] S: {}", self.address, response.name());
            self.queue.dispatch(response)?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ClientError> {
        if !self.out.is_empty() {
            self.stream
                .write_all(&self.out)
                .await
                .map_err(|e| ClientError::terminated("Connection to the database failed", Some(e)))?;
            self.stream
                .flush()
                .await
                .map_err(|e| ClientError::terminated("Connection to the database failed", Some(e)))?;
            self.out.clear();
        }
        if !self.queue.is_empty() {
            self.arm_timer();
        }
        Ok(())
    }

    fn arm_timer(&mut self) {
        self.timer = self
            .read_timeout
            .map(|timeout| Box::pin(tokio::time::sleep(timeout)));
    }

    /// Fails every outstanding handler and closes the transport.
    async fn fail(&mut self, cause: ClientError) -> ControlFlow<()> {
        tracing::warn!("[{}] Closing connection: {}", self.address, cause);
        self.open.store(false, Ordering::SeqCst);
        self.timer = None;
        self.queue.handle_fatal(cause);
        let _ = self.stream.shutdown().await;
        ControlFlow::Break(())
    }

    /// Sends GOODBYE without waiting for a reply and closes the transport.
    /// A peer that stops reading cannot hold this up past `close_timeout`.
    async fn close(&mut self) {
        tracing::debug!("[{}] Closing connection", self.address);
        self.open.store(false, Ordering::SeqCst);
        self.timer = None;
        self.queue
            .handle_fatal(ClientError::terminated("Connection closed by the client", None));

        let goodbye = Encoder::encode_request(&Request::Goodbye, &mut self.out);
        let (stream, out) = (&mut self.stream, &self.out);
        let farewell = async {
            if goodbye.is_ok() {
                let _ = stream.write_all(out).await;
                let _ = stream.flush().await;
            }
            let _ = stream.shutdown().await;
        };
        if tokio::time::timeout(self.close_timeout, farewell).await.is_err() {
            tracing::warn!(
                "[{}] Peer not reading, dropped GOODBYE after {} ms",
                self.address,
                self.close_timeout.as_millis()
            );
        }
        self.out.clear();
    }

    /// After the transport is gone, answers every further command with the
    /// recorded cause until the last handle is dropped.
    async fn reject_remaining(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Submit { messages, .. } => {
                    for (_, handler) in messages {
                        if let Some(handler) = handler {
                            self.queue.enqueue(handler);
                        }
                    }
                }
                Command::SetReadTimeout(_) => {}
                Command::Close { done } => {
                    let _ = done.send(Ok(()));
                }
            }
        }
    }
}

async fn expire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
