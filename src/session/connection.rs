//! The per-connection state machine.

use super::error::{ProtocolViolation, SessionError, SessionResult};
use super::events::{LogEvent, Message};
use super::state::SessionState;
use super::{BoxedStream, SessionShared};
use crate::frame::{read_frame, write_frame, CloseCode, FrameError, OpCode};
use crate::frame::{MAX_CONTROL_PAYLOAD, MAX_HEADER_LEN};
use crate::handler::{Handler, HandlerContext};
use crate::handshake::{accept_upgrade, HandshakeError, Negotiated};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use tokio::io::{AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Level};
use uuid::Uuid;

type SessionReader = BufReader<ReadHalf<BoxedStream>>;
type SessionWriter = WriteHalf<BoxedStream>;

/// One accepted connection.
///
/// Owned by the server's registry as an `Arc<Session>`; handlers reach it
/// through their [`HandlerContext`] and may only send, ping, and close.
pub struct Session {
    id: Uuid,
    peer: Option<SocketAddr>,
    shared: SessionShared,
    cancel: CancellationToken,
    state: Mutex<SessionState>,
    pings_outstanding: AtomicUsize,
    detached: AtomicBool,
    started: AtomicBool,
    reader: AsyncMutex<Option<SessionReader>>,
    writer: AsyncMutex<Option<SessionWriter>>,
    negotiated: OnceLock<Negotiated>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Wrap an accepted stream.
    ///
    /// `cancel` should be a child of the server's token so that shutdown
    /// reaches every session.
    pub fn new(
        id: Uuid,
        peer: Option<SocketAddr>,
        stream: BoxedStream,
        shared: SessionShared,
        cancel: CancellationToken,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let capacity = shared.config.buffer_size + MAX_HEADER_LEN;

        Self {
            id,
            peer,
            shared,
            cancel,
            state: Mutex::new(SessionState::AwaitingHandshake),
            pings_outstanding: AtomicUsize::new(0),
            detached: AtomicBool::new(false),
            started: AtomicBool::new(false),
            reader: AsyncMutex::new(Some(BufReader::with_capacity(capacity, read_half))),
            writer: AsyncMutex::new(Some(write_half)),
            negotiated: OnceLock::new(),
        }
    }

    /// Unique session identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remote address, when the transport has one.
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the session is `Open`.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Whether an application ping is waiting for its pong.
    #[must_use]
    pub fn ping_outstanding(&self) -> bool {
        self.pings_outstanding.load(Ordering::Acquire) > 0
    }

    /// Handshake outcome, once the session is open.
    #[must_use]
    pub fn negotiated(&self) -> Option<&Negotiated> {
        self.negotiated.get()
    }

    /// Token that aborts this session's reads and writes.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn advance(&self, to: SessionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if to > *state {
            trace!(session = %self.id, from = %*state, to = %to, "State transition");
            *state = to;
            true
        } else {
            false
        }
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Settle one outstanding ping. False if none was outstanding.
    fn settle_ping(&self) -> bool {
        self.pings_outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Drive the session to completion: handshake, read loop, teardown.
    ///
    /// Every outcome ends in `Closed` with the session removed from the
    /// server. Errors have already been reported to `handler` through
    /// [`Handler::on_error`] by the time they are returned; a cancelled
    /// session or a peer that hangs up after the close handshake returns
    /// `Ok`.
    ///
    /// # Errors
    ///
    /// The [`SessionError`] that ended the session.
    pub async fn run(&self, handler: &mut dyn Handler, ctx: &HandlerContext) -> SessionResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SessionError::AlreadyStarted);
        }

        let reader = self.reader.lock().await.take();
        let result = match reader {
            Some(mut reader) => self.drive(&mut reader, handler, ctx).await,
            None => Err(SessionError::NotOpen(self.state())),
        };

        let result = match result {
            Err(SessionError::Cancelled) => Ok(()),
            Err(SessionError::Frame(FrameError::ConnectionTimedOut))
                if self.state() == SessionState::Closing =>
            {
                Ok(())
            },
            other => other,
        };

        if let Err(e) = &result {
            self.fail(e, handler, ctx).await;
        }

        self.advance(SessionState::Closed);
        ctx.server().disconnect(self).await;
        result
    }

    async fn drive(
        &self,
        reader: &mut SessionReader,
        handler: &mut dyn Handler,
        ctx: &HandlerContext,
    ) -> SessionResult<()> {
        let negotiated = self.handshake(reader).await?;
        info!(
            session = %self.id,
            resource = negotiated.resource(),
            protocol = ?negotiated.protocol(),
            "Handshake completed"
        );
        let message = format!("upgraded {}", negotiated.url());
        // run() guards against a second handshake
        let _ = self.negotiated.set(negotiated);

        self.advance(SessionState::Open);
        self.shared.stats.record_upgrade(true);
        self.notify_log(handler, ctx, Level::INFO, message).await;

        handler.on_open(ctx).await.map_err(SessionError::Handler)?;
        self.listen(reader, handler, ctx).await
    }

    async fn handshake(&self, reader: &mut SessionReader) -> SessionResult<Negotiated> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or(SessionError::NotOpen(SessionState::Closed))?;

        let config = &self.shared.config;
        let upgrade = tokio::time::timeout(
            config.upgrade_timeout,
            accept_upgrade(reader, writer, &self.shared.parser, config),
        );

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
            outcome = upgrade => outcome.unwrap_or_else(|_| Err(HandshakeError::TimedOut)),
        };

        outcome.map_err(|e| {
            self.shared.stats.record_upgrade(false);
            SessionError::Handshake(e)
        })
    }

    async fn listen(
        &self,
        reader: &mut SessionReader,
        handler: &mut dyn Handler,
        ctx: &HandlerContext,
    ) -> SessionResult<()> {
        let config = &self.shared.config;
        let mut frame_buf = self.shared.pool.rent(config.buffer_size + MAX_HEADER_LEN);
        let mut message = self.shared.pool.rent(config.message_capacity());
        let mut cursor = 0usize;
        let mut frames = 0usize;
        let mut message_opcode: Option<OpCode> = None;

        while self.state() != SessionState::Closed {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                frame = read_frame(reader, &mut frame_buf[..]) => frame?,
            };

            trace!(
                session = %self.id,
                opcode = %frame.opcode,
                fin = frame.fin,
                len = frame.len(),
                "Frame received"
            );

            if !frame.masked {
                return Err(ProtocolViolation::UnmaskedFrame.into());
            }
            if frame.has_reserved_bits() {
                return Err(ProtocolViolation::ReservedBits.into());
            }
            if let OpCode::Reserved(code) = frame.opcode {
                return Err(ProtocolViolation::ReservedOpcode(code).into());
            }

            if frame.opcode.is_control() {
                if !frame.fin {
                    return Err(ProtocolViolation::FragmentedControlFrame.into());
                }
                if frame.len() > MAX_CONTROL_PAYLOAD {
                    return Err(SessionError::ControlFrameTooLarge(frame.len()));
                }
                let control = Message {
                    opcode: frame.opcode,
                    close_status: frame.close_status,
                    payload: frame.payload,
                };
                self.dispatch(handler, ctx, control).await?;
                continue;
            }

            // Once our Close is out, data is read only to reach the peer's Close.
            if self.state() == SessionState::Closing {
                trace!(session = %self.id, opcode = %frame.opcode, "Data frame dropped while closing");
                continue;
            }

            let opcode = match (frame.opcode, message_opcode) {
                (OpCode::Continuation, Some(opcode)) => opcode,
                (OpCode::Continuation, None) => {
                    return Err(ProtocolViolation::UnexpectedContinuation.into());
                },
                (opcode, None) => opcode,
                (_, Some(_)) => return Err(ProtocolViolation::InterleavedMessage.into()),
            };

            frames += 1;
            if frames > config.max_frame_count {
                return Err(SessionError::TooManyFrames {
                    limit: config.max_frame_count,
                });
            }

            let end = cursor + frame.len();
            if end > message.len() {
                return Err(SessionError::MessageTooLarge {
                    capacity: message.len(),
                });
            }
            message[cursor..end].copy_from_slice(frame.payload);
            cursor = end;

            if frame.fin {
                let complete = Message::new(opcode, &message[..cursor]);
                self.dispatch(handler, ctx, complete).await?;
                cursor = 0;
                frames = 0;
                message_opcode = None;
            } else {
                message_opcode = Some(opcode);
            }
        }

        Ok(())
    }

    async fn dispatch(
        &self,
        handler: &mut dyn Handler,
        ctx: &HandlerContext,
        message: Message<'_>,
    ) -> SessionResult<()> {
        self.shared
            .stats
            .record_message_received(message.opcode, message.payload.len());

        if !self.is_detached() {
            handler
                .before_dispatch(ctx, &message)
                .await
                .map_err(SessionError::Handler)?;
        }

        let hook = match message.opcode {
            OpCode::Text => {
                let text =
                    std::str::from_utf8(message.payload).map_err(|_| SessionError::InvalidUtf8)?;
                handler.on_text_message(ctx, text).await
            },
            OpCode::Binary => handler.on_binary_message(ctx, message.payload).await,
            OpCode::Ping => {
                self.send(OpCode::Pong, Some(message.payload)).await?;
                handler.on_ping_frame(ctx, message.payload).await
            },
            OpCode::Pong => {
                if !self.settle_ping() {
                    return self.reject_pong(handler, ctx).await;
                }
                handler.on_pong_frame(ctx, message.payload).await
            },
            OpCode::Close => {
                if let Some(status) = message.close_status {
                    if self.is_open() && !CloseCode::from(status).is_valid() {
                        return Err(ProtocolViolation::InvalidCloseStatus(status).into());
                    }
                }
                self.on_close(message.close_status).await?;
                if self.is_detached() {
                    return Ok(());
                }
                handler.on_close_frame(ctx, message.close_status).await
            },
            OpCode::Continuation | OpCode::Reserved(_) => Ok(()),
        };
        hook.map_err(SessionError::Handler)?;

        if !self.is_detached() {
            handler
                .after_dispatch(ctx, &message)
                .await
                .map_err(SessionError::Handler)?;
        }
        Ok(())
    }

    async fn reject_pong(&self, handler: &mut dyn Handler, ctx: &HandlerContext) -> SessionResult<()> {
        self.shared.stats.record_protocol_error();
        warn!(session = %self.id, "Unsolicited pong");

        let error = SessionError::Protocol(ProtocolViolation::UnsolicitedPong);
        self.notify_error(handler, ctx, &error).await;

        // The peer's answering Close completes the close handshake.
        if self.is_open() {
            self.close(CloseCode::Protocol).await?;
        }
        Ok(())
    }

    async fn on_close(&self, status: Option<u16>) -> SessionResult<()> {
        self.shared.stats.record_close();

        if self.state() == SessionState::Closing {
            self.detached.store(true, Ordering::Release);
            self.advance(SessionState::Closed);
            debug!(session = %self.id, ?status, "Close handshake completed");
        } else {
            debug!(session = %self.id, ?status, "Peer initiated close");
            self.send_close(status.unwrap_or(0)).await?;
            self.advance(SessionState::Closing);
        }
        Ok(())
    }

    async fn fail(&self, error: &SessionError, handler: &mut dyn Handler, ctx: &HandlerContext) {
        if error.is_protocol_error() {
            self.shared.stats.record_protocol_error();
            warn!(session = %self.id, error = %error, "Protocol error");
        } else {
            debug!(session = %self.id, error = %error, "Session ended with error");
        }

        self.notify_error(handler, ctx, error).await;

        if let Some(code) = error.close_code() {
            if self.is_open() {
                if let Err(e) = self.send_close(code.into()).await {
                    debug!(session = %self.id, error = %e, "Failed to send close frame");
                }
                self.advance(SessionState::Closing);
            }
        }
    }

    async fn notify_log(
        &self,
        handler: &mut dyn Handler,
        ctx: &HandlerContext,
        level: Level,
        message: impl Into<String>,
    ) {
        if !self.is_detached() {
            let event = LogEvent::new(self.id, level, message);
            handler.on_log(ctx, &event).await;
        }
    }

    async fn notify_error(&self, handler: &mut dyn Handler, ctx: &HandlerContext, error: &SessionError) {
        if !self.is_detached() {
            handler.on_error(ctx, error).await;
        }
    }

    /// Send a message.
    ///
    /// Payloads larger than the configured buffer size are split into a
    /// first frame carrying `opcode` followed by continuation frames; fin is
    /// set on the last one only.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotOpen`] for data frames outside `Open`, or any frame once `Closed`
    /// - [`SessionError::ControlFrameTooLarge`] for control payloads above 125 bytes
    /// - [`SessionError::Cancelled`] if the session is torn down mid-write
    /// - [`SessionError::Io`] on stream failure
    pub async fn send(&self, opcode: OpCode, payload: Option<&[u8]>) -> SessionResult<()> {
        let state = self.state();
        if !state.can_send(opcode.is_control()) {
            return Err(SessionError::NotOpen(state));
        }

        let payload = payload.unwrap_or(&[]);
        if opcode.is_control() && payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(SessionError::ControlFrameTooLarge(payload.len()));
        }

        tokio::select! {
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
            result = self.write_message(opcode, payload) => result,
        }
    }

    async fn write_message(&self, opcode: OpCode, payload: &[u8]) -> SessionResult<()> {
        let chunk_size = self.shared.config.buffer_size.max(1);
        let mut buf = self.shared.pool.rent(chunk_size + MAX_HEADER_LEN);

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or(SessionError::NotOpen(SessionState::Closed))?;

        let mut chunks = payload.chunks(chunk_size).peekable();
        let mut frame_opcode = opcode;
        loop {
            let chunk = chunks.next().unwrap_or_default();
            let fin = chunks.peek().is_none();
            let len = write_frame(&mut buf[..], fin, frame_opcode, None, Some(chunk))?;
            writer.write_all(&buf[..len]).await?;
            if fin {
                break;
            }
            frame_opcode = OpCode::Continuation;
        }
        writer.flush().await?;

        self.shared.stats.record_message_sent(payload.len());
        trace!(session = %self.id, %opcode, len = payload.len(), "Message sent");
        Ok(())
    }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// See [`Session::send`].
    pub async fn send_text(&self, text: &str) -> SessionResult<()> {
        self.send(OpCode::Text, Some(text.as_bytes())).await
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// See [`Session::send`].
    pub async fn send_binary(&self, data: &[u8]) -> SessionResult<()> {
        self.send(OpCode::Binary, Some(data)).await
    }

    /// Send a Close frame whose payload is `status` in network order.
    ///
    /// Does not change state; see [`Session::close`].
    ///
    /// # Errors
    ///
    /// See [`Session::send`].
    pub async fn send_close(&self, status: u16) -> SessionResult<()> {
        self.send(OpCode::Close, Some(&status.to_be_bytes())).await
    }

    /// Start the close handshake: send Close and move to `Closing`.
    ///
    /// The session reaches `Closed` when the peer answers.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotOpen`] unless the session is `Open`, or any send error.
    pub async fn close(&self, code: CloseCode) -> SessionResult<()> {
        let state = self.state();
        if state != SessionState::Open {
            return Err(SessionError::NotOpen(state));
        }
        self.send_close(code.into()).await?;
        self.advance(SessionState::Closing);
        Ok(())
    }

    /// Send a Ping and expect a Pong back.
    ///
    /// Each ping that reaches the wire allows one Pong from the peer. A ping
    /// that fails to send allows none.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotOpen`] unless the session is `Open`
    /// - [`SessionError::ControlFrameTooLarge`] for payloads above 125 bytes
    /// - any error from [`Session::send`]
    pub async fn ping(&self, payload: Option<&[u8]>) -> SessionResult<()> {
        let state = self.state();
        if state != SessionState::Open {
            return Err(SessionError::NotOpen(state));
        }
        let payload = payload.map_or_else(|| self.shared.keys.ping_payload(4), <[u8]>::to_vec);
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(SessionError::ControlFrameTooLarge(payload.len()));
        }

        self.pings_outstanding.fetch_add(1, Ordering::AcqRel);
        let result = self.send(OpCode::Ping, Some(&payload)).await;
        if result.is_err() {
            self.settle_ping();
        }
        result
    }

    /// Abort the session and release its stream.
    ///
    /// Cancels in-flight reads and writes, detaches the handler, and shuts the
    /// write side down. Safe to call more than once and from any task.
    pub async fn dispose(&self) {
        self.cancel.cancel();
        self.detached.store(true, Ordering::Release);
        self.advance(SessionState::Closed);

        drop(self.reader.lock().await.take());
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                trace!(session = %self.id, error = %e, "Stream shutdown failed");
            }
        }
    }
}
