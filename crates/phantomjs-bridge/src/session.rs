//! Transport session: owns the PhantomJS process and multiplexes its stdio.
//!
//! Flow:
//! 1. Spawn the process with piped stdio
//! 2. Run one event loop task that owns all protocol state
//! 3. Route incoming lines: responses settle pending commands, events hit
//!    the registry, acks clear the heartbeat, the rest is logged
//! 4. On process exit or kill: fail every pending command exactly once
//!
//! All writes go through the loop's outbound queue, so lines never
//! interleave and a stdin pipe that stops draining cannot block the kill
//! path: a full pipe parks only the write arm of the loop's `select!`.

use std::collections::{HashMap, VecDeque};
use std::future::{Future, poll_fn};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures::{Sink, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::config::SessionConfig;
use crate::error::Error;
use crate::events::{EventCallback, EventRegistry};
use crate::liveness::Heartbeat;
use crate::log::LogSink;
use crate::process::{self, PhantomProcess};
use crate::wire::codec::{Frame, LineCodec};
use crate::wire::protocol::{self, CallArg, Envelope, EventDescriptor};

/// Identifier of the polite shutdown command.
const EXIT_COMMAND_ID: &str = "exit";

/// Default reason handed to [`Session::kill`].
const KILLED_MESSAGE: &str = "Phantom process was killed";

/// Sweep reason when the process vanished without a usable exit code.
const PREMATURE_EXIT_MESSAGE: &str = "Phantom exited prematurely";

type ReplySender = oneshot::Sender<Result<Value, Error>>;

/// A submitted command: pre-rendered line plus the settlement channel.
struct Outbound {
    id: String,
    line: String,
    reply: ReplySender,
}

enum SessionMessage {
    /// Register the command in the pending table, then write its line.
    Command(Outbound),
    /// Stop the heartbeat and pass the shutdown command through.
    Exit { command: Outbound },
    /// Fail everything with `reason` and terminate the process.
    Kill {
        reason: String,
        done: oneshot::Sender<()>,
    },
}

/// The eventual outcome of one submitted command.
///
/// Settles exactly once: with the remote's response, the remote's error, or
/// the session's termination reason.
#[derive(Debug)]
#[must_use = "a pending call reports its outcome only when awaited"]
pub struct PendingCall {
    rx: oneshot::Receiver<Result<Value, Error>>,
}

impl Future for PendingCall {
    type Output = Result<Value, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|settled| match settled {
            Ok(result) => result,
            Err(_) => Err(Error::ChannelClosed),
        })
    }
}

/// Handle to a running session. Clones share one process and one event loop;
/// when the last clone is dropped the process is terminated.
#[derive(Clone)]
pub struct Session {
    tx: mpsc::Sender<SessionMessage>,
    events: EventRegistry,
}

impl Session {
    /// Spawn PhantomJS per `config` and start the protocol loop.
    pub async fn launch(config: SessionConfig) -> Result<Session, Error> {
        let mut child = process::spawn(&config)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Launch("stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Launch("stdout was not captured".to_string()))?;
        let stderr = child.stderr.take();
        Ok(Self::from_parts(stdout, stdin, stderr, child, &config))
    }

    /// Run the protocol over caller-supplied streams.
    ///
    /// [`Session::launch`] uses this with the child's pipes; tests drive a
    /// session through in-memory pipes and a scripted process handle.
    pub fn from_parts<R, W, E, P>(
        stdout: R,
        stdin: W,
        stderr: Option<E>,
        process: P,
        config: &SessionConfig,
    ) -> Session
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
        P: PhantomProcess + 'static,
    {
        let (tx, rx) = mpsc::channel(config.message_capacity);
        let events = EventRegistry::new();

        if let Some(stderr) = stderr {
            forward_stderr(stderr, Arc::clone(&config.log_sink));
        }

        let event_loop = EventLoop {
            reader: FramedRead::new(stdout, LineCodec::new()),
            writer: FramedWrite::new(stdin, LineCodec::new()),
            outbound: VecDeque::new(),
            process,
            rx,
            pending: HashMap::new(),
            events: events.clone(),
            heartbeat: Heartbeat::new(),
            heartbeat_timer: time::interval_at(
                Instant::now() + config.heartbeat_period,
                config.heartbeat_period,
            ),
            heartbeat_stopped: !config.heartbeat_enabled,
            log: Arc::clone(&config.log_sink),
        };
        tokio::spawn(event_loop.run());

        Session { tx, events }
    }

    /// Submit a pre-built envelope.
    ///
    /// Serialization happens here, synchronously: an unshippable argument
    /// fails the call before anything is written or registered.
    pub async fn execute_command(&self, envelope: Envelope) -> Result<PendingCall, Error> {
        let line = envelope.to_line()?;
        tracing::debug!(
            id = %envelope.id,
            target = %envelope.target,
            method = %envelope.method,
            "Sending command"
        );
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionMessage::Command(Outbound {
                id: envelope.id,
                line,
                reply: reply_tx,
            }))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        Ok(PendingCall { rx: reply_rx })
    }

    /// Call `method` on the remote object named `target`.
    pub async fn execute(
        &self,
        target: impl Into<String>,
        method: impl Into<String>,
        args: Vec<CallArg>,
    ) -> Result<PendingCall, Error> {
        self.execute_command(Envelope::new(target, method, args)).await
    }

    /// Subscribe `callback` to `event_type` on `target` and tell the remote
    /// to start forwarding that event. `extra_args` are appended after the
    /// event's own arguments on every dispatch.
    ///
    /// The returned handle settles when the remote acknowledges the
    /// subscription; the local listener is active immediately.
    pub async fn on(
        &self,
        event_type: &str,
        target: &str,
        callback: EventCallback,
        extra_args: Vec<Value>,
    ) -> Result<PendingCall, Error> {
        self.events
            .emitter_for_target(target)
            .on(event_type, callback, extra_args);
        let descriptor = EventDescriptor::local(event_type);
        self.execute(target, "addEvent", vec![descriptor.into()]).await
    }

    /// Subscribe with a callback that runs inside PhantomJS itself, with
    /// `args` passed to it after the event's own arguments.
    pub async fn on_remote(
        &self,
        event_type: &str,
        target: &str,
        callback: protocol::JsFunction,
        args: Vec<Value>,
    ) -> Result<PendingCall, Error> {
        let descriptor = EventDescriptor::remote(event_type, callback, args);
        self.execute(target, "addEvent", vec![descriptor.into()]).await
    }

    /// Drop every local listener for `event_type` on `target` and tell the
    /// remote to stop forwarding it.
    pub async fn off(&self, event_type: &str, target: &str) -> Result<PendingCall, Error> {
        self.events.emitter_for_target(target).off(event_type);
        let descriptor = EventDescriptor::local(event_type);
        self.execute(target, "removeEvent", vec![descriptor.into()]).await
    }

    /// The per-target emitter registry backing [`Session::on`].
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Ask PhantomJS to shut itself down.
    ///
    /// Stops the heartbeat and sends `phantom.invokeMethod("exit")`, without
    /// waiting for the process to die; outstanding commands settle when the
    /// exit is observed.
    pub async fn exit(&self) -> Result<(), Error> {
        let envelope = Envelope::with_id(
            EXIT_COMMAND_ID,
            "phantom",
            "invokeMethod",
            vec![CallArg::from("exit")],
        );
        let line = envelope.to_line()?;
        // The exit command gets a pending entry like any other, so a reply
        // (or the exit sweep) can consume it; nobody awaits the handle.
        let (reply, _) = oneshot::channel();
        self.tx
            .send(SessionMessage::Exit {
                command: Outbound {
                    id: envelope.id,
                    line,
                    reply,
                },
            })
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Force-terminate with the default reason.
    pub async fn kill(&self) {
        self.kill_with(KILLED_MESSAGE).await;
    }

    /// Force-terminate: fail every pending command with `reason`, then kill
    /// the process. Completed by the time this returns; a second call (or a
    /// call on an already-dead session) is a no-op.
    pub async fn kill_with(&self, reason: impl Into<String>) {
        let (done_tx, done_rx) = oneshot::channel();
        let message = SessionMessage::Kill {
            reason: reason.into(),
            done: done_tx,
        };
        if self.tx.send(message).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

fn forward_stderr<E>(stderr: E, log: Arc<dyn LogSink>)
where
    E: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = FramedRead::new(stderr, LinesCodec::new());
        while let Some(next) = lines.next().await {
            match next {
                Ok(line) => log.error(&line),
                Err(e) => {
                    tracing::debug!(error = %e, "stderr stream failed");
                    break;
                }
            }
        }
    });
}

fn write_failure(err: io::Error) -> String {
    format!("Error writing to phantomjs stdin: {err}")
}

struct EventLoop<R, W, P> {
    reader: FramedRead<R, LineCodec>,
    writer: FramedWrite<W, LineCodec>,
    /// Lines waiting for the sink, in submission order.
    outbound: VecDeque<String>,
    process: P,
    rx: mpsc::Receiver<SessionMessage>,
    pending: HashMap<String, ReplySender>,
    events: EventRegistry,
    heartbeat: Heartbeat,
    heartbeat_timer: Interval,
    heartbeat_stopped: bool,
    log: Arc<dyn LogSink>,
}

impl<R, W, P> EventLoop<R, W, P>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    P: PhantomProcess,
{
    async fn run(mut self) {
        let reason = loop {
            let want_write =
                !self.outbound.is_empty() || !self.writer.write_buffer().is_empty();
            let writer = &mut self.writer;
            let outbound = &mut self.outbound;
            tokio::select! {
                biased;

                frame = self.reader.next() => match frame {
                    Some(Ok(frame)) => self.handle_frame(frame),
                    Some(Err(e)) => {
                        break self.terminate(format!("Error reading from phantomjs stdout: {e}"));
                    }
                    None => break self.reap().await,
                },

                result = poll_fn(|cx| Self::poll_write(writer, outbound, cx)), if want_write => {
                    if let Err(e) = result {
                        break self.terminate(write_failure(e));
                    }
                }

                message = self.rx.recv() => match message {
                    Some(SessionMessage::Command(command)) => self.enqueue(command),
                    Some(SessionMessage::Exit { command }) => {
                        tracing::debug!("Stopping heartbeat, asking phantom to exit");
                        self.heartbeat_stopped = true;
                        self.enqueue(command);
                    }
                    Some(SessionMessage::Kill { reason, done }) => {
                        let reason = self.terminate(reason);
                        let _ = done.send(());
                        break reason;
                    }
                    None => {
                        tracing::debug!("All session handles dropped, terminating phantomjs");
                        break self.terminate(KILLED_MESSAGE.to_string());
                    }
                },

                _ = self.heartbeat_timer.tick(), if !self.heartbeat_stopped => {
                    if self.heartbeat.should_emit(self.pending.len()) {
                        self.heartbeat.mark_emitted();
                        self.outbound.push_back(protocol::HEARTBEAT.to_string());
                    }
                }
            }
        };
        tracing::debug!(%reason, "Session event loop exiting");
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::HeartbeatAck => self.heartbeat.acknowledge(),
            Frame::Response(response) => {
                tracing::debug!(id = %response.id, "Response received");
                match self.pending.remove(&response.id) {
                    Some(reply) => {
                        let result = match response.error {
                            None => Ok(response.response.unwrap_or(Value::Null)),
                            Some(message) => Err(Error::RemoteFailure(message)),
                        };
                        // The caller may have dropped its handle; fine.
                        let _ = reply.send(result);
                    }
                    None => {
                        self.log
                            .error(&format!("command not found for command.id: {}", response.id));
                    }
                }
            }
            Frame::Event(event) => {
                // Lookup only: events for targets nobody subscribed to drop.
                if let Some(emitter) = self.events.lookup(&event.target) {
                    emitter.emit(&event.event_type, &event.args);
                }
            }
            Frame::Log(line) => self.log.info(&line),
        }
    }

    /// Register the command and queue its line for the writer. A registered
    /// entry is settled by a response or by a sweep, never both.
    fn enqueue(&mut self, command: Outbound) {
        let Outbound { id, line, reply } = command;
        if self.pending.insert(id.clone(), reply).is_some() {
            tracing::error!(%id, "Command id reused while still pending, dropping the older handle");
        }
        self.outbound.push_back(line);
    }

    /// Feed queued lines to the sink and flush it. `Pending` parks only the
    /// write arm; frames and control messages keep being serviced, and the
    /// sink state survives the cancelled poll untouched.
    fn poll_write(
        writer: &mut FramedWrite<W, LineCodec>,
        outbound: &mut VecDeque<String>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        while !outbound.is_empty() {
            ready!(Pin::new(&mut *writer).poll_ready(cx))?;
            if let Some(line) = outbound.pop_front() {
                Pin::new(&mut *writer).start_send(line)?;
            }
        }
        Pin::new(writer).poll_flush(cx)
    }

    /// Fail everything, close the intake, and signal the process to die.
    /// Returns the reason so `run` can log it on the way out.
    fn terminate(&mut self, reason: String) -> String {
        self.rx.close();
        self.heartbeat_stopped = true;
        self.sweep(&reason);
        if let Err(e) = self.process.start_kill() {
            tracing::debug!(error = %e, "Kill signal failed, process likely already gone");
        }
        reason
    }

    /// The process closed its stdout: collect the exit status and fail all
    /// pending work with a message naming it. No kill; it already exited.
    async fn reap(&mut self) -> String {
        self.rx.close();
        self.heartbeat_stopped = true;
        let reason = match self.process.wait().await {
            Ok(Some(code)) => format!("Phantom process stopped with exit code {code}"),
            Ok(None) => PREMATURE_EXIT_MESSAGE.to_string(),
            Err(e) => {
                tracing::debug!(error = %e, "Could not collect phantomjs exit status");
                PREMATURE_EXIT_MESSAGE.to_string()
            }
        };
        tracing::debug!(%reason, "Phantom process exited");
        self.sweep(&reason);
        reason
    }

    /// Fail every pending entry with `reason`, exactly once each. Running
    /// with an empty table is a no-op.
    fn sweep(&mut self, reason: &str) {
        if self.pending.is_empty() {
            return;
        }
        tracing::debug!(count = self.pending.len(), %reason, "Failing all pending commands");
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(Error::Terminated(reason.to_string())));
        }
    }
}
