//! Progress reporting for conversion runs (made by FontLab https://www.fontlab.com/)
//!
//! Two hops, both bounded and both lossy:
//!
//! ```text
//! pool workers ──ProgressSender──▶ relay thread ──status lines──▶ subscribers
//! ```
//!
//! A slow or missing subscriber costs intermediate updates, never pipeline
//! throughput. The one exception is the last event of a batch, which both
//! hops work a little harder to deliver (see [`ProgressSender::progress`]).
//! The pool's atomic completed count stays the source of truth.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::Dispatch;

use crate::cancel::CancelToken;

/// How often the relay wakes up to look at the cancel token.
const RELAY_TICK: Duration = Duration::from_millis(50);
/// How long a worker keeps retrying the final event of a batch.
const FINAL_SEND_PATIENCE: Duration = Duration::from_secs(2);
const FINAL_SEND_RETRY: Duration = Duration::from_millis(5);

/// Which batch a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Producing `.woff2` files.
    #[serde(rename = "web-format")]
    WebFormat,
    /// Producing `.ttf` files.
    #[serde(rename = "desktop-format")]
    DesktopFormat,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::WebFormat => "web-format",
            Stage::DesktopFormat => "desktop-format",
        }
    }

    /// Name of the format the stage produces, as shown to users.
    pub fn target_name(self) -> &'static str {
        match self {
            Stage::WebFormat => "WOFF2",
            Stage::DesktopFormat => "TTF",
        }
    }
}

/// One completed job, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionProgress {
    pub total: usize,
    pub current: usize,
    pub current_font: String,
    pub stage: Stage,
}

impl ConversionProgress {
    /// `true` for the event that completes its batch.
    pub fn is_final(&self) -> bool {
        self.current >= self.total
    }

    /// Short human-readable status line.
    pub fn status_line(&self) -> String {
        format!(
            "{} conversion: {}/{} - Processing: {}",
            self.stage.target_name(),
            self.current,
            self.total,
            self.current_font
        )
    }
}

/// Anything travelling through the progress channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Progress(ConversionProgress),
    Status(String),
}

impl Notice {
    fn into_line(self) -> (String, bool) {
        match self {
            Notice::Progress(p) => {
                let last = p.is_final();
                (p.status_line(), last)
            }
            Notice::Status(msg) => (msg, false),
        }
    }
}

/// Non-blocking handle for pushing progress into a bounded channel.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: SyncSender<Notice>,
    cancel: CancelToken,
}

/// Bounded progress channel without a relay; handy for direct consumers.
pub fn channel(capacity: usize, cancel: CancelToken) -> (ProgressSender, Receiver<Notice>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (ProgressSender { tx, cancel }, rx)
}

impl ProgressSender {
    /// Send a progress event; returns whether it was accepted.
    ///
    /// Intermediate events are dropped when the channel is full. The final
    /// event of a batch is retried for a short while instead, giving up
    /// early if the receiver is gone or the run is cancelled.
    pub fn progress(&self, event: ConversionProgress) -> bool {
        let last = event.is_final();
        let sent = if last {
            self.send_patiently(Notice::Progress(event))
        } else {
            self.tx.try_send(Notice::Progress(event)).is_ok()
        };
        if !sent {
            tracing::debug!(last, "progress update dropped");
        }
        sent
    }

    /// Send a free-form status line, dropping it if the channel is full.
    pub fn status(&self, msg: impl Into<String>) -> bool {
        let msg = msg.into();
        match self.tx.try_send(Notice::Status(msg)) {
            Ok(()) => true,
            Err(TrySendError::Full(Notice::Status(msg))) => {
                tracing::debug!(status = %msg, "status update dropped");
                false
            }
            Err(_) => false,
        }
    }

    fn send_patiently(&self, mut notice: Notice) -> bool {
        let deadline = Instant::now() + FINAL_SEND_PATIENCE;
        loop {
            match self.tx.try_send(notice) {
                Ok(()) => return true,
                Err(TrySendError::Disconnected(_)) => return false,
                Err(TrySendError::Full(back)) => {
                    if self.cancel.is_cancelled() || Instant::now() >= deadline {
                        return false;
                    }
                    notice = back;
                    thread::sleep(FINAL_SEND_RETRY);
                }
            }
        }
    }
}

/// Owns the relay thread that turns progress events into status lines for
/// subscribers (the `/progress` event stream, a terminal, a test).
///
/// The relay is the only sender on the subscriber channel, so the channel is
/// closed exactly once: when the relay returns after [`shutdown`], after the
/// cancel token fires, or after every [`ProgressSender`] is gone.
///
/// [`shutdown`]: ProgressBroadcaster::shutdown
pub struct ProgressBroadcaster {
    sender: Option<ProgressSender>,
    lines: async_channel::Receiver<String>,
    relay: Option<JoinHandle<()>>,
}

impl ProgressBroadcaster {
    pub fn spawn(capacity: usize, cancel: CancelToken, dispatch: Dispatch) -> Self {
        let capacity = capacity.max(1);
        let (sender, events) = channel(capacity, cancel.clone());
        let (line_tx, lines) = async_channel::bounded(capacity);
        let spare = lines.clone();

        let relay = thread::Builder::new()
            .name("fontfill-progress".into())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    relay(events, line_tx, spare, cancel);
                })
            });

        let relay = match relay {
            Ok(handle) => Some(handle),
            Err(err) => {
                // Without a relay the senders see a closed channel and drop everything.
                tracing::error!(error = %err, "failed to start progress relay");
                None
            }
        };

        Self {
            sender: Some(sender),
            lines,
            relay,
        }
    }

    /// A sender feeding this broadcaster.
    pub fn sender(&self) -> Option<ProgressSender> {
        self.sender.clone()
    }

    /// Receiver of formatted status lines. Clones share one queue, so
    /// concurrent subscribers split the lines between them.
    pub fn subscribe(&self) -> async_channel::Receiver<String> {
        self.lines.clone()
    }

    /// Stop accepting events and wait for the relay to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.relay.take() {
            if handle.join().is_err() {
                tracing::error!("progress relay panicked");
            }
        }
    }
}

impl Drop for ProgressBroadcaster {
    fn drop(&mut self) {
        self.stop();
    }
}

fn relay(
    events: Receiver<Notice>,
    lines: async_channel::Sender<String>,
    spare: async_channel::Receiver<String>,
    cancel: CancelToken,
) {
    loop {
        if cancel.is_cancelled() {
            // flush what is already queued, then stop
            for notice in events.try_iter() {
                let (line, last) = notice.into_line();
                deliver(&lines, &spare, line, last);
            }
            tracing::debug!("progress relay cancelled");
            break;
        }
        match events.recv_timeout(RELAY_TICK) {
            Ok(notice) => {
                let (line, last) = notice.into_line();
                deliver(&lines, &spare, line, last);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    lines.close();
}

fn deliver(
    lines: &async_channel::Sender<String>,
    spare: &async_channel::Receiver<String>,
    line: String,
    last: bool,
) {
    match lines.try_send(line) {
        Ok(()) => {}
        Err(async_channel::TrySendError::Full(line)) if last => {
            // Make room by discarding the stalest line.
            let _ = spare.try_recv();
            if let Err(err) = lines.try_send(line) {
                tracing::info!(progress = %err.into_inner(), "progress update dropped");
            }
        }
        Err(async_channel::TrySendError::Full(line)) => {
            tracing::info!(progress = %line, "progress update dropped");
        }
        Err(async_channel::TrySendError::Closed(_)) => {}
    }
}
