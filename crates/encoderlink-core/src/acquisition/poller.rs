//! Background poller
//!
//! A tokio task checks the channel for waiting bytes, reads at most what is
//! waiting, decodes whole records and appends them to the store. When nothing
//! is waiting it sleeps for the poll interval. Commands are written through
//! the same channel from the caller's side.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AcquisitionSummary, EndReason, SampleStore};
use crate::config::LinkConfig;
use crate::protocol::{is_closed, Command, CommunicationChannel, FrameDecoder, ProtocolError};

type SharedChannel = Arc<Mutex<Box<dyn CommunicationChannel>>>;

fn lock_channel(channel: &SharedChannel) -> MutexGuard<'_, Box<dyn CommunicationChannel>> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
struct PollSettings {
    interval: Duration,
    chunk_size: usize,
}

impl From<&LinkConfig> for PollSettings {
    fn from(config: &LinkConfig) -> Self {
        Self {
            interval: config.poll_interval().max(Duration::from_millis(1)),
            chunk_size: config.read_chunk_size.max(1),
        }
    }
}

/// A running acquisition session
pub struct Acquisition {
    channel: SharedChannel,
    store: SampleStore,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<AcquisitionSummary, ProtocolError>>>,
}

impl Acquisition {
    /// Spawn the poller on the current tokio runtime
    ///
    /// Samples land in `store`, which is not reset here.
    pub fn start(
        channel: Box<dyn CommunicationChannel>,
        store: SampleStore,
        config: &LinkConfig,
    ) -> Self {
        let channel: SharedChannel = Arc::new(Mutex::new(channel));
        let cancel = CancellationToken::new();
        let settings = PollSettings::from(config);

        info!(
            session = %store.session().id,
            interval_ms = settings.interval.as_millis() as u64,
            "starting acquisition"
        );

        let task = tokio::spawn(poll_loop(
            channel.clone(),
            store.clone(),
            settings,
            cancel.clone(),
        ));

        Self {
            channel,
            store,
            cancel,
            task: Some(task),
        }
    }

    /// Store the poller writes into
    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Write a command line to the device without waiting for a reply
    pub fn send_command(&self, command: &Command) -> Result<(), ProtocolError> {
        let line = command.encode()?;
        let mut channel = lock_channel(&self.channel);
        channel.write_all(&line)?;
        channel.flush()?;
        info!("sent command: {}", command.to_string().trim_end());
        Ok(())
    }

    /// Whether the poller has stopped on its own (stream closed or failed)
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop polling, close the channel and report how the session went
    pub async fn shutdown(mut self) -> Result<AcquisitionSummary, ProtocolError> {
        self.cancel.cancel();
        self.finish().await
    }

    /// Wait for the stream to end on its own, then close the channel
    pub async fn wait(mut self) -> Result<AcquisitionSummary, ProtocolError> {
        self.finish().await
    }

    async fn finish(&mut self) -> Result<AcquisitionSummary, ProtocolError> {
        let result = match self.task.take() {
            Some(task) => task
                .await
                .unwrap_or_else(|e| Err(ProtocolError::TaskFailed(e.to_string()))),
            None => Err(ProtocolError::TaskFailed("poller already joined".into())),
        };

        if let Err(e) = lock_channel(&self.channel).close() {
            warn!("error closing channel: {}", e);
        }
        result
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Read whatever is waiting, up to `buf.len()` bytes
///
/// `Ok(0)` means nothing was waiting.
fn read_available(channel: &SharedChannel, buf: &mut [u8]) -> io::Result<usize> {
    let mut channel = lock_channel(channel);
    let available = channel.bytes_available()?;
    if available == 0 {
        return Ok(0);
    }

    let want = available.min(buf.len());
    match channel.read(&mut buf[..want]) {
        Ok(0) => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream reported data but read returned none",
        )),
        Ok(n) => Ok(n),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(0)
        }
        Err(e) => Err(e),
    }
}

async fn poll_loop(
    channel: SharedChannel,
    store: SampleStore,
    settings: PollSettings,
    cancel: CancellationToken,
) -> Result<AcquisitionSummary, ProtocolError> {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; settings.chunk_size];
    let mut bytes_read: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            let discarded_bytes = decoder.discard();
            if discarded_bytes > 0 {
                debug!("discarding {} bytes of partial record", discarded_bytes);
            }
            info!(frames = decoder.frames_decoded(), "acquisition stopped");
            return Ok(AcquisitionSummary {
                frames: decoder.frames_decoded(),
                bytes: bytes_read,
                discarded_bytes,
                end: EndReason::Shutdown,
            });
        }

        match read_available(&channel, &mut buf) {
            Ok(0) => {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(settings.interval) => {}
                }
            }
            Ok(n) => {
                bytes_read += n as u64;
                store.extend(decoder.push(&buf[..n]));
                tokio::task::yield_now().await;
            }
            Err(e) if is_closed(&e) => {
                let frames = decoder.frames_decoded();
                info!(frames, "stream closed: {}", e);
                decoder.finish().map_err(|err| {
                    warn!("{}", err);
                    err
                })?;
                return Ok(AcquisitionSummary {
                    frames,
                    bytes: bytes_read,
                    discarded_bytes: 0,
                    end: EndReason::StreamClosed,
                });
            }
            Err(e) => {
                warn!("stream read failed, stopping acquisition: {}", e);
                return Err(ProtocolError::StreamIo(e));
            }
        }
    }
}
