//! Async framed acquisition
//!
//! For transports that already speak `AsyncRead` (such as
//! `tokio_serial::SerialStream`), records are pulled through
//! [`TelemetryCodec`] instead of the polling loop.

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AcquisitionSummary, EndReason, SampleStore};
use crate::protocol::{ProtocolError, TelemetryCodec, FRAME_LEN};

/// Spawn a task feeding `store` from an async reader until EOF or cancellation
pub fn spawn_framed<R>(
    reader: R,
    store: SampleStore,
    cancel: CancellationToken,
) -> JoinHandle<Result<AcquisitionSummary, ProtocolError>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut frames = FramedRead::new(reader, TelemetryCodec::new());
        let mut count: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let discarded_bytes = frames.read_buffer().len();
                    if discarded_bytes > 0 {
                        debug!("discarding {} buffered bytes", discarded_bytes);
                    }
                    info!(frames = count, "framed acquisition stopped");
                    return Ok(AcquisitionSummary {
                        frames: count,
                        bytes: count * FRAME_LEN as u64 + discarded_bytes as u64,
                        discarded_bytes,
                        end: EndReason::Shutdown,
                    });
                }
                next = frames.next() => match next {
                    Some(Ok(sample)) => {
                        store.append(sample);
                        count += 1;
                    }
                    Some(Err(e)) => {
                        warn!("framed acquisition failed: {}", e);
                        return Err(e);
                    }
                    None => {
                        info!(frames = count, "stream closed");
                        return Ok(AcquisitionSummary {
                            frames: count,
                            bytes: count * FRAME_LEN as u64,
                            discarded_bytes: 0,
                            end: EndReason::StreamClosed,
                        });
                    }
                },
            }
        }
    })
}
