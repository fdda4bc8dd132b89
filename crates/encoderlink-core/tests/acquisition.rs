use encoderlink_core::acquisition::{spawn_framed, Acquisition, EndReason, SampleStore};
use encoderlink_core::config::LinkConfig;
use encoderlink_core::demo::DemoDevice;
use encoderlink_core::kinematics::KinematicsProcessor;
use encoderlink_core::protocol::{
    Command, CommunicationChannel, FramingError, ProtocolError, RawSample,
};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// What the scripted channel does once its chunks run out
#[derive(Clone, Copy)]
enum ScriptEnd {
    /// Report a closed stream
    Close,
    /// Report a transport failure
    Fail,
    /// Stay open with nothing to read
    Hold,
}

/// Channel that hands out pre-recorded chunks, one per poll
struct ScriptedChannel {
    chunks: VecDeque<Vec<u8>>,
    current: Vec<u8>,
    end: ScriptEnd,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedChannel {
    fn new(chunks: Vec<Vec<u8>>, end: ScriptEnd) -> Self {
        Self {
            chunks: chunks.into(),
            current: Vec::new(),
            end,
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Read for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.drain(..n);
        Ok(n)
    }
}

impl Write for ScriptedChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for ScriptedChannel {
    fn bytes_available(&mut self) -> io::Result<usize> {
        if self.current.is_empty() {
            match self.chunks.pop_front() {
                Some(chunk) => self.current = chunk,
                None => {
                    return match self.end {
                        ScriptEnd::Close => Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "script finished",
                        )),
                        ScriptEnd::Fail => Err(io::Error::new(
                            io::ErrorKind::PermissionDenied,
                            "device unplugged",
                        )),
                        ScriptEnd::Hold => Ok(0),
                    }
                }
            }
        }
        Ok(self.current.len())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.current.clear();
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn fast_config() -> LinkConfig {
    LinkConfig {
        poll_interval_ms: 1,
        ..LinkConfig::default()
    }
}

fn samples(n: u32) -> (Vec<RawSample>, Vec<u8>) {
    let samples: Vec<RawSample> = (0..n)
        .map(|i| RawSample::new(i * 40, i * 20, i * 1000))
        .collect();
    let bytes = samples.iter().flat_map(|s| s.to_bytes()).collect();
    (samples, bytes)
}

fn split(bytes: &[u8], sizes: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut rest = bytes;
    for &size in sizes {
        let (chunk, tail) = rest.split_at(size.min(rest.len()));
        chunks.push(chunk.to_vec());
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest.to_vec());
    }
    chunks
}

async fn wait_for_len(store: &SampleStore, n: usize) {
    for _ in 0..400 {
        if store.len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("store never reached {} samples (has {})", n, store.len());
}

#[tokio::test]
async fn test_clean_close_stores_every_record() {
    let (expected, bytes) = samples(3);
    let channel = ScriptedChannel::new(split(&bytes, &[5, 7, 1, 23]), ScriptEnd::Close);
    let store = SampleStore::new();

    let acquisition = Acquisition::start(Box::new(channel), store.clone(), &fast_config());
    let summary = acquisition.wait().await.unwrap();

    assert_eq!(summary.end, EndReason::StreamClosed);
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.bytes, 36);
    assert_eq!(store.snapshot().into_samples(), expected);
}

#[tokio::test]
async fn test_close_mid_record_is_a_framing_error() {
    let (expected, bytes) = samples(3);
    let channel = ScriptedChannel::new(split(&bytes[..30], &[11, 11]), ScriptEnd::Close);
    let store = SampleStore::new();

    let acquisition = Acquisition::start(Box::new(channel), store.clone(), &fast_config());
    let err = acquisition.wait().await.unwrap_err();

    assert!(matches!(
        err,
        ProtocolError::Framing(FramingError::TruncatedRecord { buffered: 6 })
    ));
    // Whole records before the cut are kept, the partial one never is
    assert_eq!(store.snapshot().into_samples(), expected[..2].to_vec());
}

#[tokio::test]
async fn test_transport_failure_stops_the_task() {
    let (_, bytes) = samples(1);
    let channel = ScriptedChannel::new(vec![bytes], ScriptEnd::Fail);
    let store = SampleStore::new();

    let acquisition = Acquisition::start(Box::new(channel), store.clone(), &fast_config());
    let err = acquisition.wait().await.unwrap_err();

    assert!(matches!(err, ProtocolError::StreamIo(_)));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_shutdown_discards_partial_record() {
    let (_, bytes) = samples(2);
    let channel = ScriptedChannel::new(vec![bytes[..17].to_vec()], ScriptEnd::Hold);
    let store = SampleStore::new();

    let acquisition = Acquisition::start(Box::new(channel), store.clone(), &fast_config());
    wait_for_len(&store, 1).await;
    assert!(!acquisition.is_finished());

    let summary = acquisition.shutdown().await.unwrap();
    assert_eq!(summary.end, EndReason::Shutdown);
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.discarded_bytes, 5);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_send_command_writes_wire_line() {
    let channel = ScriptedChannel::new(Vec::new(), ScriptEnd::Hold);
    let written = channel.written.clone();

    let acquisition = Acquisition::start(Box::new(channel), SampleStore::new(), &fast_config());
    acquisition
        .send_command(&Command::distance(12.5))
        .unwrap();
    acquisition.send_command(&Command::turns(3, 150)).unwrap();
    acquisition.shutdown().await.unwrap();

    let written = written.lock().unwrap().clone();
    assert_eq!(
        String::from_utf8(written).unwrap(),
        "0,0,12.50,1\n3,150,0.00,0\n"
    );
}

#[tokio::test]
async fn test_demo_device_end_to_end() {
    let store = SampleStore::new();
    let acquisition =
        Acquisition::start(Box::new(DemoDevice::new()), store.clone(), &fast_config());

    // One turn at 600 rpm takes 100ms
    acquisition.send_command(&Command::turns(1, 600)).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let summary = acquisition.shutdown().await.unwrap();
    assert!(summary.frames > 10);

    let series = KinematicsProcessor::default()
        .derive(&store.snapshot())
        .unwrap();
    assert_eq!(series.channel_a.position_degrees.last(), Some(&360.0));
    assert_eq!(series.channel_b.position_degrees.last(), Some(&180.0));
    assert!(series.time_seconds.windows(2).all(|w| w[1] > w[0]));
}

#[tokio::test]
async fn test_framed_acquisition_until_eof() {
    let (expected, bytes) = samples(5);
    let store = SampleStore::new();

    let task = spawn_framed(
        std::io::Cursor::new(bytes),
        store.clone(),
        CancellationToken::new(),
    );
    let summary = task.await.unwrap().unwrap();

    assert_eq!(summary.end, EndReason::StreamClosed);
    assert_eq!(summary.frames, 5);
    assert_eq!(store.snapshot().into_samples(), expected);
}

#[tokio::test]
async fn test_framed_acquisition_cancel() {
    let (_, bytes) = samples(2);
    let (mut device, host) = tokio::io::duplex(64);
    let store = SampleStore::new();
    let cancel = CancellationToken::new();

    let task = spawn_framed(host, store.clone(), cancel.clone());
    device.write_all(&bytes[..17]).await.unwrap();
    wait_for_len(&store, 1).await;

    cancel.cancel();
    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.end, EndReason::Shutdown);
    assert_eq!(summary.discarded_bytes, 5);
}
