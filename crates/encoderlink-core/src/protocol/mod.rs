//! Device Link Protocol
//!
//! Inbound telemetry is a continuous stream of fixed 12-byte binary records.
//! Outbound commands are single ASCII lines terminated by `\n`.

pub mod codec;
pub mod command;
mod error;
pub mod frame;
pub mod serial;
pub mod stream;

pub use codec::TelemetryCodec;
pub use command::{encode, Command, MotionMode};
pub use error::{FramingError, ProtocolError};
pub use frame::{DecoderState, FrameDecoder, RawSample};
pub use serial::{connect, list_ports, open_async_port, open_port, PortInfo};
pub use stream::{is_closed, CommunicationChannel, SerialChannel, TcpChannel};

/// Size of one telemetry record on the wire
pub const FRAME_LEN: usize = 12;

/// Default baud rate of the controller firmware
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// Default read timeout for opened ports in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;
