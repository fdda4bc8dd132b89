//! Protocol errors

use thiserror::Error;

/// Framing failures on the inbound telemetry stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// The stream ended with part of a record buffered
    #[error("Stream closed mid-record: {buffered} of 12 bytes received")]
    TruncatedRecord {
        /// Bytes of the incomplete record
        buffered: usize,
    },
}

/// Errors that can occur while talking to the device
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Opening or configuring the port failed
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// No device at the given port name
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Inbound stream did not end on a record boundary
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// Command could not be encoded or parsed
    #[error("Invalid command line: {0}")]
    InvalidCommand(String),

    /// The background task panicked or was already joined
    #[error("Acquisition task failed: {0}")]
    TaskFailed(String),

    /// Transport failure other than a clean close
    #[error("Stream I/O error: {0}")]
    StreamIo(#[from] std::io::Error),
}
