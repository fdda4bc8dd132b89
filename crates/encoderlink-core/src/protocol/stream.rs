//! Byte stream transports

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

/// Abstraction for the duplex byte stream to the device (Serial or TCP)
///
/// Reads must not block: callers ask [`bytes_available`](Self::bytes_available)
/// first and never read more than it reported. A closed stream is reported as
/// an error whose kind satisfies [`is_closed`].
pub trait CommunicationChannel: Read + Write + Send {
    /// Get number of bytes available to read without blocking
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Discard anything already waiting in the input buffer
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Close the stream; later calls fail with a closed error
    fn close(&mut self) -> io::Result<()>;
}

/// Whether an I/O error means the peer or the port went away
pub fn is_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}

/// Map a serialport error onto `io::Error`, keeping the underlying I/O kind
///
/// A vanished device (`NoDevice`) counts as closed.
fn serial_io_error(err: serialport::Error) -> io::Error {
    let kind = match err.kind() {
        serialport::ErrorKind::Io(kind) => kind,
        serialport::ErrorKind::NoDevice => io::ErrorKind::NotConnected,
        serialport::ErrorKind::InvalidInput => io::ErrorKind::InvalidInput,
        serialport::ErrorKind::Unknown => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel closed")
}

/// Serial port wrapper implementing CommunicationChannel
pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    /// Wrap an open serial port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port: Some(port) }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or_else(closed_error)
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port()?.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port()?.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port()?
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(serial_io_error)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port()?
            .clear(serialport::ClearBuffer::Input)
            .map_err(serial_io_error)
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the handle releases the OS port
        self.port.take();
        Ok(())
    }
}

/// TCP stream wrapper implementing CommunicationChannel
///
/// Useful with serial-to-network bridges (ser2net and friends).
pub struct TcpChannel {
    stream: TcpStream,
    closed: bool,
}

impl TcpChannel {
    /// Wrap a connected TCP stream
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(closed_error())
        } else {
            Ok(())
        }
    }
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        self.stream.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.stream.flush()
    }
}

impl CommunicationChannel for TcpChannel {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.check_open()?;
        self.stream.set_nonblocking(true)?;
        // peek() returns min(available, buffer_size)
        let mut buf = [0u8; 8192];
        let result = self.stream.peek(&mut buf);
        self.stream.set_nonblocking(false)?;

        match result {
            // Readable with nothing to read means the peer hung up
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed connection",
            )),
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        let drained = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        drained
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}
