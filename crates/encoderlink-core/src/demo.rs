//! Demo Mode - Simulated motor controller for testing
//!
//! Behaves like the real board on the wire: streams 12-byte telemetry records
//! for two encoders and accepts `turns,speed,distance,mode` command lines.
//! Channel A sits on the motor shaft; channel B on an output shaft geared
//! down 2:1. Distance moves drive a lead screw with an 8 mm pitch.

use bytes::{Buf, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::kinematics::DEFAULT_PULSES_PER_REVOLUTION;
use crate::protocol::{Command, CommunicationChannel, MotionMode, RawSample};

/// Time between records on the simulated device clock
const SAMPLE_PERIOD_US: u64 = 2000;
/// Upper bound on timestamp jitter added to each record
const JITTER_US: u64 = 50;
/// Output shaft reduction for channel B
const GEAR_RATIO: f64 = 2.0;
/// Lead screw pitch for distance moves
const LEAD_MM_PER_TURN: f64 = 8.0;
/// Shaft speed used for distance moves
const DISTANCE_MOVE_RPM: f64 = 60.0;
/// Cap on records generated per poll so a stalled reader is not flooded
const MAX_FRAMES_PER_POLL: usize = 512;

/// How the simulated clock advances
#[derive(Debug, Clone, Copy)]
enum DemoClock {
    /// Follows wall-clock time since creation
    RealTime(Instant),
    /// Only moves on [`DemoDevice::advance`]
    Manual,
}

/// Simulated controller implementing [`CommunicationChannel`]
pub struct DemoDevice {
    clock: DemoClock,
    /// Simulated time reached so far, in microseconds
    elapsed_us: u64,
    /// Device time of the next record
    next_frame_us: u64,
    /// Device clock value at creation
    clock_origin: u32,
    /// Raw count of channel A at creation
    count_origin: u32,
    pulses_per_revolution: u32,
    /// Motor shaft position in counts relative to the origin
    position: f64,
    /// Where the current move ends
    target: f64,
    /// Move speed in counts per microsecond
    rate: f64,
    outbound: BytesMut,
    inbound: Vec<u8>,
    frames_sent: u64,
    closed: bool,
    rng: StdRng,
}

impl Default for DemoDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoDevice {
    /// Create a device that streams in real time
    pub fn new() -> Self {
        Self::with_clock(DemoClock::RealTime(Instant::now()), StdRng::from_entropy())
    }

    /// Create a device whose clock only moves on [`advance`](Self::advance)
    pub fn manual(seed: u64) -> Self {
        Self::with_clock(DemoClock::Manual, StdRng::seed_from_u64(seed))
    }

    fn with_clock(clock: DemoClock, mut rng: StdRng) -> Self {
        Self {
            clock,
            elapsed_us: 0,
            next_frame_us: 0,
            clock_origin: rng.gen(),
            count_origin: rng.gen(),
            pulses_per_revolution: DEFAULT_PULSES_PER_REVOLUTION,
            position: 0.0,
            target: 0.0,
            rate: 0.0,
            outbound: BytesMut::new(),
            inbound: Vec::new(),
            frames_sent: 0,
            closed: false,
            rng,
        }
    }

    /// Advance the simulated clock (manual devices only)
    pub fn advance(&mut self, by: Duration) {
        if matches!(self.clock, DemoClock::Manual) {
            self.elapsed_us += by.as_micros() as u64;
            self.generate();
        }
    }

    /// Records generated so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Whether a move is still in progress
    pub fn is_moving(&self) -> bool {
        self.position != self.target
    }

    /// Motor shaft position in turns from the start
    pub fn shaft_turns(&self) -> f64 {
        self.position / f64::from(self.pulses_per_revolution)
    }

    /// Apply a command as the firmware would
    pub fn apply(&mut self, command: &Command) {
        let ppr = f64::from(self.pulses_per_revolution);
        let (turns, rpm) = match command.mode {
            MotionMode::Velocity => (f64::from(command.turns), f64::from(command.speed).abs()),
            MotionMode::Distance => (command.distance / LEAD_MM_PER_TURN, DISTANCE_MOVE_RPM),
        };
        self.target = self.position + turns * ppr;
        self.rate = rpm / 60.0 * ppr / 1_000_000.0;
        debug!(turns, rpm, "demo device accepted command");
    }

    fn sync_clock(&mut self) {
        if let DemoClock::RealTime(start) = self.clock {
            self.elapsed_us = start.elapsed().as_micros() as u64;
        }
    }

    fn generate(&mut self) {
        let mut produced = 0;
        while self.next_frame_us <= self.elapsed_us && produced < MAX_FRAMES_PER_POLL {
            let sample = self.sample_at(self.next_frame_us);
            self.outbound.extend_from_slice(&sample.to_bytes());
            self.frames_sent += 1;
            produced += 1;

            let jitter = self.rng.gen_range(0..=JITTER_US);
            self.step_motion(SAMPLE_PERIOD_US as f64);
            self.next_frame_us += SAMPLE_PERIOD_US + jitter;
        }
        if produced == MAX_FRAMES_PER_POLL {
            // Skip ahead rather than build an unbounded backlog
            self.next_frame_us = self.next_frame_us.max(self.elapsed_us);
        }
    }

    fn step_motion(&mut self, dt_us: f64) {
        let max_step = self.rate * dt_us;
        let delta = self.target - self.position;
        if delta.abs() <= max_step {
            self.position = self.target;
        } else {
            self.position += delta.signum() * max_step;
        }
    }

    fn sample_at(&self, device_us: u64) -> RawSample {
        let counts_a = self.position.round() as i64;
        let counts_b = (self.position / GEAR_RATIO).round() as i64;
        RawSample::new(
            self.count_origin.wrapping_add(counts_a as u32),
            self.count_origin.wrapping_add(counts_b as u32),
            self.clock_origin.wrapping_add(device_us as u32),
        )
    }

    fn handle_line(&mut self, line: &[u8]) {
        let parsed = std::str::from_utf8(line)
            .map_err(|e| e.to_string())
            .and_then(|s| s.parse::<Command>().map_err(|e| e.to_string()));
        match parsed {
            Ok(command) => self.apply(&command),
            Err(e) => warn!("demo device ignoring line: {}", e),
        }
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::new(io::ErrorKind::NotConnected, "demo device closed"))
        } else {
            Ok(())
        }
    }
}

impl Read for DemoDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        let n = buf.len().min(self.outbound.len());
        buf[..n].copy_from_slice(&self.outbound[..n]);
        self.outbound.advance(n);
        Ok(n)
    }
}

impl Write for DemoDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        for &byte in buf {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.inbound);
                self.handle_line(&line);
            } else {
                self.inbound.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()
    }
}

impl CommunicationChannel for DemoDevice {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.check_open()?;
        self.sync_clock();
        self.generate();
        Ok(self.outbound.len())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.outbound.clear();
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::derive;
    use crate::protocol::FrameDecoder;

    fn drain(device: &mut DemoDevice, decoder: &mut FrameDecoder) -> Vec<RawSample> {
        let mut buf = vec![0u8; device.bytes_available().unwrap()];
        let n = device.read(&mut buf).unwrap();
        decoder.push(&buf[..n]).collect()
    }

    #[test]
    fn test_streams_whole_records() {
        let mut device = DemoDevice::manual(1);
        device.advance(Duration::from_millis(100));

        let available = device.bytes_available().unwrap();
        assert!(available > 0);
        assert_eq!(available % 12, 0);
        assert_eq!(available as u64, device.frames_sent() * 12);
    }

    #[test]
    fn test_idle_device_holds_position() {
        let mut device = DemoDevice::manual(2);
        let mut decoder = FrameDecoder::new();
        device.advance(Duration::from_millis(50));

        let samples = drain(&mut device, &mut decoder);
        let series = derive(&samples, DEFAULT_PULSES_PER_REVOLUTION).unwrap();
        assert!(series.channel_a.position_degrees.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_turns_command_moves_both_channels() {
        let mut device = DemoDevice::manual(3);
        let mut decoder = FrameDecoder::new();

        device.write_all(&Command::turns(1, 120).encode().unwrap()).unwrap();
        assert!(device.is_moving());

        // One turn at 120 rpm takes half a second
        device.advance(Duration::from_millis(700));
        let samples = drain(&mut device, &mut decoder);
        let series = derive(&samples, DEFAULT_PULSES_PER_REVOLUTION).unwrap();

        assert!(!device.is_moving());
        assert_eq!(series.channel_a.position_degrees.last(), Some(&360.0));
        assert_eq!(series.channel_b.position_degrees.last(), Some(&180.0));
        let peak = series
            .channel_a
            .velocity_degrees_per_second
            .iter()
            .cloned()
            .fold(0.0, f64::max);
        assert!(peak > 600.0 && peak < 760.0, "peak velocity {}", peak);
    }

    #[test]
    fn test_distance_command() {
        let mut device = DemoDevice::manual(4);
        device.apply(&Command::distance(-4.0));
        device.advance(Duration::from_secs(2));
        assert_eq!(device.shaft_turns(), -0.5);
    }

    #[test]
    fn test_garbage_line_is_ignored() {
        let mut device = DemoDevice::manual(5);
        device.write_all(b"not a command\n").unwrap();
        assert!(!device.is_moving());
    }

    #[test]
    fn test_closed_device_errors() {
        let mut device = DemoDevice::manual(6);
        device.close().unwrap();
        assert!(device.bytes_available().is_err());
    }
}
