//! Encoder Kinematics
//!
//! Turns a snapshot of raw samples into zero-based angular position and
//! velocity series for both encoder channels.
//!
//! Conventions:
//! - Time is `(t - t0) / 1e6` seconds. Each step is taken with wrapping `u32`
//!   arithmetic, so a device clock rolling over 2^32 µs (about 71.6 minutes)
//!   still advances time. A timestamp that goes backwards is read as a wrap.
//! - Position is `(count - count0) * 360 / ppr` degrees. The count difference
//!   is taken with wrapping arithmetic and read as a signed 32-bit value, so
//!   turning backwards past the start gives negative angles.
//! - Velocity entry `i` covers the interval from sample `i` to `i + 1`.
//!   With a single sample the velocity series is one `0.0` entry.
//! - Two samples with the same timestamp give an IEEE-754 result for that
//!   interval: `±inf`, or `NaN` when the position did not change either.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use thiserror::Error;
use tracing::debug;

use crate::protocol::RawSample;

/// Encoder resolution of the stock controller
pub const DEFAULT_PULSES_PER_REVOLUTION: u32 = 8000;

const MICROS_PER_SECOND: f64 = 1_000_000.0;
const DEGREES_PER_REVOLUTION: f64 = 360.0;

/// Derivation failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KinematicsError {
    /// The snapshot held no samples
    #[error("No samples captured")]
    EmptyInput,

    /// Encoder resolution of zero
    #[error("Pulses per revolution must be greater than zero")]
    DivisionByZero,
}

/// Encoder channel selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    /// First encoder, bytes 0..4 of a record
    A,
    /// Second encoder, bytes 4..8 of a record
    B,
}

impl Channel {
    /// Both channels in record order
    pub const ALL: [Channel; 2] = [Channel::A, Channel::B];

    fn raw(&self, sample: &RawSample) -> u32 {
        match self {
            Channel::A => sample.position_a,
            Channel::B => sample.position_b,
        }
    }
}

/// Position and velocity of one channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSeries {
    /// Degrees from the first sample, one per sample
    pub position_degrees: Vec<f64>,
    /// Degrees per second, one per interval
    ///
    /// Serialized with non-finite entries spelled out so a zero-length
    /// interval survives a JSON round trip.
    #[serde(with = "float_text")]
    pub velocity_degrees_per_second: Vec<f64>,
}

/// Time-aligned series derived from one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedSeries {
    /// Seconds from the first sample
    pub time_seconds: Vec<f64>,
    /// Channel A series
    pub channel_a: ChannelSeries,
    /// Channel B series
    pub channel_b: ChannelSeries,
    /// Intervals whose two samples share a timestamp
    pub degenerate_intervals: usize,
}

impl DerivedSeries {
    /// Series for one channel
    pub fn channel(&self, channel: Channel) -> &ChannelSeries {
        match channel {
            Channel::A => &self.channel_a,
            Channel::B => &self.channel_b,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.time_seconds.len()
    }

    /// Always false; an empty snapshot is an error, not an empty series
    pub fn is_empty(&self) -> bool {
        self.time_seconds.is_empty()
    }

    /// Start time of each velocity interval, matching the velocity length
    pub fn velocity_time_seconds(&self) -> &[f64] {
        match self.time_seconds.len() {
            0 | 1 => &self.time_seconds,
            n => &self.time_seconds[..n - 1],
        }
    }

    /// Elapsed time covered by the series
    pub fn duration_seconds(&self) -> f64 {
        self.time_seconds.last().copied().unwrap_or_default()
    }
}

/// Converts raw samples to physical units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KinematicsProcessor {
    pulses_per_revolution: NonZeroU32,
}

impl Default for KinematicsProcessor {
    fn default() -> Self {
        Self {
            pulses_per_revolution: NonZeroU32::new(DEFAULT_PULSES_PER_REVOLUTION)
                .unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl KinematicsProcessor {
    /// Create a processor, rejecting a zero encoder resolution up front
    pub fn new(pulses_per_revolution: u32) -> Result<Self, KinematicsError> {
        let pulses_per_revolution =
            NonZeroU32::new(pulses_per_revolution).ok_or(KinematicsError::DivisionByZero)?;
        Ok(Self {
            pulses_per_revolution,
        })
    }

    /// Configured encoder resolution
    pub fn pulses_per_revolution(&self) -> u32 {
        self.pulses_per_revolution.get()
    }

    /// Convert a signed count difference to degrees
    pub fn counts_to_degrees(&self, counts: i32) -> f64 {
        f64::from(counts) * DEGREES_PER_REVOLUTION / f64::from(self.pulses_per_revolution.get())
    }

    /// Derive position and velocity series from time-ordered samples
    pub fn derive(&self, samples: &[RawSample]) -> Result<DerivedSeries, KinematicsError> {
        let first = samples.first().ok_or(KinematicsError::EmptyInput)?;

        let mut time_seconds = Vec::with_capacity(samples.len());
        let mut elapsed_us: u64 = 0;
        let mut prev_ts = first.timestamp;
        for sample in samples {
            elapsed_us += u64::from(sample.timestamp.wrapping_sub(prev_ts));
            prev_ts = sample.timestamp;
            time_seconds.push(elapsed_us as f64 / MICROS_PER_SECOND);
        }

        let degenerate_intervals = time_seconds
            .windows(2)
            .filter(|w| w[1] == w[0])
            .count();
        if degenerate_intervals > 0 {
            debug!(
                "{} interval(s) with zero elapsed time, velocity is non-finite there",
                degenerate_intervals
            );
        }

        let [channel_a, channel_b] =
            Channel::ALL.map(|channel| self.channel_series(channel, first, samples, &time_seconds));

        Ok(DerivedSeries {
            time_seconds,
            channel_a,
            channel_b,
            degenerate_intervals,
        })
    }

    fn channel_series(
        &self,
        channel: Channel,
        first: &RawSample,
        samples: &[RawSample],
        time_seconds: &[f64],
    ) -> ChannelSeries {
        let origin = channel.raw(first);
        let position_degrees: Vec<f64> = samples
            .iter()
            .map(|s| self.counts_to_degrees(channel.raw(s).wrapping_sub(origin) as i32))
            .collect();

        let velocity_degrees_per_second = if position_degrees.len() == 1 {
            vec![0.0]
        } else {
            position_degrees
                .windows(2)
                .zip(time_seconds.windows(2))
                .map(|(p, t)| (p[1] - p[0]) / (t[1] - t[0]))
                .collect()
        };

        ChannelSeries {
            position_degrees,
            velocity_degrees_per_second,
        }
    }
}

/// Serde adapter for `Vec<f64>` that keeps `inf`, `-inf` and `NaN`
///
/// JSON has no literal for them, so finite values stay numbers and the rest
/// are written as strings.
mod float_text {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Value {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&v| {
            if v.is_finite() {
                Value::Number(v)
            } else {
                Value::Text(v.to_string())
            }
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Value>::deserialize(deserializer)?
            .into_iter()
            .map(|value| match value {
                Value::Number(v) => Ok(v),
                Value::Text(text) => match text.as_str() {
                    "inf" | "-inf" | "NaN" => text.parse().map_err(D::Error::custom),
                    other => Err(D::Error::custom(format!(
                        "expected a number, inf, -inf or NaN, got {:?}",
                        other
                    ))),
                },
            })
            .collect()
    }
}

/// Derive series with a given encoder resolution
pub fn derive(
    samples: &[RawSample],
    pulses_per_revolution: u32,
) -> Result<DerivedSeries, KinematicsError> {
    KinematicsProcessor::new(pulses_per_revolution)?.derive(samples)
}
