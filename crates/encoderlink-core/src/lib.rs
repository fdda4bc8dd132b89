//! # EncoderLink Core Library
//!
//! Host side of the link to a dual-encoder motor controller.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Decoding of the binary telemetry stream (12-byte records)
//! - Background acquisition into a session-owned sample store
//! - Conversion of raw counts to angular position and velocity series
//! - Encoding of motion command lines
//! - Serial/TCP channels and a simulated controller for testing
//!
//! ## Example
//!
//! ```rust,ignore
//! use encoderlink_core::prelude::*;
//!
//! let config = LinkConfig::load("link.json")?;
//! let channel = protocol::connect(&config)?;
//! let acquisition = Acquisition::start(Box::new(channel), SampleStore::new(), &config);
//!
//! acquisition.send_command(&Command::turns(3, 150))?;
//! // ... later
//! let series = config.processor()?.derive(&acquisition.store().snapshot())?;
//! println!("{:.1} deg", series.channel_a.position_degrees.last().unwrap());
//! ```

pub mod acquisition;
pub mod config;
pub mod demo;
pub mod export;
pub mod kinematics;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::acquisition::{Acquisition, AcquisitionSummary, SampleStore, Snapshot};
    pub use crate::config::LinkConfig;
    pub use crate::demo::DemoDevice;
    pub use crate::kinematics::{Channel, DerivedSeries, KinematicsError, KinematicsProcessor};
    pub use crate::protocol::{self, Command, MotionMode, ProtocolError, RawSample};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
