//! screenrec library crate.
//!
//! Screen capture into a double-buffered frame exchange, with optional
//! recording through an external ffmpeg process.
//!
//! - [`capture`]: platform capture providers and monitor selection
//! - [`exchange`]: latest-frame handoff between the capture thread and a consumer
//! - [`scaler`]: bilinear resampling of RGB24 frames
//! - [`encoder`]: raw-video pipe into ffmpeg
//! - [`recorder`]: the capture thread and recording control
//! - [`session`]: one-stop facade over the pieces above

pub mod capture;
pub mod cli;
pub mod config;
pub mod encoder;
pub mod exchange;
pub mod frame;
pub mod recorder;
pub mod scaler;
pub mod screenshot;
pub mod session;
