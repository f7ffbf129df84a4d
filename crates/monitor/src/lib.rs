//! Runtime side of Crowdwatch: turning feeds into frames, frames into
//! counts, and keeping that loop running on a per-feed cadence.
//!
//! - [`playback`]: looping playback clocks for local video files.
//! - [`capture`]: remote stream capture and thumbnail fallback.
//! - [`sampler`]: the [`sampler::FrameSource`] seam and its production
//!   implementation.
//! - [`scheduler`]: the per-feed polling scheduler.
//! - [`settings`]: the persisted "analysis enabled" flag.
//! - [`assistant`]: chat sessions for the analytics assistant.

pub mod assistant;
pub mod capture;
pub mod playback;
pub mod sampler;
pub mod scheduler;
pub mod settings;
