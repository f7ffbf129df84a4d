//! Domain model and pure logic shared by every Crowdwatch crate.
//!
//! Nothing in here talks to the network. The feed registry, detection
//! model, aggregation store, overlay renderer and chat prompt building
//! live here so the monitor and API crates can share one definition.

pub mod aggregation;
pub mod chat;
pub mod detection;
pub mod error;
pub mod feed;
pub mod ffmpeg;
pub mod frame;
pub mod overlay;
pub mod types;
