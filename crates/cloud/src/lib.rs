//! Clients for the hosted services Crowdwatch depends on.
//!
//! - [`vision`]: person and face detection through the Google Cloud Vision
//!   REST API.
//! - [`chat`]: OpenAI-compatible chat completions for the analytics
//!   assistant.
//!
//! Each client sits behind an `async_trait` seam ([`vision::Detector`],
//! [`chat::ChatCompleter`]) so the scheduler and HTTP handlers can be
//! exercised without network access.

pub mod chat;
pub mod vision;
