pub mod analysis;
pub mod chat;
pub mod feeds;
pub mod media;
pub mod video;
