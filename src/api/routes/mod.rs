//! API route modules.

pub mod notifications;
pub mod recording;
pub mod refresh;
