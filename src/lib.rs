pub mod api;
pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod db;
pub mod global;
pub mod notifications;
pub mod recording;
pub mod refresh;
pub mod remote;
pub mod store;
pub mod transcription;
