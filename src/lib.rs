pub mod api;
pub mod app;
pub mod channel;
pub mod config;
pub mod shared;
pub mod sync;
pub mod tui;
