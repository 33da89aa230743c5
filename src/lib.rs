#![allow(clippy::uninlined_format_args)]

pub mod aggregate;
pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod logging;
pub mod model;
pub mod reachability;
pub mod report;
pub mod route;
pub mod video_id;
pub mod view;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
