pub mod cli;
pub mod config;
pub mod core;
pub mod scan;
pub mod watcher;

pub use crate::core::*;
pub use config::MetaDiffConfig;
pub use scan::ResultScanner;
pub use watcher::{ResultSetWatcher, WatchEvent};
