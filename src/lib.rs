//! bcachectl - simplified administration of bcache devices
//!
//! Discovers backing and cache devices through sysfs, and registers,
//! attaches, tunes, flushes and formats them.

pub mod cli;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod flush;
pub mod host;
pub mod lifecycle;
pub mod poll;
pub mod registry;
pub mod render;
pub mod scan;
pub mod sysfs;
pub mod tools;
pub mod tunable;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::{BcacheError, BcacheResult};
pub use host::BcacheHost;
