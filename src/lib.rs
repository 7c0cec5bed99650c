//! Development-time supervisor: watch a source tree, rebuild on change and
//! keep one up-to-date instance of the program running.
//!
//! Control flows from the [`watcher`] strategies through the [`debounce`]
//! trigger into the [`orchestrator`], which drives the [`builder`] and the
//! [`supervisor`].

pub mod builder;
pub mod commands;
pub mod config;
pub mod debounce;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod signals;
pub mod supervisor;
#[cfg(all(test, unix))]
mod testutil;
pub mod types;
pub mod watcher;
