#[macro_use]
extern crate tracing;

pub mod atm;
pub mod background;
pub mod cli;
pub mod hierarchy;
pub mod intent;
pub mod recents;
pub mod services;
pub mod starter;
pub mod utils;
pub mod visibility;

#[cfg(test)]
mod tests;

pub use atm::{ActivityTaskManager, GlobalState, Options};
