pub mod config;
pub mod control_handler;
pub mod controller;

pub use controller::{Daemon, Postbox};
