//! Configuration discovery and loading for courier
//!
//! The dispatch machinery lives in [`courier_dispatch`]; this crate ties it to
//! a RON configuration file and the `courier` command-line tool.

pub mod config;

pub use config::{CONFIG_ENV, CourierConfig, find_config_file};
pub use courier_common as common;
pub use courier_dispatch as dispatch;
