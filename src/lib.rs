pub mod arg_parser;
pub mod bmc;
pub mod config;
pub mod control_loop;
pub mod errors;
pub mod fan_curve;
pub mod fan_mode;
pub mod logger;
pub mod notifier;
pub mod pid;

#[cfg(test)]
mod test_utils;

pub use control_loop::run;
