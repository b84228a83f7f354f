pub mod config;
pub mod paths;

#[cfg(feature = "logging")]
pub mod logging;
