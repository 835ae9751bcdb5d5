pub mod config;
pub mod dependency;
pub mod logging;
