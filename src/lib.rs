pub mod cli;
pub mod config;
pub mod core;
pub mod run;
pub mod user_config;
