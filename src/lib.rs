pub mod actions;
pub mod cli;
pub mod config;
pub mod filters;
pub mod gestures;
pub mod ipc;
pub mod landmarks;
pub mod logging;
pub mod mapper;
pub mod source;
