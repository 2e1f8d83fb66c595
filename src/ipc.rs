pub mod dispatch;
pub mod pipeline;
mod runtime;
mod server;

pub use server::{client_request, run_daemon};
