pub mod connection;
pub mod handler;
pub mod request;
pub mod worker;

pub use handler::{DebugService, RequestResult};
pub use worker::{SharedState, Workers, spawn_workers};
