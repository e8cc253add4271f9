pub mod config;
pub mod error;
pub mod snapshot;

pub use config::ServerConfig;
pub use error::DebugdError;
pub use snapshot::{DebugSnapshot, HostIdentity, RequestDetail};
