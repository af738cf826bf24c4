pub mod config;
pub mod contract;
pub mod error;
pub mod extract;
pub mod probe;
pub mod resolver;
pub mod session;

mod process;

pub use config::{BridgeConfig, ExecutionMode};
pub use contract::{RepoStatus, EXPECTED_PROTOCOL, REQUIRED_COMMANDS};
pub use error::BridgeError;
pub use extract::{extract_field_to_file, extract_with_chunk_size, ExtractError};
pub use probe::Handshake;
pub use session::{Invocation, KernelBridge, Session};
