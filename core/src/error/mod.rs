pub mod cli;
pub mod codes;
pub mod executor;
pub mod node;

pub use cli::CliError;
pub use codes::ErrorCode;
pub use executor::ExecutorError;
pub use node::{NodeError, SamplerError};
