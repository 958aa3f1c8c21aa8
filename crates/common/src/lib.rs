pub mod config;
pub mod logging;
mod macros;

pub use config::{Environment, env_flag, env_or};
pub use logging::setup_logging;
