// Logging setup
pub mod logging;

// App state (configuration, paths)
pub mod state;

pub use state::{AppConfig, AppState, StateError};
