use clap::Args;

use hearth_cli::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Host that invite links point at
    #[arg(long, default_value = "hearth.local")]
    pub host: String,

    /// Maximum accepted request timestamp drift in milliseconds
    #[arg(long, default_value_t = 300_000)]
    pub max_age_ms: u64,

    /// Default log level
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] hearth_cli::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            host: self.host.clone(),
            max_age_ms: self.max_age_ms,
            log_level: self.log_level.clone(),
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized hearth directory at: {}\n\
             - Config: {}\n\
             - Host: {}\n\
             - Max request age: {}ms\n\
             - Log level: {}",
            state.hearth_dir.display(),
            state.config_path.display(),
            state.config.host,
            state.config.max_age_ms,
            state.config.log_level,
        );

        Ok(output)
    }
}
