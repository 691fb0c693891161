use std::net::SocketAddr;

use clap::Args;

/// Settings for the HTTP server, read from flags or the environment.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Secret used to sign session cookies
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    #[command(flatten)]
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Default, Args)]
pub struct SummaryConfig {
    /// Chat endpoint used for report summaries; summaries are disabled when unset
    #[arg(long = "ai-endpoint", env = "AI_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long = "ai-api-key", env = "AI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long = "ai-model", env = "AI_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,
}

impl ServerConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            jwt_secret: jwt_secret.into(),
            summary: SummaryConfig::default(),
        }
    }
}
