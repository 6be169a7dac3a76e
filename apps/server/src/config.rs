use std::net::SocketAddr;

use bienestar_context::MirrorConfig;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub mirror: MirrorConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env_or("SERVER_PORT", &DEFAULT_PORT.to_string())
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("SERVER_PORT is not a valid port: {}", e))?;
        Ok(Self {
            host: env_or("SERVER_HOST", DEFAULT_HOST),
            port,
            mirror: MirrorConfig::from_env()?,
        })
    }

    pub fn listen_address(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}:{}: {}", self.host, self.port, e))
    }
}
