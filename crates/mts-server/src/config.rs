use mts_protocol_core::connection::DEFAULT_MAX_FRAME_LEN;
use mts_protocol_core::{CHANNEL, PROTOCOL_VERSION};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    /// Negative disables compression.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: i32,
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    25580
}

fn default_max_players() -> u32 {
    20
}

fn default_channel() -> String {
    CHANNEL.into()
}

fn default_protocol_version() -> String {
    PROTOCOL_VERSION.into()
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

fn default_compression_threshold() -> i32 {
    256
}

fn default_tick_rate() -> u32 {
    20
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_players: default_max_players(),
            channel: default_channel(),
            protocol_version: default_protocol_version(),
            max_frame_len: default_max_frame_len(),
            compression_threshold: default_compression_threshold(),
            tick_rate: default_tick_rate(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: ServerConfig = toml::from_str(&contents)?;
            if config.tick_rate == 0 {
                anyhow::bail!("tick_rate must be at least 1");
            }
            Ok(config)
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("server.toml")).unwrap();
        assert_eq!(config.port, 25580);
        assert_eq!(config.channel, "mts:wrapper");
        assert_eq!(config.protocol_version, "22.18.0");
        assert_eq!(config.tick_rate, 20);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let file = write_config("port = 4000\ncompression_threshold = -1\n");
        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.compression_threshold, -1);
        assert_eq!(config.max_players, 20);
        assert_eq!(config.addr(), "0.0.0.0:4000");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let file = write_config("port = \"not a number\"\n");
        assert!(ServerConfig::load(file.path()).is_err());

        let file = write_config("tick_rate = 0\n");
        assert!(ServerConfig::load(file.path()).is_err());
    }
}
