use crate::core::ChatError;
use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

include!(concat!(env!("OUT_DIR"), "/config_embedded.rs"));

const CONFIG_FILE: &str = "config.toml";
const FUNCTIONS_PATH: &str = "functions/v1";

#[derive(Debug, Deserialize, Clone)]
pub struct ToolConfig {
    /// Name of the serverless function backing the tool
    pub endpoint: String,
    /// Messages allowed per day, `0` disables the limit
    pub daily_limit: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    pub chat: ToolConfig,
    pub interview: ToolConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub base_url: String,
    pub default_tool: Tool,
    pub tools: ToolsConfig,
    pub connect_timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
    pub usage_file: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Open-ended career coaching chat
    #[value(name = "chat")]
    Chat,
    /// Mock interview practice
    #[value(name = "interview")]
    Interview,
}

impl Tool {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Interview => "interview",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("Invalid default config")
    }
}

impl Config {
    /// Loads `config.toml` from the working directory, falling back to the
    /// configuration embedded at build time.
    pub fn load() -> Result<Self, ChatError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ChatError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)
                .map_err(|e| ChatError::ConfigError(format!("Failed to read config file: {e}")))?;
            Self::parse(&contents)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self, ChatError> {
        toml::from_str(contents)
            .map_err(|e| ChatError::ConfigError(format!("Failed to parse config file: {e}")))
    }

    pub fn update_tool(&mut self, tool: Tool) {
        self.default_tool = tool;
    }

    pub const fn tool_config(&self, tool: Tool) -> &ToolConfig {
        match tool {
            Tool::Chat => &self.tools.chat,
            Tool::Interview => &self.tools.interview,
        }
    }

    /// Full URL of the function backing `tool`.
    pub fn endpoint_url(&self, tool: Tool) -> String {
        format!(
            "{base}/{FUNCTIONS_PATH}/{endpoint}",
            base = self.base_url.trim_end_matches('/'),
            endpoint = self.tool_config(tool).endpoint,
        )
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}
