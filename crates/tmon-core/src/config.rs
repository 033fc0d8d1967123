use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::component::Share;
use crate::error::ConfigError;
use crate::theme::Theme;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// An external program plus its fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Blocking command with `extra` appended after the fixed arguments.
    pub fn std_command(&self, extra: &[&str]) -> std::process::Command {
        let mut command = std::process::Command::new(&self.program);
        command.args(&self.args).args(extra);
        command
    }

    pub fn tokio_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub unit: String,
}

impl ServiceEntry {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub services: Vec<ServiceEntry>,
    pub status_check: CommandSpec,
    pub log_stream: CommandSpec,
    pub chunk_size: usize,
    pub poll_delay_ms: u64,
    pub status_width: Share,
    pub log_width: Share,
    #[serde(skip)]
    pub theme: Theme,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            services: vec![
                ServiceEntry::new("livestream", "livestream.service"),
                ServiceEntry::new("wireguard", "wg-quick@wg0.service"),
            ],
            status_check: CommandSpec::new("systemctl", ["check"]),
            log_stream: CommandSpec::new("dmesg", ["-w"]),
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_delay_ms: 0,
            status_width: Share::new(1, 3),
            log_width: Share::new(2, 3),
            theme: Theme::default(),
        }
    }
}

impl DashboardConfig {
    /// Defaults when `path` is `None`, otherwise the TOML file at `path`
    /// layered over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DashboardConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::Invalid("no services configured".to_string()));
        }
        if let Some(entry) = self
            .services
            .iter()
            .find(|entry| entry.name.trim().is_empty() || entry.unit.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "service entry needs a name and a unit: {entry:?}"
            )));
        }
        if self.status_check.program.trim().is_empty() || self.log_stream.program.trim().is_empty()
        {
            return Err(ConfigError::Invalid("empty command program".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".to_string()));
        }
        if !self.status_width.fits_with(self.log_width) {
            return Err(ConfigError::Invalid(format!(
                "panel widths {} + {} exceed the terminal width",
                self.status_width, self.log_width
            )));
        }
        Ok(())
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}
