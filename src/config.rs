use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::DEFAULT_SIMILARITY_THRESHOLD;
use crate::embed::{Embedder, HashEmbedder, DEFAULT_DIMENSION};
use crate::error::InitializeError;
use crate::scheduler::SchedulerConfig;
use crate::store::SearchOptions;

pub const DEFAULT_DATA_DIR: &str = "gen_data";
pub const DEFAULT_JOURNAL_COMMAND: &str = "journalctl -f -o json -n 0";
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EmbedderKind {
    Hash,
    FastEmbed,
}

impl Default for EmbedderKind {
    fn default() -> Self {
        if cfg!(feature = "fastembed") {
            Self::FastEmbed
        } else {
            Self::Hash
        }
    }
}

impl FromStr for EmbedderKind {
    type Err = InitializeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "fastembed" => Ok(Self::FastEmbed),
            _ => Err(InitializeError::UnknownEmbedder(s.to_string())),
        }
    }
}

/// Runtime settings. Compiled defaults, overridden by `KERNOLOG_*`
/// environment variables, overridden by command-line flags.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub dimension: usize,
    pub embedder: EmbedderKind,
    pub scheduler: SchedulerConfig,
    pub search: SearchOptions,
    pub similarity_threshold: f64,
    pub notify: bool,
    pub journal_command: Vec<String>,
    pub restart_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            dimension: DEFAULT_DIMENSION,
            embedder: EmbedderKind::default(),
            scheduler: SchedulerConfig::default(),
            search: SearchOptions::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            notify: true,
            journal_command: split_command(DEFAULT_JOURNAL_COMMAND),
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

impl Config {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse.
    pub fn from_env() -> Result<Self, InitializeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults for
    /// missing keys.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, InitializeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(dir) = lookup("KERNOLOG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup("KERNOLOG_DIMENSION") {
            config.dimension = parse_setting("KERNOLOG_DIMENSION", &v)?;
        }
        if let Some(v) = lookup("KERNOLOG_EMBEDDER") {
            config.embedder = v.parse()?;
        }
        if let Some(v) = lookup("KERNOLOG_BATCH_SIZE") {
            config.scheduler.batch_size = parse_setting("KERNOLOG_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("KERNOLOG_FLUSH_INTERVAL") {
            config.scheduler.flush_interval =
                Duration::from_secs(parse_setting("KERNOLOG_FLUSH_INTERVAL", &v)?);
        }
        if let Some(v) = lookup("KERNOLOG_POLL_TIMEOUT_MS") {
            config.scheduler.poll_timeout =
                Duration::from_millis(parse_setting("KERNOLOG_POLL_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("KERNOLOG_COARSE_CANDIDATES") {
            config.search.coarse_candidates = parse_setting("KERNOLOG_COARSE_CANDIDATES", &v)?;
        }
        if let Some(v) = lookup("KERNOLOG_RELEVANCE_FLOOR") {
            config.search.relevance_floor = parse_setting("KERNOLOG_RELEVANCE_FLOOR", &v)?;
        }
        if let Some(v) = lookup("KERNOLOG_SIMILARITY_THRESHOLD") {
            config.similarity_threshold = parse_setting("KERNOLOG_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("KERNOLOG_NOTIFY") {
            config.notify = parse_bool("KERNOLOG_NOTIFY", &v)?;
        }
        if let Some(v) = lookup("KERNOLOG_JOURNAL_COMMAND") {
            let command = split_command(&v);
            if command.is_empty() {
                return Err(InitializeError::InvalidSetting {
                    name: "KERNOLOG_JOURNAL_COMMAND",
                    value: v,
                });
            }
            config.journal_command = command;
        }
        if let Some(v) = lookup("KERNOLOG_RESTART_DELAY_MS") {
            config.restart_delay =
                Duration::from_millis(parse_setting("KERNOLOG_RESTART_DELAY_MS", &v)?);
        }
        Ok(config)
    }

    /// Builds the configured embedding provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded or its dimension does
    /// not match the configured one.
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>, InitializeError> {
        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderKind::Hash => Arc::new(HashEmbedder::new(self.dimension)),
            #[cfg(feature = "fastembed")]
            EmbedderKind::FastEmbed => Arc::new(crate::embed::FastEmbedder::new()?),
            #[cfg(not(feature = "fastembed"))]
            EmbedderKind::FastEmbed => return Err(InitializeError::FastEmbedUnavailable),
        };
        if embedder.dimension() != self.dimension {
            return Err(InitializeError::InvalidSetting {
                name: "KERNOLOG_DIMENSION",
                value: self.dimension.to_string(),
            });
        }
        Ok(embedder)
    }
}

fn parse_setting<T: FromStr>(name: &'static str, value: &str) -> Result<T, InitializeError> {
    value
        .trim()
        .parse()
        .map_err(|_| InitializeError::InvalidSetting {
            name,
            value: value.to_string(),
        })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, InitializeError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(InitializeError::InvalidSetting {
            name,
            value: value.to_string(),
        }),
    }
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(ToString::to_string).collect()
}
