use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Priority assumed for records that do not carry one (syslog "info").
pub const DEFAULT_PRIORITY: u8 = 6;

/// One record from the log source, before any mining.
#[derive(Clone, Debug, PartialEq)]
pub struct RawEvent {
    pub message: String,
    pub priority: u8,
    pub unit: String,
}

impl RawEvent {
    /// Builds an event from collector fields. Returns `None` when the message
    /// is blank, since there is nothing to mine.
    #[must_use]
    pub fn new(message: &str, priority: u8, unit: &str) -> Option<Self> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }
        let unit = unit.trim();
        Some(Self {
            message: message.to_string(),
            priority: priority.min(7),
            unit: if unit.is_empty() {
                "system".to_string()
            } else {
                unit.to_string()
            },
        })
    }

    #[must_use]
    pub fn category(&self) -> Category {
        Category::from_priority(self.priority)
    }
}

/// Output of the template miner, the payload handed to the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedEvent {
    /// Generalized template text, e.g. `Disk <*> failed`.
    pub template: String,
    /// Values substituted for the wildcards, in order.
    pub params: Vec<String>,
    pub priority: u8,
    pub original: String,
    pub unit: String,
}

impl ProcessedEvent {
    #[must_use]
    pub fn category(&self) -> Category {
        Category::from_priority(self.priority)
    }
}

/// Storage partition. Each category has its own vector file and catalog.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Error,
    Warning,
    Debug,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Error, Category::Warning, Category::Debug];

    #[must_use]
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            0..=3 => Self::Error,
            4 => Self::Warning,
            _ => Self::Debug,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            "debug" => Ok(Self::Debug),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// Presentation tier of a priority. Does not influence clustering.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Error,
    Warn,
    Info,
}

impl Severity {
    #[must_use]
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            0..=3 => Self::Error,
            4 => Self::Warn,
            _ => Self::Info,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
        }
    }

    /// Lines at this tier are surfaced on every occurrence, not only when
    /// their template is first seen.
    #[must_use]
    pub fn always_shown(self) -> bool {
        self != Self::Info
    }

    #[must_use]
    pub fn raises_alert(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn log_level(self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}
