//! Console logging.
//!
//! One `tracing` subscriber for the whole process. Operation history is
//! emitted on the `audit` target and has its own level, so history stays
//! visible when the rest of the console is turned down to `warn`.

use serde::Deserialize;
use std::collections::HashMap;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Target used by the history drain task.
pub const AUDIT_TARGET: &str = "audit";

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Base level for every target
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Level of the `audit` target carrying history entries
    #[serde(default = "default_level")]
    pub audit_level: String,

    /// Extra `target = level` overrides, e.g. `tower_http = "debug"`
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    #[serde(default)]
    pub include_location: bool,

    #[serde(default = "default_true")]
    pub include_target: bool,

    /// Emit an event when an instrumented batch span closes, with timings
    #[serde(default)]
    pub span_close: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            audit_level: default_level(),
            module_levels: HashMap::new(),
            include_location: false,
            include_target: true,
            span_close: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    Pretty,
    Compact,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl LoggingConfig {
    /// Directives from the base level, the audit level and the overrides.
    /// `RUST_LOG` is ignored.
    pub fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)?
            .add_directive(format!("{}={}", AUDIT_TARGET, self.audit_level).parse()?);
        for (target, level) in &self.module_levels {
            filter = filter.add_directive(format!("{}={}", target, level).parse()?);
        }
        Ok(filter)
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_close {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails on a malformed level or when a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = config.env_filter()?;

    let base = fmt::layer()
        .with_span_events(config.span_events())
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target);
    let output = match config.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()?;
    Ok(())
}
