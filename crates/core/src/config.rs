use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{RelayError, Result};
use crate::job::{AlarmColor, JobKind, SourceJob};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

pub const DEFAULT_SCHEDULE: &str = "*/1 * * * *";
const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

// ── Env lookup ────────────────────────────────────────────────

/// Reads keys through a lookup function, trying `{PROFILE}_{KEY}` first.
struct EnvReader<'a> {
    profile: &'a str,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            if let Some(v) = self.raw(&format!("{}_{}", self.profile, key)) {
                return Some(v);
            }
        }
        self.raw(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.opt(key)
            .ok_or_else(|| RelayError::Config(format!("{key} is required")))
    }

    fn u64_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.opt(key) {
            Some(v) => v.trim().parse().map_err(|_| {
                RelayError::Config(format!("{key} must be a non-negative integer, got '{v}'"))
            }),
            None => Ok(default),
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub collector: CollectorConfig,
    pub sources: SourcesConfig,
    pub checkpoint: CheckpointConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RELAY_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build and validate config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let profile = lookup("RELAY_PROFILE")
            .unwrap_or_default()
            .trim()
            .to_uppercase();
        let reader = EnvReader {
            profile: &profile,
            lookup: &lookup,
        };

        let config = Self {
            collector: CollectorConfig::read(&reader)?,
            sources: SourcesConfig::read(&reader),
            checkpoint: CheckpointConfig::read(&reader)?,
            schedule: ScheduleConfig::read(&reader)?,
            profile,
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the cron expression, re-validating it.
    pub fn with_schedule(mut self, cron: impl Into<String>) -> Result<Self> {
        self.schedule.cron = cron.into();
        self.schedule.parse_cron()?;
        Ok(self)
    }

    /// Check cross-field constraints. Called by the constructors.
    pub fn validate(&self) -> Result<()> {
        let host = url::Url::parse(&self.collector.host).map_err(|e| {
            RelayError::Config(format!("HOST_NAME '{}' is not a valid URL: {e}", self.collector.host))
        })?;
        if !matches!(host.scheme(), "http" | "https") {
            return Err(RelayError::Config(format!(
                "HOST_NAME must use http or https, got '{}'",
                host.scheme()
            )));
        }

        let mut configured = 0;
        for kind in JobKind::ALL {
            if self.sources.path_for(kind).is_none() {
                continue;
            }
            configured += 1;
            if self.collector.endpoint_for(kind).is_none() {
                return Err(RelayError::Config(format!(
                    "{} is set but {} is missing",
                    path_key(kind),
                    endpoint_key(kind)
                )));
            }
        }
        if configured == 0 {
            return Err(RelayError::Config(
                "no sources configured (set at least one of YELLOW_ALARM_PATH, RED_ALARM_PATH, \
                 HISTORY_PATH, PREVISION_PATH, SETTINGS_PATH)"
                    .to_string(),
            ));
        }

        if self.schedule.delivery_timeout.is_zero() {
            return Err(RelayError::Config(
                "RELAY_DELIVERY_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if self.schedule.poll_interval.is_zero() {
            return Err(RelayError::Config(
                "RELAY_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        self.schedule.parse_cron()?;
        Ok(())
    }

    /// Build one [`SourceJob`] per configured source.
    pub fn jobs(&self) -> Result<Vec<SourceJob>> {
        let mut jobs = Vec::new();
        for kind in JobKind::ALL {
            let Some(path) = self.sources.path_for(kind) else {
                continue;
            };
            let endpoint = self
                .collector
                .endpoint_for(kind)
                .ok_or_else(|| RelayError::Config(format!("{} is missing", endpoint_key(kind))))?;
            let target =
                kind.delivery_url(&self.collector.host, endpoint, &self.collector.client_id)?;
            jobs.push(SourceJob::new(kind, path.clone(), target));
        }
        Ok(jobs)
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  collector:   host={}, client_id={}", self.collector.host, self.collector.client_id);
        tracing::info!("  checkpoint:  path={}", self.checkpoint.path.display());
        tracing::info!(
            "  schedule:    cron='{}', delivery_timeout={}s",
            self.schedule.cron,
            self.schedule.delivery_timeout.as_secs()
        );
        for kind in JobKind::ALL {
            match self.sources.path_for(kind) {
                Some(path) => tracing::info!("  source:      {}={}", kind, path.display()),
                None => tracing::debug!("  source:      {}=(disabled)", kind),
            }
        }
    }
}

fn path_key(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Alarm(AlarmColor::Yellow) => "YELLOW_ALARM_PATH",
        JobKind::Alarm(AlarmColor::Red) => "RED_ALARM_PATH",
        JobKind::History => "HISTORY_PATH",
        JobKind::Prevision => "PREVISION_PATH",
        JobKind::Settings => "SETTINGS_PATH",
    }
}

fn endpoint_key(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Alarm(_) => "ALARM_ENDPOINT",
        JobKind::History => "HISTORY_ENDPOINT",
        JobKind::Prevision => "PREVISION_ENDPOINT",
        JobKind::Settings => "SETTINGS_ENDPOINT",
    }
}

// ── Collector ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CollectorConfig {
    pub host: String,
    pub client_id: String,
    pub alarm_endpoint: Option<String>,
    pub history_endpoint: Option<String>,
    pub prevision_endpoint: Option<String>,
    pub settings_endpoint: Option<String>,
}

impl CollectorConfig {
    fn read(env: &EnvReader<'_>) -> Result<Self> {
        Ok(Self {
            host: env.required("HOST_NAME")?,
            client_id: env.required("CLIENT_ID")?,
            alarm_endpoint: env.opt("ALARM_ENDPOINT"),
            history_endpoint: env.opt("HISTORY_ENDPOINT"),
            prevision_endpoint: env.opt("PREVISION_ENDPOINT"),
            settings_endpoint: env.opt("SETTINGS_ENDPOINT"),
        })
    }

    pub fn endpoint_for(&self, kind: JobKind) -> Option<&str> {
        match kind {
            JobKind::Alarm(_) => self.alarm_endpoint.as_deref(),
            JobKind::History => self.history_endpoint.as_deref(),
            JobKind::Prevision => self.prevision_endpoint.as_deref(),
            JobKind::Settings => self.settings_endpoint.as_deref(),
        }
    }
}

// ── Sources ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourcesConfig {
    pub yellow_alarm: Option<PathBuf>,
    pub red_alarm: Option<PathBuf>,
    pub history: Option<PathBuf>,
    pub prevision: Option<PathBuf>,
    pub settings: Option<PathBuf>,
}

impl SourcesConfig {
    fn read(env: &EnvReader<'_>) -> Self {
        let path = |kind| env.opt(path_key(kind)).map(PathBuf::from);
        Self {
            yellow_alarm: path(JobKind::Alarm(AlarmColor::Yellow)),
            red_alarm: path(JobKind::Alarm(AlarmColor::Red)),
            history: path(JobKind::History),
            prevision: path(JobKind::Prevision),
            settings: path(JobKind::Settings),
        }
    }

    pub fn path_for(&self, kind: JobKind) -> Option<&PathBuf> {
        match kind {
            JobKind::Alarm(AlarmColor::Yellow) => self.yellow_alarm.as_ref(),
            JobKind::Alarm(AlarmColor::Red) => self.red_alarm.as_ref(),
            JobKind::History => self.history.as_ref(),
            JobKind::Prevision => self.prevision.as_ref(),
            JobKind::Settings => self.settings.as_ref(),
        }
    }
}

// ── Checkpoint ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointConfig {
    pub path: PathBuf,
}

impl CheckpointConfig {
    fn read(env: &EnvReader<'_>) -> Result<Self> {
        Ok(Self {
            path: PathBuf::from(env.required("LAST_LINE_PATH")?),
        })
    }
}

// ── Schedule ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleConfig {
    /// 5- or 6-field cron expression as configured.
    pub cron: String,
    pub poll_interval: Duration,
    pub delivery_timeout: Duration,
}

impl ScheduleConfig {
    fn read(env: &EnvReader<'_>) -> Result<Self> {
        Ok(Self {
            cron: env.or("RELAY_SCHEDULE", DEFAULT_SCHEDULE),
            poll_interval: Duration::from_millis(
                env.u64_or("RELAY_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            ),
            delivery_timeout: Duration::from_secs(
                env.u64_or("RELAY_DELIVERY_TIMEOUT_SECS", DEFAULT_DELIVERY_TIMEOUT_SECS)?,
            ),
        })
    }

    /// Parse the normalized cron expression.
    pub fn parse_cron(&self) -> Result<cron::Schedule> {
        cron::Schedule::from_str(&normalize_cron(&self.cron)).map_err(|e| {
            RelayError::Config(format!("RELAY_SCHEDULE '{}' is invalid: {e}", self.cron))
        })
    }
}
