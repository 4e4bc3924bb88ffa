//! Source jobs and the closed set of job kinds.
//!
//! Every monitored feed belongs to exactly one [`JobKind`]. The kind decides
//! the checkpoint key, which category endpoint receives its lines, and which
//! extra query parameters the collector expects.

use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::error::{RelayError, Result};

/// Severity tag sent with alarm lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmColor {
    Yellow,
    Red,
}

impl AlarmColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmColor::Yellow => "yellow",
            AlarmColor::Red => "red",
        }
    }
}

/// Category of a monitored source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Alarm(AlarmColor),
    History,
    Prevision,
    Settings,
}

impl JobKind {
    /// Every kind, in the order jobs are registered.
    pub const ALL: [JobKind; 5] = [
        JobKind::Alarm(AlarmColor::Yellow),
        JobKind::Alarm(AlarmColor::Red),
        JobKind::History,
        JobKind::Prevision,
        JobKind::Settings,
    ];

    /// Stable checkpoint key for this kind.
    pub fn key(&self) -> &'static str {
        match self {
            JobKind::Alarm(AlarmColor::Yellow) => "yellowAlarm",
            JobKind::Alarm(AlarmColor::Red) => "redAlarm",
            JobKind::History => "history",
            JobKind::Prevision => "prevision",
            JobKind::Settings => "settings",
        }
    }

    /// Reverse of [`key`](JobKind::key).
    pub fn from_key(key: &str) -> Option<JobKind> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }

    /// Build the delivery URL for this kind.
    ///
    /// `endpoint` is the category path appended to `host`. Every URL carries
    /// `clientId`; alarm URLs also carry `color`.
    pub fn delivery_url(&self, host: &str, endpoint: &str, client_id: &str) -> Result<Url> {
        let raw = join_host_path(host, endpoint);
        let mut url = Url::parse(&raw).map_err(|source| RelayError::Url {
            url: raw.clone(),
            source,
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("clientId", client_id);
            if let JobKind::Alarm(color) = self {
                query.append_pair("color", color.as_str());
            }
        }

        Ok(url)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn join_host_path(host: &str, endpoint: &str) -> String {
    let host = host.trim_end_matches('/');
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        host.to_string()
    } else if endpoint.starts_with('/') {
        format!("{host}{endpoint}")
    } else {
        format!("{host}/{endpoint}")
    }
}

/// One monitored text source. Immutable after configuration load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceJob {
    pub kind: JobKind,
    /// File whose full content is re-read on every run.
    pub content_path: PathBuf,
    /// Endpoint receiving one POST per new line.
    pub target: Url,
}

impl SourceJob {
    pub fn new(kind: JobKind, content_path: impl Into<PathBuf>, target: Url) -> Self {
        Self {
            kind,
            content_path: content_path.into(),
            target,
        }
    }

    pub fn key(&self) -> &'static str {
        self.kind.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip() {
        for kind in JobKind::ALL {
            assert_eq!(JobKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(JobKind::from_key("greenAlarm"), None);
    }

    #[test]
    fn alarm_url_carries_client_and_color() {
        let url = JobKind::Alarm(AlarmColor::Red)
            .delivery_url("https://collector.example.com", "/api/alarm", "site-7")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://collector.example.com/api/alarm?clientId=site-7&color=red"
        );
    }

    #[test]
    fn non_alarm_url_has_no_color() {
        let url = JobKind::Prevision
            .delivery_url("https://collector.example.com/", "api/prevision", "site-7")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://collector.example.com/api/prevision?clientId=site-7"
        );
        assert!(url.query_pairs().all(|(k, _)| k != "color"));
    }

    #[test]
    fn client_id_is_query_encoded() {
        let url = JobKind::Settings
            .delivery_url("http://localhost:8080", "/settings", "a b&c")
            .unwrap();
        let pairs: Vec<_> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("clientId".to_string(), "a b&c".to_string())]);
    }

    #[test]
    fn relative_host_is_rejected() {
        let err = JobKind::History
            .delivery_url("collector.example.com", "/history", "x")
            .unwrap_err();
        assert!(matches!(err, RelayError::Url { .. }));
    }
}
