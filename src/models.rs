use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ModelError {
    #[error("malformed systems payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("system record #{position} has no id")]
    MissingId { position: usize },
    #[error("expected a JSON array of systems or an object with a `log` map")]
    UnexpectedShape,
}

/// Trinary check outcome as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SuccessFailed {
    Success,
    Failed,
    Unsupported,
    #[default]
    #[serde(other)]
    Other,
}

/// The HTTP check is a plain flag on older backends and a trinary outcome on newer ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum HttpOutcome {
    Flag(bool),
    Status(SuccessFailed),
}

impl HttpOutcome {
    pub(crate) fn successful(&self) -> Option<bool> {
        match self {
            HttpOutcome::Flag(flag) => Some(*flag),
            HttpOutcome::Status(SuccessFailed::Success) => Some(true),
            HttpOutcome::Status(SuccessFailed::Failed) => Some(false),
            HttpOutcome::Status(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) enum ApplicationState {
    #[serde(rename = "air")]
    Air,
    #[serde(rename = "html")]
    Html,
    #[serde(rename = "conflict")]
    Conflict,
    #[serde(rename = "not enabled")]
    NotEnabled,
    #[serde(rename = "not running")]
    NotRunning,
    #[default]
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl ApplicationState {
    pub(crate) fn is_running(&self) -> bool {
        matches!(self, ApplicationState::Air | ApplicationState::Html)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckResult {
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub(crate) timestamp: DateTime<Utc>,
    #[serde(default)]
    pub(crate) icmp_request: bool,
    #[serde(default)]
    pub(crate) ssh_login: SuccessFailed,
    #[serde(default)]
    pub(crate) http_request: Option<HttpOutcome>,
    #[serde(default)]
    pub(crate) application_state: ApplicationState,
    #[serde(default)]
    pub(crate) application_enabled: Option<bool>,
    #[serde(default)]
    pub(crate) application_running: Option<bool>,
    #[serde(default)]
    pub(crate) application_version: Option<String>,
    #[serde(default)]
    pub(crate) smart_check: SuccessFailed,
    #[serde(default)]
    pub(crate) ram_total: Option<u64>,
    #[serde(default)]
    pub(crate) ram_free: Option<u64>,
    #[serde(default)]
    pub(crate) ram_available: Option<u64>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub(crate) offline_since: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub(crate) blackscreen_since: Option<DateTime<Utc>>,
}

impl CheckResult {
    /// Host answered ping and SSH did not explicitly fail.
    pub(crate) fn online(&self) -> bool {
        self.icmp_request && self.ssh_login != SuccessFailed::Failed
    }

    pub(crate) fn application_ok(&self) -> bool {
        self.application_state.is_running()
    }

    /// `None` when the check could not read an application version.
    pub(crate) fn out_of_date(&self, current_version: &str) -> Option<bool> {
        self.application_version
            .as_deref()
            .map(|version| version != current_version)
    }

    pub(crate) fn more_than_three_months_offline(
        &self,
        now: DateTime<Utc>,
        threshold: ChronoDuration,
    ) -> bool {
        match self.offline_since {
            Some(since) => now - since > threshold,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Company {
    pub(crate) name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Customer {
    pub(crate) id: u32,
    pub(crate) company: Company,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Address {
    #[serde(default)]
    pub(crate) street: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) house_number: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) zip_code: String,
    #[serde(default)]
    pub(crate) city: String,
}

impl Address {
    /// `street houseNumber, zipCode city`
    pub(crate) fn one_line(&self) -> String {
        format!(
            "{} {}, {} {}",
            self.street, self.house_number, self.zip_code, self.city
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Deployment {
    #[serde(default)]
    pub(crate) id: Option<u32>,
    pub(crate) customer: Customer,
    pub(crate) address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckedSystem {
    pub(crate) id: u32,
    #[serde(default)]
    pub(crate) check_results: Vec<CheckResult>,
    #[serde(default)]
    pub(crate) deployment: Option<Deployment>,
    #[serde(default)]
    pub(crate) testing: bool,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub(crate) last_sync: Option<DateTime<Utc>>,
}

impl CheckedSystem {
    /// Newest sample; the backend delivers `checkResults` newest first.
    pub(crate) fn last_check(&self) -> Option<&CheckResult> {
        self.check_results.first()
    }

    pub(crate) fn online(&self) -> Option<bool> {
        self.last_check().map(CheckResult::online)
    }

    pub(crate) fn synced(&self, now: DateTime<Utc>) -> Option<bool> {
        self.last_sync
            .map(|last_sync| now - last_sync < ChronoDuration::days(1))
    }
}

/// Parses a `/stats` response body.
///
/// Accepts either a bare array of systems or the keyed `{"log": {...}}`
/// envelope; the latter is returned ordered by system id. Records without
/// an id are rejected before anything else looks at them.
pub(crate) fn parse_systems(raw: &str) -> Result<Vec<CheckedSystem>, ModelError> {
    let value: Value = serde_json::from_str(raw)?;
    let (records, keyed) = match value {
        Value::Array(records) => (records, false),
        Value::Object(mut map) => match map.remove("log") {
            Some(Value::Object(log)) => (log.into_iter().map(|(_, record)| record).collect(), true),
            _ => return Err(ModelError::UnexpectedShape),
        },
        _ => return Err(ModelError::UnexpectedShape),
    };

    let mut systems = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        if record.get("id").is_none_or(Value::is_null) {
            return Err(ModelError::MissingId { position });
        }
        systems.push(serde_json::from_value::<CheckedSystem>(record)?);
    }

    if keyed {
        systems.sort_by_key(|system| system.id);
    }

    Ok(systems)
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Backend timestamps are ISO 8601, with or without an offset. Naive ones are UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub(crate) fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| naive.and_utc())
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub(crate) fn deserialize_option<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse(&raw))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
