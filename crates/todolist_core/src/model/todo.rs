//! Todo item model and its serialization contract.
//!
//! # Responsibility
//! - Define the canonical `TodoItem` record.
//! - Convert items to and from the flat field mapping used by adapters and
//!   storage engines.
//!
//! # Invariants
//! - Timestamps are held in UTC at microsecond precision so that the text
//!   form round-trips losslessly.
//! - Text timestamps are fixed width, so text ordering equals time ordering.
//! - `updated_at` only moves forward (see [`TodoItem::touch`]).

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Fractional-second digits kept on every timestamp.
pub const TIMESTAMP_SUBSEC_DIGITS: u16 = 6;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];

/// Errors raised while building or decoding a `TodoItem`.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid timestamp `{0}`; expected ISO-8601")]
    InvalidTimestamp(String),
    #[error("updated_at ({updated_at}) must be >= created_at ({created_at})")]
    TimestampOrder {
        created_at: String,
        updated_at: String,
    },
    #[error("invalid todo item shape: {0}")]
    Shape(#[from] serde_json::Error),
}

/// A timestamp given either as text or as an already-parsed value.
///
/// Parsing an already-parsed value is a no-op, so decoding is idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampInput {
    Text(String),
    Parsed(DateTime<Utc>),
}

impl TimestampInput {
    /// Resolves the input into a normalized UTC timestamp.
    pub fn resolve(&self) -> Result<DateTime<Utc>, ModelError> {
        match self {
            Self::Text(text) => parse_timestamp(text),
            Self::Parsed(value) => Ok(value.trunc_subsecs(TIMESTAMP_SUBSEC_DIGITS)),
        }
    }
}

impl From<&str> for TimestampInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TimestampInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for TimestampInput {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Parsed(value)
    }
}

/// Canonical task record.
///
/// An empty `id` means "not yet assigned"; the service always assigns one
/// before persistence and backends fill it defensively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTodoItem")]
pub struct TodoItem {
    pub id: String,
    pub title: String,
    pub completed: bool,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl TodoItem {
    /// Creates an item stamped with the current instant.
    ///
    /// Both timestamps share one `now` value, so `created_at == updated_at`.
    pub fn new(id: impl Into<String>, title: impl Into<String>, completed: bool) -> Self {
        let now = now_timestamp();
        Self {
            id: id.into(),
            title: title.into(),
            completed,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an item from caller-supplied timestamps.
    ///
    /// Accepts text or parsed timestamps. Used by storage read paths.
    ///
    /// # Errors
    /// - `InvalidTimestamp` when a text timestamp cannot be parsed.
    /// - `TimestampOrder` when `updated_at < created_at`.
    pub fn with_timestamps(
        id: impl Into<String>,
        title: impl Into<String>,
        completed: bool,
        created_at: impl Into<TimestampInput>,
        updated_at: impl Into<TimestampInput>,
    ) -> Result<Self, ModelError> {
        let item = Self {
            id: id.into(),
            title: title.into(),
            completed,
            created_at: created_at.into().resolve()?,
            updated_at: updated_at.into().resolve()?,
        };
        item.validate()?;
        Ok(item)
    }

    /// Returns whether an id has been assigned.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// Checks the timestamp ordering invariant.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.updated_at < self.created_at {
            return Err(ModelError::TimestampOrder {
                created_at: format_timestamp(&self.created_at),
                updated_at: format_timestamp(&self.updated_at),
            });
        }
        Ok(())
    }

    /// Refreshes `updated_at` to the current instant.
    ///
    /// Coarse clocks can repeat an instant; the value then advances by one
    /// microsecond so every refresh is strictly later than the previous one.
    pub fn touch(&mut self) {
        let now = now_timestamp();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + TimeDelta::microseconds(1)
        };
    }

    /// Serializes into the flat field mapping shared by every adapter.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert("title".to_string(), Value::String(self.title.clone()));
        map.insert("completed".to_string(), Value::Bool(self.completed));
        map.insert(
            "created_at".to_string(),
            Value::String(format_timestamp(&self.created_at)),
        );
        map.insert(
            "updated_at".to_string(),
            Value::String(format_timestamp(&self.updated_at)),
        );
        map
    }

    /// Inverse of [`TodoItem::to_map`].
    ///
    /// Absent `completed` defaults to `false`; absent timestamps default to
    /// the current instant.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ModelError> {
        let raw: RawTodoItem = serde_json::from_value(Value::Object(map.clone()))?;
        Self::try_from(raw)
    }
}

#[derive(Debug, Deserialize)]
struct RawTodoItem {
    #[serde(default)]
    id: String,
    title: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl TryFrom<RawTodoItem> for TodoItem {
    type Error = ModelError;

    fn try_from(raw: RawTodoItem) -> Result<Self, Self::Error> {
        let now = now_timestamp();
        let updated_at = raw.updated_at.as_deref().map(parse_timestamp).transpose()?;
        let created_at = match raw.created_at.as_deref() {
            Some(text) => parse_timestamp(text)?,
            None => updated_at.map_or(now, |updated| updated.min(now)),
        };

        Self::with_timestamps(
            raw.id,
            raw.title,
            raw.completed,
            created_at,
            updated_at.unwrap_or(created_at),
        )
    }
}

/// Returns the current instant at model precision.
pub fn now_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(TIMESTAMP_SUBSEC_DIGITS)
}

/// Formats a timestamp as fixed-width RFC 3339 (`...T10:00:00.123456Z`).
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses an ISO-8601 timestamp into UTC.
///
/// Offset-less values are read as UTC so rows written by naive-time writers
/// still load.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, ModelError> {
    let trimmed = text.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(value
            .with_timezone(&Utc)
            .trunc_subsecs(TIMESTAMP_SUBSEC_DIGITS));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc().trunc_subsecs(TIMESTAMP_SUBSEC_DIGITS))
        .ok_or_else(|| ModelError::InvalidTimestamp(trimmed.to_string()))
}

fn serialize_timestamp<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(value))
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, parse_timestamp, TimestampInput, TodoItem};
    use chrono::{TimeZone, Utc};

    #[test]
    fn parse_accepts_offsets_and_naive_values() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();

        assert_eq!(parse_timestamp("2025-03-01T10:00:00Z").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2025-03-01T12:00:00+02:00").unwrap(),
            expected
        );
        assert_eq!(parse_timestamp("2025-03-01T10:00:00").unwrap(), expected);
        assert_eq!(
            format_timestamp(&parse_timestamp("2025-03-01T10:00:00.123456").unwrap()),
            "2025-03-01T10:00:00.123456Z"
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn format_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(format_timestamp(&whole), "2025-03-01T10:00:00.000000Z");
    }

    #[test]
    fn resolving_parsed_input_is_idempotent() {
        let parsed = parse_timestamp("2025-03-01T10:00:00.5Z").unwrap();
        let again = TimestampInput::from(parsed).resolve().unwrap();
        assert_eq!(again, parsed);
    }

    #[test]
    fn touch_is_strictly_monotonic() {
        let mut item = TodoItem::new("a", "title", false);
        let mut previous = item.updated_at;
        for _ in 0..100 {
            item.touch();
            assert!(item.updated_at > previous);
            previous = item.updated_at;
        }
        assert!(item.updated_at > item.created_at);
    }
}
