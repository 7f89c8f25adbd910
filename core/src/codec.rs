//! JSON encoding and decoding with client-wide conventions.
//!
//! # Design
//! Payload types use plain serde derives. Key case is applied by rewriting
//! the intermediate `serde_json::Value`, so the same codec works for every
//! type and is fixed once at client construction. With default keys no
//! rewriting happens and bytes go straight through serde_json.
//!
//! Dates are only touched where a field opts in with
//! `#[serde(with = "endpoint_core::codec::date")]`. While a `JsonCodec`
//! encodes or decodes, such fields are written and read in the codec's
//! `DateStrategy`; everywhere else they use RFC 3339. Ordinary strings are
//! never reinterpreted.

use std::cell::RefCell;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use heck::{ToLowerCamelCase, ToSnakeCase};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{NetworkError, Result};

/// How object keys differ between Rust values and the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Keys travel exactly as serde produces them.
    #[default]
    UseDefaultKeys,
    /// camelCase in memory, snake_case on the wire.
    SnakeCaseWire,
    /// snake_case in memory, camelCase on the wire.
    CamelCaseWire,
}

impl KeyStrategy {
    fn to_wire(self, key: &str) -> String {
        match self {
            KeyStrategy::UseDefaultKeys => key.to_string(),
            KeyStrategy::SnakeCaseWire => key.to_snake_case(),
            KeyStrategy::CamelCaseWire => key.to_lower_camel_case(),
        }
    }

    fn from_wire(self, key: &str) -> String {
        match self {
            KeyStrategy::UseDefaultKeys => key.to_string(),
            KeyStrategy::SnakeCaseWire => key.to_lower_camel_case(),
            KeyStrategy::CamelCaseWire => key.to_snake_case(),
        }
    }
}

/// Text format of dates on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStrategy {
    #[default]
    Rfc3339,
    Rfc2822,
    /// A chrono `strftime` pattern. Patterns without an offset are read as UTC.
    Formatted(String),
}

impl DateStrategy {
    /// Check that a `Formatted` pattern only uses known specifiers.
    pub fn validate(&self) -> Result<()> {
        if let DateStrategy::Formatted(pattern) = self {
            let invalid = chrono::format::StrftimeItems::new(pattern)
                .any(|item| matches!(item, chrono::format::Item::Error));
            if invalid {
                return Err(NetworkError::Encoding(format!(
                    "invalid date pattern `{pattern}`"
                )));
            }
        }
        Ok(())
    }

    pub fn render(&self, date: &DateTime<Utc>) -> std::result::Result<String, String> {
        match self {
            DateStrategy::Rfc3339 => Ok(date.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            DateStrategy::Rfc2822 => Ok(date.to_rfc2822()),
            DateStrategy::Formatted(pattern) => {
                let mut text = String::new();
                write!(text, "{}", date.format(pattern))
                    .map_err(|_| format!("invalid date pattern `{pattern}`"))?;
                Ok(text)
            }
        }
    }

    pub fn parse(&self, text: &str) -> std::result::Result<DateTime<Utc>, String> {
        let parsed = match self {
            DateStrategy::Rfc3339 => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|date| date.with_timezone(&Utc)),
            DateStrategy::Rfc2822 => DateTime::parse_from_rfc2822(text)
                .ok()
                .map(|date| date.with_timezone(&Utc)),
            DateStrategy::Formatted(pattern) => parse_formatted(text, pattern),
        };
        parsed.ok_or_else(|| format!("`{text}` is not a {self:?} date"))
    }
}

fn parse_formatted(text: &str, pattern: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_str(text, pattern) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, pattern)
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

thread_local! {
    static ACTIVE_DATES: RefCell<DateStrategy> = RefCell::new(DateStrategy::Rfc3339);
}

/// Run `f` with `dates` as the strategy seen by `date` fields on this thread.
fn with_dates<T>(dates: &DateStrategy, f: impl FnOnce() -> T) -> T {
    struct Restore(DateStrategy);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = std::mem::take(&mut self.0);
            ACTIVE_DATES.with(|active| *active.borrow_mut() = previous);
        }
    }

    let previous = ACTIVE_DATES.with(|active| active.replace(dates.clone()));
    let _restore = Restore(previous);
    f()
}

/// Serde adapter for `DateTime<Utc>` fields that follow the client's
/// `DateStrategy`.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Event {
///     #[serde(with = "endpoint_core::codec::date")]
///     starts_at: DateTime<Utc>,
/// }
/// ```
pub mod date {
    use chrono::{DateTime, Utc};
    use serde::{de, ser, Deserialize, Deserializer, Serializer};

    use super::ACTIVE_DATES;

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        let text = ACTIVE_DATES
            .with(|active| active.borrow().render(date))
            .map_err(ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        ACTIVE_DATES
            .with(|active| active.borrow().parse(&text))
            .map_err(de::Error::custom)
    }

    /// Same as the parent module for `Option<DateTime<Utc>>`. Pair it with
    /// `#[serde(default)]` if the field may be missing.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            date: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => super::serialize(date, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(with = "super")] DateTime<Utc>);

            let wrapped = Option::<Wrapped>::deserialize(deserializer)?;
            Ok(wrapped.map(|Wrapped(date)| date))
        }
    }
}

/// Encoder/decoder shared by every request a client makes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonCodec {
    keys: KeyStrategy,
    dates: DateStrategy,
}

impl JsonCodec {
    pub fn new(keys: KeyStrategy, dates: DateStrategy) -> Self {
        Self { keys, dates }
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.keys
    }

    pub fn date_strategy(&self) -> &DateStrategy {
        &self.dates
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        with_dates(&self.dates, || {
            if self.keys == KeyStrategy::UseDefaultKeys {
                return serde_json::to_vec(value).map_err(encoding_error);
            }
            let value = serde_json::to_value(value).map_err(encoding_error)?;
            serde_json::to_vec(&rewrite_keys(value, &|key| self.keys.to_wire(key)))
                .map_err(encoding_error)
        })
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        with_dates(&self.dates, || {
            if self.keys == KeyStrategy::UseDefaultKeys {
                return serde_json::from_slice(bytes).map_err(decoding_error);
            }
            let value: Value = serde_json::from_slice(bytes).map_err(decoding_error)?;
            serde_json::from_value(rewrite_keys(value, &|key| self.keys.from_wire(key)))
                .map_err(decoding_error)
        })
    }

    /// Flatten `query` into ordered name/value pairs.
    ///
    /// `query` must serialize to an object. Null fields are dropped, arrays
    /// expand into one pair per element under the same name, scalars are
    /// stringified. Nested objects are rejected.
    pub fn encode_query<T: Serialize + ?Sized>(&self, query: &T) -> Result<Vec<(String, String)>> {
        let value = with_dates(&self.dates, || serde_json::to_value(query)).map_err(encoding_error)?;
        let Value::Object(fields) = value else {
            return Err(NetworkError::Encoding(
                "query must serialize to an object".to_string(),
            ));
        };

        let mut items = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let name = self.keys.to_wire(&name);
            match value {
                Value::Array(elements) => {
                    for element in elements {
                        if let Some(text) = query_text(&name, element)? {
                            items.push((name.clone(), text));
                        }
                    }
                }
                other => {
                    if let Some(text) = query_text(&name, other)? {
                        items.push((name, text));
                    }
                }
            }
        }
        Ok(items)
    }
}

fn query_text(name: &str, value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Array(_) | Value::Object(_) => Err(NetworkError::Encoding(format!(
            "query field `{name}` is nested"
        ))),
    }
}

fn rewrite_keys<K>(value: Value, key: &K) -> Value
where
    K: Fn(&str) -> String,
{
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(name, field)| (key(&name), rewrite_keys(field, key)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|item| rewrite_keys(item, key)).collect()),
        other => other,
    }
}

fn encoding_error(err: serde_json::Error) -> NetworkError {
    NetworkError::Encoding(err.to_string())
}

fn decoding_error(err: serde_json::Error) -> NetworkError {
    NetworkError::Decoding(err.to_string())
}
