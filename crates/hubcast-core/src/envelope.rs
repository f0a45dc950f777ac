//! Transport envelopes.
//!
//! Every SSE `data:` payload is one JSON object tagged by `type`. Counts go
//! out as decimal strings (`"hubCount": "42"`) and come back in as either
//! strings or numbers. Timestamps are RFC 3339 UTC with a `Z` suffix and
//! only as many fractional digits as the value needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EnvelopeError;
use crate::events::{CellCount, DecodedEvent};

/// One JSON frame on the stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// A single cell update.
    HubCount {
        /// Receipt time on the relay.
        #[serde(with = "ts")]
        ts: DateTime<Utc>,
        /// Cell key.
        #[serde(alias = "geoHash")]
        geohash: String,
        /// Count for the cell.
        #[serde(rename = "hubCount", with = "wire_count")]
        hub_count: u64,
    },
    /// A batch of cell updates sharing one timestamp.
    HubCountBulk {
        /// Timestamp carried by the bulk message.
        #[serde(with = "ts")]
        ts: DateTime<Utc>,
        /// `[[geohash, count], ...]` in message order.
        #[serde(with = "wire_items")]
        items: Vec<CellCount>,
    },
    /// Sent once before the relay closes a stream it can no longer serve.
    Error {
        /// Human-readable reason.
        message: String,
    },
    /// Any `type` this build does not know. Skipped by consumers.
    #[serde(other)]
    Unknown,
}

impl Envelope {
    /// Stream-closing error frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Parse one frame payload.
    pub fn parse(data: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(data)?)
    }

    /// Serialize for a `data:` line.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire `type` tag.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::HubCount { .. } => "hub_count",
            Self::HubCountBulk { .. } => "hub_count_bulk",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }

    /// The count update this envelope carries, if any.
    pub fn into_event(self) -> Option<DecodedEvent> {
        match self {
            Self::HubCount {
                ts,
                geohash,
                hub_count,
            } => Some(DecodedEvent::SingleUpdate {
                geohash,
                count: hub_count,
                observed_at: ts,
            }),
            Self::HubCountBulk { ts, items } => Some(DecodedEvent::BulkUpdate {
                observed_at: ts,
                items,
            }),
            Self::Error { .. } | Self::Unknown => None,
        }
    }
}

impl From<&DecodedEvent> for Envelope {
    fn from(event: &DecodedEvent) -> Self {
        match event {
            DecodedEvent::SingleUpdate {
                geohash,
                count,
                observed_at,
            } => Self::HubCount {
                ts: *observed_at,
                geohash: geohash.clone(),
                hub_count: *count,
            },
            DecodedEvent::BulkUpdate { observed_at, items } => Self::HubCountBulk {
                ts: *observed_at,
                items: items.clone(),
            },
        }
    }
}

impl From<DecodedEvent> for Envelope {
    fn from(event: DecodedEvent) -> Self {
        match event {
            DecodedEvent::SingleUpdate {
                geohash,
                count,
                observed_at,
            } => Self::HubCount {
                ts: observed_at,
                geohash,
                hub_count: count,
            },
            DecodedEvent::BulkUpdate { observed_at, items } => Self::HubCountBulk {
                ts: observed_at,
                items,
            },
        }
    }
}

mod ts {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}

mod wire_count {
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(count: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(count)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        match Count::deserialize(d)? {
            Count::Number(n) => Ok(n),
            Count::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(de::Error::custom(format!(
                        "count {text:?} is not an unsigned integer"
                    )));
                }
                trimmed.parse().map_err(de::Error::custom)
            }
        }
    }
}

mod wire_items {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::events::CellCount;

    #[derive(Serialize)]
    struct ItemRef<'a>(&'a str, String);

    #[derive(Deserialize)]
    struct Item(String, #[serde(deserialize_with = "super::wire_count::deserialize")] u64);

    pub fn serialize<S: Serializer>(items: &[CellCount], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(
            items
                .iter()
                .map(|cell| ItemRef(&cell.geohash, cell.count.to_string())),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<CellCount>, D::Error> {
        let items = Vec::<Item>::deserialize(d)?;
        Ok(items
            .into_iter()
            .map(|Item(geohash, count)| CellCount { geohash, count })
            .collect())
    }
}
