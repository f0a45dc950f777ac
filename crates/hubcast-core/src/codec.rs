//! Channel message decoding.
//!
//! Two wire forms share one channel, told apart only by the presence of a comma:
//!
//! - single: `"<geohash>:<count>"`
//! - bulk: `"<epochSeconds>,<geohash>:<count>,<geohash>:<count>,..."`
//!
//! Tokens are trimmed of surrounding whitespace. Counts must be base-10
//! unsigned integers; anything else rejects the whole message, so a bulk
//! update is either applied completely or not at all.

use chrono::{DateTime, Utc};

use crate::errors::CodecError;
use crate::events::{CellCount, DecodedEvent};

/// Separator between bulk fields.
const FIELD_SEPARATOR: char = ',';
/// Separator between a geohash and its count.
const PAIR_SEPARATOR: char = ':';

/// Decode one raw channel message.
///
/// `received_at` stamps single-form messages, which carry no timestamp of
/// their own. It is ignored for the bulk form.
pub fn decode(raw: &str, received_at: DateTime<Utc>) -> Result<DecodedEvent, CodecError> {
    if raw.contains(FIELD_SEPARATOR) {
        decode_bulk(raw)
    } else {
        let cell = parse_pair(raw)?;
        Ok(DecodedEvent::SingleUpdate {
            geohash: cell.geohash,
            count: cell.count,
            observed_at: received_at,
        })
    }
}

fn decode_bulk(raw: &str) -> Result<DecodedEvent, CodecError> {
    let mut fields = raw.split(FIELD_SEPARATOR);
    // split() always yields at least one field
    let ts_field = fields.next().unwrap_or_default();
    let observed_at = parse_epoch_seconds(ts_field)?;
    let items = fields.map(parse_pair).collect::<Result<Vec<_>, _>>()?;
    Ok(DecodedEvent::BulkUpdate { observed_at, items })
}

fn parse_pair(token: &str) -> Result<CellCount, CodecError> {
    let (geohash, count) = token
        .split_once(PAIR_SEPARATOR)
        .ok_or_else(|| CodecError::missing_pair(token))?;
    let geohash = geohash.trim();
    let count = count.trim();
    if geohash.is_empty() || count.is_empty() {
        return Err(CodecError::missing_pair(token));
    }
    Ok(CellCount::new(geohash, parse_count(count)?))
}

fn parse_count(token: &str) -> Result<u64, CodecError> {
    // u64::from_str also takes a leading '+'
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::invalid_count(token));
    }
    token
        .parse::<u64>()
        .map_err(|_| CodecError::invalid_count(token))
}

fn parse_epoch_seconds(token: &str) -> Result<DateTime<Utc>, CodecError> {
    let trimmed = token.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::invalid_timestamp(token));
    }
    trimmed
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| CodecError::invalid_timestamp(token))
}
