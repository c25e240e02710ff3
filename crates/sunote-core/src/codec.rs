//! JSON interchange format for backups.
//!
//! ```json
//! [
//!   { "id": 1, "title": "Buy milk", "content": "2%", "createdAt": 1700000000000, "dueAt": null }
//! ]
//! ```
//!
//! Encoding always writes all five keys. Decoding is lenient per field but
//! strict about the envelope: anything other than an array of objects fails
//! the whole batch.

use log::warn;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Note};

type Record = Map<String, Value>;

/// A note as written to a backup file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NoteRecord<'a> {
    id: i64,
    title: &'a str,
    content: &'a str,
    created_at: i64,
    /// Serialized as an explicit `null` when absent.
    due_at: Option<i64>,
}

impl<'a> From<&'a Note> for NoteRecord<'a> {
    fn from(note: &'a Note) -> Self {
        Self {
            id: note.id,
            title: &note.title,
            content: &note.content,
            created_at: note.created_at,
            due_at: note.due_at,
        }
    }
}

/// Serialize notes as a pretty-printed (2-space) UTF-8 JSON array.
pub fn encode_notes(notes: &[Note]) -> Result<Vec<u8>, Error> {
    let records: Vec<NoteRecord<'_>> = notes.iter().map(NoteRecord::from).collect();
    serde_json::to_vec_pretty(&records)
        .map_err(|e| Error::Internal(format!("failed to encode notes: {}", e)))
}

/// Parse a backup. `now` fills in a missing `createdAt`.
///
/// Missing `id` becomes 0 (a fresh id is assigned on insert), missing
/// `title`/`content` become empty, and a `dueAt` that is null or absent
/// means no due date. Imported notes get `updated_at = created_at`.
pub fn decode_notes(bytes: &[u8], now: i64) -> Result<Vec<Note>, Error> {
    let records: Vec<Record> = serde_json::from_slice(bytes)
        .map_err(|e| Error::Decode(format!("expected a JSON array of note objects: {}", e)))?;

    Ok(records
        .iter()
        .enumerate()
        .map(|(index, record)| decode_record(index, record, now))
        .collect())
}

fn decode_record(index: usize, record: &Record, now: i64) -> Note {
    let created_at = int_field(index, record, "createdAt").unwrap_or(now);
    Note {
        id: int_field(index, record, "id").unwrap_or(0),
        title: string_field(record, "title"),
        content: string_field(record, "content"),
        created_at,
        updated_at: created_at,
        due_at: int_field(index, record, "dueAt"),
    }
}

/// Integer field, accepting numeric strings. Null, absent and unusable
/// values all come back as `None`.
fn int_field(index: usize, record: &Record, key: &str) -> Option<i64> {
    let parsed = match record.get(key)? {
        Value::Null => return None,
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if parsed.is_none() {
        warn!("ignoring unusable \"{}\" in note #{} of import", key, index);
    }
    parsed
}

/// Whole-number floats such as `1.7e12`; fractions and values outside
/// the `i64` range are refused.
fn integral(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or above it overflows.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && f >= -LIMIT && f < LIMIT).then_some(f as i64)
}

/// String field; scalars are rendered as text, anything else is empty.
fn string_field(record: &Record, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
