use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Someone taking part in a matching round.
///
/// `email` is the identifier and is always stored trimmed and lower-cased.
/// Any other columns the caller supplied are kept in `attributes` and are
/// flattened back into the serialized record untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub email: String,
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Participant {
    pub fn new(email: &str, name: &str) -> Participant {
        Participant {
            email: normalize_id(email),
            name: name.trim().to_owned(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Participant {
        self.attributes.insert(key.to_owned(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.email
    }

    /// Builds a participant from a loose, sheet-style row.
    ///
    /// Column names are matched case-insensitively, blank and null cells are
    /// dropped, and an `include` column is consumed rather than echoed. Returns
    /// `None` when the row has no email or is explicitly excluded.
    pub fn from_record(record: Map<String, Value>) -> Option<Participant> {
        let (participant, include) = Participant::parse_record(record)?;
        include.unwrap_or(true).then_some(participant)
    }

    /// Like [`Participant::from_record`], but keeps excluded rows and hands the
    /// `include` column back separately (`None` when the row has none).
    pub fn parse_record(record: Map<String, Value>) -> Option<(Participant, Option<bool>)> {
        let mut email = None;
        let mut name = None;
        let mut include = None;
        let mut attributes = Map::new();

        for (key, value) in record {
            if is_blank(&value) {
                continue;
            }
            match key.trim().to_lowercase().as_str() {
                "email" => email = value_to_string(&value),
                "name" => name = value_to_string(&value),
                "include" => include = Some(is_truthy(&value)),
                _ => {
                    attributes.insert(key, value);
                }
            }
        }

        let email = normalize_id(&email?);
        if email.is_empty() {
            return None;
        }

        let participant = Participant {
            email,
            name: name.unwrap_or_default().trim().to_owned(),
            attributes,
        };
        Some((participant, include))
    }
}

pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Drops participants with an empty identifier and every repeat of an
/// identifier after its first occurrence. Input order is preserved.
pub fn dedupe(participants: &[Participant]) -> Vec<Participant> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(participants.len());
    for participant in participants {
        let id = normalize_id(&participant.email);
        if id.is_empty() {
            tracing::warn!(name = %participant.name, "skipping participant without an email");
            continue;
        }
        if !seen.insert(id.clone()) {
            tracing::warn!(email = %id, "dropping duplicate participant");
            continue;
        }
        let mut participant = participant.clone();
        participant.email = id;
        kept.push(participant);
    }
    kept
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "false" | "no" | "n" | "0" | "off"
        ),
        _ => true,
    }
}
