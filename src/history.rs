use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::participant::normalize_id;

/// One row of past-pairing history.
///
/// Spreadsheet exports name the columns `Person A (Email)` and
/// `Person B (Email)`; both spellings are accepted. Anything that is not a
/// non-empty string comes through as `None` so a single bad cell does not
/// reject the whole sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(
        default,
        alias = "Person A (Email)",
        alias = "person_a_email",
        deserialize_with = "lenient_id"
    )]
    pub person_a: Option<String>,
    #[serde(
        default,
        alias = "Person B (Email)",
        alias = "person_b_email",
        deserialize_with = "lenient_id"
    )]
    pub person_b: Option<String>,
    #[serde(
        default,
        alias = "Date",
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<String>,
}

impl HistoryRecord {
    pub fn new(a: &str, b: &str) -> HistoryRecord {
        HistoryRecord {
            person_a: Some(a.to_owned()),
            person_b: Some(b.to_owned()),
            date: None,
        }
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}

/// Who has already been matched with whom.
///
/// Symmetric: every insertion goes both ways, and deserializing a one-sided
/// map restores the missing direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, BTreeSet<String>>",
    into = "BTreeMap<String, BTreeSet<String>>"
)]
pub struct HistoryIndex {
    met: BTreeMap<String, BTreeSet<String>>,
}

impl HistoryIndex {
    /// Builds the index from raw records, skipping any record that does not
    /// name two distinct participants.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a HistoryRecord>) -> HistoryIndex {
        let mut index = HistoryIndex::default();
        let mut skipped = 0usize;
        for record in records {
            match (record.person_a.as_deref(), record.person_b.as_deref()) {
                (Some(a), Some(b)) if normalize_id(a) != normalize_id(b) => {
                    index.record(a, b);
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "ignored malformed history records");
        }
        index
    }

    /// Records that `a` and `b` have met. Returns `false` when the pair was
    /// already known or does not name two distinct participants.
    pub fn record(&mut self, a: &str, b: &str) -> bool {
        let (a, b) = (normalize_id(a), normalize_id(b));
        if a.is_empty() || b.is_empty() || a == b {
            return false;
        }
        let fresh = self.met.entry(a.clone()).or_default().insert(b.clone());
        self.met.entry(b).or_default().insert(a);
        fresh
    }

    /// Ids are normalized before the lookup, so callers may pass raw emails.
    pub fn have_met(&self, a: &str, b: &str) -> bool {
        self.met
            .get(&normalize_id(a))
            .is_some_and(|met| met.contains(&normalize_id(b)))
    }

    pub fn met_with(&self, id: &str) -> impl Iterator<Item = &str> {
        self.met
            .get(&normalize_id(id))
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Number of participants with at least one recorded match.
    pub fn len(&self) -> usize {
        self.met.len()
    }

    pub fn is_empty(&self) -> bool {
        self.met.is_empty()
    }

    /// One record per unordered pair, lower identifier first.
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.met
            .iter()
            .flat_map(|(a, met)| {
                met.iter()
                    .filter(move |b| a < *b)
                    .map(move |b| HistoryRecord::new(a, b))
            })
            .collect()
    }
}

impl From<BTreeMap<String, BTreeSet<String>>> for HistoryIndex {
    fn from(map: BTreeMap<String, BTreeSet<String>>) -> Self {
        let mut index = HistoryIndex::default();
        for (a, met) in &map {
            for b in met {
                index.record(a, b);
            }
        }
        index
    }
}

impl From<HistoryIndex> for BTreeMap<String, BTreeSet<String>> {
    fn from(index: HistoryIndex) -> Self {
        index.met
    }
}
