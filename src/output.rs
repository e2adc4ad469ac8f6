//! Output payload records and the history produced by a round.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::MatchError, history::HistoryIndex, participant::Participant, triad::Resolution,
};

/// One group in the outbound payload, carrying full participant records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "match_type", rename_all = "lowercase")]
pub enum MatchRecord {
    Pair {
        person_a: Participant,
        person_b: Participant,
    },
    Triad {
        person_a: Participant,
        person_b: Participant,
        person_c: Participant,
    },
}

impl MatchRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            MatchRecord::Pair { .. } => "pair",
            MatchRecord::Triad { .. } => "triad",
        }
    }

    pub fn members(&self) -> Vec<&Participant> {
        match self {
            MatchRecord::Pair { person_a, person_b } => vec![person_a, person_b],
            MatchRecord::Triad {
                person_a,
                person_b,
                person_c,
            } => vec![person_a, person_b, person_c],
        }
    }
}

/// Renders pairs first, then the triad if there is one.
///
/// Every identifier in `resolution` must belong to `participants`; anything
/// else means the grouping and the lookup table disagree.
pub fn format_records(
    resolution: &Resolution,
    participants: &[Participant],
) -> Result<Vec<MatchRecord>, MatchError> {
    let lookup: HashMap<&str, &Participant> =
        participants.iter().map(|p| (p.id(), p)).collect();
    let find = |id: &str| {
        lookup
            .get(id)
            .map(|p| (*p).clone())
            .ok_or_else(|| MatchError::UnknownParticipant(id.to_owned()))
    };

    let mut records = Vec::with_capacity(resolution.pairs.len() + 1);
    for (a, b) in &resolution.pairs {
        records.push(MatchRecord::Pair {
            person_a: find(a)?,
            person_b: find(b)?,
        });
    }
    if let Some(triad) = &resolution.triad {
        let [a, b, c] = &triad.members;
        records.push(MatchRecord::Triad {
            person_a: find(a)?,
            person_b: find(b)?,
            person_c: find(c)?,
        });
    }
    Ok(records)
}

/// Returns `history` extended with every pairing of this round. All three
/// combinations of a triad count as having met.
pub fn updated_history(history: &HistoryIndex, resolution: &Resolution) -> HistoryIndex {
    let mut next = history.clone();
    for (a, b) in &resolution.pairs {
        next.record(a, b);
    }
    if let Some(triad) = &resolution.triad {
        let [a, b, c] = &triad.members;
        next.record(a, b);
        next.record(b, c);
        next.record(a, c);
    }
    next
}
