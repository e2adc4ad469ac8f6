use serde::Serialize;

use crate::{
    error::MatchError,
    graph::Graph,
    history::HistoryIndex,
    matching::maximum_matching_ids,
    output::{format_records, updated_history, MatchRecord},
    participant::{dedupe, Participant},
    triad,
};

/// Everything one round produces. Nothing here is persisted; the caller
/// stores `updated_history` for it to affect later rounds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchOutcome {
    pub records: Vec<MatchRecord>,
    pub updated_history: HistoryIndex,
    pub unmatched: Vec<Participant>,
    pub triad_fallback: bool,
}

impl MatchOutcome {
    pub fn pair_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, MatchRecord::Pair { .. }))
            .count()
    }

    pub fn triad_count(&self) -> usize {
        self.records.len() - self.pair_count()
    }
}

/// Runs one matching round over `participants` given prior `history`.
///
/// Duplicate identifiers are dropped (first one wins). Fewer than two
/// participants produce an empty outcome rather than an error.
pub fn run(
    participants: &[Participant],
    history: &HistoryIndex,
) -> Result<MatchOutcome, MatchError> {
    let participants = dedupe(participants);
    if participants.len() < 2 {
        tracing::info!(count = participants.len(), "not enough participants to match");
        return Ok(MatchOutcome {
            updated_history: history.clone(),
            unmatched: participants,
            ..MatchOutcome::default()
        });
    }

    let graph = Graph::build(&participants, history);
    let pairs = maximum_matching_ids(&graph);
    let resolution = triad::resolve(pairs, &participants, history);

    let records = format_records(&resolution, &participants)?;
    let unmatched = participants
        .iter()
        .filter(|p| resolution.unmatched.iter().any(|id| id == p.id()))
        .cloned()
        .collect();
    let outcome = MatchOutcome {
        records,
        updated_history: updated_history(history, &resolution),
        unmatched,
        triad_fallback: resolution.triad.as_ref().is_some_and(|t| t.repeat_connection),
    };

    tracing::info!(
        participants = participants.len(),
        pairs = outcome.pair_count(),
        triads = outcome.triad_count(),
        unmatched = outcome.unmatched.len(),
        triad_fallback = outcome.triad_fallback,
        "matching round complete"
    );
    Ok(outcome)
}
