use std::collections::HashSet;

use crate::{history::HistoryIndex, participant::Participant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triad {
    /// The two members of the absorbed pair followed by the leftover.
    pub members: [String; 3],
    /// Set when no pair was history-clean for the leftover, so the triad
    /// repeats at least one earlier connection.
    pub repeat_connection: bool,
}

/// Final grouping for a round: surviving pairs, at most one triad, and
/// whoever could not be placed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub pairs: Vec<(String, String)>,
    pub triad: Option<Triad>,
    pub unmatched: Vec<String>,
}

/// Participants absent from every pair, in input order.
pub fn unmatched(pairs: &[(String, String)], participants: &[Participant]) -> Vec<String> {
    let matched: HashSet<&str> = pairs
        .iter()
        .flat_map(|(a, b)| [a.as_str(), b.as_str()])
        .collect();
    participants
        .iter()
        .map(Participant::id)
        .filter(|id| !matched.contains(id))
        .map(str::to_owned)
        .collect()
}

/// Folds `leftover` into one of `pairs`, removing that pair.
///
/// Prefers the first pair in which neither member has met `leftover`; when
/// every pair has some shared history the first pair is used anyway. Returns
/// `None` only when there are no pairs at all.
pub fn form_triad(
    pairs: &mut Vec<(String, String)>,
    leftover: &str,
    history: &HistoryIndex,
) -> Option<Triad> {
    if pairs.is_empty() {
        return None;
    }

    let clean = pairs
        .iter()
        .position(|(a, b)| !history.have_met(leftover, a) && !history.have_met(leftover, b));
    let repeat_connection = clean.is_none();
    let (a, b) = pairs.remove(clean.unwrap_or(0));

    if repeat_connection {
        tracing::info!(%leftover, "no history-clean pair left, triad repeats a connection");
    }
    Some(Triad {
        members: [a, b, leftover.to_owned()],
        repeat_connection,
    })
}

/// Applies the odd-one-out policy to a maximum matching.
///
/// With an even number of participants the matching is returned as is.
/// With an odd number, the first unmatched participant by input order is
/// folded into a pair. A sparse graph can leave more than one participant
/// unmatched; only one triad is ever formed and the rest stay in
/// `unmatched`.
pub fn resolve(
    mut pairs: Vec<(String, String)>,
    participants: &[Participant],
    history: &HistoryIndex,
) -> Resolution {
    let mut unmatched = unmatched(&pairs, participants);
    let mut triad = None;

    if participants.len() % 2 == 1 && !unmatched.is_empty() {
        let leftover = unmatched.remove(0);
        triad = form_triad(&mut pairs, &leftover, history);
        if triad.is_none() {
            unmatched.insert(0, leftover);
        }
    }

    if !unmatched.is_empty() {
        tracing::warn!(count = unmatched.len(), ?unmatched, "participants left unmatched");
    }

    Resolution {
        pairs,
        triad,
        unmatched,
    }
}
