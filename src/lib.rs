//! Pairs up people who have not met before.
//!
//! A round builds a compatibility graph from the active participants and the
//! history of earlier pairings, takes a maximum matching over it, and folds
//! an odd participant into a triad. [`workflow::run`] is the pure entry
//! point; [`db`], [`web`] and [`notify`] are the storage, review service and
//! delivery around it.

pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod history;
pub mod matching;
pub mod notify;
pub mod output;
pub mod participant;
pub mod triad;
pub mod web;
pub mod workflow;

pub use error::{DbError, MatchError};
pub use history::{HistoryIndex, HistoryRecord};
pub use output::MatchRecord;
pub use participant::Participant;
pub use workflow::{run, MatchOutcome};
