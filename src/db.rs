use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::{
    error::DbError,
    history::{HistoryIndex, HistoryRecord},
    output::MatchRecord,
    participant::{normalize_id, Participant},
    workflow::MatchOutcome,
};

/// A participant as stored, with the review flag deciding whether they take
/// part in the next round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPerson {
    #[serde(flatten)]
    pub participant: Participant,
    pub include: bool,
}

/// One saved round. A round only counts towards history once approved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Round {
    pub generation: i64,
    pub created_at: String,
    pub approved: bool,
    pub records: Vec<MatchRecord>,
}

const CREATE_TABLE_PEOPLE: &str = "CREATE TABLE IF NOT EXISTS people (
    email text primary key,
    name text not null,
    include boolean not null default TRUE,
    attributes text not null default '{}'
)";

const CREATE_TABLE_GENERATIONS: &str = "CREATE TABLE IF NOT EXISTS generations (
    id integer primary key,
    created_at text not null,
    approved_at text
)";

const CREATE_TABLE_MATCHES: &str = "CREATE TABLE IF NOT EXISTS matches (
    generation integer not null,
    position integer not null,
    match_type text not null,
    person_a text not null,
    person_b text not null,
    person_c text,
    record text not null,
    primary key(generation, position),
    foreign key(generation) references generations(id)
)";

const CREATE_TABLE_HISTORY: &str = "CREATE TABLE IF NOT EXISTS history (
    person_a text not null,
    person_b text not null,
    times_met integer not null,
    primary key(person_a, person_b)
)";

const UPSERT_HISTORY: &str = "INSERT INTO history (person_a, person_b, times_met)
    VALUES (?1, ?2, 1)
    ON CONFLICT (person_a, person_b) DO UPDATE SET times_met = times_met + 1";

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &std::path::Path) -> Result<Database, DbError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Database, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Database, DbError> {
        let db = Database {
            connection: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        let creations = [
            CREATE_TABLE_PEOPLE,
            CREATE_TABLE_GENERATIONS,
            CREATE_TABLE_MATCHES,
            CREATE_TABLE_HISTORY,
        ];
        for creation in creations {
            conn.execute(creation, [])?;
        }
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.connection.lock().map_err(|_| DbError::Poisoned)
    }

    /// Inserts or replaces a participant's name and attributes. The include
    /// flag of an existing row is left as it was.
    pub fn upsert_person(&self, participant: &Participant) -> Result<(), DbError> {
        let attributes = serde_json::to_string(&participant.attributes)?;
        self.conn()?.execute(
            "INSERT INTO people (email, name, include, attributes) VALUES (?1, ?2, TRUE, ?3)
             ON CONFLICT (email) DO UPDATE
             SET name = excluded.name, attributes = excluded.attributes",
            params![normalize_id(&participant.email), participant.name, attributes],
        )?;
        Ok(())
    }

    /// Returns `false` when nobody has that email.
    pub fn set_included(&self, email: &str, include: bool) -> Result<bool, DbError> {
        let updated = self.conn()?.execute(
            "UPDATE people SET include = ?1 WHERE email = ?2",
            params![include, normalize_id(email)],
        )?;
        Ok(updated > 0)
    }

    pub fn find_person(&self, email: &str) -> Result<Option<StoredPerson>, DbError> {
        let row = self
            .conn()?
            .query_row(
                "select p.email, p.name, p.include, p.attributes from people p
                 where p.email = ?1",
                [normalize_id(email)],
                person_columns,
            )
            .optional()?;
        row.map(stored_person).transpose()
    }

    pub fn all_people(&self) -> Result<Vec<StoredPerson>, DbError> {
        self.people(
            "select p.email, p.name, p.include, p.attributes from people p order by p.rowid",
        )
    }

    pub fn included_people(&self) -> Result<Vec<Participant>, DbError> {
        let people = self.people(
            "select p.email, p.name, p.include, p.attributes from people p
             where p.include = TRUE order by p.rowid",
        )?;
        Ok(people.into_iter().map(|p| p.participant).collect())
    }

    fn people(&self, query: &str) -> Result<Vec<StoredPerson>, DbError> {
        let conn = self.conn()?;
        let mut stmnt = conn.prepare(query)?;
        let rows = stmnt
            .query_map([], person_columns)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(stored_person).collect()
    }

    /// Adds raw history rows, skipping malformed ones. Returns how many rows
    /// were stored.
    pub fn import_history(&self, records: &[HistoryRecord]) -> Result<usize, DbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut stored = 0;
        for record in records {
            let (Some(a), Some(b)) = (record.person_a.as_deref(), record.person_b.as_deref()) else {
                continue;
            };
            let Some((a, b)) = ordered_pair(a, b) else {
                continue;
            };
            tx.execute(UPSERT_HISTORY, params![a, b])?;
            stored += 1;
        }
        tx.commit()?;
        tracing::debug!(stored, total = records.len(), "imported history");
        Ok(stored)
    }

    pub fn history_records(&self) -> Result<Vec<HistoryRecord>, DbError> {
        let conn = self.conn()?;
        let mut stmnt = conn.prepare("select person_a, person_b from history")?;
        let records = stmnt
            .query_map([], |row| {
                Ok(HistoryRecord {
                    person_a: row.get(0)?,
                    person_b: row.get(1)?,
                    date: None,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn history_index(&self) -> Result<HistoryIndex, DbError> {
        Ok(HistoryIndex::from_records(&self.history_records()?))
    }

    /// Stores a round as a new, unapproved generation. History is left alone
    /// until [`Database::approve_round`] is called for it.
    pub fn save_round(&self, outcome: &MatchOutcome) -> Result<i64, DbError> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO generations (created_at) VALUES (?1)",
            [&created_at],
        )?;
        let generation = tx.last_insert_rowid();

        for (position, record) in outcome.records.iter().enumerate() {
            let members = record.members();
            let ids: Vec<&str> = members.iter().map(|p| p.id()).collect();
            tx.execute(
                "INSERT INTO matches
                 (generation, position, match_type, person_a, person_b, person_c, record)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    generation,
                    position as i64,
                    record.kind(),
                    ids[0],
                    ids[1],
                    ids.get(2).copied(),
                    serde_json::to_string(record)?,
                ],
            )?;
        }

        tx.commit()?;
        tracing::info!(generation, records = outcome.records.len(), "saved matching round");
        Ok(generation)
    }

    /// Marks a generation as approved and records every pairing in it as
    /// history. Returns `false` without touching history when the generation
    /// is unknown or was already approved.
    pub fn approve_round(&self, generation: i64) -> Result<bool, DbError> {
        let approved_at = chrono::Utc::now().to_rfc3339();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE generations SET approved_at = ?1 WHERE id = ?2 AND approved_at IS NULL",
            params![approved_at, generation],
        )?;
        if updated == 0 {
            return Ok(false);
        }

        let groups = {
            let mut stmt = tx.prepare(
                "select m.person_a, m.person_b, m.person_c from matches m
                 where m.generation = ?1 order by m.position",
            )?;
            let rows = stmt
                .query_map([generation], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        for (a, b, c) in &groups {
            let ids: Vec<&str> = [Some(a.as_str()), Some(b.as_str()), c.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            for (i, a) in ids.iter().enumerate() {
                for b in &ids[i + 1..] {
                    if let Some((a, b)) = ordered_pair(a, b) {
                        tx.execute(UPSERT_HISTORY, params![a, b])?;
                    }
                }
            }
        }

        tx.commit()?;
        tracing::info!(generation, groups = groups.len(), "approved matching round");
        Ok(true)
    }

    pub fn latest_generation(&self) -> Result<Option<i64>, DbError> {
        let latest = self
            .conn()?
            .query_row("select max(id) from generations", [], |r| r.get(0))?;
        Ok(latest)
    }

    pub fn latest_round(&self) -> Result<Option<Round>, DbError> {
        let Some(generation) = self.latest_generation()? else {
            return Ok(None);
        };
        let conn = self.conn()?;
        let (created_at, approved_at): (String, Option<String>) = conn.query_row(
            "select created_at, approved_at from generations where id = ?1",
            [generation],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let mut stmt = conn
            .prepare("select m.record from matches m where m.generation = ?1 order by m.position")?;
        let raw = stmt
            .query_map([generation], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let records = raw
            .iter()
            .map(|r| serde_json::from_str(r))
            .collect::<Result<Vec<MatchRecord>, _>>()?;
        Ok(Some(Round {
            generation,
            created_at,
            approved: approved_at.is_some(),
            records,
        }))
    }
}

type PersonColumns = (String, String, bool, String);

fn person_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersonColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn stored_person(
    (email, name, include, attributes): PersonColumns,
) -> Result<StoredPerson, DbError> {
    Ok(StoredPerson {
        participant: Participant {
            email,
            name,
            attributes: serde_json::from_str(&attributes)?,
        },
        include,
    })
}

fn ordered_pair(a: &str, b: &str) -> Option<(String, String)> {
    let (a, b) = (normalize_id(a), normalize_id(b));
    if a.is_empty() || b.is_empty() || a == b {
        None
    } else if a < b {
        Some((a, b))
    } else {
        Some((b, a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn people_keep_include_flag_across_upserts() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_person(&Participant::new("a@x.io", "A")).unwrap();
        assert!(db.set_included("A@x.io", false).unwrap());
        db.upsert_person(&Participant::new("a@x.io", "Ada").with_attribute("team", "core"))
            .unwrap();

        let stored = db.find_person("a@x.io").unwrap().unwrap();
        assert_eq!(stored.participant.name, "Ada");
        assert_eq!(stored.participant.attributes["team"], "core");
        assert!(!stored.include);
        assert!(db.included_people().unwrap().is_empty());
    }

    #[test]
    fn unknown_person_is_not_toggled() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.set_included("nobody@x.io", true).unwrap());
        assert!(db.find_person("nobody@x.io").unwrap().is_none());
    }

    #[test]
    fn history_import_is_normalized() {
        let db = Database::open_in_memory().unwrap();
        let stored = db
            .import_history(&[
                HistoryRecord::new("B@x.io", "a@x.io"),
                HistoryRecord::new("a@x.io", "a@x.io"),
                HistoryRecord {
                    person_a: Some("c@x.io".to_owned()),
                    person_b: None,
                    date: None,
                },
            ])
            .unwrap();
        assert_eq!(stored, 1);
        assert_eq!(
            db.history_records().unwrap(),
            vec![HistoryRecord::new("a@x.io", "b@x.io")]
        );
    }

    #[test]
    fn no_round_before_first_save() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.latest_generation().unwrap(), None);
        assert!(db.latest_round().unwrap().is_none());
        assert!(!db.approve_round(1).unwrap());
    }

    #[test]
    fn approving_counts_each_meeting_once() {
        let db = Database::open_in_memory().unwrap();
        for (email, name) in [("a@x.io", "A"), ("b@x.io", "B"), ("c@x.io", "C")] {
            db.upsert_person(&Participant::new(email, name)).unwrap();
        }
        let outcome =
            crate::workflow::run(&db.included_people().unwrap(), &HistoryIndex::default())
                .unwrap();
        let generation = db.save_round(&outcome).unwrap();
        assert!(db.history_records().unwrap().is_empty());
        assert!(!db.latest_round().unwrap().unwrap().approved);

        assert!(db.approve_round(generation).unwrap());
        assert!(!db.approve_round(generation).unwrap());
        assert!(db.latest_round().unwrap().unwrap().approved);

        let times: Vec<i64> = db
            .conn()
            .unwrap()
            .prepare("select times_met from history order by person_a, person_b")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(times, vec![1, 1, 1]);
    }
}
