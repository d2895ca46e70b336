// The relational store of the results.
//
// Every import replaces all the children of an election. The surrogate keys are
// regenerated each time, the natural keys are what the readers rely on.

use std::collections::{BTreeMap, HashMap};

use election_results::*;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use uuid::Uuid;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS elections (
    id TEXT PRIMARY KEY,
    system TEXT NOT NULL,
    domain TEXT NOT NULL,
    domain_segment TEXT,
    distinct_districts INTEGER NOT NULL,
    year INTEGER NOT NULL,
    number_of_mandates INTEGER NOT NULL,
    has_expats INTEGER NOT NULL,
    completes_manually INTEGER,
    manually_completed INTEGER,
    status TEXT NOT NULL,
    absolute_majority INTEGER,
    counted_entities INTEGER NOT NULL,
    total_entities INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS election_results (
    id TEXT PRIMARY KEY,
    election_id TEXT NOT NULL REFERENCES elections(id),
    entity_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    district TEXT NOT NULL,
    counted INTEGER NOT NULL,
    eligible_voters INTEGER NOT NULL,
    expats INTEGER,
    received_ballots INTEGER NOT NULL,
    blank_ballots INTEGER NOT NULL,
    invalid_ballots INTEGER NOT NULL,
    blank_votes INTEGER NOT NULL,
    invalid_votes INTEGER NOT NULL,
    UNIQUE (election_id, entity_id)
);

CREATE TABLE IF NOT EXISTS list_connections (
    id TEXT PRIMARY KEY,
    election_id TEXT NOT NULL REFERENCES elections(id),
    connection_id TEXT NOT NULL,
    parent_id TEXT REFERENCES list_connections(id)
);

CREATE TABLE IF NOT EXISTS lists (
    id TEXT PRIMARY KEY,
    election_id TEXT NOT NULL REFERENCES elections(id),
    list_id TEXT NOT NULL,
    name TEXT NOT NULL,
    number_of_mandates INTEGER NOT NULL,
    connection_id TEXT REFERENCES list_connections(id),
    UNIQUE (election_id, list_id)
);

CREATE TABLE IF NOT EXISTS candidates (
    id TEXT PRIMARY KEY,
    election_id TEXT NOT NULL REFERENCES elections(id),
    candidate_id TEXT NOT NULL,
    family_name TEXT NOT NULL,
    first_name TEXT NOT NULL,
    elected INTEGER NOT NULL,
    party TEXT,
    list_id TEXT REFERENCES lists(id),
    gender TEXT,
    year_of_birth INTEGER,
    UNIQUE (election_id, candidate_id)
);

CREATE TABLE IF NOT EXISTS candidate_results (
    id TEXT PRIMARY KEY,
    election_result_id TEXT NOT NULL REFERENCES election_results(id),
    candidate_id TEXT NOT NULL REFERENCES candidates(id),
    votes INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS list_results (
    id TEXT PRIMARY KEY,
    election_result_id TEXT NOT NULL REFERENCES election_results(id),
    list_id TEXT NOT NULL REFERENCES lists(id),
    votes INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS panachage_results (
    id TEXT PRIMARY KEY,
    election_id TEXT NOT NULL REFERENCES elections(id),
    target TEXT NOT NULL,
    source TEXT NOT NULL,
    votes INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS candidate_panachage_results (
    id TEXT PRIMARY KEY,
    election_result_id TEXT NOT NULL REFERENCES election_results(id),
    candidate_id TEXT NOT NULL REFERENCES candidates(id),
    source TEXT NOT NULL,
    votes INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS election_colors (
    election_id TEXT NOT NULL REFERENCES elections(id),
    name TEXT NOT NULL,
    color TEXT NOT NULL,
    PRIMARY KEY (election_id, name)
);

CREATE TABLE IF NOT EXISTS party_results (
    id TEXT PRIMARY KEY,
    election_id TEXT NOT NULL REFERENCES elections(id),
    year INTEGER NOT NULL,
    party_id TEXT NOT NULL,
    name TEXT NOT NULL,
    color TEXT,
    total_votes INTEGER NOT NULL,
    number_of_mandates INTEGER NOT NULL,
    votes INTEGER NOT NULL,
    voters_count INTEGER
);

CREATE TABLE IF NOT EXISTS party_panachage_results (
    id TEXT PRIMARY KEY,
    election_id TEXT NOT NULL REFERENCES elections(id),
    target TEXT NOT NULL,
    source TEXT NOT NULL,
    votes INTEGER NOT NULL
);
";

/// The children of an election, in an order that respects the references.
///
/// The colors are not part of a generation: they are merged with the known ones.
const CHILD_TABLES: [&str; 10] = [
    "DELETE FROM candidate_panachage_results WHERE election_result_id IN
        (SELECT id FROM election_results WHERE election_id = ?1)",
    "DELETE FROM candidate_results WHERE election_result_id IN
        (SELECT id FROM election_results WHERE election_id = ?1)",
    "DELETE FROM list_results WHERE election_result_id IN
        (SELECT id FROM election_results WHERE election_id = ?1)",
    "DELETE FROM candidates WHERE election_id = ?1",
    "DELETE FROM lists WHERE election_id = ?1",
    "DELETE FROM list_connections WHERE election_id = ?1",
    "DELETE FROM election_results WHERE election_id = ?1",
    "DELETE FROM panachage_results WHERE election_id = ?1",
    "DELETE FROM party_results WHERE election_id = ?1",
    "DELETE FROM party_panachage_results WHERE election_id = ?1",
];

pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// SQLite integers are signed.
fn int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn count(row: &Row, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u64)
}

fn system_str(system: ElectionSystem) -> &'static str {
    match system {
        ElectionSystem::Majorz => "majorz",
        ElectionSystem::Proporz => "proporz",
    }
}

fn domain_str(domain: Domain) -> &'static str {
    match domain {
        Domain::Federation => "federation",
        Domain::Canton => "canton",
        Domain::Region => "region",
        Domain::District => "district",
        Domain::Municipality => "municipality",
    }
}

fn parse_system(s: &str) -> ElectionSystem {
    if s == "majorz" {
        ElectionSystem::Majorz
    } else {
        ElectionSystem::Proporz
    }
}

fn parse_domain(s: &str) -> Domain {
    match s {
        "federation" => Domain::Federation,
        "region" => Domain::Region,
        "district" => Domain::District,
        "municipality" => Domain::Municipality,
        _ => Domain::Canton,
    }
}

/// Replaces the stored results of the election by the generation of the outcome.
///
/// Nothing is touched if the outcome has errors, and false is returned. The
/// caller owns the transaction, and decides when to commit it.
pub fn commit(tx: &Transaction, election: &Election, outcome: &ImportOutcome) -> rusqlite::Result<bool> {
    if !outcome.is_ok() {
        debug!("commit: {} errors, nothing stored", outcome.errors.len());
        return Ok(false);
    }
    let generation = &outcome.generation;
    upsert_election(tx, election, generation)?;
    for sql in CHILD_TABLES.iter() {
        tx.execute(sql, [&election.id])?;
    }

    let mut result_ids: HashMap<u32, String> = HashMap::new();
    {
        let mut ins = tx.prepare(
            "INSERT INTO election_results (id, election_id, entity_id, name, district, counted,
                eligible_voters, expats, received_ballots, blank_ballots, invalid_ballots,
                blank_votes, invalid_votes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for r in generation.results.iter() {
            let id = new_id();
            ins.execute(params![
                id,
                election.id,
                r.entity_id,
                r.name,
                r.district,
                r.counted,
                int(r.eligible_voters),
                r.expats.map(int),
                int(r.received_ballots),
                int(r.blank_ballots),
                int(r.invalid_ballots),
                int(r.blank_votes),
                int(r.invalid_votes)
            ])?;
            result_ids.insert(r.entity_id, id);
        }
    }

    // The parents first.
    let mut connection_ids: HashMap<ListConnection, String> = HashMap::new();
    {
        let mut ins = tx.prepare(
            "INSERT INTO list_connections (id, election_id, connection_id, parent_id)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let (tops, subs): (Vec<&ListConnection>, Vec<&ListConnection>) =
            generation.connections.iter().partition(|c| c.parent.is_none());
        for c in tops.into_iter().chain(subs) {
            let parent_id = c
                .parent
                .as_ref()
                .and_then(|p| connection_ids.get(&ListConnection::top(p)).cloned());
            let id = new_id();
            ins.execute(params![id, election.id, c.connection_id, parent_id])?;
            connection_ids.insert(c.clone(), id);
        }
    }

    let mut list_ids: HashMap<&str, String> = HashMap::new();
    {
        let mut ins = tx.prepare(
            "INSERT INTO lists (id, election_id, list_id, name, number_of_mandates, connection_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for l in generation.lists.iter() {
            let id = new_id();
            let connection_id = l.connection.as_ref().and_then(|c| connection_ids.get(c));
            ins.execute(params![
                id,
                election.id,
                l.list_id,
                l.name,
                l.number_of_mandates,
                connection_id
            ])?;
            list_ids.insert(l.list_id.as_str(), id);
        }
    }

    let mut candidate_ids: HashMap<&str, String> = HashMap::new();
    {
        let mut ins = tx.prepare(
            "INSERT INTO candidates (id, election_id, candidate_id, family_name, first_name,
                elected, party, list_id, gender, year_of_birth)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for c in generation.candidates.iter() {
            let id = new_id();
            let list_id = c.list_id.as_deref().and_then(|l| list_ids.get(l));
            ins.execute(params![
                id,
                election.id,
                c.candidate_id,
                c.family_name,
                c.first_name,
                c.elected,
                c.party,
                list_id,
                c.gender.map(|g| g.as_str()),
                c.year_of_birth
            ])?;
            candidate_ids.insert(c.candidate_id.as_str(), id);
        }
    }

    {
        let mut ins = tx.prepare(
            "INSERT INTO candidate_results (id, election_result_id, candidate_id, votes)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in generation.candidate_results.iter() {
            if let (Some(result_id), Some(candidate_id)) = (
                result_ids.get(&r.entity_id),
                candidate_ids.get(r.candidate_id.as_str()),
            ) {
                ins.execute(params![new_id(), result_id, candidate_id, int(r.votes)])?;
            }
        }
    }

    {
        let mut ins = tx.prepare(
            "INSERT INTO list_results (id, election_result_id, list_id, votes)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in generation.list_results.iter() {
            if let (Some(result_id), Some(list_id)) = (
                result_ids.get(&r.entity_id),
                list_ids.get(r.list_id.as_str()),
            ) {
                ins.execute(params![new_id(), result_id, list_id, int(r.votes)])?;
            }
        }
    }

    {
        let mut ins = tx.prepare(
            "INSERT INTO candidate_panachage_results (id, election_result_id, candidate_id, source,
                votes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for p in generation.candidate_panachage.iter() {
            if let (Some(result_id), Some(candidate_id)) = (
                result_ids.get(&p.entity_id),
                candidate_ids.get(p.candidate_id.as_str()),
            ) {
                ins.execute(params![new_id(), result_id, candidate_id, p.source, int(p.votes)])?;
            }
        }
    }

    {
        let mut ins = tx.prepare(
            "INSERT INTO election_colors (election_id, name, color) VALUES (?1, ?2, ?3)
             ON CONFLICT(election_id, name) DO UPDATE SET color = excluded.color",
        )?;
        for (name, color) in generation.colors.iter() {
            ins.execute(params![election.id, name, color])?;
        }
    }

    insert_panachage(tx, "panachage_results", &election.id, &generation.panachage)?;
    insert_panachage(
        tx,
        "party_panachage_results",
        &election.id,
        &generation.party_panachage,
    )?;

    {
        let mut ins = tx.prepare(
            "INSERT INTO party_results (id, election_id, year, party_id, name, color, total_votes,
                number_of_mandates, votes, voters_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for p in generation.party_results.iter() {
            ins.execute(params![
                new_id(),
                election.id,
                p.year,
                p.party_id,
                p.name,
                p.color,
                int(p.total_votes),
                p.number_of_mandates,
                int(p.votes),
                p.voters_count.map(int)
            ])?;
        }
    }

    info!(
        "commit: election {}: {} results, {} candidates, {} lists",
        election.id,
        generation.results.len(),
        generation.candidates.len(),
        generation.lists.len()
    );
    Ok(true)
}

fn upsert_election(tx: &Transaction, election: &Election, generation: &Generation) -> rusqlite::Result<()> {
    let counted = generation.results.iter().filter(|r| r.counted).count() as u32;
    let total = generation.results.len() as u32;
    tx.execute(
        "INSERT INTO elections (id, system, domain, domain_segment, distinct_districts, year,
            number_of_mandates, has_expats, completes_manually, manually_completed, status,
            absolute_majority, counted_entities, total_entities)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(id) DO UPDATE SET
            system = excluded.system,
            domain = excluded.domain,
            domain_segment = excluded.domain_segment,
            distinct_districts = excluded.distinct_districts,
            year = excluded.year,
            number_of_mandates = excluded.number_of_mandates,
            has_expats = excluded.has_expats,
            completes_manually = excluded.completes_manually,
            manually_completed = excluded.manually_completed,
            status = excluded.status,
            absolute_majority = excluded.absolute_majority,
            counted_entities = excluded.counted_entities,
            total_entities = excluded.total_entities",
        params![
            election.id,
            system_str(election.system),
            domain_str(election.domain),
            election.domain_segment,
            election.distinct,
            election.year,
            election.number_of_mandates,
            election.has_expats,
            election.compound.map(|c| c.completes_manually),
            election.compound.map(|c| c.manually_completed),
            generation.status.as_str(),
            generation.absolute_majority.map(int),
            counted,
            total
        ],
    )?;
    Ok(())
}

fn insert_panachage(
    tx: &Transaction,
    table: &str,
    election_id: &str,
    panachage: &[PanachageResult],
) -> rusqlite::Result<()> {
    let mut ins = tx.prepare(&format!(
        "INSERT INTO {} (id, election_id, target, source, votes) VALUES (?1, ?2, ?3, ?4, ?5)",
        table
    ))?;
    for p in panachage.iter() {
        ins.execute(params![new_id(), election_id, p.target, p.source, int(p.votes)])?;
    }
    Ok(())
}

/// Reads back the election and its committed generation, if the election is stored.
pub fn load(conn: &Connection, election_id: &str) -> rusqlite::Result<Option<ResultSet>> {
    let election = conn
        .query_row(
            "SELECT id, system, domain, domain_segment, distinct_districts, year,
                number_of_mandates, has_expats, completes_manually, manually_completed, status,
                absolute_majority, counted_entities, total_entities
             FROM elections WHERE id = ?1",
            [election_id],
            |row| {
                let completes_manually: Option<bool> = row.get(8)?;
                let manually_completed: Option<bool> = row.get(9)?;
                let status: String = row.get(10)?;
                let absolute_majority: Option<i64> = row.get(11)?;
                Ok(Election {
                    id: row.get(0)?,
                    system: parse_system(&row.get::<_, String>(1)?),
                    domain: parse_domain(&row.get::<_, String>(2)?),
                    domain_segment: row.get(3)?,
                    distinct: row.get(4)?,
                    year: row.get(5)?,
                    number_of_mandates: row.get(6)?,
                    has_expats: row.get(7)?,
                    compound: completes_manually.map(|completes_manually| CompoundGate {
                        completes_manually,
                        manually_completed: manually_completed.unwrap_or(false),
                    }),
                    status: Status::parse(&status).unwrap_or_default(),
                    absolute_majority: absolute_majority.map(|m| m.max(0) as u64),
                    counted_entities: row.get(12)?,
                    total_entities: row.get(13)?,
                })
            },
        )
        .optional()?;
    let election = match election {
        Some(e) => e,
        None => return Ok(None),
    };

    let mut generation = Generation {
        status: election.status,
        absolute_majority: election.absolute_majority,
        ..Default::default()
    };

    let mut stmt = conn.prepare(
        "SELECT entity_id, name, district, counted, eligible_voters, received_ballots,
            blank_ballots, invalid_ballots, blank_votes, invalid_votes, expats
         FROM election_results WHERE election_id = ?1 ORDER BY entity_id",
    )?;
    generation.results = stmt
        .query_map([election_id], |row| {
            let expats: Option<i64> = row.get(10)?;
            Ok(ElectionResult {
                entity_id: row.get(0)?,
                name: row.get(1)?,
                district: row.get(2)?,
                counted: row.get(3)?,
                eligible_voters: count(row, 4)?,
                expats: expats.map(|e| e.max(0) as u64),
                received_ballots: count(row, 5)?,
                blank_ballots: count(row, 6)?,
                invalid_ballots: count(row, 7)?,
                blank_votes: count(row, 8)?,
                invalid_votes: count(row, 9)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT c.connection_id, p.connection_id
         FROM list_connections c LEFT JOIN list_connections p ON c.parent_id = p.id
         WHERE c.election_id = ?1",
    )?;
    generation.connections = stmt
        .query_map([election_id], |row| {
            Ok(ListConnection {
                connection_id: row.get(0)?,
                parent: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    generation.connections.sort();

    let mut stmt = conn.prepare(
        "SELECT l.list_id, l.name, l.number_of_mandates, c.connection_id, p.connection_id
         FROM lists l
            LEFT JOIN list_connections c ON l.connection_id = c.id
            LEFT JOIN list_connections p ON c.parent_id = p.id
         WHERE l.election_id = ?1 ORDER BY l.list_id",
    )?;
    generation.lists = stmt
        .query_map([election_id], |row| {
            let connection_id: Option<String> = row.get(3)?;
            let parent: Option<String> = row.get(4)?;
            Ok(List {
                list_id: row.get(0)?,
                name: row.get(1)?,
                number_of_mandates: row.get(2)?,
                connection: connection_id.map(|connection_id| ListConnection {
                    connection_id,
                    parent,
                }),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT c.candidate_id, c.family_name, c.first_name, c.elected, c.party, l.list_id,
            c.gender, c.year_of_birth
         FROM candidates c LEFT JOIN lists l ON c.list_id = l.id
         WHERE c.election_id = ?1 ORDER BY c.candidate_id",
    )?;
    generation.candidates = stmt
        .query_map([election_id], |row| {
            let gender: Option<String> = row.get(6)?;
            Ok(Candidate {
                candidate_id: row.get(0)?,
                family_name: row.get(1)?,
                first_name: row.get(2)?,
                elected: row.get(3)?,
                party: row.get(4)?,
                list_id: row.get(5)?,
                gender: gender.as_deref().and_then(Gender::parse),
                year_of_birth: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT r.entity_id, c.candidate_id, cr.votes
         FROM candidate_results cr
            JOIN election_results r ON cr.election_result_id = r.id
            JOIN candidates c ON cr.candidate_id = c.id
         WHERE r.election_id = ?1 ORDER BY r.entity_id, c.candidate_id",
    )?;
    generation.candidate_results = stmt
        .query_map([election_id], |row| {
            Ok(CandidateResult {
                entity_id: row.get(0)?,
                candidate_id: row.get(1)?,
                votes: count(row, 2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT r.entity_id, l.list_id, lr.votes
         FROM list_results lr
            JOIN election_results r ON lr.election_result_id = r.id
            JOIN lists l ON lr.list_id = l.id
         WHERE r.election_id = ?1 ORDER BY r.entity_id, l.list_id",
    )?;
    generation.list_results = stmt
        .query_map([election_id], |row| {
            Ok(ListResult {
                entity_id: row.get(0)?,
                list_id: row.get(1)?,
                votes: count(row, 2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT r.entity_id, c.candidate_id, cp.source, cp.votes
         FROM candidate_panachage_results cp
            JOIN election_results r ON cp.election_result_id = r.id
            JOIN candidates c ON cp.candidate_id = c.id
         WHERE r.election_id = ?1 ORDER BY r.entity_id, c.candidate_id, cp.source",
    )?;
    generation.candidate_panachage = stmt
        .query_map([election_id], |row| {
            Ok(CandidatePanachageResult {
                entity_id: row.get(0)?,
                candidate_id: row.get(1)?,
                source: row.get(2)?,
                votes: count(row, 3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare("SELECT name, color FROM election_colors WHERE election_id = ?1")?;
    generation.colors = stmt
        .query_map([election_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<BTreeMap<String, String>>>()?;

    generation.panachage = load_panachage(conn, "panachage_results", election_id)?;
    generation.party_panachage = load_panachage(conn, "party_panachage_results", election_id)?;

    let mut stmt = conn.prepare(
        "SELECT year, party_id, name, color, total_votes, number_of_mandates, votes, voters_count
         FROM party_results WHERE election_id = ?1 ORDER BY year, party_id",
    )?;
    generation.party_results = stmt
        .query_map([election_id], |row| {
            let voters_count: Option<i64> = row.get(7)?;
            Ok(PartyResult {
                year: row.get(0)?,
                party_id: row.get(1)?,
                name: row.get(2)?,
                color: row.get(3)?,
                total_votes: count(row, 4)?,
                number_of_mandates: row.get(5)?,
                votes: count(row, 6)?,
                voters_count: voters_count.map(|v| v.max(0) as u64),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(
        "load: election {}: {} results",
        election_id,
        generation.results.len()
    );
    Ok(Some(ResultSet::new(election, generation)))
}

fn load_panachage(
    conn: &Connection,
    table: &str,
    election_id: &str,
) -> rusqlite::Result<Vec<PanachageResult>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT target, source, votes FROM {} WHERE election_id = ?1 ORDER BY target, source",
        table
    ))?;
    let rows = stmt
        .query_map([election_id], |row| {
            Ok(PanachageResult {
                target: row.get(0)?,
                source: row.get(1)?,
                votes: count(row, 2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election() -> Election {
        let mut election = Election::new("nr", ElectionSystem::Proporz, Domain::Canton, 2015, 1);
        election.compound = Some(CompoundGate {
            completes_manually: true,
            manually_completed: false,
        });
        election
    }

    fn generation() -> Generation {
        let top = ListConnection::top("1");
        let sub = ListConnection::sub("1.1", "1");
        Generation {
            status: Status::Interim,
            absolute_majority: None,
            results: vec![
                ElectionResult {
                    entity_id: 1,
                    name: "Baar".to_string(),
                    district: "Nord".to_string(),
                    counted: true,
                    eligible_voters: 100,
                    expats: Some(3),
                    received_ballots: 50,
                    ..Default::default()
                },
                ElectionResult {
                    entity_id: 2,
                    name: "Zug".to_string(),
                    district: "Nord".to_string(),
                    ..Default::default()
                },
            ],
            candidates: vec![Candidate {
                candidate_id: "101".to_string(),
                family_name: "Muster".to_string(),
                first_name: "Max".to_string(),
                elected: true,
                party: Some("FDP".to_string()),
                list_id: Some("1".to_string()),
                gender: Some(Gender::Male),
                year_of_birth: Some(1970),
            }],
            candidate_results: vec![CandidateResult {
                entity_id: 1,
                candidate_id: "101".to_string(),
                votes: 30,
            }],
            lists: vec![List {
                list_id: "1".to_string(),
                name: "FDP".to_string(),
                number_of_mandates: 1,
                connection: Some(sub.clone()),
            }],
            list_results: vec![ListResult {
                entity_id: 1,
                list_id: "1".to_string(),
                votes: 45,
            }],
            connections: vec![top, sub],
            panachage: vec![PanachageResult {
                target: "1".to_string(),
                source: "999".to_string(),
                votes: 4,
            }],
            candidate_panachage: vec![CandidatePanachageResult {
                entity_id: 1,
                candidate_id: "101".to_string(),
                source: "999".to_string(),
                votes: 4,
            }],
            party_results: vec![PartyResult {
                year: 2015,
                party_id: "1".to_string(),
                name: "FDP".to_string(),
                color: Some("#112233".to_string()),
                total_votes: 100,
                number_of_mandates: 1,
                votes: 45,
                voters_count: None,
            }],
            party_panachage: vec![],
            colors: [("FDP".to_string(), "#112233".to_string())].into_iter().collect(),
        }
    }

    fn outcome(generation: Generation) -> ImportOutcome {
        ImportOutcome {
            generation,
            errors: vec![],
        }
    }

    #[test]
    fn stores_and_loads_a_generation() {
        let mut conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        let tx = conn.transaction().unwrap();
        assert!(commit(&tx, &election(), &outcome(generation())).unwrap());
        tx.commit().unwrap();

        let rs = load(&conn, "nr").unwrap().unwrap();
        assert_eq!(rs.generation, generation());
        assert_eq!(rs.election.status, Status::Interim);
        assert_eq!(rs.election.counted_entities, 1);
        assert_eq!(rs.election.total_entities, 2);
        assert_eq!(rs.election.compound, election().compound);
        assert!(load(&conn, "other").unwrap().is_none());
    }

    #[test]
    fn a_new_generation_replaces_the_old_one() {
        let mut conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        let tx = conn.transaction().unwrap();
        commit(&tx, &election(), &outcome(generation())).unwrap();
        tx.commit().unwrap();

        let mut next = generation();
        next.candidates.clear();
        next.candidate_results.clear();
        next.candidate_panachage.clear();
        next.connections.clear();
        next.lists[0].connection = None;
        next.status = Status::Final;
        let tx = conn.transaction().unwrap();
        commit(&tx, &election(), &outcome(next.clone())).unwrap();
        tx.commit().unwrap();

        let rs = load(&conn, "nr").unwrap().unwrap();
        assert_eq!(rs.generation, next);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM list_connections", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM candidate_panachage_results", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn colors_are_merged_with_the_known_ones() {
        let mut conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        let tx = conn.transaction().unwrap();
        commit(&tx, &election(), &outcome(generation())).unwrap();
        tx.commit().unwrap();

        let mut next = generation();
        next.colors = [
            ("FDP".to_string(), "#0000ff".to_string()),
            ("SP".to_string(), "#ff0000".to_string()),
        ]
        .into_iter()
        .collect();
        let tx = conn.transaction().unwrap();
        commit(&tx, &election(), &outcome(next.clone())).unwrap();
        tx.commit().unwrap();

        let mut only_sp = generation();
        only_sp.colors = [("SP".to_string(), "#cc0000".to_string())].into_iter().collect();
        let tx = conn.transaction().unwrap();
        commit(&tx, &election(), &outcome(only_sp)).unwrap();
        tx.commit().unwrap();

        let rs = load(&conn, "nr").unwrap().unwrap();
        let colors: Vec<(&str, &str)> = rs
            .generation
            .colors
            .iter()
            .map(|(name, color)| (name.as_str(), color.as_str()))
            .collect();
        assert_eq!(colors, vec![("FDP", "#0000ff"), ("SP", "#cc0000")]);
    }

    #[test]
    fn outcomes_with_errors_are_not_stored() {
        let mut conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        let tx = conn.transaction().unwrap();
        let failed = ImportOutcome {
            generation: generation(),
            errors: vec![ImportError::batch(Issue::NoData)],
        };
        assert!(!commit(&tx, &election(), &failed).unwrap());
        tx.commit().unwrap();
        assert!(load(&conn, "nr").unwrap().is_none());
    }

    #[test]
    fn a_dropped_transaction_leaves_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        {
            let tx = conn.transaction().unwrap();
            commit(&tx, &election(), &outcome(generation())).unwrap();
        }
        assert!(load(&conn, "nr").unwrap().is_none());
    }
}
