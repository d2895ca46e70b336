// The internal format: one line per entity and candidate, everything in one file.

use std::collections::HashSet;

use election_results::records::*;
use election_results::*;
use log::debug;

use crate::imports::io_common::*;
use crate::imports::Context;

const MAJORZ_HEADERS: [&str; 16] = [
    "election_absolute_majority",
    "election_status",
    "entity_id",
    "entity_counted",
    "entity_eligible_voters",
    "entity_received_ballots",
    "entity_blank_ballots",
    "entity_invalid_ballots",
    "entity_blank_votes",
    "entity_invalid_votes",
    "candidate_family_name",
    "candidate_first_name",
    "candidate_id",
    "candidate_elected",
    "candidate_votes",
    "candidate_party",
];

const PROPORZ_HEADERS: [&str; 21] = [
    "election_status",
    "entity_id",
    "entity_counted",
    "entity_eligible_voters",
    "entity_received_ballots",
    "entity_blank_ballots",
    "entity_invalid_ballots",
    "entity_blank_votes",
    "entity_invalid_votes",
    "candidate_family_name",
    "candidate_first_name",
    "candidate_id",
    "candidate_elected",
    "candidate_votes",
    "candidate_party",
    "list_name",
    "list_id",
    "list_number_of_mandates",
    "list_votes",
    "list_connection",
    "list_connection_parent",
];

const LIST_PANACHAGE_PREFIXES: [&str; 2] =
    ["list_panachage_votes_from_list_", "panachage_votes_from_list_"];
const CANDIDATE_PANACHAGE_PREFIX: &str = "candidate_panachage_votes_from_list_";

/// The panachage columns, with the id of their source list.
fn panachage_columns(table: &Table, prefixes: &[&str]) -> Vec<(usize, String)> {
    table.find_columns(|h| {
        prefixes
            .iter()
            .find_map(|p| h.strip_prefix(p))
            .filter(|id| !id.is_empty())
            .map(|id| id.to_string())
    })
}

fn parse_status(row: &Row) -> Result<Status, Issue> {
    Status::parse(row.text("election_status")).ok_or(Issue::InvalidStatus)
}

fn parse_gender(row: &Row) -> Result<Option<Gender>, Issue> {
    match row.text("candidate_gender") {
        "" => Ok(None),
        value => Gender::parse(value).map(Some).ok_or(Issue::InvalidGender {
            value: value.to_string(),
        }),
    }
}

fn parse_year_of_birth(row: &Row) -> Result<Option<u32>, Issue> {
    let invalid = || Issue::InvalidInteger {
        column: "candidate_year_of_birth".to_string(),
    };
    match row.opt_int("candidate_year_of_birth")? {
        Some(year) => u32::try_from(year).map(Some).map_err(|_| invalid()),
        None => Ok(None),
    }
}

/// The colors of the party of the candidate and of the list, keyed by their names.
fn parse_colors(row: &Row, line: &mut Line) -> Vec<Record> {
    let mut colors = Vec::new();
    for (name_column, color_column) in [
        ("candidate_party", "candidate_party_color"),
        ("list_name", "list_color"),
    ] {
        if let Some(Some(color)) = line.take(row.color(color_column)) {
            if let Some(name) = row.opt_text(name_column) {
                colors.push(Record::Color { name, color });
            }
        }
    }
    colors
}

/// Reads the entity columns. Uncounted entities have all their figures set to 0.
fn parse_entity(row: &Row, line: &mut Line) -> Option<EntityFacts> {
    let entity_id = line.take(row.entity_id("entity_id"));
    let counted = row.flag("entity_counted");
    let eligible_voters = line.take(row.int("entity_eligible_voters"));
    let received_ballots = line.take(row.int("entity_received_ballots"));
    let blank_ballots = line.take(row.int("entity_blank_ballots"));
    let invalid_ballots = line.take(row.int("entity_invalid_ballots"));
    let blank_votes = line.take(row.int("entity_blank_votes"));
    let invalid_votes = line.take(row.int("entity_invalid_votes"));
    let expats = line.take(row.opt_int("entity_expats"));
    let entity_id = entity_id?;

    if !counted {
        return Some(EntityFacts {
            expats: Some(0),
            ..EntityFacts::uncounted(entity_id)
        });
    }
    if eligible_voters == Some(0) {
        line.error(Issue::NoEligibleVoters);
    }
    Some(EntityFacts {
        entity_id,
        counted: Some(true),
        eligible_voters,
        received_ballots,
        blank_ballots,
        invalid_ballots,
        blank_votes,
        invalid_votes,
        expats: expats.flatten(),
    })
}

fn parse_candidate(row: &Row, line: &mut Line, list_id: Option<String>) -> Option<CandidateFacts> {
    let gender = line.take(parse_gender(row));
    let year_of_birth = line.take(parse_year_of_birth(row));
    let candidate_id = row.text("candidate_id");
    if candidate_id.is_empty() {
        line.error(Issue::InvalidValues(Facet::Candidate));
        return None;
    }
    Some(CandidateFacts {
        candidate_id: candidate_id.to_string(),
        family_name: Some(row.text("candidate_family_name").to_string()),
        first_name: Some(row.text("candidate_first_name").to_string()),
        elected: Some(row.flag("candidate_elected")),
        party: row.opt_text("candidate_party"),
        list_id,
        gender: gender?,
        year_of_birth: year_of_birth?,
    })
}

/// The sub-connection ids that do not extend the id of their parent are prefixed
/// with it, so that both can be told apart.
fn subconnection_id(connection_id: &str, parent_id: &str) -> String {
    if connection_id.len() > parent_id.len() {
        connection_id.to_string()
    } else {
        format!("{}{}", parent_id, connection_id)
    }
}

fn parse_connection(row: &Row, line: &mut Line) -> Option<ListConnection> {
    let connection_id = row.text("list_connection");
    let parent_id = row.text("list_connection_parent");
    let valid = |id: &str| id.is_empty() || is_alphanumeric_id(id);
    if !valid(connection_id) || !valid(parent_id) {
        line.error(Issue::InvalidValues(Facet::ListConnection));
        return None;
    }
    match (connection_id.is_empty(), parent_id.is_empty()) {
        (_, false) => Some(ListConnection::sub(
            &subconnection_id(connection_id, parent_id),
            parent_id,
        )),
        (false, true) => Some(ListConnection::top(connection_id)),
        (true, true) => None,
    }
}

pub fn parse_majorz(ctx: &Context, file: &SourceFile) -> Parsed {
    let table = match load_table(file, &MAJORZ_HEADERS) {
        Ok(t) => t,
        Err(e) => return Parsed::failed(e),
    };
    let mut parsed = Parsed::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let status = line.take(parse_status(&row));
        let absolute_majority = line.take(row.opt_int("election_absolute_majority"));
        let entity = parse_entity(&row, &mut line);
        let candidate = parse_candidate(&row, &mut line, None);
        let votes = line.take(row.int("candidate_votes"));
        let colors = parse_colors(&row, &mut line);

        let entity = match entity {
            Some(e) => e,
            None => {
                parsed.add_line(line);
                continue;
            }
        };
        if ctx.entity(entity.entity_id).is_none() {
            debug!("parse_majorz: line {}: skipping the expats", row.line);
            continue;
        }
        let counted = entity.counted == Some(true);
        let entity_id = entity.entity_id;
        line.record(Record::Election(ElectionFacts {
            status,
            absolute_majority: absolute_majority.flatten(),
        }));
        line.record(Record::Entity(entity));
        if let (Some(candidate), Some(votes)) = (candidate, votes) {
            let candidate_id = candidate.candidate_id.clone();
            line.record(Record::Candidate(candidate));
            line.record(Record::CandidateResult {
                entity_id,
                candidate_id,
                votes: if counted { votes } else { 0 },
            });
        }
        for color in colors {
            line.record(color);
        }
        parsed.add_line(line);
    }
    debug!(
        "parse_majorz: {} records, {} errors",
        parsed.entries.len(),
        parsed.errors.len()
    );
    parsed
}

pub fn parse_proporz(ctx: &Context, file: &SourceFile) -> Parsed {
    let table = match load_table(file, &PROPORZ_HEADERS) {
        Ok(t) => t,
        Err(e) => return Parsed::failed(e),
    };
    let list_panachage = panachage_columns(&table, &LIST_PANACHAGE_PREFIXES);
    let candidate_panachage = panachage_columns(&table, &[CANDIDATE_PANACHAGE_PREFIX]);
    debug!(
        "parse_proporz: {} list panachage columns, {} candidate panachage columns",
        list_panachage.len(),
        candidate_panachage.len()
    );

    // The panachage of a list is read on its first line only.
    let mut panachage_read: HashSet<String> = HashSet::new();
    let mut parsed = Parsed::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let status = line.take(parse_status(&row));
        let entity = parse_entity(&row, &mut line);
        let list_id = line.take(row.list_id("list_id"));
        let candidate = parse_candidate(&row, &mut line, list_id.clone());
        let candidate_votes = line.take(row.int("candidate_votes"));
        let list_mandates = line.take(row.int("list_number_of_mandates").and_then(|m| {
            u32::try_from(m).map_err(|_| Issue::InvalidValues(Facet::List))
        }));
        let list_votes = line.take(row.int("list_votes"));
        let connection = parse_connection(&row, &mut line);
        let colors = parse_colors(&row, &mut line);

        let mut transfers: Vec<(String, u64)> = Vec::new();
        for (idx, source) in list_panachage.iter() {
            if let Some(votes) = line.take(row.opt_int_at(*idx)) {
                transfers.extend(votes.map(|v| (source.clone(), v)));
            }
        }
        let mut candidate_transfers: Vec<(String, u64)> = Vec::new();
        for (idx, source) in candidate_panachage.iter() {
            if let Some(Some(votes)) = line.take(row.opt_int_at(*idx)) {
                if votes > 0 {
                    candidate_transfers.push((source.clone(), votes));
                }
            }
        }

        let entity = match entity {
            Some(e) => e,
            None => {
                parsed.add_line(line);
                continue;
            }
        };
        if ctx.entity(entity.entity_id).is_none() {
            debug!("parse_proporz: line {}: skipping the expats", row.line);
            continue;
        }
        let (list_id, candidate, candidate_votes, list_mandates, list_votes) =
            match (list_id, candidate, candidate_votes, list_mandates, list_votes) {
                (Some(a), Some(b), Some(c), Some(d), Some(e)) => (a, b, c, d, e),
                _ => {
                    parsed.add_line(line);
                    continue;
                }
            };
        let counted = entity.counted == Some(true);
        let entity_id = entity.entity_id;
        let candidate_id = candidate.candidate_id.clone();

        line.record(Record::Election(ElectionFacts {
            status,
            absolute_majority: None,
        }));
        line.record(Record::Entity(entity));
        line.record(Record::List(ListFacts {
            list_id: list_id.clone(),
            name: Some(row.text("list_name").to_string()),
            number_of_mandates: Some(list_mandates),
            connection: None,
        }));
        if let Some(connection) = connection {
            line.record(Record::Connection {
                list_id: list_id.clone(),
                connection,
            });
        }
        line.record(Record::ListResult {
            entity_id,
            list_id: list_id.clone(),
            votes: if counted { list_votes } else { 0 },
        });
        line.record(Record::Candidate(candidate));
        line.record(Record::CandidateResult {
            entity_id,
            candidate_id: candidate_id.clone(),
            votes: if counted { candidate_votes } else { 0 },
        });
        for (source, votes) in candidate_transfers {
            line.record(Record::CandidatePanachage {
                entity_id,
                candidate_id: candidate_id.clone(),
                source,
                votes,
            });
        }
        if !line.has_errors() && panachage_read.insert(list_id.clone()) {
            for (source, votes) in transfers {
                if source != list_id {
                    line.record(Record::Panachage {
                        target: list_id.clone(),
                        source,
                        votes,
                    });
                }
            }
        }
        for color in colors {
            line.record(color);
        }
        parsed.add_line(line);
    }
    debug!(
        "parse_proporz: {} records, {} errors",
        parsed.entries.len(),
        parsed.errors.len()
    );
    parsed
}
