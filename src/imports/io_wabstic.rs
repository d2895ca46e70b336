// The WabstiC exports: one set of files for many businesses, the lines of an
// election being selected by its business number (SortGeschaeft) and, for
// some files, by its district (SortWahlkreis).

use std::collections::{BTreeMap, BTreeSet};

use election_results::records::*;
use election_results::*;
use log::debug;

use crate::imports::io_common::*;
use crate::imports::Context;

const HEADERS_WM_WAHL: [&str; 3] = ["sortgeschaeft", "absolutesmehr", "anzpendentgde"];

const HEADERS_WP_WAHL: [&str; 2] = ["sortgeschaeft", "anzpendentgde"];

const HEADERS_STATIC_GEMEINDEN: [&str; 4] = [
    "sortwahlkreis",
    "sortgeschaeft",
    "bfsnrgemeinde",
    "stimmberechtigte",
];

const HEADERS_WM_GEMEINDEN: [&str; 8] = [
    "bfsnrgemeinde",
    "stimmberechtigte",
    "sperrung",
    "stmabgegeben",
    "stmleer",
    "stmungueltig",
    "stimmenleer",
    "stimmenungueltig",
];

const HEADERS_WP_GEMEINDEN: [&str; 7] = [
    "bfsnrgemeinde",
    "stimmberechtigte",
    "sperrung",
    "stmabgegeben",
    "stmleer",
    "stmungueltig",
    "anzwzamtleer",
];

const HEADERS_WM_KANDIDATEN: [&str; 6] = [
    "sortgeschaeft",
    "knr",
    "nachname",
    "vorname",
    "gewaehlt",
    "partei",
];

const HEADERS_WM_KANDIDATENGDE: [&str; 4] = ["sortgeschaeft", "bfsnrgemeinde", "knr", "stimmen"];

const HEADERS_WP_LISTEN: [&str; 6] = [
    "sortgeschaeft",
    "listnr",
    "listcode",
    "sitze",
    "listverb",
    "listuntverb",
];

const HEADERS_WP_LISTENGDE: [&str; 3] = ["bfsnrgemeinde", "listnr", "stimmentotal"];

const HEADERS_WPSTATIC_KANDIDATEN: [&str; 4] = ["sortgeschaeft", "knr", "nachname", "vorname"];

const HEADERS_WP_KANDIDATEN: [&str; 3] = ["sortgeschaeft", "knr", "gewaehlt"];

const HEADERS_WP_KANDIDATENGDE: [&str; 3] = ["bfsnrgemeinde", "knr", "stimmen"];

// The names of the files in the messages about missing declarations.
const WM_KANDIDATEN: &str = "wm_kandidaten";
const WMSTATIC_GEMEINDEN: &str = "wmstatic_gemeinden";
const WPSTATIC_KANDIDATEN: &str = "wpstatic_kandidaten";

/// The blank list of WabstiC.
const WABSTIC_BLANK_LIST: &str = "99";

/// The export files of a majorz election.
pub struct MajorzFiles<'a> {
    pub wm_wahl: &'a SourceFile,
    pub wmstatic_gemeinden: &'a SourceFile,
    pub wm_gemeinden: &'a SourceFile,
    pub wm_kandidaten: &'a SourceFile,
    pub wm_kandidatengde: &'a SourceFile,
}

/// The export files of a proporz election.
pub struct ProporzFiles<'a> {
    pub wp_wahl: &'a SourceFile,
    pub wpstatic_gemeinden: &'a SourceFile,
    pub wp_gemeinden: &'a SourceFile,
    pub wp_listen: &'a SourceFile,
    pub wp_listengde: &'a SourceFile,
    pub wpstatic_kandidaten: &'a SourceFile,
    pub wp_kandidaten: &'a SourceFile,
    pub wp_kandidatengde: &'a SourceFile,
}

/// The lines that belong to the business, and to the district if one is given.
#[derive(Debug, Clone, Copy)]
struct Selection<'a> {
    number: &'a str,
    district: Option<&'a str>,
}

impl<'a> Selection<'a> {
    fn new(number: &'a str, district: Option<&'a str>) -> Selection<'a> {
        Selection {
            number,
            district: district.filter(|d| !d.is_empty()),
        }
    }

    fn business(&self, row: &Row) -> bool {
        row.text("sortgeschaeft") == self.number
    }

    fn business_and_district(&self, row: &Row) -> bool {
        let in_district = match self.district {
            Some(d) => row.text("sortwahlkreis") == d,
            None => true,
        };
        self.business(row) && in_district
    }
}

/// What the entity files tell about the entities of the election.
#[derive(Debug, Clone, Default)]
struct Entities {
    /// The eligible voters of the static file, by entity.
    declared: BTreeMap<u32, u64>,
    counted: BTreeMap<u32, bool>,
}

impl Entities {
    /// The entity of a line, if it is declared for this election.
    fn find(&self, ctx: &Context, raw: u32) -> Option<u32> {
        ctx.entity(raw).filter(|id| self.declared.contains_key(id))
    }

    fn is_counted(&self, id: u32) -> bool {
        self.counted.get(&id).cloned().unwrap_or(false)
    }

    /// Votes of entities not counted yet are not published.
    fn votes(&self, id: u32, votes: u64) -> u64 {
        if self.is_counted(id) {
            votes
        } else {
            0
        }
    }
}

fn table(file: &SourceFile, headers: &[&str], failed: &mut Vec<Parsed>) -> Option<Table> {
    match load_table(file, headers) {
        Ok(t) => Some(t),
        Err(e) => {
            failed.push(Parsed::failed(e));
            None
        }
    }
}

pub fn parse_majorz(
    ctx: &Context,
    files: &MajorzFiles,
    number: &str,
    district: Option<&str>,
) -> Vec<Parsed> {
    let mut failed = Vec::new();
    let tables = (
        table(files.wm_wahl, &HEADERS_WM_WAHL, &mut failed),
        table(files.wmstatic_gemeinden, &HEADERS_STATIC_GEMEINDEN, &mut failed),
        table(files.wm_gemeinden, &HEADERS_WM_GEMEINDEN, &mut failed),
        table(files.wm_kandidaten, &HEADERS_WM_KANDIDATEN, &mut failed),
        table(files.wm_kandidatengde, &HEADERS_WM_KANDIDATENGDE, &mut failed),
    );
    let (wahl, statics, gemeinden, kandidaten, kandidatengde) = match tables {
        (Some(a), Some(b), Some(c), Some(d), Some(e)) => (a, b, c, d, e),
        _ => return failed,
    };
    let selection = Selection::new(number, district);
    debug!("parse_majorz: business {} {:?}", number, selection.district);

    let mut entities = Entities::default();
    let mut candidates: BTreeSet<String> = BTreeSet::new();
    vec![
        parse_majorz_election(&wahl, &selection),
        parse_static_entities(ctx, &statics, &selection, &mut entities),
        parse_entities(ctx, &gemeinden, &mut entities),
        parse_majorz_candidates(&kandidaten, &selection, &mut candidates),
        parse_majorz_candidate_results(ctx, &kandidatengde, &selection, &entities, &candidates),
    ]
}

pub fn parse_proporz(
    ctx: &Context,
    files: &ProporzFiles,
    number: &str,
    district: Option<&str>,
) -> Vec<Parsed> {
    let mut failed = Vec::new();
    let tables = (
        table(files.wp_wahl, &HEADERS_WP_WAHL, &mut failed),
        table(files.wpstatic_gemeinden, &HEADERS_STATIC_GEMEINDEN, &mut failed),
        table(files.wp_gemeinden, &HEADERS_WP_GEMEINDEN, &mut failed),
        table(files.wp_listen, &HEADERS_WP_LISTEN, &mut failed),
        table(files.wp_listengde, &HEADERS_WP_LISTENGDE, &mut failed),
        table(files.wpstatic_kandidaten, &HEADERS_WPSTATIC_KANDIDATEN, &mut failed),
        table(files.wp_kandidaten, &HEADERS_WP_KANDIDATEN, &mut failed),
        table(files.wp_kandidatengde, &HEADERS_WP_KANDIDATENGDE, &mut failed),
    );
    let (wahl, statics, gemeinden, listen, listengde, static_kandidaten, kandidaten, kandidatengde) =
        match tables {
            (Some(a), Some(b), Some(c), Some(d), Some(e), Some(f), Some(g), Some(h)) => {
                (a, b, c, d, e, f, g, h)
            }
            _ => return failed,
        };
    let selection = Selection::new(number, district);
    debug!("parse_proporz: business {} {:?}", number, selection.district);

    let mut entities = Entities::default();
    let mut lists: BTreeSet<String> = BTreeSet::new();
    let mut candidates: BTreeSet<String> = BTreeSet::new();
    vec![
        parse_proporz_election(&wahl, &selection),
        parse_static_entities(ctx, &statics, &selection, &mut entities),
        parse_entities(ctx, &gemeinden, &mut entities),
        parse_lists(&listen, &selection, &mut lists),
        parse_list_results(ctx, &listengde, &entities),
        parse_proporz_candidates(&static_kandidaten, &selection, &lists, &mut candidates),
        parse_proporz_elected(&kandidaten, &selection, &candidates),
        parse_proporz_candidate_results(ctx, &kandidatengde, &entities, &candidates),
    ]
}

// ******** Election ********

fn parse_majorz_election(table: &Table, selection: &Selection) -> Parsed {
    let mut parsed = Parsed::new();
    let mut final_but_pending = false;
    for row in table.rows().filter(|r| selection.business(r)) {
        let mut line = Line::new(&table.file, row.line);
        let majority = line.take(row.signed("absolutesmehr"));
        // An empty stage is 0, anything else must be a count.
        let stage = line.take(row.int("ausmittlungsstand"));
        let pending = line.take(row.opt_int("anzpendentgde"));
        if let (Some(majority), Some(stage), Some(pending)) = (majority, stage, pending) {
            let status = match (stage, pending) {
                (_, Some(0)) => Status::Final,
                (1, _) => Status::Interim,
                _ => Status::Unknown,
            };
            final_but_pending |= stage == 2 && pending != Some(0);
            line.record(Record::Election(ElectionFacts {
                status: Some(status),
                // -1 stands for no absolute majority.
                absolute_majority: majority.filter(|m| *m >= 0).map(|m| m as u64),
            }));
        }
        parsed.add_line(line);
    }
    if final_but_pending {
        parsed.error(ImportError::batch(Issue::FinalButPending));
    }
    parsed
}

fn parse_proporz_election(table: &Table, selection: &Selection) -> Parsed {
    let mut parsed = Parsed::new();
    for row in table.rows().filter(|r| selection.business(r)) {
        let mut line = Line::new(&table.file, row.line);
        if let Some(pending) = line.take(row.opt_int("anzpendentgde")) {
            let status = if pending == Some(0) {
                Status::Final
            } else {
                Status::Unknown
            };
            line.record(Record::Election(ElectionFacts {
                status: Some(status),
                absolute_majority: None,
            }));
        }
        parsed.add_line(line);
    }
    parsed
}

// ******** Entities ********

/// The entities taking part in the election, with their eligible voters.
///
/// Each entity is declared once: the validation reports the unknown ones and
/// those declared twice.
fn parse_static_entities(
    ctx: &Context,
    table: &Table,
    selection: &Selection,
    entities: &mut Entities,
) -> Parsed {
    let mut parsed = Parsed::new();
    for row in table.rows().filter(|r| selection.business_and_district(r)) {
        let mut line = Line::new(&table.file, row.line);
        let raw = line.take(row.entity_id("bfsnrgemeinde"));
        let entity_id = match raw.map(|r| ctx.entity(r)) {
            Some(None) => {
                debug!("parse_static_entities: line {}: skipping the expats", row.line);
                continue;
            }
            Some(id) => id,
            None => None,
        };
        let eligible_voters = line.take(row.int("stimmberechtigte"));
        if let (Some(id), Some(eligible_voters)) = (entity_id, eligible_voters) {
            line.record(Record::Declare { entity_id: id });
            entities.declared.entry(id).or_insert(eligible_voters);
        }
        parsed.add_line(line);
    }
    parsed
}

/// The results of the entities. The file has the entities of all businesses,
/// only the declared ones are read.
fn parse_entities(ctx: &Context, table: &Table, entities: &mut Entities) -> Parsed {
    let majorz = ctx.election.system == ElectionSystem::Majorz;
    let mut parsed = Parsed::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let entity_id = match line.take(row.entity_id("bfsnrgemeinde")) {
            Some(raw) => match entities.find(ctx, raw) {
                Some(id) => Some(id),
                None => continue,
            },
            None => None,
        };
        // The time of the lock, empty until the entity is counted.
        let counted = line.take(row.int("sperrung")).map(|lock| lock != 0);
        let eligible_voters = line.take(row.int("stimmberechtigte"));
        let received_ballots = line.take(row.int("stmabgegeben"));
        let blank_ballots = line.take(row.int("stmleer"));
        let invalid_ballots = line.take(row.int("stmungueltig"));
        let (blank_votes, invalid_votes) = if majorz {
            (
                line.take(row.int("stimmenleer")),
                line.take(row.int("stimmenungueltig")),
            )
        } else {
            // The blank votes are the votes of the blank list.
            (None, Some(0))
        };
        let (entity_id, counted, eligible_voters) = match (entity_id, counted, eligible_voters) {
            (Some(a), Some(b), Some(c)) if !line.has_errors() => (a, b, c),
            _ => {
                parsed.add_line(line);
                continue;
            }
        };

        entities.counted.insert(entity_id, counted);
        let facts = if counted {
            let declared = entities.declared.get(&entity_id).cloned().unwrap_or(0);
            EntityFacts {
                entity_id,
                counted: Some(true),
                eligible_voters: Some(if eligible_voters == 0 {
                    declared
                } else {
                    eligible_voters
                }),
                received_ballots,
                blank_ballots,
                invalid_ballots,
                blank_votes,
                invalid_votes,
                expats: None,
            }
        } else {
            EntityFacts::uncounted(entity_id)
        };
        line.record(Record::Entity(facts));
        parsed.add_line(line);
    }
    parsed
}

// ******** Majorz candidates ********

fn parse_majorz_candidates(
    table: &Table,
    selection: &Selection,
    candidates: &mut BTreeSet<String>,
) -> Parsed {
    let mut parsed = Parsed::new();
    for row in table.rows().filter(|r| selection.business(r)) {
        let mut line = Line::new(&table.file, row.line);
        match row.opt_text("knr") {
            Some(candidate_id) => {
                candidates.insert(candidate_id.clone());
                line.record(Record::Candidate(CandidateFacts {
                    candidate_id,
                    family_name: Some(row.text("nachname").to_string()),
                    first_name: Some(row.text("vorname").to_string()),
                    elected: Some(row.text("gewaehlt") == "1"),
                    party: row.opt_text("partei"),
                    list_id: None,
                    gender: None,
                    year_of_birth: None,
                }));
            }
            None => line.error(Issue::InvalidValues(Facet::Candidate)),
        }
        parsed.add_line(line);
    }
    parsed
}

fn parse_majorz_candidate_results(
    ctx: &Context,
    table: &Table,
    selection: &Selection,
    entities: &Entities,
    candidates: &BTreeSet<String>,
) -> Parsed {
    let mut parsed = Parsed::new();
    for row in table.rows().filter(|r| selection.business(r)) {
        let mut line = Line::new(&table.file, row.line);
        let values = (
            row.entity_id("bfsnrgemeinde"),
            row.opt_text("knr"),
            row.required_int("stimmen"),
        );
        let (raw, candidate_id, votes) = match values {
            (Ok(a), Some(b), Ok(c)) => (a, b, c),
            _ => {
                line.error(Issue::InvalidValues(Facet::CandidateResults));
                parsed.add_line(line);
                continue;
            }
        };
        if !candidates.is_empty() && !candidates.contains(&candidate_id) {
            line.error(Issue::CandidateNotDeclared {
                candidate_id: candidate_id.clone(),
                file: WM_KANDIDATEN.to_string(),
            });
        }
        let entity_id = match ctx.entity(raw) {
            Some(id) => id,
            None => continue,
        };
        if !entities.declared.contains_key(&entity_id) {
            line.error(Issue::EntityNotDeclared {
                entity_id,
                file: WMSTATIC_GEMEINDEN.to_string(),
            });
        }
        line.record(Record::CandidateResult {
            entity_id,
            candidate_id,
            votes: entities.votes(entity_id, votes),
        });
        parsed.add_line(line);
    }
    parsed
}

// ******** Lists ********

// List 99 of WabstiC is the blank list.
fn list_id(row: &Row) -> Result<String, Issue> {
    let number = match row.text("listnr") {
        "" => "0",
        WABSTIC_BLANK_LIST => BLANK_LIST,
        n => n,
    };
    if is_alphanumeric_id(number) {
        Ok(number.to_string())
    } else {
        Err(Issue::NotAlphanumeric {
            column: "listnr".to_string(),
        })
    }
}

fn parse_lists(table: &Table, selection: &Selection, lists: &mut BTreeSet<String>) -> Parsed {
    let mut parsed = Parsed::new();
    for row in table.rows().filter(|r| selection.business(r)) {
        let mut line = Line::new(&table.file, row.line);
        let list_id = line.take(list_id(&row));
        let mandates = line.take(row.int("sitze").and_then(|m| {
            u32::try_from(m).map_err(|_| Issue::InvalidInteger {
                column: "sitze".to_string(),
            })
        }));
        let connection = match (row.opt_text("listverb"), row.opt_text("listuntverb")) {
            (None, None) => None,
            (Some(c), None) => Some(ListConnection::top(&c)),
            (Some(c), Some(sub)) => Some(ListConnection::sub(&sub, &c)),
            (None, Some(_)) => {
                line.error(Issue::Missing {
                    variable: "connection".to_string(),
                });
                None
            }
        };
        if let Some(id) = &list_id {
            if lists.contains(id) {
                line.error(Issue::FoundTwice { name: id.clone() });
            }
        }
        if let (Some(list_id), Some(mandates), false) = (list_id, mandates, line.has_errors()) {
            lists.insert(list_id.clone());
            if list_id != BLANK_LIST {
                line.record(Record::List(ListFacts {
                    list_id,
                    name: Some(row.text("listcode").to_string()),
                    number_of_mandates: Some(mandates),
                    connection,
                }));
            }
        }
        parsed.add_line(line);
    }
    parsed
}

/// The list results of the declared entities. The votes of the blank list are
/// the blank votes of the entity.
fn parse_list_results(ctx: &Context, table: &Table, entities: &Entities) -> Parsed {
    let mut parsed = Parsed::new();
    let mut seen: BTreeSet<(u32, String)> = BTreeSet::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let raw = line.take(row.entity_id("bfsnrgemeinde"));
        let list_id = line.take(list_id(&row));
        let votes = line.take(row.int("stimmentotal"));
        let (raw, list_id, votes) = match (raw, list_id, votes) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                parsed.add_line(line);
                continue;
            }
        };
        let entity_id = match entities.find(ctx, raw) {
            Some(id) => id,
            None => continue,
        };
        if !seen.insert((entity_id, list_id.clone())) {
            line.error(Issue::FoundTwice {
                name: format!("{}/{}", entity_id, list_id),
            });
        }
        let votes = entities.votes(entity_id, votes);
        if list_id == BLANK_LIST {
            line.record(Record::Statistics(EntityFacts {
                blank_votes: Some(votes),
                ..EntityFacts::new(entity_id)
            }));
        } else {
            line.record(Record::ListResult {
                entity_id,
                list_id,
                votes,
            });
        }
        parsed.add_line(line);
    }
    parsed
}

// ******** Proporz candidates ********

/// The list of a candidate is part of their number: `<list>.<n>` or `<list><nn>`.
fn list_of_candidate(candidate_id: &str) -> String {
    match candidate_id.split_once('.') {
        Some((list, _)) => list.to_string(),
        None => {
            let end = candidate_id
                .char_indices()
                .rev()
                .nth(1)
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            candidate_id[..end].to_string()
        }
    }
}

fn parse_proporz_candidates(
    table: &Table,
    selection: &Selection,
    lists: &BTreeSet<String>,
    candidates: &mut BTreeSet<String>,
) -> Parsed {
    let mut parsed = Parsed::new();
    for row in table.rows().filter(|r| selection.business(r)) {
        let mut line = Line::new(&table.file, row.line);
        let candidate_id = match row.opt_text("knr") {
            Some(id) => id,
            None => {
                line.error(Issue::InvalidValues(Facet::Candidate));
                parsed.add_line(line);
                continue;
            }
        };
        let list_id = list_of_candidate(&candidate_id);
        if candidates.contains(&candidate_id) {
            line.error(Issue::FoundTwice {
                name: candidate_id.clone(),
            });
        }
        if !lists.contains(&list_id) {
            line.error(Issue::ListNotFound {
                list_id: list_id.clone(),
            });
        }
        if !line.has_errors() {
            candidates.insert(candidate_id.clone());
        }
        line.record(Record::Candidate(CandidateFacts {
            candidate_id,
            family_name: Some(row.text("nachname").to_string()),
            first_name: Some(row.text("vorname").to_string()),
            elected: Some(false),
            party: None,
            list_id: Some(list_id),
            gender: None,
            year_of_birth: None,
        }));
        parsed.add_line(line);
    }
    parsed
}

/// The mandates are given by the lists, electing a candidate adds none.
fn parse_proporz_elected(
    table: &Table,
    selection: &Selection,
    candidates: &BTreeSet<String>,
) -> Parsed {
    let mut parsed = Parsed::new();
    for row in table.rows().filter(|r| selection.business(r)) {
        let mut line = Line::new(&table.file, row.line);
        let candidate_id = row.text("knr").to_string();
        let elected = line.take(row.int("gewaehlt"));
        if !candidates.contains(&candidate_id) {
            line.error(Issue::CandidateNotDeclared {
                candidate_id: candidate_id.clone(),
                file: WPSTATIC_KANDIDATEN.to_string(),
            });
        }
        if elected == Some(1) {
            line.record(Record::Elected {
                candidate_id,
                adds_mandate: false,
            });
        }
        parsed.add_line(line);
    }
    parsed
}

/// The file has the results of all businesses, only those of declared
/// entities and candidates are read.
fn parse_proporz_candidate_results(
    ctx: &Context,
    table: &Table,
    entities: &Entities,
    candidates: &BTreeSet<String>,
) -> Parsed {
    let mut parsed = Parsed::new();
    let mut seen: BTreeSet<(u32, String)> = BTreeSet::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let raw = line.take(row.entity_id("bfsnrgemeinde"));
        let votes = line.take(row.int("stimmen"));
        let candidate_id = row.text("knr").to_string();
        let (raw, votes) = match (raw, votes) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                parsed.add_line(line);
                continue;
            }
        };
        let entity_id = match entities.find(ctx, raw) {
            Some(id) if candidates.contains(&candidate_id) => id,
            _ => continue,
        };
        if !seen.insert((entity_id, candidate_id.clone())) {
            line.error(Issue::FoundTwice {
                name: format!("{}/{}", entity_id, candidate_id),
            });
        }
        line.record(Record::CandidateResult {
            entity_id,
            candidate_id,
            votes: entities.votes(entity_id, votes),
        });
        parsed.add_line(line);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> EntityRegistry {
        let mut registry = EntityRegistry::new();
        for (id, name) in [(3203, "St. Gallen"), (3204, "Wittenbach"), (3251, "Altstätten")] {
            registry.insert(
                2016,
                id,
                Entity {
                    name: name.to_string(),
                    district: String::new(),
                },
            );
        }
        registry
    }

    fn import(election: &Election, parsed: Vec<Parsed>) -> ImportOutcome {
        build(election, &registry(), &Rules::DEFAULT_RULES, parsed)
    }

    fn messages(outcome: &ImportOutcome) -> Vec<String> {
        outcome.errors.iter().map(|e| e.to_string()).collect()
    }

    const WM_WAHL: &str = "SortGeschaeft,AbsolutesMehr,Ausmittlungsstand,AnzPendentGde\n\
        1,5000,1,1\n\
        2,100,0,5\n";

    const WMSTATIC_GEMEINDEN: &str = "SortWahlkreis,SortGeschaeft,BfsNrGemeinde,Stimmberechtigte\n\
        1,1,3203,100\n\
        1,1,3204,200\n\
        1,1,9170,50\n\
        2,1,3251,70\n\
        1,2,3251,70\n";

    const WM_GEMEINDEN: &str = "BfsNrGemeinde,Stimmberechtigte,Sperrung,StmAbgegeben,StmLeer,StmUngueltig,StimmenLeer,StimmenUngueltig\n\
        3203,0,1200,80,1,2,3,4\n\
        3204,210,,90,1,1,1,1\n\
        3251,70,1200,60,0,0,0,0\n\
        9170,50,1300,10,0,0,0,0\n";

    const WM_KANDIDATEN: &str = "SortGeschaeft,KNR,Nachname,Vorname,Gewaehlt,Partei\n\
        1,1,Muster,Max,1,FDP\n\
        1,2,Meier,Eva,0,SP\n\
        2,9,Other,Otto,0,\n";

    fn majorz_files(wahl: &str, kandidatengde: &str) -> Vec<SourceFile> {
        vec![
            SourceFile::csv("wm_wahl.csv", wahl),
            SourceFile::csv("wmstatic_gemeinden.csv", WMSTATIC_GEMEINDEN),
            SourceFile::csv("wm_gemeinden.csv", WM_GEMEINDEN),
            SourceFile::csv("wm_kandidaten.csv", WM_KANDIDATEN),
            SourceFile::csv("wm_kandidatengde.csv", kandidatengde),
        ]
    }

    fn parse_majorz_files(ctx: &Context, f: &[SourceFile]) -> Vec<Parsed> {
        let files = MajorzFiles {
            wm_wahl: &f[0],
            wmstatic_gemeinden: &f[1],
            wm_gemeinden: &f[2],
            wm_kandidaten: &f[3],
            wm_kandidatengde: &f[4],
        };
        parse_majorz(ctx, &files, "1", Some("1"))
    }

    #[test]
    fn majorz_business_of_a_district() {
        let election = Election::new("sr", ElectionSystem::Majorz, Domain::Canton, 2016, 1);
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let f = majorz_files(
            WM_WAHL,
            "SortGeschaeft,BfsNrGemeinde,KNR,Stimmen\n\
             1,3203,1,50\n\
             1,3203,2,20\n\
             1,3204,1,5\n\
             1,9170,1,3\n\
             2,3203,9,1\n",
        );
        let outcome = import(&election, parse_majorz_files(&ctx, &f));
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        let g = outcome.generation;

        assert_eq!(g.status, Status::Interim);
        assert_eq!(g.absolute_majority, Some(5000));
        let results: Vec<(u32, bool, u64)> = g
            .results
            .iter()
            .map(|r| (r.entity_id, r.counted, r.eligible_voters))
            .collect();
        // Altstätten is in another district: it is added as not counted.
        assert_eq!(
            results,
            vec![(3203, true, 100), (3204, false, 0), (3251, false, 0)]
        );
        assert_eq!(g.results[0].blank_votes, 3);
        assert_eq!(g.results[0].invalid_votes, 4);

        let candidates: Vec<(&str, bool, Option<&str>)> = g
            .candidates
            .iter()
            .map(|c| (c.candidate_id.as_str(), c.elected, c.party.as_deref()))
            .collect();
        assert_eq!(
            candidates,
            vec![("1", true, Some("FDP")), ("2", false, Some("SP"))]
        );
        let votes: Vec<(u32, &str, u64)> = g
            .candidate_results
            .iter()
            .map(|r| (r.entity_id, r.candidate_id.as_str(), r.votes))
            .collect();
        assert_eq!(votes, vec![(3203, "1", 50), (3203, "2", 20), (3204, "1", 0)]);
    }

    #[test]
    fn majorz_undeclared_references() {
        let election = Election::new("sr", ElectionSystem::Majorz, Domain::Canton, 2016, 1);
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let f = majorz_files(
            "SortGeschaeft,AbsolutesMehr,Ausmittlungsstand,AnzPendentGde\n1,-1,2,3\n",
            "SortGeschaeft,BfsNrGemeinde,KNR,Stimmen\n\
             1,3203,7,50\n\
             1,3251,1,20\n\
             1,xxx,1,20\n",
        );
        let outcome = import(&election, parse_majorz_files(&ctx, &f));
        assert_eq!(
            messages(&outcome),
            vec![
                "Ausmittlungsstand set to final but AnzPendentGde is not 0".to_string(),
                "wm_kandidatengde.csv:2: Candidate with id 7 not in wm_kandidaten".to_string(),
                "wm_kandidatengde.csv:3: Entity with id 3251 not in wmstatic_gemeinden"
                    .to_string(),
                "wm_kandidatengde.csv:4: Invalid candidate results".to_string(),
            ]
        );
    }

    #[test]
    fn majorz_stage_must_be_a_number() {
        let election = Election::new("sr", ElectionSystem::Majorz, Domain::Canton, 2016, 1);
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let kandidatengde = "SortGeschaeft,BfsNrGemeinde,KNR,Stimmen\n1,3203,1,50\n";
        let f = majorz_files(
            "SortGeschaeft,AbsolutesMehr,Ausmittlungsstand,AnzPendentGde\n1,5000,final,0\n",
            kandidatengde,
        );
        let outcome = import(&election, parse_majorz_files(&ctx, &f));
        assert_eq!(
            messages(&outcome),
            vec!["wm_wahl.csv:2: Invalid integer: ausmittlungsstand".to_string()]
        );

        // An empty stage counts as 0, which is neither interim nor final.
        let f = majorz_files(
            "SortGeschaeft,AbsolutesMehr,Ausmittlungsstand,AnzPendentGde\n1,5000,,1\n",
            kandidatengde,
        );
        let outcome = import(&election, parse_majorz_files(&ctx, &f));
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        assert_eq!(outcome.generation.status, Status::Unknown);
    }

    #[test]
    fn missing_headers_stop_the_import() {
        let election = Election::new("sr", ElectionSystem::Majorz, Domain::Canton, 2016, 1);
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let f = majorz_files("SortGeschaeft\n1\n", "SortGeschaeft,KNR\n1,1\n");
        let parsed = parse_majorz_files(&ctx, &f);
        assert_eq!(parsed.len(), 2);
        let outcome = import(&election, parsed);
        assert_eq!(
            messages(&outcome),
            vec![
                "wm_wahl.csv: Missing columns: 'absolutesmehr, anzpendentgde'".to_string(),
                "wm_kandidatengde.csv: Missing columns: 'bfsnrgemeinde, stimmen'".to_string(),
            ]
        );
    }

    fn proporz_files(listen: &str, static_kandidaten: &str, kandidaten: &str) -> Vec<SourceFile> {
        vec![
            SourceFile::csv("wp_wahl.csv", "SortGeschaeft,AnzPendentGde\n1,0\n2,3\n"),
            SourceFile::csv(
                "wpstatic_gemeinden.csv",
                "SortWahlkreis,SortGeschaeft,BfsNrGemeinde,Stimmberechtigte\n\
                 1,1,3203,100\n\
                 1,1,3204,200\n",
            ),
            SourceFile::csv(
                "wp_gemeinden.csv",
                "BfsNrGemeinde,Stimmberechtigte,Sperrung,StmAbgegeben,StmLeer,StmUngueltig,AnzWZAmtLeer\n\
                 3203,100,1200,80,1,2,0\n\
                 3204,200,1300,150,0,0,0\n",
            ),
            SourceFile::csv("wp_listen.csv", listen),
            SourceFile::csv(
                "wp_listengde.csv",
                "BfsNrGemeinde,ListNr,StimmenTotal\n\
                 3203,1,100\n\
                 3203,99,5\n\
                 3204,1,200\n\
                 3299,1,7\n",
            ),
            SourceFile::csv("wpstatic_kandidaten.csv", static_kandidaten),
            SourceFile::csv("wp_kandidaten.csv", kandidaten),
            SourceFile::csv(
                "wp_kandidatengde.csv",
                "BfsNrGemeinde,KNR,Stimmen\n\
                 3203,101,30\n\
                 3204,101,50\n\
                 3204,999,1\n",
            ),
        ]
    }

    fn parse_proporz_files(ctx: &Context, f: &[SourceFile]) -> Vec<Parsed> {
        let files = ProporzFiles {
            wp_wahl: &f[0],
            wpstatic_gemeinden: &f[1],
            wp_gemeinden: &f[2],
            wp_listen: &f[3],
            wp_listengde: &f[4],
            wpstatic_kandidaten: &f[5],
            wp_kandidaten: &f[6],
            wp_kandidatengde: &f[7],
        };
        parse_proporz(ctx, &files, "1", None)
    }

    #[test]
    fn proporz_business() {
        let election = Election::new("kr", ElectionSystem::Proporz, Domain::Canton, 2016, 2);
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let f = proporz_files(
            "SortGeschaeft,ListNr,ListCode,Sitze,ListVerb,ListUntVerb\n\
             1,1,FDP,1,1,\n\
             1,2,SP,1,1,2\n\
             1,99,WoP,0,,\n\
             2,1,CVP,3,,\n",
            "SortGeschaeft,KNR,Nachname,Vorname\n\
             1,101,Muster,Max\n\
             1,102,Meier,Eva\n\
             1,2.01,Keller,Urs\n",
            "SortGeschaeft,KNR,Gewaehlt\n\
             1,101,1\n\
             1,102,0\n\
             1,2.01,1\n",
        );
        let outcome = import(&election, parse_proporz_files(&ctx, &f));
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        let g = outcome.generation;

        assert_eq!(g.status, Status::Final);
        assert_eq!(g.results.len(), 3);
        assert_eq!(g.results[0].blank_votes, 5);
        assert_eq!(g.results[1].blank_votes, 0);
        assert!(!g.results[2].counted);

        let lists: Vec<(&str, &str, u32)> = g
            .lists
            .iter()
            .map(|l| (l.list_id.as_str(), l.name.as_str(), l.number_of_mandates))
            .collect();
        assert_eq!(lists, vec![("1", "FDP", 1), ("2", "SP", 1)]);
        assert_eq!(g.lists[1].connection, Some(ListConnection::sub("2", "1")));

        let candidates: Vec<(&str, Option<&str>, bool)> = g
            .candidates
            .iter()
            .map(|c| (c.candidate_id.as_str(), c.list_id.as_deref(), c.elected))
            .collect();
        assert_eq!(
            candidates,
            vec![
                ("101", Some("1"), true),
                ("102", Some("1"), false),
                ("2.01", Some("2"), true)
            ]
        );
        assert_eq!(g.list_results.len(), 2);
        assert_eq!(g.candidate_results.len(), 2);
    }

    #[test]
    fn proporz_inconsistent_lists_and_candidates() {
        let election = Election::new("kr", ElectionSystem::Proporz, Domain::Canton, 2016, 2);
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let f = proporz_files(
            "SortGeschaeft,ListNr,ListCode,Sitze,ListVerb,ListUntVerb\n\
             1,1,FDP,1,,\n\
             1,1,FDP,1,,\n\
             1,2,SP,1,,2\n",
            "SortGeschaeft,KNR,Nachname,Vorname\n\
             1,101,Muster,Max\n\
             1,301,Keller,Urs\n",
            "SortGeschaeft,KNR,Gewaehlt\n\
             1,101,1\n\
             1,999,1\n",
        );
        let outcome = import(&election, parse_proporz_files(&ctx, &f));
        assert_eq!(
            messages(&outcome),
            vec![
                "wp_listen.csv:3: 1 was found twice".to_string(),
                "wp_listen.csv:4: connection is missing.".to_string(),
                "wpstatic_kandidaten.csv:3: List_id 3 has not been found in list numbers"
                    .to_string(),
                "wp_kandidaten.csv:3: Candidate with id 999 not in wpstatic_kandidaten"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn candidate_numbers_carry_the_list() {
        assert_eq!(list_of_candidate("101"), "1");
        assert_eq!(list_of_candidate("1201"), "12");
        assert_eq!(list_of_candidate("03.07"), "03");
        assert_eq!(list_of_candidate("7"), "");
    }
}
