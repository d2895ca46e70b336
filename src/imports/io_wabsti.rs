// The legacy exports of Wabsti: one results file, completed by optional files
// for the list connections, the elected candidates and the statistics.

use election_results::records::*;
use election_results::*;
use log::{debug, warn};

use crate::imports::io_common::*;
use crate::imports::Context;

const PROPORZ_HEADERS: [&str; 8] = [
    "einheit_bfs",
    "liste_kandid",
    "kand_nachname",
    "kand_vorname",
    "liste_id",
    "liste_code",
    "kand_stimmentotal",
    "liste_parteistimmentotal",
];

const PROPORZ_HEADERS_CONNECTIONS: [&str; 3] = ["liste", "lv", "luv"];

const PROPORZ_HEADERS_ELECTED: [&str; 1] = ["liste_kandid"];

const PROPORZ_HEADERS_STATS: [&str; 7] = [
    "einheit_bfs",
    "einheit_name",
    "stimbertotal",
    "wzeingegangen",
    "wzleer",
    "wzungueltig",
    "stmwzveraendertleeramtlleer",
];

const MAJORZ_HEADERS: [&str; 6] = [
    "AnzMandate",
    "BFS",
    "StimmBer",
    "StimmAbgegeben",
    "StimmLeer",
    "StimmUngueltig",
];

const MAJORZ_HEADERS_ELECTED: [&str; 3] = ["KandID", "Name", "Vorname"];

/// The name of the statistics line of the expats.
const EXPATS_NAME: &str = "auslandschweizer";

/// The pseudo candidates of the majorz results.
const BLANK_LINES: &str = "leere zeilen";
const INVALID_VOTES: &str = "ungültige stimmen";

/// Panachage columns are named `<list id>.<list code>`, list 99 being the blank list.
fn panachage_columns(table: &Table) -> Vec<(usize, String)> {
    table.find_columns(|h| {
        if !h.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        h.split_once('.').map(|(id, _)| {
            if id == "99" {
                BLANK_LIST.to_string()
            } else {
                id.to_string()
            }
        })
    })
}

fn load(file: &SourceFile, headers: &[&str]) -> Result<Table, Parsed> {
    load_table(file, headers).map_err(Parsed::failed)
}

pub fn parse_proporz(
    ctx: &Context,
    results: &SourceFile,
    connections: Option<&SourceFile>,
    elected: Option<&SourceFile>,
    statistics: Option<&SourceFile>,
) -> Vec<Parsed> {
    let mut all = vec![parse_proporz_results(ctx, results)];
    if let Some(file) = connections {
        all.push(parse_proporz_connections(file));
    }
    if let Some(file) = elected {
        all.push(parse_proporz_elected(file));
    }
    if let Some(file) = statistics {
        all.push(parse_proporz_statistics(ctx, file));
    }
    all
}

fn parse_proporz_results(ctx: &Context, file: &SourceFile) -> Parsed {
    let table = match load(file, &PROPORZ_HEADERS) {
        Ok(t) => t,
        Err(p) => return p,
    };
    let panachage = panachage_columns(&table);
    debug!(
        "parse_proporz_results: {} panachage columns",
        panachage.len()
    );

    let mut parsed = Parsed::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let entity_id = line.take(row.entity_id("einheit_bfs"));
        let candidate_id = line.take(row.required_int("liste_kandid"));
        let candidate_votes = line.take(row.int("kand_stimmentotal"));
        let list_id = line.take(row.list_id("liste_id"));
        let list_votes = line.take(row.int("liste_parteistimmentotal"));
        let transfers: Vec<(String, u64)> = panachage
            .iter()
            .filter_map(|(idx, source)| line.take(row.int_at(*idx)).map(|v| (source.clone(), v)))
            .collect();

        if let Some(id) = entity_id {
            if ctx.entity(id).is_none() {
                debug!("parse_proporz_results: line {}: skipping the expats", row.line);
                continue;
            }
        }
        let (entity_id, candidate_id, candidate_votes, list_id, list_votes) =
            match (entity_id, candidate_id, candidate_votes, list_id, list_votes) {
                (Some(a), Some(b), Some(c), Some(d), Some(e)) => (a, b.to_string(), c, d, e),
                _ => {
                    parsed.add_line(line);
                    continue;
                }
            };

        line.record(Record::Entity(EntityFacts {
            counted: Some(true),
            ..EntityFacts::new(entity_id)
        }));
        line.record(Record::List(ListFacts {
            list_id: list_id.clone(),
            name: Some(row.text("liste_code").to_string()),
            number_of_mandates: Some(0),
            connection: None,
        }));
        line.record(Record::ListResult {
            entity_id,
            list_id: list_id.clone(),
            votes: list_votes,
        });
        line.record(Record::Candidate(CandidateFacts {
            candidate_id: candidate_id.clone(),
            family_name: Some(row.text("kand_nachname").to_string()),
            first_name: Some(row.text("kand_vorname").to_string()),
            elected: Some(false),
            party: None,
            list_id: Some(list_id.clone()),
            gender: None,
            year_of_birth: None,
        }));
        line.record(Record::CandidateResult {
            entity_id,
            candidate_id,
            votes: candidate_votes,
        });
        // Every line of a candidate carries the votes from the other lists.
        for (source, votes) in transfers {
            if source != list_id {
                line.record(Record::Panachage {
                    target: list_id.clone(),
                    source,
                    votes,
                });
            }
        }
        parsed.add_line(line);
    }
    parsed
}

fn parse_proporz_connections(file: &SourceFile) -> Parsed {
    let table = match load(file, &PROPORZ_HEADERS_CONNECTIONS) {
        Ok(t) => t,
        Err(p) => return p,
    };
    let mut parsed = Parsed::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let list_id = line.take(row.list_id("liste"));
        let connection = match (row.text("lv"), row.text("luv")) {
            ("", _) => None,
            (lv, "") => Some(ListConnection::top(lv)),
            (lv, luv) => Some(ListConnection::sub(luv, lv)),
        };
        if let (Some(list_id), Some(connection)) = (list_id, connection) {
            line.record(Record::Connection {
                list_id,
                connection,
            });
        }
        parsed.add_line(line);
    }
    parsed
}

fn parse_proporz_elected(file: &SourceFile) -> Parsed {
    let table = match load(file, &PROPORZ_HEADERS_ELECTED) {
        Ok(t) => t,
        Err(p) => return p,
    };
    let mut parsed = Parsed::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        if let Some(candidate_id) = line.take(row.required_int("liste_kandid")) {
            line.record(Record::Elected {
                candidate_id: candidate_id.to_string(),
                adds_mandate: true,
            });
        }
        parsed.add_line(line);
    }
    parsed
}

fn parse_proporz_statistics(ctx: &Context, file: &SourceFile) -> Parsed {
    let table = match load(file, &PROPORZ_HEADERS_STATS) {
        Ok(t) => t,
        Err(p) => return p,
    };
    let year = ctx.election.year;
    let mut parsed = Parsed::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let entity_id = line.take(row.entity_id("einheit_bfs"));
        let eligible_voters = line.take(row.int("stimbertotal"));
        let received_ballots = line.take(row.int("wzeingegangen"));
        let blank_ballots = line.take(row.int("wzleer"));
        let invalid_ballots = line.take(row.int("wzungueltig"));
        let blank_votes = line.take(row.int("stmwzveraendertleeramtlleer"));

        if let Some(mut entity_id) = entity_id {
            let expats = row.text("einheit_name").eq_ignore_ascii_case(EXPATS_NAME);
            if expats && ctx.registry.get(year, entity_id).is_none() {
                entity_id = 0;
            }
            line.record(Record::Statistics(EntityFacts {
                entity_id,
                counted: None,
                eligible_voters,
                received_ballots,
                blank_ballots,
                invalid_ballots,
                blank_votes,
                invalid_votes: None,
                expats: None,
            }));
        }
        parsed.add_line(line);
    }
    parsed
}

/// The (name, votes) column pairs of the candidates, in the order of the file.
fn candidate_columns(table: &Table) -> Vec<(usize, usize)> {
    let names = table.find_columns(|h| h.strip_prefix("kandname_").map(|n| n.to_string()));
    let votes = table.find_columns(|h| h.strip_prefix("stimmen_").map(|n| n.to_string()));
    names
        .into_iter()
        .filter_map(|(name_idx, n)| {
            let votes_idx = votes.iter().find(|(_, m)| *m == n).map(|(idx, _)| *idx);
            if votes_idx.is_none() {
                warn!("candidate_columns: no votes for kandname_{}", n);
            }
            votes_idx.map(|v| (name_idx, v))
        })
        .collect()
}

fn parse_majorz_election(row: &Row) -> Result<Option<u64>, Issue> {
    let majority = row
        .signed("AnzMandate")
        .map_err(|_| Issue::InvalidValues(Facet::Election))?;
    // Negative values are used when there is no absolute majority.
    Ok(majority.filter(|m| *m >= 0).map(|m| m as u64))
}

fn parse_majorz_entity(row: &Row) -> Result<EntityFacts, Issue> {
    let invalid = |_| Issue::InvalidValues(Facet::Entity);
    Ok(EntityFacts {
        entity_id: row.entity_id("BFS").map_err(invalid)?,
        counted: Some(true),
        eligible_voters: Some(row.int("StimmBer").map_err(invalid)?),
        received_ballots: Some(row.int("StimmAbgegeben").map_err(invalid)?),
        blank_ballots: Some(row.int("StimmLeer").map_err(invalid)?),
        invalid_ballots: Some(row.int("StimmUngueltig").map_err(invalid)?),
        blank_votes: Some(0),
        invalid_votes: Some(0),
        expats: None,
    })
}

pub fn parse_majorz(ctx: &Context, results: &SourceFile, elected: Option<&SourceFile>) -> Vec<Parsed> {
    let mut all = vec![parse_majorz_results(ctx, results)];
    if let Some(file) = elected {
        all.push(parse_majorz_elected(file));
    }
    all
}

fn parse_majorz_results(ctx: &Context, file: &SourceFile) -> Parsed {
    let table = match load(file, &MAJORZ_HEADERS) {
        Ok(t) => t,
        Err(p) => return p,
    };
    let candidates = candidate_columns(&table);
    debug!("parse_majorz_results: {} candidate columns", candidates.len());

    let mut parsed = Parsed::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let absolute_majority = line.take(parse_majorz_election(&row)).flatten();
        let entity = line.take(parse_majorz_entity(&row));
        let mut entity = match (entity, line.has_errors()) {
            (Some(e), false) => e,
            _ => {
                parsed.add_line(line);
                continue;
            }
        };
        if ctx.entity(entity.entity_id).is_none() {
            debug!("parse_majorz_results: line {}: skipping the expats", row.line);
            continue;
        }

        let mut votes: Vec<(String, u64)> = Vec::new();
        for (name_idx, votes_idx) in candidates.iter() {
            let name = row.cell(*name_idx);
            let count = match row.int_at(*votes_idx) {
                Ok(c) => c,
                Err(_) => {
                    line.error(Issue::InvalidValues(Facet::CandidateResults));
                    break;
                }
            };
            match name.to_lowercase().as_str() {
                "" => {}
                BLANK_LINES => entity.blank_votes = Some(count),
                INVALID_VOTES => entity.invalid_votes = Some(count),
                _ => votes.push((name.to_string(), count)),
            }
        }

        let entity_id = entity.entity_id;
        line.record(Record::Election(ElectionFacts {
            status: None,
            absolute_majority,
        }));
        line.record(Record::Declare { entity_id });
        line.record(Record::Entity(entity));
        for (name, count) in votes {
            line.record(Record::Candidate(CandidateFacts {
                candidate_id: name.clone(),
                family_name: Some(name.clone()),
                first_name: Some(String::new()),
                elected: Some(false),
                party: None,
                list_id: None,
                gender: None,
                year_of_birth: None,
            }));
            line.record(Record::CandidateResult {
                entity_id,
                candidate_id: name,
                votes: count,
            });
        }
        parsed.add_line(line);
    }
    parsed
}

/// The elected candidates are found by their names, as the results know no ids.
fn parse_majorz_elected(file: &SourceFile) -> Parsed {
    let table = match load(file, &MAJORZ_HEADERS_ELECTED) {
        Ok(t) => t,
        Err(p) => return p,
    };
    let mut parsed = Parsed::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let name = format!("{} {}", row.text("Name"), row.text("Vorname"));
        line.record(Record::Elected {
            candidate_id: name.trim().to_string(),
            adds_mandate: false,
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
        for (id, name) in [(3203, "St. Gallen"), (3204, "Wittenbach")] {
            registry.insert(
                2016,
                id,
                Entity {
                    name: name.to_string(),
                    district: "St. Gallen".to_string(),
                },
            );
        }
        registry
    }

    fn import(election: &Election, parsed: Vec<Parsed>) -> ImportOutcome {
        let rules = Rules {
            redefinition: Redefinition::KeepFirst,
            ballot_checks: election.system == ElectionSystem::Proporz,
        };
        build(election, &registry(), &rules, parsed)
    }

    const RESULTS: &str = "\
Einheit_BFS,Liste_KandID,Kand_Nachname,Kand_Vorname,Liste_ID,Liste_Code,Kand_StimmenTotal,Liste_ParteistimmenTotal,01.FDP,02.SP,99.WoP
3203,101,Muster,Max,01,FDP,30,100,0,5,2
3203,102,Meier,Eva,01,FDP,20,100,0,1,0
3203,201,Keller,Urs,02,SP,25,60,3,0,1
3204,101,Muster,Max,01,FDP,10,40,0,0,0";

    #[test]
    fn proporz_with_all_the_files() {
        let election = Election::new("kr", ElectionSystem::Proporz, Domain::Canton, 2016, 2);
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let results = SourceFile::csv("results.csv", RESULTS);
        let connections = SourceFile::csv("connections.csv", "Liste,LV,LUV\n01,1,\n02,1,2\n");
        let elected = SourceFile::csv("elected.csv", "Liste_KandID\n101\n201\n");
        let stats = SourceFile::csv(
            "stats.csv",
            "Einheit_BFS,Einheit_Name,StimBerTotal,WZEingegangen,WZLeer,WZUngueltig,StmWZVeraendertLeerAmtlLeer\n\
             3203,St. Gallen,200,100,2,3,4\n\
             3205,Gossau,100,50,0,0,0\n",
        );
        let parsed = parse_proporz(&ctx, &results, Some(&connections), Some(&elected), Some(&stats));
        let outcome = import(&election, parsed);
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        let g = outcome.generation;

        assert_eq!(g.results[0].eligible_voters, 200);
        assert_eq!(g.results[0].blank_votes, 4);
        // Wittenbach has no statistics.
        assert_eq!(g.results[1].eligible_voters, 0);
        assert!(g.results[1].counted);

        let mandates: Vec<(&str, u32)> = g
            .lists
            .iter()
            .map(|l| (l.list_id.as_str(), l.number_of_mandates))
            .collect();
        assert_eq!(mandates, vec![("01", 1), ("02", 1)]);
        assert_eq!(g.lists[1].connection, Some(ListConnection::sub("2", "1")));

        let panachage: Vec<(&str, &str, u64)> = g
            .panachage
            .iter()
            .map(|p| (p.target.as_str(), p.source.as_str(), p.votes))
            .collect();
        assert_eq!(
            panachage,
            vec![
                ("01", "02", 6),
                ("01", "999", 2),
                ("02", "01", 3),
                ("02", "999", 1)
            ]
        );
    }

    #[test]
    fn unknown_elected_candidate() {
        let election = Election::new("kr", ElectionSystem::Proporz, Domain::Canton, 2016, 2);
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let results = SourceFile::csv("results.csv", RESULTS);
        let elected = SourceFile::csv("elected.csv", "Liste_KandID\n999\nx\n");
        let parsed = parse_proporz(&ctx, &results, None, Some(&elected), None);
        let outcome = import(&election, parsed);
        let errors: Vec<String> = outcome.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            errors,
            vec![
                "elected.csv:3: Invalid integer: liste_kandid".to_string(),
                "elected.csv:2: Unknown candidate".to_string(),
            ]
        );
    }

    const MAJORZ: &str = "\
AnzMandate,BFS,StimmBer,StimmAbgegeben,StimmLeer,StimmUngueltig,KandName_1,Stimmen_1,KandName_2,Stimmen_2,KandName_3,Stimmen_3,KandName_4,Stimmen_4
50,3203,200,100,2,3,Rechsteiner Paul,80,Meier Eva,15,Leere Zeilen,4,Ungültige Stimmen,1
50,9170,20,10,0,0,Rechsteiner Paul,8,Meier Eva,2,Leere Zeilen,0,Ungültige Stimmen,0";

    #[test]
    fn majorz_with_elected_candidates() {
        let mut election = Election::new("sr", ElectionSystem::Majorz, Domain::Canton, 2016, 1);
        election.has_expats = true;
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let elected = SourceFile::csv("elected.csv", "KandID,Name,Vorname\n3,Rechsteiner,Paul\n");
        let parsed = parse_majorz(&ctx, &SourceFile::csv("majorz.csv", MAJORZ), Some(&elected));
        let outcome = import(&election, parsed);
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        let g = outcome.generation;

        assert_eq!(g.absolute_majority, Some(50));
        assert_eq!(g.status, Status::Unknown);
        let ids: Vec<u32> = g.results.iter().map(|r| r.entity_id).collect();
        assert_eq!(ids, vec![0, 3203, 3204]);
        assert_eq!(g.results[0].eligible_voters, 20);
        assert_eq!(g.results[1].blank_votes, 4);
        assert_eq!(g.results[1].invalid_votes, 1);
        let elected: Vec<&str> = g
            .candidates
            .iter()
            .filter(|c| c.elected)
            .map(|c| c.family_name.as_str())
            .collect();
        assert_eq!(elected, vec!["Rechsteiner Paul"]);
    }

    #[test]
    fn majorz_without_absolute_majority() {
        let mut election = Election::new("sr", ElectionSystem::Majorz, Domain::Canton, 2016, 1);
        election.has_expats = true;
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let results = MAJORZ.replace("\n50,", "\n-1,");
        let parsed = parse_majorz(&ctx, &SourceFile::csv("majorz.csv", &results), None);
        let outcome = import(&election, parsed);
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        assert_eq!(outcome.generation.absolute_majority, None);
    }

    #[test]
    fn majorz_errors_are_grouped() {
        let election = Election::new("sr", ElectionSystem::Majorz, Domain::Canton, 2016, 1);
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let results = "AnzMandate,BFS,StimmBer,StimmAbgegeben,StimmLeer,StimmUngueltig,KandName_1,Stimmen_1\n\
             xxx,xxx,xxx,xxx,xxx,xxx,xxx,xxx\n\
             ,1234,100,90,1,1,Leere Zeilen,0\n";
        let elected = SourceFile::csv("elected.csv", "KandID,Name,Vorname\nxxx,xxx,xxx\n");
        let parsed = parse_majorz(&ctx, &SourceFile::csv("majorz.csv", results), Some(&elected));
        let outcome = import(&election, parsed);
        let errors: Vec<String> = outcome.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            errors,
            vec![
                "majorz.csv:2: Invalid election values".to_string(),
                "majorz.csv:2: Invalid entity values".to_string(),
                "elected.csv:2: Unknown candidate".to_string(),
                "majorz.csv:3: 1234 is unknown".to_string(),
            ]
        );
    }
}
