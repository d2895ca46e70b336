use log::{debug, info, warn};

use election_results::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::imports::config_reader::*;
use crate::imports::io_common::SourceFile;

pub mod config_reader;
pub mod io_common;
pub mod io_internal;
pub mod io_party;
pub mod io_wabsti;
pub mod io_wabstic;
pub mod store;

/// Failures that stop an import before any result is computed.
///
/// Problems in the content of the files are not failures: they are collected
/// as `ImportError`s and reported back.
#[derive(Debug, Snafu)]
pub enum ImportFailure {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Invalid entry {key} in the entity registry"))]
    InvalidRegistry { key: String },
    #[snafu(display("No file provided for {role}"))]
    MissingFile { role: String },
    #[snafu(display("The {format} format needs the number of the business"))]
    MissingNumber { format: String },
    #[snafu(display("Error accessing the database"))]
    Database { source: rusqlite::Error },
    #[snafu(display("Error writing the report to {path}"))]
    WritingReport {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error serializing the report"))]
    SerializingReport { source: serde_json::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type ImportResult<T> = Result<T, ImportFailure>;

/// The export formats.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Internal,
    Wabsti,
    Wabstic,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Internal => "internal",
            Format::Wabsti => "wabsti",
            Format::Wabstic => "wabstic",
        }
    }

    /// The checks that apply to the files of this format.
    ///
    /// The legacy wabsti exports repeat definitions that may drift, and the
    /// majorz ones do not keep the ballots consistent with the voters.
    pub fn rules(&self, system: ElectionSystem) -> Rules {
        match (self, system) {
            (Format::Internal, _) | (Format::Wabstic, _) => Rules::DEFAULT_RULES,
            (Format::Wabsti, ElectionSystem::Proporz) => Rules {
                redefinition: Redefinition::KeepFirst,
                ballot_checks: true,
            },
            (Format::Wabsti, ElectionSystem::Majorz) => Rules {
                redefinition: Redefinition::KeepFirst,
                ballot_checks: false,
            },
        }
    }
}

/// All the files of one import.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Batch {
    pub format: Format,
    /// The files, by role.
    pub files: Vec<(String, SourceFile)>,
    /// The business (SortGeschaeft) in the wabstic files.
    pub number: Option<String>,
    /// The district (SortWahlkreis) in the wabstic files.
    pub district: Option<String>,
    pub party_results: Option<SourceFile>,
}

impl Batch {
    pub fn new(format: Format) -> Batch {
        Batch {
            format,
            files: Vec::new(),
            number: None,
            district: None,
            party_results: None,
        }
    }

    pub fn with_file(mut self, role: &str, file: SourceFile) -> Batch {
        self.files.push((role.to_string(), file));
        self
    }

    pub fn optional(&self, role: &str) -> Option<&SourceFile> {
        self.files
            .iter()
            .find(|(r, _)| r.eq_ignore_ascii_case(role))
            .map(|(_, f)| f)
    }

    pub fn file(&self, role: &str) -> ImportResult<&SourceFile> {
        self.optional(role).context(MissingFileSnafu { role })
    }

    fn number(&self) -> ImportResult<&str> {
        self.number.as_deref().context(MissingNumberSnafu {
            format: self.format.as_str(),
        })
    }
}

/// What the parsers know about the election being imported.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub election: &'a Election,
    pub registry: &'a EntityRegistry,
}

impl<'a> Context<'a> {
    pub fn new(election: &'a Election, registry: &'a EntityRegistry) -> Context<'a> {
        Context { election, registry }
    }

    /// The entity id used for a line, or None if the line is for the expats
    /// and they are not part of this election.
    pub fn entity(&self, raw: u32) -> Option<u32> {
        let id = self.registry.normalize(self.election.year, raw);
        Some(id).filter(|id| self.election.accepts_entity(*id))
    }
}

/// Runs the parsers of the format on all the files of the batch.
pub fn parse_batch(ctx: &Context, batch: &Batch) -> ImportResult<Vec<Parsed>> {
    let system = ctx.election.system;
    info!(
        "parse_batch: {} {:?} election {}",
        batch.format.as_str(),
        system,
        ctx.election.id
    );
    let mut parsed = match (batch.format, system) {
        (Format::Internal, ElectionSystem::Majorz) => {
            vec![io_internal::parse_majorz(ctx, batch.file("results")?)]
        }
        (Format::Internal, ElectionSystem::Proporz) => {
            vec![io_internal::parse_proporz(ctx, batch.file("results")?)]
        }
        (Format::Wabsti, ElectionSystem::Proporz) => io_wabsti::parse_proporz(
            ctx,
            batch.file("results")?,
            batch.optional("connections"),
            batch.optional("elected"),
            batch.optional("statistics"),
        ),
        (Format::Wabsti, ElectionSystem::Majorz) => io_wabsti::parse_majorz(
            ctx,
            batch.file("results")?,
            batch.optional("elected"),
        ),
        (Format::Wabstic, ElectionSystem::Majorz) => {
            let files = io_wabstic::MajorzFiles {
                wm_wahl: batch.file("wm_wahl")?,
                wmstatic_gemeinden: batch.file("wmstatic_gemeinden")?,
                wm_gemeinden: batch.file("wm_gemeinden")?,
                wm_kandidaten: batch.file("wm_kandidaten")?,
                wm_kandidatengde: batch.file("wm_kandidatengde")?,
            };
            io_wabstic::parse_majorz(ctx, &files, batch.number()?, batch.district.as_deref())
        }
        (Format::Wabstic, ElectionSystem::Proporz) => {
            let files = io_wabstic::ProporzFiles {
                wp_wahl: batch.file("wp_wahl")?,
                wpstatic_gemeinden: batch.file("wpstatic_gemeinden")?,
                wp_gemeinden: batch.file("wp_gemeinden")?,
                wp_listen: batch.file("wp_listen")?,
                wp_listengde: batch.file("wp_listengde")?,
                wpstatic_kandidaten: batch.file("wpstatic_kandidaten")?,
                wp_kandidaten: batch.file("wp_kandidaten")?,
                wp_kandidatengde: batch.file("wp_kandidatengde")?,
            };
            io_wabstic::parse_proporz(ctx, &files, batch.number()?, batch.district.as_deref())
        }
    };
    if let Some(parties) = &batch.party_results {
        parsed.push(io_party::parse_party_results(ctx, parties));
    }
    Ok(parsed)
}

/// Imports a batch and, if it is free of errors, replaces the stored results of
/// the election in one transaction.
pub fn import_batch(
    conn: &mut Connection,
    election: &Election,
    registry: &EntityRegistry,
    batch: &Batch,
) -> ImportResult<ImportOutcome> {
    let ctx = Context::new(election, registry);
    let parsed = parse_batch(&ctx, batch)?;
    let rules = batch.format.rules(election.system);
    let outcome = build(election, registry, &rules, parsed);

    let tx = conn.transaction().context(DatabaseSnafu {})?;
    let committed = store::commit(&tx, election, &outcome).context(DatabaseSnafu {})?;
    tx.commit().context(DatabaseSnafu {})?;
    if committed {
        info!("import_batch: election {} replaced", election.id);
    } else {
        warn!(
            "import_batch: election {} left unchanged, {} errors",
            election.id,
            outcome.errors.len()
        );
    }
    Ok(outcome)
}

fn write_report(out: &str, text: &str) -> ImportResult<()> {
    if out == "stdout" {
        println!("{}", text);
        Ok(())
    } else {
        fs::write(out, text).context(WritingReportSnafu { path: out })
    }
}

/// Runs the import described by a batch configuration file, and returns the report.
pub fn run_import(
    config_path: &str,
    out: Option<String>,
    reference: Option<String>,
    with_summary: bool,
) -> ImportResult<ImportReport> {
    let config = read_config(config_path)?;
    let root = Path::new(config_path)
        .parent()
        .unwrap_or_else(|| Path::new("."));
    let registry = read_registry(&root.join(&config.registry))?;
    let batch = read_batch(root, &config)?;
    debug!("run_import: batch {:?}", batch.files.len());

    let mut conn = Connection::open(root.join(&config.database)).context(DatabaseSnafu {})?;
    store::init(&conn).context(DatabaseSnafu {})?;

    let outcome = import_batch(&mut conn, &config.election, &registry, &batch)?;
    let report = outcome.report();

    let mut report_js = serde_json::to_value(&report).context(SerializingReportSnafu {})?;
    if with_summary && outcome.is_ok() {
        if let Some(rs) = store::load(&conn, &config.election.id).context(DatabaseSnafu {})? {
            let summary_js = serde_json::to_value(rs.summary()).context(SerializingReportSnafu {})?;
            if let JSValue::Object(m) = &mut report_js {
                m.insert("summary".to_string(), summary_js);
            }
        }
    }
    let pretty_js = serde_json::to_string_pretty(&report_js).context(SerializingReportSnafu {})?;
    write_report(out.as_deref().unwrap_or("stdout"), &pretty_js)?;

    // The reference report, if provided for comparison
    if let Some(reference_p) = reference {
        let reference_js = read_summary(&reference_p)?;
        let pretty_js_ref =
            serde_json::to_string_pretty(&reference_js).context(SerializingReportSnafu {})?;
        if pretty_js_ref != pretty_js {
            warn!("Found differences with the reference report");
            print_diff(pretty_js_ref.as_str(), pretty_js.as_ref(), "\n");
            whatever!("Difference detected between the report and the reference report")
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn registry() -> EntityRegistry {
        let mut registry = EntityRegistry::new();
        for id in 1..=20 {
            registry.insert(
                2015,
                id,
                Entity {
                    name: format!("Gemeinde {}", id),
                    district: if id <= 10 { "Nord" } else { "Süd" }.to_string(),
                },
            );
        }
        registry
    }

    fn proporz() -> Election {
        Election::new("nr-2015", ElectionSystem::Proporz, Domain::Canton, 2015, 2)
    }

    const HEADER: &str = "election_status,entity_id,entity_counted,entity_eligible_voters,\
entity_received_ballots,entity_blank_ballots,entity_invalid_ballots,entity_blank_votes,\
entity_invalid_votes,candidate_family_name,candidate_first_name,candidate_id,\
candidate_elected,candidate_votes,candidate_party,list_name,list_id,\
list_number_of_mandates,list_votes,list_connection,list_connection_parent";

    fn scenario_a() -> String {
        let mut lines = vec![HEADER.to_string()];
        for entity in [1, 2] {
            for (cand, list, name) in [(101, 1, "FDP"), (201, 2, "SP")] {
                lines.push(format!(
                    "final,{entity},true,100,80,2,3,0,0,Muster{cand},Max,{cand},false,20,P,{name},{list},1,40,,"
                ));
            }
        }
        lines.join("\n")
    }

    #[test]
    fn scenario_a_replaces_the_results() {
        let _ = env_logger::builder().is_test(true).try_init();
        let election = proporz();
        let registry = registry();
        let mut conn = Connection::open_in_memory().unwrap();
        store::init(&conn).unwrap();

        let batch = Batch::new(Format::Internal)
            .with_file("results", SourceFile::csv("results.csv", &scenario_a()));
        let outcome = import_batch(&mut conn, &election, &registry, &batch).unwrap();
        assert_eq!(outcome.report().status, ReportStatus::Ok);

        let stored = store::load(&conn, &election.id).unwrap().unwrap();
        let counted: Vec<u32> = stored
            .generation
            .results
            .iter()
            .filter(|r| r.counted)
            .map(|r| r.entity_id)
            .collect();
        assert_eq!(counted, vec![1, 2]);
        assert_eq!(stored.generation.candidates.len(), 2);
        assert_eq!(stored.generation.lists.len(), 2);
        assert_eq!(stored.generation.candidate_results.len(), 4);
        assert_eq!(stored.generation.list_results.len(), 4);
        assert_eq!(stored.election.status, Status::Final);
        assert_eq!(stored.election.total_entities, 20);
        assert_eq!(stored.election.counted_entities, 2);
    }

    #[test]
    fn scenario_b_keeps_the_previous_results() {
        let election = proporz();
        let registry = registry();
        let mut conn = Connection::open_in_memory().unwrap();
        store::init(&conn).unwrap();
        let batch = Batch::new(Format::Internal)
            .with_file("results", SourceFile::csv("results.csv", &scenario_a()));
        import_batch(&mut conn, &election, &registry, &batch).unwrap();
        let before = store::load(&conn, &election.id).unwrap();

        let broken = scenario_a().replace("final,2,", "final,9999,");
        let batch = Batch::new(Format::Internal)
            .with_file("results", SourceFile::csv("results.csv", &broken));
        let outcome = import_batch(&mut conn, &election, &registry, &batch).unwrap();
        let report = outcome.report();
        assert_eq!(report.status, ReportStatus::Error);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].message, "9999 is unknown");

        assert_eq!(store::load(&conn, &election.id).unwrap(), before);
    }

    #[test]
    fn importing_twice_gives_the_same_results() {
        let election = proporz();
        let registry = registry();
        let mut conn = Connection::open_in_memory().unwrap();
        store::init(&conn).unwrap();
        let batch = Batch::new(Format::Internal)
            .with_file("results", SourceFile::csv("results.csv", &scenario_a()));
        import_batch(&mut conn, &election, &registry, &batch).unwrap();
        let first = store::load(&conn, &election.id).unwrap();
        import_batch(&mut conn, &election, &registry, &batch).unwrap();
        let second = store::load(&conn, &election.id).unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn scenario_c_more_ballots_than_voters() {
        let election = proporz();
        let registry = registry();
        let mut conn = Connection::open_in_memory().unwrap();
        store::init(&conn).unwrap();
        let results = "Einheit_BFS,Liste_KandID,Kand_Nachname,Kand_Vorname,Liste_ID,Liste_Code,Kand_StimmenTotal,Liste_ParteistimmenTotal\n\
                       1,101,Muster,Max,01,FDP,30,100\n";
        let stats = "Einheit_BFS,Einheit_Name,StimBerTotal,WZEingegangen,WZLeer,WZUngueltig,StmWZVeraendertLeerAmtlLeer\n\
                     1,Gemeinde 1,50,80,0,0,0\n";
        let batch = Batch::new(Format::Wabsti)
            .with_file("results", SourceFile::csv("results.csv", results))
            .with_file("statistics", SourceFile::csv("stats.csv", stats));
        let outcome = import_batch(&mut conn, &election, &registry, &batch).unwrap();
        let report = outcome.report();
        assert_eq!(report.status, ReportStatus::Error);
        let messages: Vec<&str> = report.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["More received ballots than eligible voters"]);
        assert_eq!(store::load(&conn, &election.id).unwrap(), None);
    }

    #[test]
    fn missing_files_are_failures() {
        let election = proporz();
        let registry = registry();
        let ctx = Context::new(&election, &registry);
        let batch = Batch::new(Format::Wabsti);
        let err = parse_batch(&ctx, &batch).unwrap_err();
        assert_eq!(err.to_string(), "No file provided for results");

        let batch = Batch::new(Format::Wabstic);
        assert!(parse_batch(&ctx, &batch).is_err());
    }

    #[test]
    fn runs_an_import_from_a_configuration() {
        let dir = std::env::temp_dir().join(format!("elimport-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(dir.join("data")).unwrap();
        let entities: Vec<String> = (1..=20)
            .map(|id| format!("\"{}\": {{\"name\": \"Gemeinde {}\"}}", id, id))
            .collect();
        fs::write(
            dir.join("registry.json"),
            format!("{{\"2015\": {{{}}}}}", entities.join(", ")),
        )
        .unwrap();
        fs::write(dir.join("data/results.csv"), scenario_a()).unwrap();
        let config = r#"{
            "database": "results.db",
            "registry": "registry.json",
            "election": {
                "id": "nr-2015",
                "system": "proporz",
                "domain": "canton",
                "year": 2015,
                "numberOfMandates": 2
            },
            "format": "internal",
            "files": [{"role": "results", "filePath": "data/results.csv"}]
        }"#;
        let config_path = dir.join("batch.json");
        fs::write(&config_path, config).unwrap();
        let out = dir.join("report.json");

        let report = run_import(
            config_path.to_str().unwrap(),
            Some(out.display().to_string()),
            None,
            true,
        )
        .unwrap();
        assert_eq!(report.status, ReportStatus::Ok);

        let written: JSValue = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written["status"], "ok");
        assert_eq!(written["summary"]["status"], "final");
        assert_eq!(written["summary"]["progress"], serde_json::json!([2, 20]));

        // The same report is its own reference.
        let again = run_import(
            config_path.to_str().unwrap(),
            Some(dir.join("again.json").display().to_string()),
            Some(out.display().to_string()),
            true,
        );
        assert!(again.is_ok());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn format_rules() {
        assert_eq!(
            Format::Internal.rules(ElectionSystem::Majorz),
            Rules::DEFAULT_RULES
        );
        assert!(Format::Wabsti.rules(ElectionSystem::Proporz).ballot_checks);
        assert!(!Format::Wabsti.rules(ElectionSystem::Majorz).ballot_checks);
    }
}
