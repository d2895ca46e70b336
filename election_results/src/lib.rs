/*!
The canonical model of election results, with everything needed to turn
the records read from the exports of the counting systems into one
consistent generation of results, and to derive the figures that are
published from it.

The crate does no I/O. Reading the files and storing the results is the
business of the caller:

- the format parsers turn lines into [`records::Record`]s and line errors,
- the [`builder::Builder`] merges the records of all the files of a batch,
- [`validate::validate`] runs the checks that need the whole batch,
- the caller stores the [`ImportOutcome`] if, and only if, it has no errors,
- [`ResultSet`] derives the published figures from a stored generation.

See the [manual] for the supported formats.
*/

mod aggregate;
pub mod builder;
mod errors;
pub mod manual;
mod model;
pub mod records;
pub mod validate;

use log::{debug, info};

pub use crate::aggregate::*;
pub use crate::errors::*;
pub use crate::model::*;
pub use crate::records::{Parsed, Redefinition, Rules};

use crate::builder::Builder;

/// The result of an import: the generation to store, or the reasons not to.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ImportOutcome {
    pub generation: Generation,
    pub errors: Vec<ImportError>,
}

impl ImportOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn report(&self) -> ImportReport {
        ImportReport::new(&self.errors)
    }
}

/// Merges and checks everything the parsers produced for one batch.
///
/// The errors are those of the parsers, in the order of the files, followed by
/// those of the builder and of the cross-record checks. When there are none,
/// the entities of the domain missing from the batch are added as uncounted.
pub fn build(
    election: &Election,
    registry: &EntityRegistry,
    rules: &Rules,
    parsed: Vec<Parsed>,
) -> ImportOutcome {
    let mut errors: Vec<ImportError> = Vec::new();
    let mut builder = Builder::new(election, registry, rules);
    for p in parsed {
        errors.extend(p.errors);
        builder.extend(p.entries);
    }
    let draft = builder.finish();
    errors.extend(draft.errors.iter().cloned());
    let clean = errors.is_empty();
    errors.extend(validate::validate(&draft, election, registry, rules, clean));

    let mut generation = draft.generation;
    if errors.is_empty() {
        generation.add_missing_entities(election, registry);
        info!(
            "build: election {}: {} results ready",
            election.id,
            generation.results.len()
        );
    } else {
        debug!("build: election {}: {} errors", election.id, errors.len());
    }
    ImportOutcome { generation, errors }
}

#[cfg(test)]
mod tests {
    use super::records::*;
    use super::*;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn errors_of_all_files_are_collected() {
        init_logger();
        let election = Election::new("e", ElectionSystem::Majorz, Domain::Canton, 2015, 1);
        let mut registry = EntityRegistry::new();
        registry.insert(
            2015,
            1,
            Entity {
                name: "Baar".to_string(),
                district: "Zug".to_string(),
            },
        );

        let mut first = Parsed::new();
        first.error(ImportError::in_file(
            "elected.csv",
            Issue::MissingColumns {
                columns: vec!["kandid".to_string()],
            },
        ));
        let mut second = Parsed::new();
        let mut line = Line::new("results.csv", 2);
        line.record(Record::Entity(EntityFacts::uncounted(7)));
        second.add_line(line);

        let outcome = build(&election, &registry, &Rules::DEFAULT_RULES, vec![first, second]);
        assert!(!outcome.is_ok());
        let messages: Vec<String> = outcome.errors.iter().map(|e| e.issue.to_string()).collect();
        assert_eq!(messages, vec!["Missing columns: 'kandid'", "7 is unknown"]);
        assert_eq!(outcome.report().status, ReportStatus::Error);
    }

    #[test]
    fn a_clean_batch_is_completed_with_the_missing_entities() {
        init_logger();
        let election = Election::new("e", ElectionSystem::Majorz, Domain::Canton, 2015, 1);
        let mut registry = EntityRegistry::new();
        for id in [1, 2] {
            registry.insert(
                2015,
                id,
                Entity {
                    name: format!("E{}", id),
                    district: String::new(),
                },
            );
        }
        let mut parsed = Parsed::new();
        let mut line = Line::new("results.csv", 2);
        let mut facts = EntityFacts::uncounted(1);
        facts.counted = Some(true);
        facts.eligible_voters = Some(10);
        line.record(Record::Entity(facts));
        parsed.add_line(line);

        let outcome = build(&election, &registry, &Rules::DEFAULT_RULES, vec![parsed]);
        assert!(outcome.is_ok());
        assert_eq!(outcome.generation.results.len(), 2);
        assert!(!outcome.generation.results[1].counted);
    }
}
