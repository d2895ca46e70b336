// Checks that need the whole batch.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::debug;

use crate::builder::Draft;
use crate::errors::*;
use crate::model::*;
use crate::records::Rules;

/// Runs all the cross-record checks on a draft and returns every problem found.
///
/// `clean` tells whether the batch was free of errors so far: an empty batch is
/// only reported on its own when nothing else explains it.
pub fn validate(
    draft: &Draft,
    election: &Election,
    registry: &EntityRegistry,
    rules: &Rules,
    clean: bool,
) -> Vec<ImportError> {
    let mut errors = Vec::new();
    errors.extend(check_registry(draft, election, registry));
    errors.extend(check_declarations(draft));
    errors.extend(check_references(draft));
    errors.extend(check_districts(draft, election));
    if rules.ballot_checks {
        errors.extend(check_ballots(draft));
    }
    errors.extend(check_parties(draft, election));
    if draft.generation.results.is_empty() && clean && errors.is_empty() {
        errors.push(ImportError::batch(Issue::NoData));
    }
    debug!("validate: {} errors", errors.len());
    errors
}

// One error per unknown entity, on the first line it appears.
fn check_registry(draft: &Draft, election: &Election, registry: &EntityRegistry) -> Vec<ImportError> {
    let mut first_seen: BTreeMap<u32, &Provenance> = BTreeMap::new();
    for (at, id) in draft.trace.declarations.iter() {
        first_seen.entry(*id).or_insert(at);
    }
    for (id, at) in draft.trace.entities.iter() {
        first_seen.entry(*id).or_insert(at);
    }
    first_seen
        .into_iter()
        .filter(|(id, _)| *id != 0 && registry.get(election.year, *id).is_none())
        .map(|(id, at)| ImportError::at(at, Issue::UnknownEntity { entity_id: id }))
        .collect()
}

fn check_declarations(draft: &Draft) -> Vec<ImportError> {
    let mut seen: HashSet<(&str, u32)> = HashSet::new();
    let mut errors = Vec::new();
    for (at, id) in draft.trace.declarations.iter() {
        if !seen.insert((at.file.as_str(), *id)) {
            errors.push(ImportError::at(
                at,
                Issue::FoundTwice {
                    name: id.to_string(),
                },
            ));
        }
    }
    errors
}

fn check_references(draft: &Draft) -> Vec<ImportError> {
    let generation = &draft.generation;
    let trace = &draft.trace;
    let lists: BTreeSet<&str> = generation.lists.iter().map(|l| l.list_id.as_str()).collect();
    let candidates: BTreeSet<&str> = generation
        .candidates
        .iter()
        .map(|c| c.candidate_id.as_str())
        .collect();
    let mut errors = Vec::new();

    for ((target, source), at) in trace.panachage.iter() {
        if !lists.contains(target.as_str()) {
            errors.push(ImportError::at(
                at,
                Issue::UnknownPanachageList {
                    list_id: target.clone(),
                },
            ));
        }
        if source != BLANK_LIST && !lists.contains(source.as_str()) {
            errors.push(ImportError::at(
                at,
                Issue::UnknownPanachageList {
                    list_id: source.clone(),
                },
            ));
        }
    }

    for ((_, _, source), at) in trace.candidate_panachage.iter() {
        if source != BLANK_LIST && !lists.contains(source.as_str()) {
            errors.push(ImportError::at(
                at,
                Issue::UnknownPanachageList {
                    list_id: source.clone(),
                },
            ));
        }
    }

    for candidate in generation.candidates.iter() {
        if let Some(list_id) = &candidate.list_id {
            if !lists.contains(list_id.as_str()) {
                if let Some(at) = trace.candidates.get(&candidate.candidate_id) {
                    errors.push(ImportError::at(
                        at,
                        Issue::ListNotFound {
                            list_id: list_id.clone(),
                        },
                    ));
                }
            }
        }
    }

    for ((_, list_id), at) in trace.list_results.iter() {
        if !lists.contains(list_id.as_str()) {
            errors.push(ImportError::at(
                at,
                Issue::ListNotFound {
                    list_id: list_id.clone(),
                },
            ));
        }
    }

    for ((_, candidate_id), at) in trace.candidate_results.iter() {
        if !candidates.contains(candidate_id.as_str()) {
            errors.push(ImportError::at(at, Issue::UnknownCandidate));
        }
    }
    errors
}

fn check_districts(draft: &Draft, election: &Election) -> Vec<ImportError> {
    let mut errors = Vec::new();
    // Unknown entities and the expats have no district.
    let located: Vec<&ElectionResult> = draft
        .generation
        .results
        .iter()
        .filter(|r| r.entity_id != 0 && !r.name.is_empty())
        .collect();

    if election.domain == Domain::Region && election.distinct {
        let districts: BTreeSet<&str> = located.iter().map(|r| r.district.as_str()).collect();
        if districts.len() > 1 {
            errors.push(ImportError::batch(Issue::NoClearDistrict));
        }
    }

    if let Some(segment) = election.segment() {
        for result in located {
            let at = draft.trace.entities.get(&result.entity_id);
            let issue = match election.domain {
                Domain::Region | Domain::District if result.district != segment => {
                    Some(Issue::NotPartOf {
                        entity_id: result.entity_id,
                        district: segment.to_string(),
                    })
                }
                Domain::Municipality if result.name != segment => Some(Issue::NotPartOfBusiness {
                    entity_id: result.entity_id,
                }),
                _ => None,
            };
            if let (Some(issue), Some(at)) = (issue, at) {
                errors.push(ImportError::at(at, issue));
            }
        }
    }
    errors
}

fn check_ballots(draft: &Draft) -> Vec<ImportError> {
    let mut errors = Vec::new();
    for result in draft.generation.results.iter() {
        let at = match draft.trace.entities.get(&result.entity_id) {
            Some(at) => at,
            None => continue,
        };
        let checks = [
            (result.received_ballots, Ballots::Received),
            (result.blank_ballots, Ballots::Blank),
            (result.invalid_ballots, Ballots::Invalid),
        ];
        for (count, ballots) in checks {
            if count > result.eligible_voters {
                errors.push(ImportError::at(at, Issue::MoreBallotsThanEligible(ballots)));
            }
        }
    }
    errors
}

fn check_parties(draft: &Draft, election: &Election) -> Vec<ImportError> {
    let years = &draft.trace.party_years;
    if !years.is_empty() && !years.contains(&election.year) {
        vec![ImportError::batch(Issue::NoPartyResults {
            year: election.year,
        })]
    } else {
        vec![]
    }
}
