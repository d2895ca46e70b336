use std::collections::btree_map::Entry as MapEntry;
use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use crate::errors::*;
use crate::model::*;
use crate::records::*;

struct Seen<T> {
    value: T,
    at: Provenance,
}

impl<T> Seen<T> {
    fn new(value: T, at: &Provenance) -> Seen<T> {
        Seen {
            value,
            at: at.clone(),
        }
    }
}

/// Where the kept records were first seen, for the cross-record checks.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Trace {
    pub entities: BTreeMap<u32, Provenance>,
    pub declarations: Vec<(Provenance, u32)>,
    pub candidates: BTreeMap<String, Provenance>,
    pub candidate_results: BTreeMap<(u32, String), Provenance>,
    pub list_results: BTreeMap<(u32, String), Provenance>,
    pub panachage: BTreeMap<(String, String), Provenance>,
    pub candidate_panachage: BTreeMap<(u32, String, String), Provenance>,
    pub party_years: BTreeSet<i32>,
}

/// The merged records of a batch, before the cross-record checks.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Draft {
    pub generation: Generation,
    pub trace: Trace,
    pub errors: Vec<ImportError>,
}

/// Merges the records of all the files of a batch, keyed by natural ids.
///
/// The first record seen for a key defines it. Later records may add facts
/// that are still missing, but a different value for a known fact is a
/// redefinition, handled according to the rules of the format.
///
/// Panachage votes are the exception: they are added up.
pub struct Builder<'a> {
    election: &'a Election,
    registry: &'a EntityRegistry,
    rules: Rules,
    election_facts: ElectionFacts,
    entities: BTreeMap<u32, Seen<EntityFacts>>,
    declarations: Vec<(Provenance, u32)>,
    candidates: BTreeMap<String, Seen<CandidateFacts>>,
    candidate_results: BTreeMap<(u32, String), Seen<u64>>,
    lists: BTreeMap<String, Seen<ListFacts>>,
    list_results: BTreeMap<(u32, String), Seen<u64>>,
    panachage: BTreeMap<(String, String), Seen<u64>>,
    candidate_panachage: BTreeMap<(u32, String, String), Seen<u64>>,
    colors: BTreeMap<String, String>,
    parties: BTreeMap<(i32, String), Seen<PartyResult>>,
    party_panachage: BTreeMap<(String, String), u64>,
    errors: Vec<ImportError>,
}

impl<'a> Builder<'a> {
    pub fn new(election: &'a Election, registry: &'a EntityRegistry, rules: &Rules) -> Builder<'a> {
        Builder {
            election,
            registry,
            rules: *rules,
            election_facts: ElectionFacts::default(),
            entities: BTreeMap::new(),
            declarations: Vec::new(),
            candidates: BTreeMap::new(),
            candidate_results: BTreeMap::new(),
            lists: BTreeMap::new(),
            list_results: BTreeMap::new(),
            panachage: BTreeMap::new(),
            candidate_panachage: BTreeMap::new(),
            colors: BTreeMap::new(),
            parties: BTreeMap::new(),
            party_panachage: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn extend(&mut self, entries: Vec<Entry>) {
        for entry in entries {
            self.add(entry);
        }
    }

    pub fn add(&mut self, entry: Entry) {
        let Entry { at, record } = entry;
        match record {
            Record::Election(facts) => {
                let mut conflicts = Vec::new();
                absorb(
                    &mut self.election_facts.status,
                    facts.status,
                    "status",
                    &mut conflicts,
                );
                absorb(
                    &mut self.election_facts.absolute_majority,
                    facts.absolute_majority,
                    "absolute majority",
                    &mut conflicts,
                );
                self.redefined(&at, "election", conflicts);
            }
            Record::Declare { entity_id } => {
                if let Some(id) = self.entity_id(entity_id) {
                    self.declarations.push((at, id));
                }
            }
            Record::Entity(facts) => self.add_entity(&at, facts),
            Record::Statistics(facts) => {
                if let Some(id) = self.entity_id(facts.entity_id) {
                    if self.entities.contains_key(&id) {
                        self.add_entity(&at, facts);
                    } else {
                        debug!("builder: no results for entity {}, skipping statistics", id);
                    }
                }
            }
            Record::Candidate(facts) => {
                let name = facts.candidate_id.clone();
                let conflicts = match self.candidates.entry(facts.candidate_id.clone()) {
                    MapEntry::Vacant(v) => {
                        v.insert(Seen::new(facts, &at));
                        Vec::new()
                    }
                    MapEntry::Occupied(mut o) => merge_candidate(&mut o.get_mut().value, facts),
                };
                self.redefined(&at, &name, conflicts);
            }
            Record::CandidateResult {
                entity_id,
                candidate_id,
                votes,
            } => {
                if let Some(id) = self.entity_id(entity_id) {
                    self.touch_entity(&at, id);
                    let name = format!("{}/{}", id, candidate_id);
                    let conflicts = keep_first(&mut self.candidate_results, (id, candidate_id), votes, &at);
                    self.redefined(&at, &name, conflicts);
                }
            }
            Record::Elected {
                candidate_id,
                adds_mandate,
            } => {
                let list_id = match self.candidates.get_mut(&candidate_id) {
                    Some(seen) => {
                        seen.value.elected = Some(true);
                        seen.value.list_id.clone()
                    }
                    None => {
                        self.errors.push(ImportError::at(&at, Issue::UnknownCandidate));
                        return;
                    }
                };
                if let (true, Some(list_id)) = (adds_mandate, list_id) {
                    if let Some(list) = self.lists.get_mut(&list_id) {
                        let mandates = list.value.number_of_mandates.unwrap_or(0);
                        list.value.number_of_mandates = Some(mandates + 1);
                    }
                }
            }
            Record::List(facts) => {
                let name = facts.list_id.clone();
                let conflicts = match self.lists.entry(facts.list_id.clone()) {
                    MapEntry::Vacant(v) => {
                        v.insert(Seen::new(facts, &at));
                        Vec::new()
                    }
                    MapEntry::Occupied(mut o) => merge_list(&mut o.get_mut().value, facts),
                };
                self.redefined(&at, &name, conflicts);
            }
            Record::ListResult {
                entity_id,
                list_id,
                votes,
            } => {
                if let Some(id) = self.entity_id(entity_id) {
                    self.touch_entity(&at, id);
                    let name = format!("{}/{}", id, list_id);
                    let conflicts = keep_first(&mut self.list_results, (id, list_id), votes, &at);
                    self.redefined(&at, &name, conflicts);
                }
            }
            Record::Connection {
                list_id,
                connection,
            } => {
                let mut conflicts = Vec::new();
                match self.lists.get_mut(&list_id) {
                    Some(list) => absorb(
                        &mut list.value.connection,
                        Some(connection),
                        "connection",
                        &mut conflicts,
                    ),
                    None => debug!("builder: connection for unknown list {}, skipping", list_id),
                }
                self.redefined(&at, &list_id, conflicts);
            }
            Record::Panachage {
                target,
                source,
                votes,
            } => {
                if target != source {
                    add_votes(&mut self.panachage, (target, source), votes, &at);
                }
            }
            Record::CandidatePanachage {
                entity_id,
                candidate_id,
                source,
                votes,
            } => {
                if let Some(id) = self.entity_id(entity_id) {
                    let key = (id, candidate_id, source);
                    add_votes(&mut self.candidate_panachage, key, votes, &at);
                }
            }
            Record::Color { name, color } => {
                // The last color given for a name is kept.
                self.colors.insert(name, color);
            }
            Record::Party(party) => {
                let key = (party.year, party.party_id.clone());
                if self.parties.contains_key(&key) {
                    let name = format!("{}/{}", party.year, party.party_id);
                    self.errors
                        .push(ImportError::at(&at, Issue::FoundTwice { name }));
                } else {
                    self.parties.insert(key, Seen::new(party, &at));
                }
            }
            Record::PartyPanachage {
                target,
                source,
                votes,
            } => {
                if target != source {
                    *self.party_panachage.entry((target, source)).or_insert(0) += votes;
                }
            }
        }
    }

    // The entity id as it is stored, or None if it should be dropped.
    fn entity_id(&self, raw: u32) -> Option<u32> {
        let id = self.registry.normalize(self.election.year, raw);
        if self.election.accepts_entity(id) {
            Some(id)
        } else {
            debug!("builder: expats are disabled, dropping entity {}", raw);
            None
        }
    }

    fn add_entity(&mut self, at: &Provenance, mut facts: EntityFacts) {
        let id = match self.entity_id(facts.entity_id) {
            Some(id) => id,
            None => return,
        };
        facts.entity_id = id;
        let conflicts = match self.entities.entry(id) {
            MapEntry::Vacant(v) => {
                v.insert(Seen::new(facts, at));
                Vec::new()
            }
            MapEntry::Occupied(mut o) => merge_entity(&mut o.get_mut().value, facts),
        };
        self.redefined(at, &id.to_string(), conflicts);
    }

    fn touch_entity(&mut self, at: &Provenance, id: u32) {
        self.entities
            .entry(id)
            .or_insert_with(|| Seen::new(EntityFacts::new(id), at));
    }

    fn redefined(&mut self, at: &Provenance, name: &str, fields: Vec<&'static str>) {
        for field in fields {
            match self.rules.redefinition {
                Redefinition::Reject => self.errors.push(ImportError::at(
                    at,
                    Issue::Redefined {
                        name: name.to_string(),
                        field,
                    },
                )),
                Redefinition::KeepFirst => debug!(
                    "builder: {} keeps its first {}, ignoring {}:{:?}",
                    name, field, at.file, at.line
                ),
            }
        }
    }

    pub fn finish(self) -> Draft {
        let Builder {
            election,
            registry,
            election_facts,
            entities,
            declarations,
            candidates,
            candidate_results,
            lists,
            list_results,
            mut panachage,
            candidate_panachage,
            colors,
            parties,
            party_panachage,
            errors,
            ..
        } = self;

        let mut trace = Trace {
            declarations,
            ..Default::default()
        };

        // Without list panachage, the panachage of the candidates is summed per list.
        if panachage.is_empty() {
            for ((_, candidate_id, source), seen) in candidate_panachage.iter() {
                let target = candidates
                    .get(candidate_id)
                    .and_then(|c| c.value.list_id.clone());
                let known = source == BLANK_LIST || lists.contains_key(source);
                match target {
                    Some(target) if target != *source && known => {
                        add_votes(&mut panachage, (target, source.clone()), seen.value, &seen.at)
                    }
                    _ => debug!(
                        "finish: no list panachage for candidate {} from {}",
                        candidate_id, source
                    ),
                }
            }
        }

        let mut results: Vec<ElectionResult> = Vec::new();
        for (id, seen) in entities {
            let (name, district) = match registry.get(election.year, id) {
                Some(e) => (e.name.clone(), e.district.clone()),
                None => (String::new(), String::new()),
            };
            let f = seen.value;
            results.push(ElectionResult {
                entity_id: id,
                name,
                district,
                counted: f.counted.unwrap_or(false),
                eligible_voters: f.eligible_voters.unwrap_or(0),
                expats: f.expats,
                received_ballots: f.received_ballots.unwrap_or(0),
                blank_ballots: f.blank_ballots.unwrap_or(0),
                invalid_ballots: f.invalid_ballots.unwrap_or(0),
                blank_votes: f.blank_votes.unwrap_or(0),
                invalid_votes: f.invalid_votes.unwrap_or(0),
            });
            trace.entities.insert(id, seen.at);
        }

        let mut all_candidates: Vec<Candidate> = Vec::new();
        for (id, seen) in candidates {
            let f = seen.value;
            all_candidates.push(Candidate {
                candidate_id: id.clone(),
                family_name: f.family_name.unwrap_or_default(),
                first_name: f.first_name.unwrap_or_default(),
                elected: f.elected.unwrap_or(false),
                party: f.party.filter(|p| !p.is_empty()),
                list_id: f.list_id,
                gender: f.gender,
                year_of_birth: f.year_of_birth,
            });
            trace.candidates.insert(id, seen.at);
        }

        let mut all_lists: Vec<List> = Vec::new();
        let mut connections: BTreeSet<ListConnection> = BTreeSet::new();
        for (id, seen) in lists {
            let f = seen.value;
            if let Some(c) = &f.connection {
                if let Some(parent) = &c.parent {
                    connections.insert(ListConnection::top(parent));
                }
                connections.insert(c.clone());
            }
            all_lists.push(List {
                list_id: id,
                name: f.name.unwrap_or_default(),
                number_of_mandates: f.number_of_mandates.unwrap_or(0),
                connection: f.connection,
            });
        }

        let mut all_candidate_results = Vec::new();
        for ((entity_id, candidate_id), seen) in candidate_results {
            all_candidate_results.push(CandidateResult {
                entity_id,
                candidate_id: candidate_id.clone(),
                votes: seen.value,
            });
            trace
                .candidate_results
                .insert((entity_id, candidate_id), seen.at);
        }

        let mut all_list_results = Vec::new();
        for ((entity_id, list_id), seen) in list_results {
            all_list_results.push(ListResult {
                entity_id,
                list_id: list_id.clone(),
                votes: seen.value,
            });
            trace.list_results.insert((entity_id, list_id), seen.at);
        }

        let mut all_panachage = Vec::new();
        for ((target, source), seen) in panachage {
            all_panachage.push(PanachageResult {
                target: target.clone(),
                source: source.clone(),
                votes: seen.value,
            });
            trace.panachage.insert((target, source), seen.at);
        }

        let mut all_candidate_panachage = Vec::new();
        for ((entity_id, candidate_id, source), seen) in candidate_panachage {
            all_candidate_panachage.push(CandidatePanachageResult {
                entity_id,
                candidate_id: candidate_id.clone(),
                source: source.clone(),
                votes: seen.value,
            });
            trace
                .candidate_panachage
                .insert((entity_id, candidate_id, source), seen.at);
        }

        let mut party_results = Vec::new();
        for ((year, _), seen) in parties {
            trace.party_years.insert(year);
            party_results.push(seen.value);
        }

        let generation = Generation {
            status: election_facts.status.unwrap_or_default(),
            absolute_majority: election_facts.absolute_majority,
            results,
            candidates: all_candidates,
            candidate_results: all_candidate_results,
            lists: all_lists,
            list_results: all_list_results,
            connections: connections.into_iter().collect(),
            panachage: all_panachage,
            candidate_panachage: all_candidate_panachage,
            party_results,
            party_panachage: party_panachage
                .into_iter()
                .map(|((target, source), votes)| PanachageResult {
                    target,
                    source,
                    votes,
                })
                .collect(),
            colors,
        };
        info!(
            "finish: {} results, {} candidates, {} lists",
            generation.results.len(),
            generation.candidates.len(),
            generation.lists.len()
        );
        Draft {
            generation,
            trace,
            errors,
        }
    }
}

impl Generation {
    /// Adds the entities of the domain that are not part of the results, as
    /// uncounted results.
    pub fn add_missing_entities(&mut self, election: &Election, registry: &EntityRegistry) {
        let present: BTreeSet<u32> = self.results.iter().map(|r| r.entity_id).collect();
        let segment: Option<String> = match election.segment() {
            Some(s) => Some(s.to_string()),
            None if election.distinct => {
                let districts: BTreeSet<&str> = self
                    .results
                    .iter()
                    .filter(|r| r.entity_id != 0)
                    .map(|r| r.district.as_str())
                    .collect();
                match districts.into_iter().collect::<Vec<_>>().as_slice() {
                    [district] => Some(district.to_string()),
                    _ => None,
                }
            }
            None => None,
        };

        let mut missing: Vec<ElectionResult> = Vec::new();
        if let Some(entities) = registry.entities(election.year) {
            for (id, entity) in entities {
                if present.contains(id) {
                    continue;
                }
                let in_domain = match election.domain {
                    Domain::Federation | Domain::Canton => true,
                    Domain::Region | Domain::District => {
                        segment.as_deref() == Some(entity.district.as_str())
                    }
                    Domain::Municipality => segment.as_deref() == Some(entity.name.as_str()),
                };
                if in_domain {
                    missing.push(ElectionResult {
                        entity_id: *id,
                        name: entity.name.clone(),
                        district: entity.district.clone(),
                        ..Default::default()
                    });
                }
            }
        }
        let expats_in_domain = matches!(election.domain, Domain::Federation | Domain::Canton);
        if election.has_expats && expats_in_domain && !present.contains(&0) {
            missing.push(ElectionResult::default());
        }

        debug!("add_missing_entities: adding {} entities", missing.len());
        self.results.extend(missing);
        self.results.sort_by_key(|r| r.entity_id);
    }
}

// Sets the slot if it is empty, reports the field if the value differs.
fn absorb<T: PartialEq>(
    slot: &mut Option<T>,
    value: Option<T>,
    field: &'static str,
    conflicts: &mut Vec<&'static str>,
) {
    match (slot.as_ref(), value) {
        (_, None) => {}
        (None, Some(v)) => *slot = Some(v),
        (Some(current), Some(v)) if *current == v => {}
        (Some(_), Some(_)) => conflicts.push(field),
    }
}

fn merge_entity(current: &mut EntityFacts, other: EntityFacts) -> Vec<&'static str> {
    let mut c = Vec::new();
    absorb(&mut current.counted, other.counted, "counted", &mut c);
    absorb(&mut current.eligible_voters, other.eligible_voters, "eligible voters", &mut c);
    absorb(&mut current.expats, other.expats, "expats", &mut c);
    absorb(&mut current.received_ballots, other.received_ballots, "received ballots", &mut c);
    absorb(&mut current.blank_ballots, other.blank_ballots, "blank ballots", &mut c);
    absorb(&mut current.invalid_ballots, other.invalid_ballots, "invalid ballots", &mut c);
    absorb(&mut current.blank_votes, other.blank_votes, "blank votes", &mut c);
    absorb(&mut current.invalid_votes, other.invalid_votes, "invalid votes", &mut c);
    c
}

fn merge_candidate(current: &mut CandidateFacts, other: CandidateFacts) -> Vec<&'static str> {
    let mut c = Vec::new();
    absorb(&mut current.family_name, other.family_name, "family name", &mut c);
    absorb(&mut current.first_name, other.first_name, "first name", &mut c);
    absorb(&mut current.elected, other.elected, "elected", &mut c);
    absorb(&mut current.party, other.party, "party", &mut c);
    absorb(&mut current.list_id, other.list_id, "list", &mut c);
    absorb(&mut current.gender, other.gender, "gender", &mut c);
    absorb(&mut current.year_of_birth, other.year_of_birth, "year of birth", &mut c);
    c
}

fn merge_list(current: &mut ListFacts, other: ListFacts) -> Vec<&'static str> {
    let mut c = Vec::new();
    absorb(&mut current.name, other.name, "name", &mut c);
    absorb(
        &mut current.number_of_mandates,
        other.number_of_mandates,
        "number of mandates",
        &mut c,
    );
    absorb(&mut current.connection, other.connection, "connection", &mut c);
    c
}

fn keep_first<K: Ord>(
    map: &mut BTreeMap<K, Seen<u64>>,
    key: K,
    votes: u64,
    at: &Provenance,
) -> Vec<&'static str> {
    match map.entry(key) {
        MapEntry::Vacant(v) => {
            v.insert(Seen::new(votes, at));
            Vec::new()
        }
        MapEntry::Occupied(o) if o.get().value == votes => Vec::new(),
        MapEntry::Occupied(_) => vec!["votes"],
    }
}

fn add_votes<K: Ord>(map: &mut BTreeMap<K, Seen<u64>>, key: K, votes: u64, at: &Provenance) {
    map.entry(key)
        .and_modify(|s| s.value += votes)
        .or_insert_with(|| Seen::new(votes, at));
}
