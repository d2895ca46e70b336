// ********* Election definition ***********

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The sentinel list id used for votes cast on a ballot without a list.
pub const BLANK_LIST: &str = "999";

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionSystem {
    Majorz,
    Proporz,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Federation,
    Canton,
    Region,
    District,
    Municipality,
}

/// The completeness code of an election, as reported by the source files.
///
/// The order of the variants is the order of the progression of an election.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Interim,
    Final,
}

impl Status {
    pub fn parse(s: &str) -> Option<Status> {
        match s.trim().to_lowercase().as_str() {
            "" | "unknown" => Some(Status::Unknown),
            "interim" => Some(Status::Interim),
            "final" => Some(Status::Final),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Interim => "interim",
            Status::Final => "final",
        }
    }
}

/// The completion gate of an enclosing election compound.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompoundGate {
    #[serde(rename = "completesManually", default)]
    pub completes_manually: bool,
    #[serde(rename = "manuallyCompleted", default)]
    pub manually_completed: bool,
}

/// The aggregate root of all the results.
///
/// The definition fields are provided by the caller, the scalar state
/// (status, absolute majority, counted and total entities) is replaced at every
/// successful import.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    pub id: String,
    pub system: ElectionSystem,
    pub domain: Domain,
    #[serde(rename = "domainSegment", default)]
    pub domain_segment: Option<String>,
    #[serde(default)]
    pub distinct: bool,
    pub year: i32,
    #[serde(rename = "numberOfMandates")]
    pub number_of_mandates: u32,
    #[serde(rename = "hasExpats", default)]
    pub has_expats: bool,
    #[serde(default)]
    pub compound: Option<CompoundGate>,

    #[serde(default)]
    pub status: Status,
    #[serde(rename = "absoluteMajority", default)]
    pub absolute_majority: Option<u64>,
    #[serde(rename = "countedEntities", default)]
    pub counted_entities: u32,
    #[serde(rename = "totalEntities", default)]
    pub total_entities: u32,
}

impl Election {
    pub fn new(
        id: &str,
        system: ElectionSystem,
        domain: Domain,
        year: i32,
        number_of_mandates: u32,
    ) -> Election {
        Election {
            id: id.to_string(),
            system,
            domain,
            domain_segment: None,
            distinct: false,
            year,
            number_of_mandates,
            has_expats: false,
            compound: None,
            status: Status::Unknown,
            absolute_majority: None,
            counted_entities: 0,
            total_entities: 0,
        }
    }

    /// Entity 0 collects the votes of the expats, which only count when enabled.
    pub fn accepts_entity(&self, entity_id: u32) -> bool {
        entity_id != 0 || self.has_expats
    }

    /// The segment of the domain, if it is set to something meaningful.
    pub fn segment(&self) -> Option<&str> {
        self.domain_segment
            .as_deref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

// ********* Entity registry ***********

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub district: String,
}

/// The political subdivisions known for every year.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct EntityRegistry {
    years: BTreeMap<i32, BTreeMap<u32, Entity>>,
}

/// The BFS numbers used by some exports for the expats.
pub fn is_expats_code(entity_id: u32) -> bool {
    entity_id == 9170 || ((19010..=19260).contains(&entity_id) && entity_id % 10 == 0)
}

impl EntityRegistry {
    pub fn new() -> EntityRegistry {
        EntityRegistry::default()
    }

    pub fn insert(&mut self, year: i32, entity_id: u32, entity: Entity) {
        self.years.entry(year).or_default().insert(entity_id, entity);
    }

    pub fn entities(&self, year: i32) -> Option<&BTreeMap<u32, Entity>> {
        self.years.get(&year)
    }

    pub fn get(&self, year: i32, entity_id: u32) -> Option<&Entity> {
        self.years.get(&year).and_then(|m| m.get(&entity_id))
    }

    /// Maps the expats codes to the entity 0, unless they are real entities for this year.
    pub fn normalize(&self, year: i32, entity_id: u32) -> u32 {
        if is_expats_code(entity_id) && self.get(year, entity_id).is_none() {
            0
        } else {
            entity_id
        }
    }
}

// ********* Results ***********

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
pub struct ElectionResult {
    pub entity_id: u32,
    pub name: String,
    pub district: String,
    pub counted: bool,
    pub eligible_voters: u64,
    /// The expats among the eligible voters, when the source tells them apart.
    pub expats: Option<u64>,
    pub received_ballots: u64,
    pub blank_ballots: u64,
    pub invalid_ballots: u64,
    pub blank_votes: u64,
    pub invalid_votes: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Undetermined,
}

impl Gender {
    pub fn parse(s: &str) -> Option<Gender> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "undetermined" => Some(Gender::Undetermined),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Undetermined => "undetermined",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
pub struct Candidate {
    pub candidate_id: String,
    pub family_name: String,
    pub first_name: String,
    pub elected: bool,
    pub party: Option<String>,
    pub list_id: Option<String>,
    pub gender: Option<Gender>,
    pub year_of_birth: Option<u32>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct CandidateResult {
    pub entity_id: u32,
    pub candidate_id: String,
    pub votes: u64,
}

/// A list connection, or a sub-connection when it has a parent.
///
/// The natural key is the pair (parent, connection id): the same id may be
/// used by a connection and by one of its sub-connections.
#[derive(Eq, PartialEq, Debug, Clone, Hash, PartialOrd, Ord, Serialize)]
pub struct ListConnection {
    pub connection_id: String,
    pub parent: Option<String>,
}

impl ListConnection {
    pub fn top(connection_id: &str) -> ListConnection {
        ListConnection {
            connection_id: connection_id.to_string(),
            parent: None,
        }
    }

    pub fn sub(connection_id: &str, parent: &str) -> ListConnection {
        ListConnection {
            connection_id: connection_id.to_string(),
            parent: Some(parent.to_string()),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
pub struct List {
    pub list_id: String,
    pub name: String,
    pub number_of_mandates: u32,
    pub connection: Option<ListConnection>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct ListResult {
    pub entity_id: u32,
    pub list_id: String,
    pub votes: u64,
}

/// Votes transferred from the source list to the target list.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct PanachageResult {
    pub target: String,
    pub source: String,
    pub votes: u64,
}

/// Votes a candidate received in one entity from the ballots of a list.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct CandidatePanachageResult {
    pub entity_id: u32,
    pub candidate_id: String,
    pub source: String,
    pub votes: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct PartyResult {
    pub year: i32,
    pub party_id: String,
    pub name: String,
    pub color: Option<String>,
    pub total_votes: u64,
    pub number_of_mandates: u32,
    pub votes: u64,
    pub voters_count: Option<u64>,
}

/// One complete generation of the children of an election.
///
/// All the collections are ordered by their natural keys.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
pub struct Generation {
    pub status: Status,
    pub absolute_majority: Option<u64>,
    pub results: Vec<ElectionResult>,
    pub candidates: Vec<Candidate>,
    pub candidate_results: Vec<CandidateResult>,
    pub lists: Vec<List>,
    pub list_results: Vec<ListResult>,
    pub connections: Vec<ListConnection>,
    pub panachage: Vec<PanachageResult>,
    pub candidate_panachage: Vec<CandidatePanachageResult>,
    pub party_results: Vec<PartyResult>,
    pub party_panachage: Vec<PanachageResult>,
    /// The colors of the parties and lists, by name.
    pub colors: BTreeMap<String, String>,
}

/// An election together with its currently committed generation.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ResultSet {
    pub election: Election,
    pub generation: Generation,
}
