// ********* Intermediate records ***********
//
// What the format parsers produce for every line, before the builder merges
// them into one generation.

use crate::errors::*;
use crate::model::*;

/// The statistics of one entity. Fields left to `None` are not provided by the line.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct EntityFacts {
    pub entity_id: u32,
    pub counted: Option<bool>,
    pub eligible_voters: Option<u64>,
    pub received_ballots: Option<u64>,
    pub blank_ballots: Option<u64>,
    pub invalid_ballots: Option<u64>,
    pub blank_votes: Option<u64>,
    pub invalid_votes: Option<u64>,
    pub expats: Option<u64>,
}

impl EntityFacts {
    pub fn new(entity_id: u32) -> EntityFacts {
        EntityFacts {
            entity_id,
            ..Default::default()
        }
    }

    /// The facts of an entity that has not been counted yet: everything is zero.
    pub fn uncounted(entity_id: u32) -> EntityFacts {
        EntityFacts {
            entity_id,
            counted: Some(false),
            eligible_voters: Some(0),
            received_ballots: Some(0),
            blank_ballots: Some(0),
            invalid_ballots: Some(0),
            blank_votes: Some(0),
            invalid_votes: Some(0),
            expats: None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct CandidateFacts {
    pub candidate_id: String,
    pub family_name: Option<String>,
    pub first_name: Option<String>,
    pub elected: Option<bool>,
    pub party: Option<String>,
    pub list_id: Option<String>,
    pub gender: Option<Gender>,
    pub year_of_birth: Option<u32>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ListFacts {
    pub list_id: String,
    pub name: Option<String>,
    pub number_of_mandates: Option<u32>,
    pub connection: Option<ListConnection>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ElectionFacts {
    pub status: Option<Status>,
    pub absolute_majority: Option<u64>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Record {
    Election(ElectionFacts),
    /// The entity is listed in a file that has exactly one line per entity.
    Declare {
        entity_id: u32,
    },
    Entity(EntityFacts),
    /// Statistics that only complete entities already seen in the batch.
    Statistics(EntityFacts),
    Candidate(CandidateFacts),
    CandidateResult {
        entity_id: u32,
        candidate_id: String,
        votes: u64,
    },
    /// Marks a candidate as elected, and optionally gives one mandate to their list.
    Elected {
        candidate_id: String,
        adds_mandate: bool,
    },
    List(ListFacts),
    ListResult {
        entity_id: u32,
        list_id: String,
        votes: u64,
    },
    Connection {
        list_id: String,
        connection: ListConnection,
    },
    Panachage {
        target: String,
        source: String,
        votes: u64,
    },
    /// Panachage votes of a candidate in an entity. They are also folded into
    /// the panachage of their list when no list panachage is provided.
    CandidatePanachage {
        entity_id: u32,
        candidate_id: String,
        source: String,
        votes: u64,
    },
    /// The color of a party or a list.
    Color {
        name: String,
        color: String,
    },
    Party(PartyResult),
    PartyPanachage {
        target: String,
        source: String,
        votes: u64,
    },
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Entry {
    pub at: Provenance,
    pub record: Record,
}

/// The records and the errors of one line.
///
/// A line with errors contributes its errors only: none of its records are kept.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Line {
    at: Provenance,
    records: Vec<Record>,
    issues: Vec<Issue>,
}

impl Line {
    pub fn new(file: &str, line: u64) -> Line {
        Line {
            at: Provenance::line(file, line),
            records: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn at(&self) -> &Provenance {
        &self.at
    }

    /// Keeps the value, or the issue if the value could not be read.
    pub fn take<T>(&mut self, value: Result<T, Issue>) -> Option<T> {
        match value {
            Ok(v) => Some(v),
            Err(issue) => {
                self.issues.push(issue);
                None
            }
        }
    }

    pub fn record(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn error(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn has_errors(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// What one file (or one group of files of a dialect) produced.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Parsed {
    pub entries: Vec<Entry>,
    pub errors: Vec<ImportError>,
}

impl Parsed {
    pub fn new() -> Parsed {
        Parsed::default()
    }

    pub fn failed(error: ImportError) -> Parsed {
        Parsed {
            entries: Vec::new(),
            errors: vec![error],
        }
    }

    pub fn push(&mut self, at: &Provenance, record: Record) {
        self.entries.push(Entry {
            at: at.clone(),
            record,
        });
    }

    pub fn error(&mut self, error: ImportError) {
        self.errors.push(error);
    }

    pub fn add_line(&mut self, line: Line) {
        let Line {
            at,
            records,
            issues,
        } = line;
        if issues.is_empty() {
            for record in records {
                self.push(&at, record);
            }
        } else {
            for issue in issues {
                self.errors.push(ImportError::at(&at, issue));
            }
        }
    }

    pub fn append(&mut self, other: Parsed) {
        self.entries.extend(other.entries);
        self.errors.extend(other.errors);
    }
}

// ********* Rules ***********

/// What happens when a line sets a value that differs from the one already known.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Redefinition {
    /// The conflict is an error.
    Reject,
    /// The first value is kept, the conflicting one is dropped.
    KeepFirst,
}

/// The validation rules that differ between the source formats.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct Rules {
    pub redefinition: Redefinition,
    /// Checks that no entity reports more ballots than eligible voters.
    pub ballot_checks: bool,
}

impl Rules {
    pub const DEFAULT_RULES: Rules = Rules {
        redefinition: Redefinition::Reject,
        ballot_checks: true,
    };
}
