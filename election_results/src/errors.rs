// ********* Collected import errors ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;

use serde::Serialize;

/// Where an intermediate record comes from.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Provenance {
    pub file: String,
    pub line: Option<u64>,
}

impl Provenance {
    pub fn line(file: &str, line: u64) -> Provenance {
        Provenance {
            file: file.to_string(),
            line: Some(line),
        }
    }

    pub fn file(file: &str) -> Provenance {
        Provenance {
            file: file.to_string(),
            line: None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
pub enum ErrorKind {
    Format,
    Field,
    Referential,
    Consistency,
    EmptyResult,
}

/// The group of values that could not be read on a line.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Facet {
    Election,
    Entity,
    Candidate,
    CandidateResults,
    List,
    ListResults,
    ListConnection,
    Party,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Ballots {
    Received,
    Blank,
    Invalid,
}

/// All the problems that can be reported back for a batch.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Issue {
    MissingColumns { columns: Vec<String> },
    DuplicateColumns,
    EmptyFile,
    EmptyLine,
    InvalidFile,

    InvalidInteger { column: String },
    EmptyValue { column: String },
    NotAlphanumeric { column: String },
    InvalidColor { column: String },
    InvalidGender { value: String },
    InvalidStatus,
    InvalidValues(Facet),
    NoEligibleVoters,
    Missing { variable: String },

    UnknownEntity { entity_id: u32 },
    UnknownCandidate,
    CandidateNotDeclared { candidate_id: String, file: String },
    EntityNotDeclared { entity_id: u32, file: String },
    ListNotFound { list_id: String },
    UnknownPanachageList { list_id: String },

    MoreBallotsThanEligible(Ballots),
    FoundTwice { name: String },
    Redefined { name: String, field: &'static str },
    NotPartOf { entity_id: u32, district: String },
    NotPartOfBusiness { entity_id: u32 },
    NoClearDistrict,
    FinalButPending,

    NoPartyResults { year: i32 },
    NoData,
}

impl Issue {
    pub fn kind(&self) -> ErrorKind {
        use Issue::*;
        match self {
            MissingColumns { .. } | DuplicateColumns | EmptyFile | EmptyLine | InvalidFile => {
                ErrorKind::Format
            },
            InvalidInteger { .. }
            | EmptyValue { .. }
            | NotAlphanumeric { .. }
            | InvalidColor { .. }
            | InvalidGender { .. }
            | InvalidStatus
            | InvalidValues(_)
            | NoEligibleVoters
            | Missing { .. } => ErrorKind::Field,
            UnknownEntity { .. }
            | UnknownCandidate
            | CandidateNotDeclared { .. }
            | EntityNotDeclared { .. }
            | ListNotFound { .. }
            | UnknownPanachageList { .. } => ErrorKind::Referential,
            MoreBallotsThanEligible(_)
            | FoundTwice { .. }
            | Redefined { .. }
            | NotPartOf { .. }
            | NotPartOfBusiness { .. }
            | NoClearDistrict
            | FinalButPending => ErrorKind::Consistency,
            NoPartyResults { .. } | NoData => ErrorKind::EmptyResult,
        }
    }

    /// The untranslated message, with `${name}` placeholders for the parameters.
    pub fn template(&self) -> &'static str {
        use Issue::*;
        match self {
            MissingColumns { .. } => "Missing columns: '${columns}'",
            DuplicateColumns => "Some column names appear twice.",
            EmptyFile => "The file is empty.",
            EmptyLine => "The file contains an empty line.",
            InvalidFile => "Not a valid csv/xls/xlsx file.",
            InvalidInteger { .. } => "Invalid integer: ${column}",
            EmptyValue { .. } => "Empty value: ${column}",
            NotAlphanumeric { .. } => "Not an alphanumeric: ${column}",
            InvalidColor { .. } => "Invalid color: ${column}",
            InvalidGender { .. } => "Invalid gender: ${value}",
            InvalidStatus => "Invalid status",
            InvalidValues(Facet::Election) => "Invalid election values",
            InvalidValues(Facet::Entity) => "Invalid entity values",
            InvalidValues(Facet::Candidate) => "Invalid candidate values",
            InvalidValues(Facet::CandidateResults) => "Invalid candidate results",
            InvalidValues(Facet::List) => "Invalid list values",
            InvalidValues(Facet::ListResults) => "Invalid list results",
            InvalidValues(Facet::ListConnection) => "Invalid list connection values",
            InvalidValues(Facet::Party) => "Invalid values",
            NoEligibleVoters => "No eligible voters",
            Missing { .. } => "${variable} is missing.",
            UnknownEntity { .. } => "${id} is unknown",
            UnknownCandidate => "Unknown candidate",
            CandidateNotDeclared { .. } => "Candidate with id ${id} not in ${file}",
            EntityNotDeclared { .. } => "Entity with id ${id} not in ${file}",
            ListNotFound { .. } => "List_id ${id} has not been found in list numbers",
            UnknownPanachageList { .. } => "Panachage results id ${id} not in list_id's",
            MoreBallotsThanEligible(Ballots::Received) => {
                "More received ballots than eligible voters"
            }
            MoreBallotsThanEligible(Ballots::Blank) => "More blank ballots than eligible voters",
            MoreBallotsThanEligible(Ballots::Invalid) => {
                "More invalid ballots than eligible voters"
            }
            FoundTwice { .. } => "${name} was found twice",
            Redefined { .. } => "${name} was redefined: ${field}",
            NotPartOf { .. } => "${name} is not part of ${district}",
            NotPartOfBusiness { .. } => "${name} is not part of this business",
            NoClearDistrict => "No clear district",
            FinalButPending => "Ausmittlungsstand set to final but AnzPendentGde is not 0",
            NoPartyResults { .. } => "No party results for year ${year}",
            NoData => "No data found",
        }
    }

    pub fn params(&self) -> BTreeMap<String, String> {
        use Issue::*;
        let pairs: Vec<(&str, String)> = match self {
            MissingColumns { columns } => vec![("columns", columns.join(", "))],
            InvalidInteger { column }
            | EmptyValue { column }
            | NotAlphanumeric { column }
            | InvalidColor { column } => vec![("column", column.clone())],
            Missing { variable } => vec![("variable", variable.clone())],
            UnknownEntity { entity_id } => vec![("id", entity_id.to_string())],
            CandidateNotDeclared { candidate_id, file } => {
                vec![("id", candidate_id.clone()), ("file", file.clone())]
            }
            EntityNotDeclared { entity_id, file } => {
                vec![("id", entity_id.to_string()), ("file", file.clone())]
            }
            ListNotFound { list_id } | UnknownPanachageList { list_id } => {
                vec![("id", list_id.clone())]
            }
            InvalidGender { value } => vec![("value", value.clone())],
            FoundTwice { name } => vec![("name", name.clone())],
            NotPartOfBusiness { entity_id } => vec![("name", entity_id.to_string())],
            Redefined { name, field } => vec![("name", name.clone()), ("field", field.to_string())],
            NotPartOf {
                entity_id,
                district,
            } => {
                vec![("name", entity_id.to_string()), ("district", district.clone())]
            }
            NoPartyResults { year } => vec![("year", year.to_string())],
            _ => vec![],
        };
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut message = self.template().to_string();
        for (key, value) in self.params() {
            message = message.replace(&format!("${{{}}}", key), &value);
        }
        write!(f, "{}", message)
    }
}

/// An error collected during an import, attributed to a file and a line if possible.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct ImportError {
    pub file: Option<String>,
    pub line: Option<u64>,
    pub issue: Issue,
}

impl ImportError {
    pub fn at(at: &Provenance, issue: Issue) -> ImportError {
        ImportError {
            file: Some(at.file.clone()),
            line: at.line,
            issue,
        }
    }

    pub fn in_file(file: &str, issue: Issue) -> ImportError {
        ImportError {
            file: Some(file.to_string()),
            line: None,
            issue,
        }
    }

    /// An error that concerns the batch as a whole.
    pub fn batch(issue: Issue) -> ImportError {
        ImportError {
            file: None,
            line: None,
            issue,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.issue.kind()
    }
}

impl Error for ImportError {}

impl Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}: {}", file, line, self.issue),
            (Some(file), None) => write!(f, "{}: {}", file, self.issue),
            _ => write!(f, "{}", self.issue),
        }
    }
}

// ********* Report ***********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Ok,
    Error,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct ReportedError {
    pub file: Option<String>,
    pub line: Option<u64>,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// The structured answer to the caller of an import.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct ImportReport {
    pub status: ReportStatus,
    pub errors: Vec<ReportedError>,
}

impl ImportReport {
    pub fn new(errors: &[ImportError]) -> ImportReport {
        ImportReport {
            status: if errors.is_empty() {
                ReportStatus::Ok
            } else {
                ReportStatus::Error
            },
            errors: errors
                .iter()
                .map(|e| ReportedError {
                    file: e.file.clone(),
                    line: e.line,
                    message: e.issue.to_string(),
                    params: e.issue.params(),
                })
                .collect(),
        }
    }
}
