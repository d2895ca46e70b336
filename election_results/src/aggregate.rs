// ********* Read side ***********
//
// Everything here is derived from a committed generation on every call.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::*;

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl ElectionResult {
    /// The ballots that are neither blank nor invalid.
    pub fn accounted_ballots(&self) -> u64 {
        self.received_ballots
            .saturating_sub(self.blank_ballots)
            .saturating_sub(self.invalid_ballots)
    }

    pub fn turnout(&self) -> f64 {
        percentage(self.accounted_ballots(), self.eligible_voters)
    }
}

/// The derived values of an election, as reported after an import.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Summary {
    pub status: Status,
    pub completed: bool,
    pub counted: bool,
    pub progress: (u32, u32),
    pub eligible_voters: u64,
    pub accounted_ballots: u64,
    pub accounted_votes: u64,
    pub turnout: f64,
    pub allocated_mandates: u32,
    pub elected_candidates: Vec<(String, String)>,
}

impl ResultSet {
    pub fn new(election: Election, generation: Generation) -> ResultSet {
        ResultSet {
            election,
            generation,
        }
    }

    fn results(&self) -> &[ElectionResult] {
        &self.generation.results
    }

    pub fn eligible_voters(&self) -> u64 {
        self.results().iter().map(|r| r.eligible_voters).sum()
    }

    pub fn received_ballots(&self) -> u64 {
        self.results().iter().map(|r| r.received_ballots).sum()
    }

    pub fn blank_ballots(&self) -> u64 {
        self.results().iter().map(|r| r.blank_ballots).sum()
    }

    pub fn invalid_ballots(&self) -> u64 {
        self.results().iter().map(|r| r.invalid_ballots).sum()
    }

    pub fn accounted_ballots(&self) -> u64 {
        self.results().iter().map(|r| r.accounted_ballots()).sum()
    }

    pub fn turnout(&self) -> f64 {
        percentage(self.accounted_ballots(), self.eligible_voters())
    }

    /// The votes of one entity that went to candidates or lists.
    pub fn accounted_votes_of(&self, result: &ElectionResult) -> u64 {
        match self.election.system {
            ElectionSystem::Majorz => (result.accounted_ballots()
                * self.election.number_of_mandates as u64)
                .saturating_sub(result.blank_votes)
                .saturating_sub(result.invalid_votes),
            ElectionSystem::Proporz => self
                .generation
                .list_results
                .iter()
                .filter(|r| r.entity_id == result.entity_id)
                .map(|r| r.votes)
                .sum(),
        }
    }

    pub fn accounted_votes(&self) -> u64 {
        match self.election.system {
            ElectionSystem::Majorz => {
                let blank: u64 = self.results().iter().map(|r| r.blank_votes).sum();
                let invalid: u64 = self.results().iter().map(|r| r.invalid_votes).sum();
                (self.accounted_ballots() * self.election.number_of_mandates as u64)
                    .saturating_sub(blank)
                    .saturating_sub(invalid)
            }
            ElectionSystem::Proporz => self.generation.list_results.iter().map(|r| r.votes).sum(),
        }
    }

    /// (counted entities, total entities) of the results.
    pub fn progress(&self) -> (u32, u32) {
        let counted = self.results().iter().filter(|r| r.counted).count() as u32;
        (counted, self.results().len() as u32)
    }

    pub fn has_results(&self) -> bool {
        self.results().iter().any(|r| r.counted)
    }

    /// True once every entity has been counted.
    pub fn counted(&self) -> bool {
        let election = &self.election;
        !self.results().is_empty()
            && self.results().iter().all(|r| r.counted)
            && election.total_entities > 0
            && election.counted_entities == election.total_entities
    }

    /// True if the results are final.
    ///
    /// Without a status from the source, the election is complete once it
    /// is counted. An enclosing compound completed manually has the last word.
    pub fn completed(&self) -> bool {
        let own = match self.election.status {
            Status::Final => true,
            Status::Interim => false,
            Status::Unknown => self.counted(),
        };
        match self.election.compound {
            Some(gate) if gate.completes_manually => own && gate.manually_completed,
            _ => own,
        }
    }

    /// The number of elected candidates, only once the election is completed.
    pub fn allocated_mandates(&self) -> u32 {
        if !self.completed() {
            return 0;
        }
        self.generation.candidates.iter().filter(|c| c.elected).count() as u32
    }

    /// (first name, family name) of the elected candidates, ordered by family name
    /// and first name.
    pub fn elected_candidates(&self) -> Vec<(String, String)> {
        let mut elected: Vec<(String, String)> = self
            .generation
            .candidates
            .iter()
            .filter(|c| c.elected)
            .map(|c| (c.first_name.clone(), c.family_name.clone()))
            .collect();
        elected.sort_by(|a, b| (&a.1, &a.0).cmp(&(&b.1, &b.0)));
        elected
    }

    pub fn candidate_votes(&self) -> BTreeMap<String, u64> {
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for r in self.generation.candidate_results.iter() {
            *totals.entry(r.candidate_id.clone()).or_insert(0) += r.votes;
        }
        totals
    }

    pub fn list_votes(&self) -> BTreeMap<String, u64> {
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for r in self.generation.list_results.iter() {
            *totals.entry(r.list_id.clone()).or_insert(0) += r.votes;
        }
        totals
    }

    /// The candidates reaching the absolute majority, most votes first.
    pub fn candidates_with_majority(&self) -> Vec<(String, u64)> {
        let majority = match (self.election.system, self.election.absolute_majority) {
            (ElectionSystem::Majorz, Some(m)) => m,
            _ => return vec![],
        };
        let mut reached: Vec<(String, u64)> = self
            .candidate_votes()
            .into_iter()
            .filter(|(_, votes)| *votes >= majority)
            .collect();
        reached.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        reached
    }

    pub fn summary(&self) -> Summary {
        Summary {
            status: self.election.status,
            completed: self.completed(),
            counted: self.counted(),
            progress: self.progress(),
            eligible_voters: self.eligible_voters(),
            accounted_ballots: self.accounted_ballots(),
            accounted_votes: self.accounted_votes(),
            turnout: self.turnout(),
            allocated_mandates: self.allocated_mandates(),
            elected_candidates: self.elected_candidates(),
        }
    }
}
