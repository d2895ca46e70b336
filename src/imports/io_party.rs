// Party results: the aggregated results of the parties over one or more years,
// and the panachage between the parties for the year of the election.

use election_results::records::*;
use election_results::*;
use log::debug;

use crate::imports::io_common::*;
use crate::imports::Context;

const HEADERS: [&str; 7] = [
    "year",
    "total_votes",
    "id",
    "name",
    "color",
    "mandates",
    "votes",
];

const PANACHAGE_PREFIX: &str = "panachage_votes_from_";

fn parse_party(row: &Row) -> Result<PartyResult, Issue> {
    let invalid = |_: Issue| Issue::InvalidValues(Facet::Party);
    let year = row.required_int("year").map_err(invalid)?;
    let mandates = row.int("mandates").map_err(invalid)?;
    Ok(PartyResult {
        year: i32::try_from(year).ok().ok_or(Issue::InvalidValues(Facet::Party))?,
        party_id: row.list_id("id")?,
        name: row.text("name").to_string(),
        color: row.color("color")?,
        total_votes: row.int("total_votes").map_err(invalid)?,
        number_of_mandates: u32::try_from(mandates)
            .ok()
            .ok_or(Issue::InvalidValues(Facet::Party))?,
        votes: row.int("votes").map_err(invalid)?,
        voters_count: row.opt_int("voters_count").map_err(invalid)?,
    })
}

pub fn parse_party_results(ctx: &Context, file: &SourceFile) -> Parsed {
    let table = match load_table(file, &HEADERS) {
        Ok(t) => t,
        Err(e) => return Parsed::failed(e),
    };
    let panachage = table.find_columns(|h| {
        h.strip_prefix(PANACHAGE_PREFIX)
            .filter(|source| is_alphanumeric_id(source))
            .map(|source| source.to_string())
    });
    debug!("parse_party_results: {} panachage columns", panachage.len());

    let mut parsed = Parsed::new();
    for row in table.rows() {
        let mut line = Line::new(&table.file, row.line);
        let party = match line.take(parse_party(&row)) {
            Some(p) => p,
            None => {
                parsed.add_line(line);
                continue;
            }
        };
        if party.year == ctx.election.year {
            for (idx, source) in panachage.iter() {
                let votes = row
                    .opt_int_at(*idx)
                    .map_err(|_| Issue::InvalidValues(Facet::Party));
                if let Some(Some(votes)) = line.take(votes) {
                    line.record(Record::PartyPanachage {
                        target: party.party_id.clone(),
                        source: source.clone(),
                        votes,
                    });
                }
            }
        }
        line.record(Record::Party(party));
        parsed.add_line(line);
    }
    parsed
}
