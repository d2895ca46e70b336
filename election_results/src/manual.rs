/*!

This is the long-form manual for `election_results` and `elimport`.

## Import batches

An import replaces all the results of one election. A batch is made of the
files of one export format, plus an optional party results file. Every file
is read completely and every error is reported, with its file and line. The
results are only stored if the whole batch is free of errors; otherwise the
results stored before are left as they were.

Files are read as CSV (`text/plain`, `text/csv`) or as Excel workbooks (any
other mime type). In workbooks, the sheet named `Resultate` is used if it
exists, the first sheet otherwise. Column names are matched ignoring case and
surrounding whitespace. Columns that are not expected are ignored, except
for the panachage columns.

## Formats

### `internal`

One line per candidate and entity, for majorz and proporz elections. The
statistics of the entity and the definitions of the candidate and of the list
are repeated on every line; repeating them with different values is an error.

Panachage columns are named `list_panachage_votes_from_list_<id>` (or
`panachage_votes_from_list_<id>`). The list `999` is the blank list. Without
list panachage, the `candidate_panachage_votes_from_list_<id>` columns are
summed per list.

### `wabsti` (proporz)

Four files:
- `results`: one line per candidate and entity, with the panachage columns
  named `<list id>.<list code>`,
- `connections`: the list connections and sub-connections,
- `elected`: the elected candidates, each adding one mandate to their list,
- `statistics`: the ballots of every entity; the line `Auslandschweizer` holds
  the expats.

The first definition of a candidate or a list wins. The ballots are checked
against the eligible voters.

### `wabsti` (majorz)

Two files:
- `results`: one line per entity, with numbered pairs of candidate name and
  votes columns. `Leere Zeilen` and `Ungültige Stimmen` hold the blank and
  invalid votes,
- `elected`: the elected candidates, matched by family and first name.

The ballots are not checked against the eligible voters for this format.

### `wabstic`

Five files for majorz elections (`wm_wahl`, `wmstatic_gemeinden`,
`wm_gemeinden`, `wm_kandidaten`, `wm_kandidatengde`) and eight for proporz
elections (`wp_wahl`, `wpstatic_gemeinden`, `wp_gemeinden`, `wp_listen`,
`wp_listengde`, `wpstatic_kandidaten`, `wp_kandidaten`, `wp_kandidatengde`).
They contain all the businesses of a vote day: only the lines of the business
given by `number` (and `district`, if set) are read.

The status of the election comes from `Ausmittlungsstand` and `AnzPendentGde`.
The entities of the election are those of the static file; the votes of the
entities that are not locked yet (`Sperrung`) are published as zero. For
proporz elections, the mandates come from `Sitze`, and the list `99` is the
blank list: its votes are the blank votes of the entity.

## Party results

One line per party and year, with `year`, `total_votes`, `id`, `name`,
`color`, `mandates` and `votes`, and optionally `voters_count` and
`panachage_votes_from_<id>` columns. There must be lines for the year of the
election.

## Derived figures

- accounted ballots: received ballots without the blank and invalid ballots,
- turnout: accounted ballots per eligible voters, in percent,
- accounted votes: for majorz, accounted ballots times the number of mandates
  without the blank and invalid votes; for proporz, the sum of the list votes,
- counted: every entity is counted,
- completed: the status is final (or, without status, the election is counted),
  and the enclosing compound, if it is completed manually, is completed,
- allocated mandates: the elected candidates, once completed.
*/
