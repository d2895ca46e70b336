use clap::Parser;

/// Imports the results of an election from the exports of a counting system.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON description of the import: the election, the format, the files of the batch,
    /// the entity registry and the database. Relative paths are resolved from the directory of this file.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference report in JSON format. If provided, elimport will check that the report of
    /// the import matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) Where the report of the import is written in JSON format.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// If passed as an argument, the report also carries the summary of the results stored after
    /// a successful import.
    #[clap(long, takes_value = false)]
    pub summary: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
