mod args;
mod imports;

use clap::Parser;
use log::{error, info, LevelFilter};

use election_results::ReportStatus;

fn main() {
    let args = args::Args::parse();

    if args.verbose {
        env_logger::builder().filter_level(LevelFilter::Debug).init();
    } else {
        env_logger::init();
    }
    info!("main: {:?}", args);

    match imports::run_import(&args.config, args.out, args.reference, args.summary) {
        Ok(report) if report.status == ReportStatus::Ok => {}
        Ok(report) => {
            info!("main: import rejected with {} errors", report.errors.len());
            std::process::exit(1);
        }
        Err(e) => {
            error!("main: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
