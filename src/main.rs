use clap::Parser;
use docshift::{cli, error, report};
use std::time::Instant;
use tracing::error;

fn main() {
    let args = cli::Args::parse();
    let started = Instant::now();
    if let Err(err) = cli::dispatch(args) {
        error!("{:#}", err);
        println!("{}", report::failure_line(&err, started.elapsed().as_millis()));
        std::process::exit(error::exit_code_for(&err));
    }
}
