use std::process::exit;

use clap::Parser;
use log::LevelFilter;

use rups::cmd;
use rups::cmd::opts::RupsArgs;
use rups::cmd::style;
use rups::config;
use rups::updater::UpdateError;

fn main() {
    let args = RupsArgs::parse();

    let level = if args.quiet {
        LevelFilter::Error
    } else if args.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            print_err(&e, args.quiet);
            exit(1);
        }
    };

    if let Err(e) = cmd::exec_command(&args, config) {
        print_err(&e, args.quiet);
        exit(1);
    }
}

fn print_err(error: &UpdateError, quiet: bool) {
    if !quiet {
        if atty::is(atty::Stream::Stderr) {
            eprintln!("{}", style::RED.paint(format!("Error: {}", error)));
        } else {
            eprintln!("Error: {}", error);
        }
    }
}
