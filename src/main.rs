mod cancel;
mod cli;
mod client;
mod clock;
mod config;
mod constants;
mod error;
mod events;
mod history;
mod inject;
mod native;
mod packet;
mod preferences;
mod probe;
mod process;
mod runner;
mod secret;
mod sequence;
mod task;
#[cfg(test)]
mod testing;
mod verify;

use cancel::CancelToken;
use clap::Parser;
use cli::{Args, Command};
use config::get_config;
use log::warn;
use std::time::Duration;

fn run(args: Args) -> anyhow::Result<()> {
    args.validate()?;

    let log_level = if args.verbose {
        simplelog::LevelFilter::Info
    } else {
        simplelog::LevelFilter::Warn
    };

    simplelog::TermLogger::init(
        log_level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let config = get_config(&args.config)?;

    // Ctrl+C stops whatever is running; a second press exits right away
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        warn!("Cancelling, press Ctrl+C again to exit immediately");
        handler_token.cancel();
    })?;

    match &args.command {
        Command::Sequence { abort_on_failure } => {
            runner::run_sequence(&config, *abort_on_failure, &cancel)
        }
        Command::Launch { account, server } => {
            runner::run_launch(&config, account, server, &cancel)
        }
        Command::Probe {
            server,
            watch,
            timeout,
        } => runner::run_probe(
            &config,
            server.as_deref(),
            *watch,
            Duration::from_secs(*timeout),
            &cancel,
        ),
    }
}

fn exit_with_error(e: anyhow::Error) -> ! {
    eprintln!("An error occurred: {:#}", e);
    std::process::exit(1)
}

fn main() {
    let args = Args::parse();

    match run(args) {
        Ok(_) => {}
        Err(e) => exit_with_error(e),
    }
}
