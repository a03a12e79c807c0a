#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, error::ErrorKind};
use spoolmail::{Cli, Config, Spoolmail};
use spoolmail_common::logging;
use spoolmail_store::{create_migration, create_model};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if let Some(dir) = &cli.chdir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to change directory to {}", dir.display()))?;
    }

    if cli.create_migration {
        print!("{}", create_migration(&cli.scaffold_table_name()));
        return Ok(());
    }
    if cli.create_model {
        print!("{}", create_model(&cli.scaffold_table_name()));
        return Ok(());
    }

    let config = Config::from_cli(cli)?;

    if cli.mailq {
        let listing = runtime()?.block_on(Spoolmail::new(config).mailq())?;
        print!("{listing}");
        return Ok(());
    }

    if cli.daemonize {
        daemonize()?;
    }

    logging::init(&config.logging, config.sendmail.verbose)?;

    runtime()?.block_on(Spoolmail::new(config).run())
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")
}

/// Detach from the controlling terminal, keeping the working directory
fn daemonize() -> anyhow::Result<()> {
    // SAFETY: called before the runtime or any other thread is started, so
    // the forked child is the only copy of the process state that matters.
    let detached = unsafe { libc::daemon(1, 0) };
    if detached != 0 {
        return Err(std::io::Error::last_os_error()).context("Failed to daemonize");
    }

    Ok(())
}

fn report(err: &anyhow::Error) {
    eprintln!("Error: {err}");
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
    eprintln!("{}", err.backtrace());
}
