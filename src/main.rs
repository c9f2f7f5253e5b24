//! `wpsync` — synchronise WordPress sites across ssh, (s)ftp and local hosts.
//!
//! # Overview
//!
//! One config file (`wpsync.toml`) describes the sites; four commands move
//! content and databases between them:
//!
//! ```text
//! wpsync backup -a production          # snapshot everything but the web root
//! wpsync sync -dupt staging production # staging → production, with rollback point
//! wpsync restore -b production@2024-01-02T09:30:00
//! wpsync list -s production
//! ```
//!
//! The same backup/restore logic runs against every protocol: local
//! directories, ssh hosts (rsync/scp), and shell-less FTP hosting — where
//! database work happens through a generated PHP payload invoked over HTTP.
//!
//! # Module layout
//!
//! | Module           | Responsibility                                    |
//! |------------------|---------------------------------------------------|
//! | [`cli`]          | Argument types parsed by clap                     |
//! | [`config`]       | `Site` records + TOML loader + validation         |
//! | [`error`]        | Typed error taxonomy for the core layers          |
//! | [`ui`]           | Logger trait, console logger, spinners            |
//! | [`transport`]    | file/ssh/ftp capability contract + connections    |
//! | [`server`]       | Remote-execution payloads and HTTP invocation     |
//! | [`host_info`]    | Per-site capability cache                         |
//! | [`dump`]         | SQL-dump tokenizer and table-option rewriter      |
//! | [`backup`]       | Backup orchestrator                               |
//! | [`restore`]      | Restore orchestrator                              |
//! | [`list_backups`] | Backup-set listing                                |
//! | [`commands`]     | One handler per subcommand                        |

mod backup;
mod cli;
mod commands;
mod config;
mod dump;
mod error;
mod host_info;
mod list_backups;
mod restore;
mod server;
mod transport;
mod ui;

use clap::Parser;
use cli::{Cli, Command};
use ui::{ConsoleLog, Log};

fn main() {
    let cli = Cli::parse();
    let log = ConsoleLog::new(cli.quiet);

    match run(&cli, &log) {
        Ok(()) => {
            if !cli.print_config {
                log.success("DONE");
            }
        }
        Err(e) => {
            log.error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli, log: &ConsoleLog) -> anyhow::Result<()> {
    let config_path = config::find_config_file(cli.config.as_deref())?;
    let (config, warnings) = config::load_config(&config_path)?;
    for warning in &warnings {
        log.warn(warning);
    }

    if cli.print_config {
        println!("{config:#?}");
        return Ok(());
    }

    let workdir = config::workdir(&config_path)?;
    let ctx = commands::Ctx {
        config: &config,
        workdir: &workdir,
        log,
        quiet: cli.quiet,
    };

    match &cli.command {
        Command::Sync {
            source,
            dest,
            select,
        } => commands::sync::run(&ctx, source, dest, *select),
        Command::Backup { site, select } => commands::backup::run(&ctx, site, *select),
        Command::Restore {
            backup,
            site,
            select,
        } => commands::restore::run(&ctx, backup.as_deref(), site.as_deref(), *select),
        Command::List { site, select } => commands::list::run(&ctx, site.as_deref(), *select),
    }
}
