//! Command-line interface definition.
//!
//! All argument parsing lives here so the rest of the codebase can stay
//! agnostic to `clap`. The `Cli` struct is parsed once in `main` and then
//! passed (by reference) into the command handlers.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI arguments, shared across every subcommand.
#[derive(Parser, Debug)]
#[command(
    name    = "wpsync",
    about   = "Synchronise WordPress sites across ssh, (s)ftp and local hosts",
    version
)]
pub struct Cli {
    /// Don't print anything to stdout.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use the config file specified instead of searching for one.
    #[arg(short, long, global = true, value_name = "file")]
    pub config: Option<PathBuf>,

    /// Print the parsed configuration and exit without running anything.
    #[arg(long, global = true)]
    pub print_config: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync one site to another: backup source, backup dest (as a rollback
    /// point), then restore the source backup onto dest.
    #[command(visible_alias = "s")]
    Sync {
        /// Name of the site to take content from.
        source: String,
        /// Name of the site to restore onto.
        dest: String,
        #[command(flatten)]
        select: Selection,
    },

    /// Create a backup of a site.
    #[command(visible_alias = "b")]
    Backup {
        /// Name of the site to back up.
        site: String,
        #[command(flatten)]
        select: Selection,
    },

    /// Restore a backup onto a site.
    #[command(visible_alias = "r")]
    Restore {
        /// ID of the backup to restore, as `[site@]yyyy-mm-ddThh:mm:ss`.
        /// Defaults to the most recent backup of the target site.
        #[arg(short, long, value_name = "backup")]
        backup: Option<String>,
        /// Site to restore onto. Defaults to the site the backup came from.
        #[arg(short, long, value_name = "site")]
        site: Option<String>,
        #[command(flatten)]
        select: Selection,
    },

    /// List existing backups.
    #[command(visible_alias = "l")]
    List {
        /// Only list backups of this site.
        #[arg(short, long, value_name = "site")]
        site: Option<String>,
        #[command(flatten)]
        select: Selection,
    },
}

// ─── Selection ────────────────────────────────────────────────────────────────

/// Which categories an operation covers.
///
/// `--all` is shorthand for the four category flags; `--full` covers the
/// entire web root instead and cannot be combined with the others.
#[derive(Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    /// Sync/backup/restore the database.
    #[arg(short, long, conflicts_with_all = ["all", "full"])]
    pub database: bool,

    /// Sync/backup/restore uploads.
    #[arg(short, long, conflicts_with_all = ["all", "full"])]
    pub uploads: bool,

    /// Sync/backup/restore plugins.
    #[arg(short, long, conflicts_with_all = ["all", "full"])]
    pub plugins: bool,

    /// Sync/backup/restore themes.
    #[arg(short, long, conflicts_with_all = ["all", "full"])]
    pub themes: bool,

    /// Sync/backup/restore all of the above.
    #[arg(short, long, conflicts_with = "full")]
    pub all: bool,

    /// Sync/backup/restore the full site.
    #[arg(short, long)]
    pub full: bool,
}

impl Selection {
    /// Expand `--all` into the four category flags.
    pub fn resolved(self) -> Self {
        if self.all {
            Self {
                database: true,
                uploads: true,
                plugins: true,
                themes: true,
                all: false,
                full: self.full,
            }
        } else {
            self
        }
    }

    /// Whether any category is selected at all.
    pub fn any(self) -> bool {
        self.database || self.uploads || self.plugins || self.themes || self.all || self.full
    }

    /// Whether the named content category is selected (after resolution).
    pub fn contains(self, name: &str) -> bool {
        match name {
            "database" => self.database,
            "uploads" => self.uploads,
            "plugins" => self.plugins,
            "themes" => self.themes,
            "full" => self.full,
            _ => false,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("wpsync").chain(args.iter().copied()))
    }

    fn try_parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("wpsync").chain(args.iter().copied()))
    }

    // ── parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn backup_with_short_flags() {
        let cli = parse(&["backup", "-du", "production"]);
        match cli.command {
            Command::Backup { site, select } => {
                assert_eq!(site, "production");
                assert!(select.database && select.uploads);
                assert!(!select.plugins && !select.themes && !select.full);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn sync_takes_source_and_dest() {
        let cli = parse(&["sync", "-a", "staging", "production"]);
        match cli.command {
            Command::Sync {
                source,
                dest,
                select,
            } => {
                assert_eq!(source, "staging");
                assert_eq!(dest, "production");
                assert!(select.all);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn single_letter_aliases_work() {
        assert!(matches!(parse(&["b", "-d", "x"]).command, Command::Backup { .. }));
        assert!(matches!(parse(&["s", "-f", "x", "y"]).command, Command::Sync { .. }));
        assert!(matches!(parse(&["l"]).command, Command::List { .. }));
        assert!(matches!(parse(&["r", "-a"]).command, Command::Restore { .. }));
    }

    #[test]
    fn quiet_is_global() {
        let cli = parse(&["backup", "-d", "x", "--quiet"]);
        assert!(cli.quiet);
    }

    // ── conflicts ─────────────────────────────────────────────────────────────

    #[test]
    fn all_conflicts_with_category_flags() {
        assert!(try_parse(&["backup", "-a", "-d", "x"]).is_err());
    }

    #[test]
    fn full_conflicts_with_all_and_categories() {
        assert!(try_parse(&["backup", "-f", "-a", "x"]).is_err());
        assert!(try_parse(&["backup", "-f", "-u", "x"]).is_err());
    }

    // ── Selection ─────────────────────────────────────────────────────────────

    #[test]
    fn resolved_all_expands_to_categories() {
        let select = Selection {
            all: true,
            ..Selection::default()
        }
        .resolved();
        assert!(select.database && select.uploads && select.plugins && select.themes);
        assert!(!select.all && !select.full);
    }

    #[test]
    fn resolved_is_identity_without_all() {
        let select = Selection {
            uploads: true,
            ..Selection::default()
        };
        assert_eq!(select.resolved(), select);
    }

    #[test]
    fn empty_selection_is_not_any() {
        assert!(!Selection::default().any());
        assert!(
            Selection {
                full: true,
                ..Selection::default()
            }
            .any()
        );
    }

    #[test]
    fn contains_maps_names_to_flags() {
        let select = Selection {
            uploads: true,
            full: true,
            ..Selection::default()
        };
        assert!(select.contains("uploads"));
        assert!(select.contains("full"));
        assert!(!select.contains("themes"));
        assert!(!select.contains("nonsense"));
    }
}
