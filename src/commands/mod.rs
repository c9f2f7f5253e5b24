//! Subcommand handlers.
//!
//! Each file in this module corresponds to one user-facing command:
//!
//! | File         | Invocation        | Description                            |
//! |--------------|-------------------|----------------------------------------|
//! | `backup.rs`  | `wpsync backup`   | Back up one site                       |
//! | `restore.rs` | `wpsync restore`  | Restore a backup set onto a site       |
//! | `sync.rs`    | `wpsync sync`     | backup(src) → backup(dst) → restore    |
//! | `list.rs`    | `wpsync list`     | List existing backup sets              |
//!
//! Handlers are thin: resolve sites, check external tools, open the
//! connection scope, and hand over to the orchestrators. Everything here
//! returns `anyhow::Result` — typed errors from the core convert on the way
//! up and `main` renders them.

pub mod backup;
pub mod list;
pub mod restore;
pub mod sync;

use std::{collections::BTreeSet, path::Path};

use anyhow::bail;

use crate::{
    cli::Selection,
    config::{Config, Protocol, Site},
    ui::Log,
};

/// Everything a command handler needs, threaded explicitly — no globals.
pub struct Ctx<'a> {
    pub config: &'a Config,
    pub workdir: &'a Path,
    pub log: &'a dyn Log,
    pub quiet: bool,
}

/// Backup, restore and sync refuse to run with nothing selected; guessing a
/// default selection would make it far too easy to sync less than intended.
pub fn require_selection(select: Selection) -> anyhow::Result<()> {
    if !select.any() {
        bail!("select at least one of --database/--uploads/--plugins/--themes, or --all/--full");
    }
    Ok(())
}

// ─── External-tool preflight ──────────────────────────────────────────────────

/// Verify the external tools the involved sites' protocols need exist on
/// PATH, before any connection opens.
pub fn preflight(sites: &[&Site]) -> anyhow::Result<()> {
    for tool in required_tools(sites) {
        if !executable_on_path(tool) {
            bail!("wpsync requires {tool} to be installed on your system");
        }
    }
    Ok(())
}

fn required_tools(sites: &[&Site]) -> BTreeSet<&'static str> {
    let mut tools = BTreeSet::new();
    for site in sites {
        match site.protocol {
            Protocol::Ssh => {
                tools.extend(["ssh", "scp", "rsync"]);
            }
            Protocol::Ftp | Protocol::Sftp => {
                tools.insert("lftp");
            }
            Protocol::File => {}
        }
    }
    tools
}

fn executable_on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(name);
        candidate.is_file() && is_executable(&candidate)
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;

    fn site_with(protocol: Protocol) -> Site {
        Site {
            name: "s".into(),
            aliases: vec![],
            protocol,
            base_url: "http://s".into(),
            file_url: None,
            base_dir: "/s/".into(),
            user: Some("u".into()),
            host: Some("h".into()),
            password: Some("p".into()),
            http_user: None,
            http_pass: None,
            mysql_host: "h".into(),
            mysql_name: "n".into(),
            mysql_user: "u".into(),
            mysql_pass: "p".into(),
            mysql_port: 3306,
            sudo_remote: false,
            chown_remote: None,
            chgrp_remote: None,
            no_verify_ssl: false,
        }
    }

    #[test]
    fn file_sites_need_no_tools() {
        assert!(required_tools(&[&site_with(Protocol::File)]).is_empty());
    }

    #[test]
    fn ssh_sites_need_the_ssh_triple() {
        let tools = required_tools(&[&site_with(Protocol::Ssh)]);
        assert_eq!(tools, BTreeSet::from(["rsync", "scp", "ssh"]));
    }

    #[test]
    fn ftp_and_sftp_sites_need_lftp() {
        assert!(required_tools(&[&site_with(Protocol::Ftp)]).contains("lftp"));
        assert!(required_tools(&[&site_with(Protocol::Sftp)]).contains("lftp"));
    }

    #[test]
    fn mixed_sites_union_their_tools() {
        let ssh = site_with(Protocol::Ssh);
        let ftp = site_with(Protocol::Ftp);
        let tools = required_tools(&[&ssh, &ftp]);
        assert_eq!(tools, BTreeSet::from(["lftp", "rsync", "scp", "ssh"]));
    }

    #[test]
    fn sh_is_on_every_path() {
        assert!(executable_on_path("sh"));
    }

    #[test]
    fn nonsense_binaries_are_not_found() {
        assert!(!executable_on_path("wpsync-no-such-tool-x9"));
    }

    #[test]
    fn empty_selection_is_rejected() {
        assert!(require_selection(Selection::default()).is_err());
        assert!(
            require_selection(Selection {
                themes: true,
                ..Selection::default()
            })
            .is_ok()
        );
    }
}
