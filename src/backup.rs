//! Backup orchestrator.
//!
//! Walks a site plus a selection of content categories and produces one
//! timestamped backup set under `backups/<urlencoded-site-name>/<id>/` in
//! the working directory. The set's subdirectories (`database/`, `uploads/`,
//! `plugins/`, `themes/`, `full/`) are the sole record of what was backed
//! up; the set is never modified once written.
//!
//! The database dump is taken host-side: through a transport shell and
//! `mysqldump` when the host has both, otherwise through a one-shot PHP
//! script invoked over HTTP ([`crate::server::run_script`]). Either way the
//! dump lands in the connection's scratch directory, is fetched, and the
//! remote copy removed.
//!
//! A missing remote content directory is not an error — it is created (with
//! a notice) so later restores find a structurally consistent site. Every
//! selected category produces at least one log line; errors here are fatal
//! to the whole backup.

use std::{fs, path::Path};

use crate::{
    cli::Selection,
    config::Site,
    error::Result,
    host_info::HostInfo,
    server,
    transport::{Connection, sh_quote},
    ui::{Log, spinner},
};

/// Content directories handled per category, in backup order.
pub const CONTENT_DIRS: [&str; 3] = ["uploads", "plugins", "themes"];

/// Back up `site` through `conn`, returning the new backup-set ID in its
/// filesystem-safe form (`yyyy-mm-ddThh_mm_ss`).
pub fn backup(
    workdir: &Path,
    site: &Site,
    conn: &Connection,
    log: &dyn Log,
    quiet: bool,
    select: Selection,
) -> Result<String> {
    let now = chrono::Local::now();
    let display_ts = now.format("%Y-%m-%dT%H:%M:%S").to_string();
    let fs_ts = display_ts.replace(':', "_");
    let backup_dir = workdir
        .join("backups")
        .join(site.fs_safe_name())
        .join(&fs_ts);

    log.title(&format!(
        "Creating new backup of {} at {display_ts}",
        site.name
    ));

    let select = select.resolved();

    if select.database {
        log.step("Backing up database");
        let mut host = HostInfo::new(workdir, site)?;
        backup_database(site, conn, &mut host, &backup_dir, quiet)?;
    }

    for name in CONTENT_DIRS {
        if select.contains(name) {
            backup_content_dir(site, conn, log, quiet, &backup_dir, name)?;
        }
    }

    if select.full {
        log.step("Backing up full site");
        let local_dir = backup_dir.join("full");
        fs::create_dir_all(&local_dir)?;
        let pb = spinner(!quiet, "Mirroring site root");
        let result = conn.mirror(site.base_dir.trim_end_matches('/'), &local_dir);
        pb.finish_and_clear();
        result?;
    }

    Ok(fs_ts)
}

// ─── Database ─────────────────────────────────────────────────────────────────

fn backup_database(
    site: &Site,
    conn: &Connection,
    host: &mut HostInfo,
    backup_dir: &Path,
    quiet: bool,
) -> Result<()> {
    let database_dir = backup_dir.join("database");
    fs::create_dir_all(&database_dir)?;
    let local_dump = database_dir.join("dump.sql");
    let remote_dump = conn.scratch_path("dump.sql");

    let pb = spinner(!quiet, "Dumping database");
    let result = (|| {
        if host.has_executable(conn, "mysqldump")? {
            conn.shell(&mysqldump_command(site, &remote_dump))?;
        } else {
            server::run_script(conn, &server::dump_script(site)?)?;
        }
        conn.get(&remote_dump, &local_dump)?;
        conn.remove(&remote_dump)
    })();
    pb.finish_and_clear();
    result
}

/// Shell command dumping the site's database into `remote_dump`.
///
/// `--skip-extended-insert` keeps one row per INSERT so dumps diff and
/// rewrite cleanly; an empty password omits `-p` entirely (a bare `-p`
/// would prompt and hang the non-interactive shell).
pub(crate) fn mysqldump_command(site: &Site, remote_dump: &str) -> String {
    let mut parts = vec![
        "mysqldump".to_string(),
        "--skip-extended-insert".into(),
        "--quick".into(),
        "--default-character-set=utf8".into(),
        "-h".into(),
        sh_quote(&site.mysql_host),
        "-P".into(),
        site.mysql_port.to_string(),
        "-u".into(),
        sh_quote(&site.mysql_user),
    ];
    if !site.mysql_pass.is_empty() {
        parts.push(format!("-p{}", sh_quote(&site.mysql_pass)));
    }
    parts.extend([
        "-r".into(),
        sh_quote(remote_dump),
        sh_quote(&site.mysql_name),
    ]);
    parts.join(" ")
}

// ─── Content categories ───────────────────────────────────────────────────────

fn backup_content_dir(
    site: &Site,
    conn: &Connection,
    log: &dyn Log,
    quiet: bool,
    backup_dir: &Path,
    name: &str,
) -> Result<()> {
    log.step(&format!("Backing up {name}"));
    let remote_dir = format!("{}wp-content/{name}", site.base_dir);
    if !conn.dir_exists(&remote_dir)? {
        log.info(&format!(
            "wp-content/{name} doesn't exist on {}, creating it",
            site.name
        ));
        conn.mkdir(&remote_dir)?;
    }
    let local_dir = backup_dir.join(name);
    fs::create_dir_all(&local_dir)?;

    let pb = spinner(!quiet, &format!("Mirroring {name}"));
    let result = conn.mirror(&remote_dir, &local_dir);
    pb.finish_and_clear();
    result
}

// ─── Tests ────────────────────────────────────────────────────────────────────
