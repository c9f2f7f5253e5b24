//! Per-site capability cache.
//!
//! Some facts about a host are expensive to discover (scanning a dump for
//! database settings, probing for executables over ssh) or must stay stable
//! across invocations (the remote-execution server's filename and password).
//! [`HostInfo`] discovers each fact at most once per working directory and
//! persists it in `<workdir>/info/<urlencoded-site-name>.json`.
//!
//! The file is a flat JSON object. It is read once at construction and
//! rewritten synchronously on every mutation — no batching, no locking.
//! Save-on-write is the contract: a crash after any `set` never loses the
//! fact. Concurrent invocations against the same site can race; wpsync is a
//! single-operator tool.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{
    config::Site,
    dump,
    error::{Error, Result},
    transport::Connection,
};

// ─── PersistentMap ────────────────────────────────────────────────────────────

/// A string-keyed JSON map with an explicit load/save pair.
///
/// `set` writes the whole file back before returning.
#[derive(Debug)]
pub struct PersistentMap {
    path: PathBuf,
    data: serde_json::Map<String, Value>,
}

impl PersistentMap {
    /// Load the map at `path`. A missing file is an empty map; an unreadable
    /// or non-JSON file is an error.
    pub fn load(path: PathBuf) -> Result<Self> {
        let data = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::Map::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, data })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Insert `key` and persist immediately.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        self.data.insert(key.into(), value);
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, serde_json::to_string(&self.data)?)?;
        Ok(())
    }
}

// ─── HostInfo ─────────────────────────────────────────────────────────────────

/// Lazily discovered facts about one site's host.
pub struct HostInfo {
    info: PersistentMap,
    site_name: String,
    /// `<workdir>/backups/<urlencoded-site-name>` — scanned for the most
    /// recent database dump when settings are not cached yet.
    backups_dir: PathBuf,
}

impl HostInfo {
    pub fn new(workdir: &Path, site: &Site) -> Result<Self> {
        let fs_safe = site.fs_safe_name();
        let info = PersistentMap::load(workdir.join("info").join(format!("{fs_safe}.json")))?;
        Ok(Self {
            info,
            site_name: site.name.clone(),
            backups_dir: workdir.join("backups").join(fs_safe),
        })
    }

    // ── database settings ─────────────────────────────────────────────────────

    /// The site's effective `CHARSET`/`COLLATE`/`ENGINE`.
    ///
    /// Resolved from the most recent existing database backup of this site
    /// (newest first) and cached; fails with [`Error::BackupNotFound`] when
    /// the site has never had a database backup.
    pub fn database_settings(&mut self) -> Result<BTreeMap<String, String>> {
        if let Some(cached) = self.info.get("database_settings") {
            return Ok(serde_json::from_value(cached.clone())?);
        }

        let dump_file = self.latest_database_dump()?;
        let text = std::fs::read_to_string(&dump_file)?;
        let settings = dump::parse_database_settings(&text);
        self.info
            .set("database_settings", serde_json::to_value(&settings)?)?;
        Ok(settings)
    }

    /// Newest `database/dump.sql` across this site's backup sets.
    fn latest_database_dump(&self) -> Result<PathBuf> {
        let not_found = || {
            Error::BackupNotFound(format!(
                "no database backup of {} to parse settings from",
                self.site_name
            ))
        };

        let entries = std::fs::read_dir(&self.backups_dir).map_err(|_| not_found())?;
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        ids.sort();

        ids.iter()
            .rev()
            .map(|id| self.backups_dir.join(id).join("database").join("dump.sql"))
            .find(|p| p.is_file())
            .ok_or_else(not_found)
    }

    // ── executables ───────────────────────────────────────────────────────────

    /// Whether `name` is on the host's PATH. Probed once through the
    /// transport's shell; hosts without shell access never have executables.
    pub fn has_executable(&mut self, conn: &Connection, name: &str) -> Result<bool> {
        let key = format!("has_{name}");
        if self.info.contains(&key) {
            return Ok(self.info.get(&key).and_then(Value::as_bool).unwrap_or(false));
        }
        if !conn.has_shell() {
            return Ok(false);
        }
        let found = conn.shell(&format!("command -v {name}")).is_ok();
        self.info.set(key, Value::Bool(found))?;
        Ok(found)
    }

    // ── remote-execution server credentials ───────────────────────────────────

    /// Cached `(filename, password)` of the generated execution server, if
    /// one was generated for this site before.
    pub fn server_credentials(&self) -> Option<(String, String)> {
        match (
            self.info.get_str("server_filename"),
            self.info.get_str("server_password"),
        ) {
            (Some(f), Some(p)) => Some((f.to_string(), p.to_string())),
            _ => None,
        }
    }

    /// Bcrypt hash embedded in the generated server payload.
    pub fn server_password_hash(&self) -> Option<String> {
        self.info.get_str("server_password_hash").map(String::from)
    }

    /// Remember the generated server's filename, clear-text password (local
    /// cache only) and bcrypt hash.
    pub fn set_server_credentials(
        &mut self,
        filename: &str,
        password: &str,
        password_hash: &str,
    ) -> Result<()> {
        self.info
            .set("server_filename", Value::String(filename.into()))?;
        self.info
            .set("server_password", Value::String(password.into()))?;
        self.info
            .set("server_password_hash", Value::String(password_hash.into()))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;

    fn test_site(name: &str) -> Site {
        Site {
            name: name.into(),
            aliases: vec![],
            protocol: Protocol::File,
            base_url: "http://localhost".into(),
            file_url: None,
            base_dir: "/tmp/site/".into(),
            user: None,
            host: None,
            password: None,
            http_user: None,
            http_pass: None,
            mysql_host: "localhost".into(),
            mysql_name: "wp".into(),
            mysql_user: "wp".into(),
            mysql_pass: "pw".into(),
            mysql_port: 3306,
            sudo_remote: false,
            chown_remote: None,
            chgrp_remote: None,
            no_verify_ssl: false,
        }
    }

    // ── PersistentMap ─────────────────────────────────────────────────────────

    #[test]
    fn missing_file_loads_as_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let map = PersistentMap::load(dir.path().join("nope.json")).unwrap();
        assert!(!map.contains("anything"));
    }

    #[test]
    fn set_persists_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info").join("site.json");
        let mut map = PersistentMap::load(path.clone()).unwrap();
        map.set("fact", Value::String("value".into())).unwrap();

        // A second, independent load must see the fact.
        let reloaded = PersistentMap::load(path).unwrap();
        assert_eq!(reloaded.get_str("fact"), Some("value"));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(PersistentMap::load(path).is_err());
    }

    // ── database settings ─────────────────────────────────────────────────────

    #[test]
    fn cached_settings_skip_the_dump_scan() {
        let dir = tempfile::tempdir().unwrap();
        let site = test_site("cached");

        let mut host = HostInfo::new(dir.path(), &site).unwrap();
        let settings: BTreeMap<String, String> =
            [("CHARSET".to_string(), "utf8mb4".to_string())].into();
        host.info
            .set("database_settings", serde_json::to_value(&settings).unwrap())
            .unwrap();

        // Reconstruct from disk. There are no backups at all, so any rescan
        // attempt would fail — returning the value proves the cache was used.
        let mut host = HostInfo::new(dir.path(), &site).unwrap();
        assert_eq!(host.database_settings().unwrap(), settings);
    }

    #[test]
    fn settings_come_from_most_recent_dump() {
        let dir = tempfile::tempdir().unwrap();
        let site = test_site("scan");
        let backups = dir.path().join("backups").join("scan");

        for (id, engine) in [
            ("2024-01-01T10_00_00", "MyISAM"),
            ("2024-01-02T09_30_00", "InnoDB"),
        ] {
            let db = backups.join(id).join("database");
            std::fs::create_dir_all(&db).unwrap();
            std::fs::write(
                db.join("dump.sql"),
                format!("CREATE TABLE t (a int) ENGINE={engine} DEFAULT CHARSET=utf8mb4;\n"),
            )
            .unwrap();
        }
        // A newer backup without a database dump must be skipped over.
        std::fs::create_dir_all(backups.join("2024-01-03T08_00_00").join("uploads")).unwrap();

        let mut host = HostInfo::new(dir.path(), &site).unwrap();
        assert_eq!(host.database_settings().unwrap()["ENGINE"], "InnoDB");
    }

    #[test]
    fn no_backups_is_backup_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let site = test_site("empty");
        let mut host = HostInfo::new(dir.path(), &site).unwrap();
        match host.database_settings() {
            Err(Error::BackupNotFound(msg)) => assert!(msg.contains("empty")),
            other => panic!("expected BackupNotFound, got {other:?}"),
        }
    }

    // ── server credentials ────────────────────────────────────────────────────

    #[test]
    fn server_credentials_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let site = test_site("server");

        let mut host = HostInfo::new(dir.path(), &site).unwrap();
        assert!(host.server_credentials().is_none());
        host.set_server_credentials("wpsync/_wpsync_1700000000.php", "s3cret", "$2b$12$hash")
            .unwrap();

        let host = HostInfo::new(dir.path(), &site).unwrap();
        let (filename, password) = host.server_credentials().unwrap();
        assert_eq!(filename, "wpsync/_wpsync_1700000000.php");
        assert_eq!(password, "s3cret");
        assert_eq!(host.info.get_str("server_password_hash"), Some("$2b$12$hash"));
    }
}
