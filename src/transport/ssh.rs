//! SSH transport.
//!
//! Every remote shell action is one non-interactive `ssh user@host <cmd>`
//! execution; transfers go through `scp` and `rsync`. Password auth is
//! rejected at configuration time — only key-based auth works
//! non-interactively, and a suppressed password prompt would hang forever.
//!
//! With `sudo_remote` every remote command is prefixed with `sudo` and ssh
//! gets `-t` (sudo may need a tty to prompt). With `chown_remote` /
//! `chgrp_remote`, every operation that creates or modifies remote paths is
//! followed by an ownership fix against the same path — after the transfer,
//! never before, so the fix covers what was actually written.

use std::path::Path;

use super::{Transport, run_captured, run_checked, sh_quote};
use crate::{
    config::Site,
    error::{Error, Result},
};

pub struct SshTransport {
    user: String,
    host: String,
    sudo: bool,
    chown: Option<String>,
    chgrp: Option<String>,
}

impl SshTransport {
    pub fn new(site: &Site) -> Result<Self> {
        let missing = || Error::Config(format!("site {} has no user/host", site.name));
        Ok(Self {
            user: site.user.clone().ok_or_else(missing)?,
            host: site.host.clone().ok_or_else(missing)?,
            sudo: site.sudo_remote,
            chown: site.chown_remote.clone(),
            chgrp: site.chgrp_remote.clone(),
        })
    }

    fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    // ── Argument builders ─────────────────────────────────────────────────────
    // Pure functions, unit-tested without spawning anything.

    /// `ssh [-t] user@host [sudo ]<command>`
    pub(crate) fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = vec!["ssh".to_string()];
        if self.sudo {
            args.push("-t".into());
        }
        args.push(self.target());
        args.push(if self.sudo {
            format!("sudo {command}")
        } else {
            command.to_string()
        });
        args
    }

    pub(crate) fn scp_down_args(&self, remote_path: &str, local_path: &Path) -> Vec<String> {
        vec![
            "scp".into(),
            format!("{}:{}", self.target(), sh_quote(remote_path)),
            local_path.display().to_string(),
        ]
    }

    pub(crate) fn scp_up_args(&self, local_path: &Path, remote_path: &str) -> Vec<String> {
        vec![
            "scp".into(),
            local_path.display().to_string(),
            format!("{}:{}", self.target(), sh_quote(remote_path)),
        ]
    }

    pub(crate) fn rsync_down_args(&self, remote_dir: &str, local_dir: &Path) -> Vec<String> {
        vec![
            "rsync".into(),
            "--recursive".into(),
            "--del".into(),
            "--compress".into(),
            format!("{}:{}/", self.target(), sh_quote(remote_dir)),
            local_dir.display().to_string(),
        ]
    }

    pub(crate) fn rsync_up_args(
        &self,
        local_dir: &Path,
        remote_dir: &str,
        exclude: &[String],
    ) -> Vec<String> {
        let mut args = vec![
            "rsync".into(),
            "--recursive".into(),
            "--del".into(),
            "--compress".into(),
        ];
        for pattern in exclude {
            args.push(format!("--exclude={}", sh_quote(pattern)));
        }
        args.push(format!("{}/", local_dir.display()));
        args.push(format!("{}:{}", self.target(), sh_quote(remote_dir)));
        args
    }

    /// Shell commands fixing ownership of `path`, in execution order.
    /// Empty when neither `chown_remote` nor `chgrp_remote` is configured.
    pub(crate) fn ownership_fix_commands(&self, path: &str, recursive: bool) -> Vec<String> {
        let flag = if recursive { "-R " } else { "" };
        let mut commands = Vec::new();
        if let Some(owner) = &self.chown {
            commands.push(format!("chown {flag}{} {}", sh_quote(owner), sh_quote(path)));
        }
        if let Some(group) = &self.chgrp {
            commands.push(format!("chgrp {flag}{} {}", sh_quote(group), sh_quote(path)));
        }
        commands
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    fn ssh_do(&self, command: &str) -> Result<String> {
        run_checked(&self.ssh_args(command))
    }

    /// Existence probe: exit 0 with `yes` on stdout means yes, exit 1 means
    /// no, anything else (255 = connection failure) is a transport error.
    fn probe(&self, command: &str) -> Result<bool> {
        let args = self.ssh_args(command);
        let (code, stdout, stderr) = run_captured(&args)?;
        match code {
            Some(0) => Ok(stdout.contains("yes")),
            Some(1) => Ok(false),
            _ => Err(Error::transport(&args, stderr.trim().to_string())),
        }
    }

    fn fix_ownership(&self, path: &str, recursive: bool) -> Result<()> {
        for command in self.ownership_fix_commands(path, recursive) {
            self.ssh_do(&command)?;
        }
        Ok(())
    }
}

impl Transport for SshTransport {
    fn dir_exists(&self, path: &str) -> Result<bool> {
        self.probe(&format!("test -d {} && echo yes", sh_quote(path)))
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        self.probe(&format!("test -f {} && echo yes", sh_quote(path)))
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        self.ssh_do(&format!("mkdir {}", sh_quote(path)))?;
        self.fix_ownership(path, false)
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        self.ssh_do(&format!("rm -r {}", sh_quote(path)))?;
        Ok(())
    }

    fn get(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        run_checked(&self.scp_down_args(remote_path, local_path))?;
        Ok(())
    }

    fn put(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        run_checked(&self.scp_up_args(local_path, remote_path))?;
        self.fix_ownership(remote_path, false)
    }

    fn mirror(&self, remote_dir: &str, local_dir: &Path) -> Result<()> {
        run_checked(&self.rsync_down_args(remote_dir, local_dir))?;
        Ok(())
    }

    fn mirror_reverse(
        &self,
        local_dir: &Path,
        remote_dir: &str,
        exclude: &[String],
    ) -> Result<()> {
        run_checked(&self.rsync_up_args(local_dir, remote_dir, exclude))?;
        self.fix_ownership(remote_dir, true)
    }

    fn cat(&self, path: &str) -> Result<String> {
        self.ssh_do(&format!("cat {}", sh_quote(path)))
    }

    fn cat_write(&self, path: &str, content: &str) -> Result<()> {
        // Staged through a local temp file and scp; pushing arbitrary content
        // through a remote `echo` breaks on size and on option-like prefixes.
        let mut tmp = tempfile::NamedTempFile::new()?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        self.put(tmp.path(), path)
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.ssh_do(&format!("rm {}", sh_quote(path)))?;
        Ok(())
    }

    fn shell(&self, command: &str) -> Result<String> {
        self.ssh_do(command)
    }

    fn has_shell(&self) -> bool {
        true
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
