//! FTP/SFTP transport, scripted through `lftp`.
//!
//! FTP servers offer no shell, no `test`, no `which` — every operation here
//! is a one-shot `lftp -c "open …; <command>; quit"` session. SFTP sites go
//! through the exact same code path: config normalisation rewrites their
//! host to an `sftp://` URL, which lftp dials natively, and no
//! password-based auth distinction is exposed to the caller.
//!
//! Existence checks are approximated with `glob --exist`: the final
//! character of the path is wrapped in a `[…]` character class so the glob
//! matches the literal path. Known gap: a path whose last character is part
//! of a `]` sequence breaks the class and the probe misreports — documented
//! here rather than silently worked around.

use std::path::Path;

use super::{Transport, run_captured, run_checked, sh_quote};
use crate::{
    config::Site,
    error::{Error, Result},
};

pub struct FtpTransport {
    user: String,
    password: String,
    host: String,
}

impl FtpTransport {
    pub fn new(site: &Site) -> Result<Self> {
        let missing = || Error::Config(format!("site {} has no user/host/pass", site.name));
        Ok(Self {
            user: site.user.clone().ok_or_else(missing)?,
            password: site.password.clone().ok_or_else(missing)?,
            host: site.host.clone().ok_or_else(missing)?,
        })
    }

    /// Full `lftp -c` script for one command.
    pub(crate) fn script(&self, command: &str) -> String {
        format!(
            "open -u {},{} {}; {command}; quit",
            sh_quote(&self.user),
            sh_quote(&self.password),
            sh_quote(&self.host),
        )
    }

    pub(crate) fn lftp_args(&self, command: &str) -> Vec<String> {
        vec!["lftp".into(), "-c".into(), self.script(command)]
    }

    fn ftp_do(&self, command: &str) -> Result<String> {
        run_checked(&self.lftp_args(command))
    }

    /// Existence probe; lftp exits 1 when the glob matches nothing.
    fn probe(&self, command: &str) -> Result<bool> {
        let args = self.lftp_args(command);
        let (code, stdout, stderr) = run_captured(&args)?;
        match code {
            Some(0) => Ok(stdout.contains("yes")),
            Some(1) => Ok(false),
            _ => Err(Error::transport(&args, stderr.trim().to_string())),
        }
    }
}

/// Turn `path` into a glob matching exactly that path by wrapping its final
/// character in a character class. Breaks when the path ends in `]`.
pub(crate) fn exact_glob(path: &str) -> String {
    match path.chars().next_back() {
        Some(last) => {
            let head = &path[..path.len() - last.len_utf8()];
            format!("{head}[{last}]")
        }
        None => String::new(),
    }
}

impl Transport for FtpTransport {
    fn dir_exists(&self, path: &str) -> Result<bool> {
        self.probe(&format!(
            "glob --exist -d {} && echo yes",
            sh_quote(&exact_glob(path))
        ))
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        self.probe(&format!(
            "glob --exist -f {} && echo yes",
            sh_quote(&exact_glob(path))
        ))
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        self.ftp_do(&format!("mkdir -p {}", sh_quote(path)))?;
        Ok(())
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        self.ftp_do(&format!("rm -r {}", sh_quote(path)))?;
        Ok(())
    }

    fn get(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        self.ftp_do(&format!(
            "get {} -o {}",
            sh_quote(remote_path),
            sh_quote(&local_path.display().to_string())
        ))?;
        Ok(())
    }

    fn put(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.ftp_do(&format!(
            "put {} -o {}",
            sh_quote(&local_path.display().to_string()),
            sh_quote(remote_path)
        ))?;
        Ok(())
    }

    fn mirror(&self, remote_dir: &str, local_dir: &Path) -> Result<()> {
        self.ftp_do(&format!(
            "mirror --delete {} {}",
            sh_quote(remote_dir),
            sh_quote(&local_dir.display().to_string())
        ))?;
        Ok(())
    }

    fn mirror_reverse(
        &self,
        local_dir: &Path,
        remote_dir: &str,
        exclude: &[String],
    ) -> Result<()> {
        let mut command = String::from("mirror --delete -R");
        for pattern in exclude {
            command.push_str(&format!(" --exclude {}", sh_quote(pattern)));
        }
        command.push_str(&format!(
            " {} {}",
            sh_quote(&local_dir.display().to_string()),
            sh_quote(remote_dir)
        ));
        self.ftp_do(&command)?;
        Ok(())
    }

    fn cat(&self, path: &str) -> Result<String> {
        self.ftp_do(&format!("cat {}", sh_quote(path)))
    }

    fn cat_write(&self, path: &str, content: &str) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        self.put(tmp.path(), path)
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.ftp_do(&format!("rm {}", sh_quote(path)))?;
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(host: &str) -> FtpTransport {
        FtpTransport {
            user: "alice".into(),
            password: "p w".into(),
            host: host.into(),
        }
    }

    // ── script / args ─────────────────────────────────────────────────────────

    #[test]
    fn script_opens_runs_and_quits() {
        let script = transport("ftp.example.org").script("mkdir -p www/wpsync");
        assert_eq!(
            script,
            "open -u alice,'p w' ftp.example.org; mkdir -p www/wpsync; quit"
        );
    }

    #[test]
    fn lftp_args_are_a_single_dash_c_invocation() {
        let args = transport("ftp.example.org").lftp_args("ls");
        assert_eq!(args.len(), 3);
        assert_eq!(args[0], "lftp");
        assert_eq!(args[1], "-c");
    }

    #[test]
    fn sftp_hosts_pass_through_as_urls() {
        let script = transport("sftp://shared.example.org").script("ls");
        assert!(script.contains("open -u alice,'p w' sftp://shared.example.org;"));
    }

    // ── exact_glob ────────────────────────────────────────────────────────────

    #[test]
    fn glob_wraps_last_character() {
        assert_eq!(exact_glob("www/site"), "www/sit[e]");
    }

    #[test]
    fn glob_of_single_character_path() {
        assert_eq!(exact_glob("w"), "[w]");
    }

    #[test]
    fn glob_of_empty_path_is_empty() {
        assert_eq!(exact_glob(""), "");
    }

    #[test]
    fn glob_gap_trailing_bracket_is_known_broken() {
        // A trailing `]` produces `[]]` which is not the literal-match class
        // the probe intends. Locked in as the documented gap.
        assert_eq!(exact_glob("dir]"), "dir[]]");
    }
}
