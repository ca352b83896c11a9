//! Background service management.
//!
//! Narrow interface over the platform service manager so relayd can run as
//! an auto-started background instance. Linux installs a systemd user
//! unit; unit rendering is pure so it can be tested without touching the
//! filesystem or systemd.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use directories::BaseDirs;

/// Unit file name installed for the daemon.
const UNIT_NAME: &str = "relayd.service";

/// Platform service-manager operations for the relayd daemon.
pub trait ServiceManager {
    /// Write the service definition pointing at the given rules file.
    fn install(&self, rules_file: &Path) -> Result<()>;
    /// Enable and start the service.
    fn enable(&self) -> Result<()>;
    /// Stop and disable the service.
    fn disable(&self) -> Result<()>;
    /// Human-readable status lines.
    fn status(&self) -> Result<Vec<String>>;
}

/// systemd user-unit implementation.
pub struct SystemdUserService {
    unit_dir: PathBuf,
}

impl SystemdUserService {
    pub fn new() -> Result<Self> {
        let dirs = BaseDirs::new().context("no home directory available")?;
        Ok(Self {
            unit_dir: dirs.config_dir().join("systemd").join("user"),
        })
    }

    fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(UNIT_NAME)
    }

    /// Run `systemctl --user`, failing on a non-zero exit.
    fn systemctl(args: &[&str]) -> Result<std::process::Output> {
        let output = Command::new("systemctl")
            .arg("--user")
            .args(args)
            .output()
            .context("running systemctl")?;
        if !output.status.success() {
            bail!(
                "systemctl --user {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }
}

impl ServiceManager for SystemdUserService {
    fn install(&self, rules_file: &Path) -> Result<()> {
        let relayd = relayd_path()?;
        fs::create_dir_all(&self.unit_dir)
            .with_context(|| format!("creating {}", self.unit_dir.display()))?;

        let unit_path = self.unit_path();
        fs::write(&unit_path, render_unit(&relayd, rules_file))
            .with_context(|| format!("writing {}", unit_path.display()))?;

        Self::systemctl(&["daemon-reload"])?;
        Ok(())
    }

    fn enable(&self) -> Result<()> {
        Self::systemctl(&["enable", "--now", UNIT_NAME])?;
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        Self::systemctl(&["disable", "--now", UNIT_NAME])?;
        Ok(())
    }

    fn status(&self) -> Result<Vec<String>> {
        // `systemctl status` exits non-zero for inactive units; the output
        // is still what the user asked for.
        let output = Command::new("systemctl")
            .args(["--user", "status", UNIT_NAME, "--no-pager"])
            .output()
            .context("running systemctl")?;

        let text = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };

        Ok(String::from_utf8_lossy(&text)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// The relayd binary installed alongside relayctl.
fn relayd_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating current executable")?;
    Ok(exe.with_file_name("relayd"))
}

/// Render the systemd unit for the daemon.
fn render_unit(relayd: &Path, rules_file: &Path) -> String {
    format!(
        "[Unit]\n\
         Description=tcprelay TCP forwarding daemon\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         ExecStart={} --rules-file {}\n\
         Restart=on-failure\n\
         RestartSec=2\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n",
        relayd.display(),
        rules_file.display()
    )
}
