use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use sshkit::config::{ConfigError, ConfigRecord, ConnectionConfig};
use sshkit::ssh::{HostKeyPolicy, SessionOptions};

use crate::commands;
use crate::paths;

const DEFAULT_PORT: u16 = 22;

/// sshkit - run commands and move files over password-authenticated SSH
#[derive(Parser)]
#[command(name = "sshkit")]
#[command(version)]
#[command(about = "Run commands and move files over password-authenticated SSH")]
pub struct Cli {
    /// Show verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// JSON file with host, port, user and password
    #[arg(long, env = "SSHKIT_CONFIG", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Remote host; overrides the config file
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// SSH port; overrides the config file
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Login user; overrides the config file
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Login password; overrides the config file
    #[arg(long, env = "SSHKIT_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Verify the server's host key against ~/.ssh/known_hosts ("yes") or
    /// accept any key ("no")
    #[arg(long, value_name = "MODE", default_value = "no", global = true)]
    pub strict_host_key_checking: HostKeyPolicy,

    /// known_hosts file to check against; implies strict checking
    #[arg(long, value_name = "FILE", global = true)]
    pub known_hosts: Option<PathBuf>,

    /// Give up connecting after this many seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub connect_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command on the remote host and print its output
    Exec {
        /// Fail when the command exits with a non-zero status
        #[arg(long)]
        check: bool,

        /// Command line to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Upload a local file to the remote host
    #[command(visible_alias = "put")]
    Upload {
        /// Local file to read
        local: PathBuf,
        /// Remote path to write (overwritten)
        remote: String,
    },

    /// Download a remote file
    #[command(visible_alias = "get")]
    Download {
        /// Remote file to read
        remote: String,
        /// Local path to write (overwritten)
        local: PathBuf,
    },
}

impl Cli {
    pub fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let config = self.connection_config()?;
        let options = self.session_options();

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(commands::run(config, options, self.command))
    }

    /// Resolve connection parameters: config file first, then flags on top.
    ///
    /// Without `--config` (or `SSHKIT_CONFIG`) and without `--host` the
    /// default config file is read.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let mut record = match (&self.config, &self.host) {
            (Some(path), _) => ConfigRecord::from_json_file(path)?,
            (None, Some(_)) => ConfigRecord {
                port: Some(i64::from(DEFAULT_PORT)),
                ..Default::default()
            },
            (None, None) => ConfigRecord::from_json_file(&paths::default_config_path()?)?,
        };

        if let Some(host) = &self.host {
            record.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            record.port = Some(i64::from(port));
        }
        if let Some(user) = &self.user {
            record.user = Some(user.clone());
        }
        if let Some(password) = &self.password {
            record.password = Some(password.clone());
        }

        ConnectionConfig::try_from(record)
    }

    pub fn session_options(&self) -> SessionOptions {
        let host_key_policy = match &self.known_hosts {
            Some(path) => HostKeyPolicy::KnownHosts(Some(path.clone())),
            None => self.strict_host_key_checking.clone(),
        };

        SessionOptions {
            host_key_policy,
            connect_timeout: self.connect_timeout.map(Duration::from_secs),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("ssh.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn exec_collects_trailing_arguments() {
        let cli = Cli::try_parse_from(["sshkit", "--host", "h", "exec", "ls", "-la", "/tmp"]).unwrap();
        let Commands::Exec { command, check } = cli.command else {
            panic!("expected Exec");
        };
        assert_eq!(command, vec!["ls", "-la", "/tmp"]);
        assert!(!check);
    }

    #[test]
    fn exec_requires_a_command() {
        assert!(Cli::try_parse_from(["sshkit", "exec"]).is_err());
    }

    #[test]
    fn upload_and_download_take_two_paths() {
        let cli = Cli::try_parse_from(["sshkit", "upload", "a.txt", "/srv/a.txt"]).unwrap();
        let Commands::Upload { local, remote } = cli.command else {
            panic!("expected Upload");
        };
        assert_eq!(local, PathBuf::from("a.txt"));
        assert_eq!(remote, "/srv/a.txt");

        let cli = Cli::try_parse_from(["sshkit", "get", "/srv/a.txt", "b.txt"]).unwrap();
        assert!(matches!(cli.command, Commands::Download { .. }));
    }

    #[test]
    fn flags_after_subcommand_are_accepted() {
        let cli = Cli::try_parse_from(["sshkit", "upload", "a", "b", "--port", "2222"]).unwrap();
        assert_eq!(cli.port, Some(2222));
    }

    #[test]
    fn host_flag_builds_config_without_file() {
        let cli = Cli::try_parse_from([
            "sshkit", "--host", "10.0.0.5", "--user", "deploy", "--password", "pw", "exec", "true",
        ])
        .unwrap();
        let config = cli.connection_config().unwrap();
        assert_eq!(config.host(), "10.0.0.5");
        assert_eq!(config.port(), 22);
        assert_eq!(config.user(), "deploy");
        assert_eq!(config.password(), "pw");
    }

    #[test]
    fn host_flag_without_user_is_rejected() {
        let cli = Cli::try_parse_from(["sshkit", "--host", "10.0.0.5", "exec", "true"]).unwrap();
        let err = cli.connection_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("user")));
    }

    #[test]
    fn flags_override_config_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            &temp,
            r#"{"host": "file-host", "port": 22, "user": "alice", "password": "secret"}"#,
        );

        let cli = Cli::try_parse_from([
            "sshkit",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "2200",
            "exec",
            "pwd",
        ])
        .unwrap();
        let config = cli.connection_config().unwrap();
        assert_eq!(config.host(), "file-host");
        assert_eq!(config.port(), 2200);
        assert_eq!(config.user(), "alice");
        assert_eq!(config.password(), "secret");
    }

    #[test]
    fn missing_config_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.json");
        let cli = Cli::try_parse_from(["sshkit", "--config", path.to_str().unwrap(), "exec", "pwd"])
            .unwrap();
        assert!(matches!(
            cli.connection_config().unwrap_err(),
            ConfigError::FileRead(..)
        ));
    }

    #[test]
    fn host_key_checking_defaults_to_accept_any() {
        let cli = Cli::try_parse_from(["sshkit", "exec", "pwd"]).unwrap();
        let options = cli.session_options();
        assert_eq!(options.host_key_policy, HostKeyPolicy::AcceptAny);
        assert!(options.connect_timeout.is_none());
    }

    #[test]
    fn strict_checking_and_timeout_are_applied() {
        let cli = Cli::try_parse_from([
            "sshkit",
            "--strict-host-key-checking",
            "yes",
            "--connect-timeout",
            "5",
            "exec",
            "pwd",
        ])
        .unwrap();
        let options = cli.session_options();
        assert_eq!(options.host_key_policy, HostKeyPolicy::KnownHosts(None));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn known_hosts_file_implies_strict_checking() {
        let cli = Cli::try_parse_from(["sshkit", "--known-hosts", "/tmp/kh", "exec", "pwd"]).unwrap();
        assert_eq!(
            cli.session_options().host_key_policy,
            HostKeyPolicy::KnownHosts(Some(PathBuf::from("/tmp/kh")))
        );
    }

    #[test]
    fn invalid_host_key_mode_is_a_parse_error() {
        assert!(
            Cli::try_parse_from(["sshkit", "--strict-host-key-checking", "maybe", "exec", "pwd"])
                .is_err()
        );
    }
}
