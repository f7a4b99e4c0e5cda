use std::path::PathBuf;

use crate::cli::GlobalArgs;
use crate::lock::sanitize_name;
use crate::types::Domain;

/// Settings shared by every subcommand.
pub struct Config {
    pub data_dir: PathBuf,
    pub config_name: String,
    pub domain: Domain,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("config_name", &self.config_name)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(args: &GlobalArgs) -> anyhow::Result<Self> {
        let config_name = args.config_name.trim().to_string();
        if sanitize_name(&config_name) != config_name || config_name.is_empty() {
            anyhow::bail!(
                "Invalid configuration name '{}': use letters, digits, '_' or '-'",
                args.config_name
            );
        }
        if args.timeout == 0 {
            anyhow::bail!("--timeout must be at least 1 second");
        }

        Ok(Self {
            data_dir: expand_tilde(&args.data_dir),
            config_name,
            domain: args.domain,
            timeout_secs: args.timeout,
        })
    }

    /// SQLite database shared by all configurations in the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("crm-sync.db")
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalArgs {
        let argv = ["crm-sync"]
            .into_iter()
            .chain(args.iter().copied())
            .chain(["status"]);
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/Documents");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("Documents"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(
            expand_tilde("/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            expand_tilde("relative/path"),
            PathBuf::from("relative/path")
        );
    }

    #[test]
    fn test_from_cli_paths() {
        let cfg = Config::from_cli(&global(&["--data-dir", "/var/lib/crm"])).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/crm"));
        assert_eq!(cfg.db_path(), PathBuf::from("/var/lib/crm/crm-sync.db"));
        assert_eq!(cfg.config_name, "default");
        assert_eq!(cfg.timeout_secs, 30);
    }

    #[test]
    fn test_from_cli_rejects_unsafe_config_name() {
        assert!(Config::from_cli(&global(&["--config-name", "../etc"])).is_err());
        assert!(Config::from_cli(&global(&["--config-name", "prod-eu"])).is_ok());
    }

    #[test]
    fn test_from_cli_rejects_zero_timeout() {
        assert!(Config::from_cli(&global(&["--timeout", "0"])).is_err());
    }
}
