//! Configuration file management for wrench.
//!
//! Provides a TOML-based config file at `~/.config/wrench/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use wrench_core::adapter::inventory::CHECK_INVENTORY;
use wrench_db::config::DbConfig;

pub const PLANNER_COMMAND_ENV: &str = "WRENCH_PLANNER_COMMAND";
pub const EXECUTOR_COMMAND_ENV: &str = "WRENCH_EXECUTOR_COMMAND";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub gateway: GatewaySection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

/// External programs backing the planner and executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner: Option<ModelCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<ModelCommand>,
    /// Per-step executor deadline; 0 disables it.
    #[serde(default = "default_executor_deadline_secs")]
    pub executor_deadline_secs: u64,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Offer the built-in `check_inventory` tool to the executor.
    #[serde(default = "default_check_inventory")]
    pub check_inventory: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSection>,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            planner: None,
            executor: None,
            executor_deadline_secs: default_executor_deadline_secs(),
            max_tool_rounds: default_max_tool_rounds(),
            check_inventory: default_check_inventory(),
            tools: Vec::new(),
        }
    }
}

fn default_executor_deadline_secs() -> u64 {
    600
}

fn default_max_tool_rounds() -> u32 {
    wrench_core::adapter::executor::DEFAULT_MAX_TOOL_ROUNDS
}

fn default_check_inventory() -> bool {
    true
}

fn default_tool_timeout_secs() -> u64 {
    60
}

/// A program that reads a prompt on stdin and answers on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCommand {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// A command the executor model may call as a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSection {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl GatewaySection {
    pub fn executor_deadline(&self) -> Option<Duration> {
        (self.executor_deadline_secs > 0).then(|| Duration::from_secs(self.executor_deadline_secs))
    }

    /// The planner command, or an error naming where to configure it.
    pub fn require_planner(&self) -> Result<&ModelCommand> {
        self.planner.as_ref().with_context(|| {
            format!(
                "no planner configured; set [gateway.planner] in {} or {PLANNER_COMMAND_ENV}",
                config_path().display()
            )
        })
    }

    /// The executor command, or an error naming where to configure it.
    pub fn require_executor(&self) -> Result<&ModelCommand> {
        self.executor.as_ref().with_context(|| {
            format!(
                "no executor configured; set [gateway.executor] in {} or {EXECUTOR_COMMAND_ENV}",
                config_path().display()
            )
        })
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the wrench config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/wrench` or `~/.config/wrench`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("wrench");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("wrench")
}

/// Return the path to the wrench config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file is left readable by its owner only.
pub fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(config, &config_path())
}

/// Load the config file. A missing file is `Ok(None)`; a file that exists
/// but does not parse is an error.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    load_config_from(&path).map(Some)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct WrenchConfig {
    pub db_config: DbConfig,
    pub gateway: GatewaySection,
}

impl WrenchConfig {
    /// Resolve configuration from the user's config file and environment.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        Self::resolve_with(cli_db_url, load_config()?)
    }

    /// Resolve against an already loaded config file.
    ///
    /// - DB URL: `cli_db_url` > `WRENCH_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Planner/executor command: `WRENCH_PLANNER_COMMAND` / `WRENCH_EXECUTOR_COMMAND` >
    ///   `[gateway.planner]` / `[gateway.executor]`
    pub fn resolve_with(cli_db_url: Option<&str>, file: Option<ConfigFile>) -> Result<Self> {
        let db_url = if let Some(url) = cli_db_url {
            url.to_owned()
        } else if let Ok(url) = std::env::var(DbConfig::ENV_VAR) {
            url
        } else if let Some(ref cfg) = file {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_owned()
        };

        let mut gateway = file.map(|f| f.gateway).unwrap_or_default();
        if let Some(cmd) = command_from_env(PLANNER_COMMAND_ENV)? {
            gateway.planner = Some(cmd);
        }
        if let Some(cmd) = command_from_env(EXECUTOR_COMMAND_ENV)? {
            gateway.executor = Some(cmd);
        }

        let mut seen = std::collections::HashSet::new();
        if gateway.check_inventory {
            seen.insert(CHECK_INVENTORY);
        }
        for tool in &gateway.tools {
            if !seen.insert(tool.name.as_str()) {
                bail!("duplicate tool name {:?} in [[gateway.tools]]", tool.name);
            }
        }

        Ok(Self {
            db_config: DbConfig::new(db_url),
            gateway,
        })
    }
}

/// Read a command line from `var`, split on whitespace.
fn command_from_env(var: &str) -> Result<Option<ModelCommand>> {
    let Ok(value) = std::env::var(var) else {
        return Ok(None);
    };
    let mut words = value.split_whitespace().map(str::to_owned);
    let Some(command) = words.next() else {
        bail!("{var} is set but empty");
    };
    Ok(Some(ModelCommand {
        command,
        args: words.collect(),
    }))
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::lock_env;

    const SAMPLE: &str = r#"
[database]
url = "postgresql://db:5432/wrench"

[gateway]
executor_deadline_secs = 120

[gateway.planner]
command = "llm"
args = ["-m", "planner"]

[gateway.executor]
command = "llm"

[[gateway.tools]]
name = "ping"
description = "ICMP reachability"
command = "/usr/local/bin/ping-json"
"#;

    fn clear_env() {
        unsafe {
            std::env::remove_var(DbConfig::ENV_VAR);
            std::env::remove_var(PLANNER_COMMAND_ENV);
            std::env::remove_var(EXECUTOR_COMMAND_ENV);
        }
    }

    #[test]
    fn parse_full_config() {
        let cfg: ConfigFile = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.database.url, "postgresql://db:5432/wrench");
        let planner = cfg.gateway.planner.as_ref().unwrap();
        assert_eq!(planner.command, "llm");
        assert_eq!(planner.args, vec!["-m", "planner"]);
        assert!(cfg.gateway.executor.as_ref().unwrap().args.is_empty());
        assert_eq!(cfg.gateway.executor_deadline(), Some(Duration::from_secs(120)));
        assert_eq!(cfg.gateway.max_tool_rounds, default_max_tool_rounds());
        assert_eq!(cfg.gateway.tools.len(), 1);
        assert_eq!(cfg.gateway.tools[0].timeout_secs, 60);
        assert!(cfg.gateway.check_inventory);
    }

    #[test]
    fn gateway_section_is_optional() {
        let cfg: ConfigFile = toml::from_str("[database]\nurl = \"postgresql://x/y\"\n").unwrap();
        assert_eq!(cfg.gateway, GatewaySection::default());
        assert!(cfg.gateway.require_planner().is_err());
    }

    #[test]
    fn zero_deadline_disables_it() {
        let gateway = GatewaySection {
            executor_deadline_secs: 0,
            ..GatewaySection::default()
        };
        assert_eq!(gateway.executor_deadline(), None);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("wrench").join("config.toml");
        let original: ConfigFile = toml::from_str(SAMPLE).unwrap();

        save_config_to(&original, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[cfg(unix)]
    #[test]
    fn saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        save_config_to(&toml::from_str(SAMPLE).unwrap(), &path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[database\nurl = ").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config file"));
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(DbConfig::ENV_VAR, "postgresql://env:5432/envdb") };

        let file = toml::from_str(SAMPLE).unwrap();
        let config =
            WrenchConfig::resolve_with(Some("postgresql://cli:5432/clidb"), Some(file)).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        clear_env();
    }

    #[test]
    fn resolve_env_overrides_file() {
        let _lock = lock_env();
        clear_env();
        unsafe {
            std::env::set_var(DbConfig::ENV_VAR, "postgresql://env:5432/envdb");
            std::env::set_var(PLANNER_COMMAND_ENV, "ollama run llama3");
        }

        let file = toml::from_str(SAMPLE).unwrap();
        let config = WrenchConfig::resolve_with(None, Some(file)).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        let planner = config.gateway.require_planner().unwrap();
        assert_eq!(planner.command, "ollama");
        assert_eq!(planner.args, vec!["run", "llama3"]);
        // Executor still comes from the file.
        assert_eq!(config.gateway.require_executor().unwrap().command, "llm");

        clear_env();
    }

    #[test]
    fn resolve_falls_back_to_file_then_default() {
        let _lock = lock_env();
        clear_env();

        let file = toml::from_str(SAMPLE).unwrap();
        let config = WrenchConfig::resolve_with(None, Some(file)).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://db:5432/wrench");

        let config = WrenchConfig::resolve_with(None, None).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert!(config.gateway.planner.is_none());
    }

    #[test]
    fn duplicate_tool_names_rejected() {
        let _lock = lock_env();
        clear_env();

        let mut file: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let dup = file.gateway.tools[0].clone();
        file.gateway.tools.push(dup);
        let err = WrenchConfig::resolve_with(None, Some(file)).unwrap_err();
        assert!(err.to_string().contains("duplicate tool name"));
    }

    #[test]
    fn command_tool_cannot_shadow_builtin_inventory_tool() {
        let _lock = lock_env();
        clear_env();

        let mut file: ConfigFile = toml::from_str(SAMPLE).unwrap();
        file.gateway.tools[0].name = CHECK_INVENTORY.to_owned();
        let err = WrenchConfig::resolve_with(None, Some(file.clone())).unwrap_err();
        assert!(err.to_string().contains("duplicate tool name"));

        file.gateway.check_inventory = false;
        assert!(WrenchConfig::resolve_with(None, Some(file)).is_ok());
    }

    #[test]
    fn empty_env_command_rejected() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(EXECUTOR_COMMAND_ENV, "   ") };

        assert!(WrenchConfig::resolve_with(None, None).is_err());

        clear_env();
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("wrench/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
