//! Configuration file management for trellis.
//!
//! Provides a TOML-based config file at `~/.config/trellis/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Plan file used when nothing else names one.
pub const DEFAULT_PLAN_PATH: &str = "plan.toml";

pub const PLAN_ENV: &str = "TRELLIS_PLAN";
pub const VIEW_FORMAT_ENV: &str = "TRELLIS_VIEW_FORMAT";

// -----------------------------------------------------------------------
// View format
// -----------------------------------------------------------------------

/// Output of `trellis show`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewFormat {
    /// Indented `id [status] description` lines
    #[default]
    Outline,
    /// Nested Markdown list
    Markdown,
    /// Mermaid flowchart
    Mermaid,
    /// Graphviz DOT
    Graphviz,
    /// Node/edge graph as JSON
    Json,
}

impl fmt::Display for ViewFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Outline => "outline",
            Self::Markdown => "markdown",
            Self::Mermaid => "mermaid",
            Self::Graphviz => "graphviz",
            Self::Json => "json",
        };
        f.write_str(s)
    }
}

impl FromStr for ViewFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(s, true).map_err(|_| {
            anyhow::anyhow!(
                "invalid view format: {s:?} (expected outline, markdown, mermaid, graphviz, or json)"
            )
        })
    }
}

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub plan: PlanSection,
    #[serde(default)]
    pub view: ViewSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSection {
    /// Plan file, relative to the working directory unless absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ViewFormat>,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSection {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the trellis config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/trellis` or `~/.config/trellis`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("trellis");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("trellis")
}

/// Return the path to the trellis config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load the config file at `path`. A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Option<ConfigFile>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Load the config file from [`config_path`].
pub fn load_config() -> Result<Option<ConfigFile>> {
    load_config_from(&config_path())
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone, PartialEq)]
pub struct TrellisConfig {
    pub plan_path: PathBuf,
    pub view_format: ViewFormat,
}

impl TrellisConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Plan path: `cli_plan` > `TRELLIS_PLAN` env > `plan.path` > `plan.toml`
    /// - View format: `cli_view` > `TRELLIS_VIEW_FORMAT` env > `view.format` > `outline`
    pub fn resolve(
        cli_plan: Option<&Path>,
        cli_view: Option<ViewFormat>,
        file_config: Option<&ConfigFile>,
    ) -> Result<Self> {
        let plan_path = if let Some(path) = cli_plan {
            path.to_path_buf()
        } else if let Ok(path) = std::env::var(PLAN_ENV) {
            PathBuf::from(path)
        } else if let Some(path) = file_config.and_then(|c| c.plan.path.clone()) {
            path
        } else {
            PathBuf::from(DEFAULT_PLAN_PATH)
        };

        let view_format = if let Some(format) = cli_view {
            format
        } else if let Ok(value) = std::env::var(VIEW_FORMAT_ENV) {
            value
                .parse()
                .with_context(|| format!("{VIEW_FORMAT_ENV} env var is invalid"))?
        } else if let Some(format) = file_config.and_then(|c| c.view.format) {
            format
        } else {
            ViewFormat::default()
        };

        Ok(Self {
            plan_path,
            view_format,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    fn clear_env() {
        unsafe { std::env::remove_var(PLAN_ENV) };
        unsafe { std::env::remove_var(VIEW_FORMAT_ENV) };
    }

    fn file_config() -> ConfigFile {
        ConfigFile {
            plan: PlanSection {
                path: Some(PathBuf::from("plans/file.toml")),
            },
            view: ViewSection {
                format: Some(ViewFormat::Mermaid),
            },
            log: LogSection {
                filter: Some("trellis_core=debug".into()),
            },
        }
    }

    #[test]
    fn config_roundtrip_through_toml() {
        let original = file_config();
        let text = toml::to_string_pretty(&original).unwrap();
        assert!(text.contains("[plan]"), "got:\n{text}");
        assert!(text.contains("format = \"mermaid\""), "got:\n{text}");
        let loaded: ConfigFile = toml::from_str(&text).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn sections_are_optional() {
        let loaded: ConfigFile = toml::from_str("[view]\nformat = \"graphviz\"\n").unwrap();
        assert_eq!(loaded.view.format, Some(ViewFormat::Graphviz));
        assert_eq!(loaded.plan.path, None);
        assert_eq!(loaded.log.filter, None);
    }

    #[test]
    fn load_missing_config_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let loaded = load_config_from(&tmp.path().join("config.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn load_malformed_config_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[view]\nformat = \"sideways\"\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(
            format!("{err:#}").contains("failed to parse config file"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();

        unsafe { std::env::set_var(PLAN_ENV, "env.toml") };
        unsafe { std::env::set_var(VIEW_FORMAT_ENV, "json") };

        let config = TrellisConfig::resolve(
            Some(Path::new("cli.toml")),
            Some(ViewFormat::Markdown),
            Some(&file_config()),
        )
        .unwrap();
        assert_eq!(config.plan_path, PathBuf::from("cli.toml"));
        assert_eq!(config.view_format, ViewFormat::Markdown);

        clear_env();
    }

    #[test]
    fn resolve_with_env_var_overrides_config_file() {
        let _lock = lock_env();

        unsafe { std::env::set_var(PLAN_ENV, "env.toml") };
        unsafe { std::env::set_var(VIEW_FORMAT_ENV, "JSON") };

        let config = TrellisConfig::resolve(None, None, Some(&file_config())).unwrap();
        assert_eq!(config.plan_path, PathBuf::from("env.toml"));
        assert_eq!(config.view_format, ViewFormat::Json);

        clear_env();
    }

    #[test]
    fn resolve_falls_back_to_config_file_then_defaults() {
        let _lock = lock_env();
        clear_env();

        let config = TrellisConfig::resolve(None, None, Some(&file_config())).unwrap();
        assert_eq!(config.plan_path, PathBuf::from("plans/file.toml"));
        assert_eq!(config.view_format, ViewFormat::Mermaid);

        let config = TrellisConfig::resolve(None, None, None).unwrap();
        assert_eq!(config.plan_path, PathBuf::from(DEFAULT_PLAN_PATH));
        assert_eq!(config.view_format, ViewFormat::Outline);
    }

    #[test]
    fn resolve_rejects_invalid_env_format() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(VIEW_FORMAT_ENV, "sideways") };

        let result = TrellisConfig::resolve(None, None, None);

        clear_env();
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains(VIEW_FORMAT_ENV), "unexpected error: {msg}");
        assert!(msg.contains("sideways"), "unexpected error: {msg}");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("trellis/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
