//! Top-level configuration file
//!
//! ```ron
//! (
//!     log_format: Compact,
//!     providers: ["primary-api", "smtp-relay"],
//!     dispatch: (
//!         retry: (max_retries: 3, base_delay_ms: 500),
//!     ),
//! )
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use courier_common::logging::LogFormat;
use courier_dispatch::{DispatchConfig, DispatchOrchestrator, Provider};
use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "COURIER_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub log_format: LogFormat,

    /// Provider names, most preferred first
    ///
    /// The embedding application supplies an implementation for each name.
    #[serde(default)]
    pub providers: Vec<String>,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl CourierConfig {
    /// Read and parse a RON configuration file
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not a valid configuration.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Check the dispatch settings against the configured provider names
    ///
    /// # Errors
    ///
    /// The first problem [`DispatchConfig::validate`] finds.
    pub fn validate(&self) -> anyhow::Result<()> {
        let names: Vec<&str> = self.providers.iter().map(String::as_str).collect();
        self.dispatch.validate(&names)?;
        Ok(())
    }

    /// Build an orchestrator from the configured provider order
    ///
    /// Every configured name must be matched by one of `available`; providers
    /// that are available but not configured are left out.
    ///
    /// # Errors
    ///
    /// If a configured provider has no implementation, or the configuration
    /// does not validate.
    pub fn orchestrator(
        &self,
        available: impl IntoIterator<Item = Arc<dyn Provider>>,
    ) -> anyhow::Result<DispatchOrchestrator> {
        let available: Vec<Arc<dyn Provider>> = available.into_iter().collect();

        let ordered = self
            .providers
            .iter()
            .map(|name| {
                available
                    .iter()
                    .find(|provider| provider.name() == name)
                    .cloned()
                    .with_context(|| format!("No implementation for configured provider {name:?}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(DispatchOrchestrator::new(ordered, self.dispatch.clone())?)
    }

    /// Pretty RON rendering of the effective configuration
    ///
    /// # Errors
    ///
    /// If serialisation fails.
    pub fn to_pretty_ron(&self) -> anyhow::Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `COURIER_CONFIG` environment variable
/// 2. ./courier.config.ron (current working directory)
/// 3. /etc/courier/courier.config.ron (system-wide config)
///
/// # Errors
///
/// If `COURIER_CONFIG` names a missing file, or none of the default paths exist.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    let default_paths = [
        PathBuf::from("./courier.config.ron"),
        PathBuf::from("/etc/courier/courier.config.ron"),
    ];

    locate(
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        &default_paths,
    )
}

fn locate(explicit: Option<PathBuf>, default_paths: &[PathBuf]) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_locate_prefers_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit.ron");
        let fallback = dir.path().join("fallback.ron");
        std::fs::write(&explicit, "()").unwrap();
        std::fs::write(&fallback, "()").unwrap();

        let found = locate(Some(explicit.clone()), std::slice::from_ref(&fallback)).unwrap();
        assert_eq!(found, explicit);
    }

    #[test]
    fn test_locate_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("fallback.ron");
        std::fs::write(&fallback, "()").unwrap();

        let error = locate(Some(dir.path().join("missing.ron")), &[fallback]).unwrap_err();
        assert!(error.to_string().contains("non-existent file"));
    }

    #[test]
    fn test_locate_falls_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.ron");
        let second = dir.path().join("second.ron");
        std::fs::write(&second, "()").unwrap();

        assert_eq!(
            locate(None, &[first.clone(), second.clone()]).unwrap(),
            second
        );

        std::fs::write(&first, "()").unwrap();
        assert_eq!(locate(None, &[first.clone(), second]).unwrap(), first);
    }

    #[test]
    fn test_locate_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let error = locate(None, &[dir.path().join("nope.ron")]).unwrap_err();
        assert!(error.to_string().starts_with("No configuration file found"));
    }

    #[test]
    fn test_pretty_ron_round_trips() {
        let config = CourierConfig {
            log_format: LogFormat::Json,
            providers: vec!["primary".to_string(), "backup".to_string()],
            ..CourierConfig::default()
        };

        let rendered = config.to_pretty_ron().unwrap();
        let parsed: CourierConfig = ron::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
