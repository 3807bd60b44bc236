use crate::config::Config;
use crate::config::merge::{deep_merge, remove_nulls};
use crate::config::providers::{EnvVars, defaults, env, legacy};
use crate::config::validation::validate_config;
use crate::error::ResultExt;
use anyhow::Context;
use arc_swap::ArcSwap;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;

const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_LEGACY_EXPORTS_PATH: &str = "aws-exports.json";

/// Controls where the [`ConfigManager`] looks for configuration sources.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Determines if a legacy exports file is consulted at all.
    pub use_legacy_exports: bool,
    pub legacy_exports_path: PathBuf,
    /// Overrides the environment otherwise taken from `APP_ENV` or `NODE_ENV`.
    pub environment: Option<String>,
    pub vars: EnvVars,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions::from_vars(EnvVars::from_process())
    }
}

impl LoadOptions {
    pub fn from_vars(vars: EnvVars) -> Self {
        LoadOptions {
            use_legacy_exports: true,
            legacy_exports_path: PathBuf::from(DEFAULT_LEGACY_EXPORTS_PATH),
            environment: None,
            vars,
        }
    }

    fn resolve_environment(&self) -> String {
        self.environment
            .as_deref()
            .or_else(|| self.vars.first_of(&["APP_ENV", "NODE_ENV"]))
            .unwrap_or(DEFAULT_ENVIRONMENT)
            .to_string()
    }
}

/// Loads, merges and validates the configuration exactly once.
///
/// Concurrent callers of [`load`](ConfigManager::load) share a single build pass. A successful
/// result is kept until [`reset`](ConfigManager::reset) is invoked, whereas a failed load is
/// retried by the next caller.
pub struct ConfigManager {
    options: LoadOptions,
    cell: ArcSwap<OnceCell<Arc<Config>>>,
    builds: AtomicUsize,
}

impl ConfigManager {
    pub fn new(options: LoadOptions) -> Self {
        ConfigManager {
            options,
            cell: ArcSwap::from_pointee(OnceCell::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Returns the loaded configuration, building it first if required.
    pub async fn load(&self) -> anyhow::Result<Arc<Config>> {
        let cell = self.cell.load_full();
        let config = cell.get_or_try_init(|| self.load_and_validate()).await?;

        Ok(config.clone())
    }

    /// Returns the configuration if it has already been loaded.
    pub fn config(&self) -> Option<Arc<Config>> {
        self.cell.load().get().cloned()
    }

    /// Forgets the loaded configuration so that the next [`load`](ConfigManager::load) rebuilds it.
    pub fn reset(&self) {
        self.cell.store(Arc::new(OnceCell::new()));
    }

    /// Merges all sources into a single tree without validating it.
    pub fn build(&self) -> Value {
        let environment = self.options.resolve_environment();
        let mut sources = vec![defaults::defaults(&environment)];

        if self.options.use_legacy_exports
            && let Some(exports) = legacy::load(&self.options.legacy_exports_path)
        {
            sources.push(exports);
        }

        sources.push(env::load_from_env(&self.options.vars));

        remove_nulls(deep_merge(&sources))
    }

    /// Returns how many build passes have been performed so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    async fn load_and_validate(&self) -> anyhow::Result<Arc<Config>> {
        self.builds.fetch_add(1, Ordering::Relaxed);

        let tree = self.build();
        let report = validate_config(&tree);
        if !report.valid {
            tracing::error!(
                "Failed to load configuration: {} problem(s) found",
                report.errors.len()
            );
            return Err(anyhow::anyhow!(
                "Configuration validation failed:\n{}",
                report.errors.join("\n")
            ))
            .mark_validation_error();
        }

        let config: Config =
            serde_json::from_value(tree).context("Failed to deserialize the configuration")?;
        tracing::info!(
            "Configuration loaded successfully (environment: {})",
            config.environment
        );

        Ok(Arc::new(config))
    }
}
