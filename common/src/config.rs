//! Configuration types for the build inputs and for runtime and execution settings

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

use crate::locale::Locale;

/// Runtime configuration for tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

/// One font family: every file under `root` is copied, keeping its path relative to `base`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontFamily {
    pub root: std::path::PathBuf,
    pub base: std::path::PathBuf,
}

/// Locations of the build inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Application root, assets keep their path relative to it
    pub app: std::path::PathBuf,
    pub assets: std::path::PathBuf,
    pub material_icons: std::path::PathBuf,
    pub fonts: Vec<FontFamily>,
    /// Third-party images (only top-level `*.png` files are distributed)
    pub dependency_images: std::path::PathBuf,
    /// Already localized bundles, one subdirectory per locale key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i18n: Option<std::path::PathBuf>,
}

impl PathsConfig {
    fn resolve_against(&mut self, dir: &std::path::Path) {
        let resolve = |path: &mut std::path::PathBuf| {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        };
        resolve(&mut self.app);
        resolve(&mut self.assets);
        resolve(&mut self.material_icons);
        for family in &mut self.fonts {
            resolve(&mut family.root);
            resolve(&mut family.base);
        }
        resolve(&mut self.dependency_images);
        if let Some(i18n) = self.i18n.as_mut() {
            resolve(i18n);
        }
    }
}

/// Everything a build needs to know about its inputs: the supported locales, in output order,
/// and where the sources live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub locales: Vec<Locale>,
    pub paths: PathsConfig,
}

impl BuildConfig {
    /// Parse a JSON build configuration, relative paths are resolved against `base_dir`
    pub fn from_json(json: &str, base_dir: &std::path::Path) -> anyhow::Result<Self> {
        let mut config: BuildConfig =
            serde_json::from_str(json).context("failed parsing build configuration")?;
        config.paths.resolve_against(base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON build configuration file, relative paths are resolved against its directory
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading build configuration {:?}", &path))?;
        let base_dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        Self::from_json(&json, base_dir).with_context(|| format!("invalid configuration {:?}", &path))
    }

    /// Locale keys become directory names, so each must be exactly one plain path component and
    /// no two locales may share a key.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for locale in &self.locales {
            let mut components = std::path::Path::new(&locale.key).components();
            let is_plain = matches!(
                (components.next(), components.next()),
                (Some(std::path::Component::Normal(_)), None)
            );
            if !is_plain || locale.key.contains(['/', '\\']) {
                return Err(anyhow!("invalid locale key {:?}", &locale.key));
            }
            if !seen.insert(locale.key.as_str()) {
                return Err(anyhow!("duplicate locale key {:?}", &locale.key));
            }
        }
        Ok(())
    }
}
