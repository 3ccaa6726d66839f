//! Configuration file support for abiwright.
//!
//! abiwright reads two configuration file locations:
//! - Global: `~/.abiwright/config.toml` - User-wide defaults
//! - Project: `.abiwright/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default location of the reference ABI dumps, relative to the project root.
pub const DEFAULT_DUMP_ROOT: &str = "prebuilts/abi-dumps";

/// Default output directory for generated artifacts.
pub const DEFAULT_OUT_DIR: &str = "out";

/// abiwright configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Platform release settings
    pub platform: PlatformConfig,

    /// ABI checking settings
    pub abi: AbiConfig,

    /// Build settings
    pub build: BuildConfig,
}

/// Release and device settings that drive API levels and ABI reference lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Numeric platform SDK version (e.g. 33)
    pub sdk_version: i32,

    /// Whether the platform SDK version has been finalized
    pub sdk_final: bool,

    /// Codename of the in-development release ("REL" once finalized)
    pub sdk_codename: String,

    /// Preview codenames currently in development
    pub active_codenames: Vec<String>,

    /// Codenames of already finalized releases, mapped to their API level
    pub final_codenames: BTreeMap<String, i32>,

    /// VNDK version of the device (a codename or a numeric version)
    pub vndk_version: Option<String>,

    /// Binder bitness of the device ("64" or "32")
    pub binder_bitness: String,

    /// Architecture being built
    pub arch: String,

    /// Primary device architecture
    pub primary_arch: String,

    /// Device product name, if building for a specific product
    pub device_product: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            sdk_version: 33,
            sdk_final: true,
            sdk_codename: "REL".to_string(),
            active_codenames: Vec::new(),
            final_codenames: BTreeMap::new(),
            vndk_version: None,
            binder_bitness: "64".to_string(),
            arch: "arm64".to_string(),
            primary_arch: "arm64".to_string(),
            device_product: None,
        }
    }
}

impl PlatformConfig {
    /// Architecture directory name used in reference dump paths.
    ///
    /// Secondary architectures are suffixed with the primary one, e.g. `arm_arm64`.
    pub fn arch_dir_name(&self) -> String {
        if self.arch == self.primary_arch {
            self.arch.clone()
        } else {
            format!("{}_{}", self.arch, self.primary_arch)
        }
    }

    /// The platform SDK version as a string.
    pub fn sdk_version_string(&self) -> String {
        self.sdk_version.to_string()
    }
}

/// ABI-checking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbiConfig {
    /// Root directory of the reference dumps
    pub dump_root: PathBuf,

    /// ABI tool implementation (only "builtin" is provided)
    pub tool: String,

    /// Check all APIs by default, not just the referenced ones
    pub check_all_apis: bool,
}

impl Default for AbiConfig {
    fn default() -> Self {
        AbiConfig {
            dump_root: PathBuf::from(DEFAULT_DUMP_ROOT),
            tool: "builtin".to_string(),
            check_all_apis: false,
        }
    }
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default number of parallel jobs (None = auto-detect)
    pub jobs: Option<usize>,

    /// Output directory for generated artifacts
    pub out_dir: Option<PathBuf>,
}

impl BuildConfig {
    /// Effective output directory.
    pub fn out_dir(&self) -> PathBuf {
        self.out_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR))
    }
}

/// Partially specified configuration used when layering files.
///
/// Every field is optional so a project file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    platform: PlatformLayer,
    abi: AbiLayer,
    build: BuildConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PlatformLayer {
    sdk_version: Option<i32>,
    sdk_final: Option<bool>,
    sdk_codename: Option<String>,
    active_codenames: Option<Vec<String>>,
    final_codenames: Option<BTreeMap<String, i32>>,
    vndk_version: Option<String>,
    binder_bitness: Option<String>,
    arch: Option<String>,
    primary_arch: Option<String>,
    device_product: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AbiLayer {
    dump_root: Option<PathBuf>,
    tool: Option<String>,
    check_all_apis: Option<bool>,
}

impl Config {
    /// Load configuration from a file, on top of the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.merge(read_layer(path)?);
        Ok(config)
    }

    /// Parse configuration from a TOML string, on top of the defaults.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let layer: ConfigLayer =
            toml::from_str(contents).with_context(|| "failed to parse config")?;
        let mut config = Config::default();
        config.merge(layer);
        Ok(config)
    }

    /// Merge a layer into this config (the layer takes precedence).
    fn merge(&mut self, other: ConfigLayer) {
        let p = other.platform;
        if let Some(v) = p.sdk_version {
            self.platform.sdk_version = v;
        }
        if let Some(v) = p.sdk_final {
            self.platform.sdk_final = v;
        }
        if let Some(v) = p.sdk_codename {
            self.platform.sdk_codename = v;
        }
        if let Some(v) = p.active_codenames {
            self.platform.active_codenames = v;
        }
        if let Some(v) = p.final_codenames {
            self.platform.final_codenames = v;
        }
        if p.vndk_version.is_some() {
            self.platform.vndk_version = p.vndk_version;
        }
        if let Some(v) = p.binder_bitness {
            self.platform.binder_bitness = v;
        }
        if let Some(v) = p.arch {
            self.platform.arch = v;
        }
        if let Some(v) = p.primary_arch {
            self.platform.primary_arch = v;
        }
        if p.device_product.is_some() {
            self.platform.device_product = p.device_product;
        }

        if let Some(v) = other.abi.dump_root {
            self.abi.dump_root = v;
        }
        if let Some(v) = other.abi.tool {
            self.abi.tool = v;
        }
        if let Some(v) = other.abi.check_all_apis {
            self.abi.check_all_apis = v;
        }

        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.out_dir.is_some() {
            self.build.out_dir = other.build.out_dir;
        }
    }
}

fn read_layer(path: &Path) -> Result<ConfigLayer> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

/// Get the global abiwright config directory (~/.abiwright).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".abiwright"))
}

/// Get the global config path (~/.abiwright/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.abiwright/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".abiwright").join("config.toml")
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.abiwright/config.toml)
/// 2. Global config (~/.abiwright/config.toml)
/// 3. Defaults
///
/// Unreadable files are skipped with a warning.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    for path in global_path.into_iter().chain(std::iter::once(project_path)) {
        if !path.exists() {
            continue;
        }
        match read_layer(path) {
            Ok(layer) => config.merge(layer),
            Err(e) => tracing::warn!("Failed to load config from {}: {:#}", path.display(), e),
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.platform.binder_bitness, "64");
        assert_eq!(config.abi.dump_root, PathBuf::from(DEFAULT_DUMP_ROOT));
        assert_eq!(config.build.out_dir(), PathBuf::from("out"));
        assert!(!config.abi.check_all_apis);
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[platform]
sdk_version = 34
sdk_final = false
active_codenames = ["VanillaIceCream"]

[platform.final_codenames]
Tiramisu = 33

[abi]
dump_root = "abi"
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.platform.sdk_version, 34);
        assert!(!config.platform.sdk_final);
        assert_eq!(config.platform.active_codenames, vec!["VanillaIceCream"]);
        assert_eq!(config.platform.final_codenames.get("Tiramisu"), Some(&33));
        assert_eq!(config.abi.dump_root, PathBuf::from("abi"));
        // Untouched sections keep their defaults
        assert_eq!(config.platform.arch, "arm64");
    }

    #[test]
    fn test_project_overrides_global() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project = tmp.path().join("project.toml");

        std::fs::write(&global, "[platform]\nsdk_version = 30\narch = \"x86_64\"\n").unwrap();
        std::fs::write(&project, "[platform]\nsdk_version = 31\n").unwrap();

        let config = load_config(Some(&global), &project);
        assert_eq!(config.platform.sdk_version, 31);
        assert_eq!(config.platform.arch, "x86_64");
    }

    #[test]
    fn test_broken_config_falls_back() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project.toml");
        std::fs::write(&project, "[platform\nsdk_version = ").unwrap();

        let config = load_config(None, &project);
        assert_eq!(config.platform.sdk_version, 33);
    }

    #[test]
    fn test_arch_dir_name() {
        let mut platform = PlatformConfig::default();
        assert_eq!(platform.arch_dir_name(), "arm64");

        platform.arch = "arm".to_string();
        assert_eq!(platform.arch_dir_name(), "arm_arm64");
    }
}
