//! The workspace handle.
//!
//! One [`Workspace`] value is threaded through everything: it knows the root,
//! the metadata directory layout, the parsed workspace config, the retry
//! attempt count, the parallel job count, the run's failure counter, and the
//! cancellation flag. It is cheap to clone; clones share the counters.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fsops;
use crate::manifest::AttributeSet;

/// Name of the root metadata directory. Fixed per build.
pub const META_DIR: &str = ".grove";
/// Default name of the root manifest file inside the workspace.
pub const ROOT_MANIFEST: &str = "manifest";
/// Upper bound on the worker pool regardless of core count.
const MAX_JOBS: usize = 50;

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_true(v: &bool) -> bool {
    *v
}

fn default_true() -> bool {
    true
}

fn default_lockfile_name() -> String {
    "grove.lock".to_string()
}

fn default_prebuilt_json() -> String {
    "prebuilts.json".to_string()
}

fn default_package_tool() -> String {
    "cipd".to_string()
}

/// Workspace-level configuration, stored as XML at `<meta>/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Shared git object cache; relative paths resolve against the root.
    /// Empty disables the cache.
    #[serde(rename = "@cachepath", default, skip_serializing_if = "String::is_empty")]
    pub cache_path: String,
    /// Clone with `--filter=blob:none`.
    #[serde(rename = "@partialclone", default, skip_serializing_if = "is_false")]
    pub partial_clone: bool,
    /// Dissociate clones from the reference cache after cloning.
    #[serde(rename = "@dissociate", default, skip_serializing_if = "is_false")]
    pub dissociate: bool,
    /// Superproject submodule handling. Accepted values: "true", "false",
    /// and the historical "yes-please" (reserved for internal test use).
    /// The feature is experimental and defaults to off.
    #[serde(
        rename = "@enablesubmodules",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub enable_submodules: String,
    /// Transitional migration knob: wins over `enablesubmodules`.
    #[serde(
        rename = "@force-disable-submodules-infra-only",
        default,
        skip_serializing_if = "is_false"
    )]
    pub force_disable_submodules: bool,
    #[serde(
        rename = "@lockfileenabled",
        default = "default_true",
        skip_serializing_if = "is_true"
    )]
    pub lockfile_enabled: bool,
    #[serde(rename = "@lockfilename", default = "default_lockfile_name")]
    pub lockfile_name: String,
    #[serde(rename = "@prebuiltjson", default = "default_prebuilt_json")]
    pub prebuilt_json: String,
    /// Active fetch attributes; optional projects and packages whose
    /// attributes do not intersect this set are skipped.
    #[serde(
        rename = "@fetchingattrs",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub fetching_attributes: String,
    #[serde(rename = "@analyticsopt", default, skip_serializing_if = "is_false")]
    pub analytics_opt_in: bool,
    /// Comma-separated directory names the full scan never descends into.
    #[serde(
        rename = "@excludedirs",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub exclude_dirs: String,
    /// External binary-package tool invoked with an ensure-file.
    #[serde(rename = "@packagetool", default = "default_package_tool")]
    pub package_tool: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            cache_path: String::new(),
            partial_clone: false,
            dissociate: false,
            enable_submodules: String::new(),
            force_disable_submodules: false,
            lockfile_enabled: true,
            lockfile_name: default_lockfile_name(),
            prebuilt_json: default_prebuilt_json(),
            fetching_attributes: String::new(),
            analytics_opt_in: false,
            exclude_dirs: String::new(),
            package_tool: default_package_tool(),
        }
    }
}

impl WorkspaceConfig {
    pub fn parse(content: &str) -> Result<Self> {
        quick_xml::de::from_str(content)
            .map_err(|e| Error::Config(format!("malformed workspace config: {e}")))
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut body = String::new();
        let ser = quick_xml::se::Serializer::with_root(&mut body, Some("config"))
            .map_err(|e| Error::Config(format!("cannot serialize config: {e}")))?;
        self.serialize(ser)
            .map_err(|e| Error::Config(format!("cannot serialize config: {e}")))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
    }

    /// Whether submodule handling is on, after the migration knobs.
    /// "yes-please" is the historical magic value still accepted for tests.
    pub fn submodules_enabled(&self) -> bool {
        if self.force_disable_submodules {
            return false;
        }
        matches!(self.enable_submodules.as_str(), "true" | "yes-please")
    }

    pub fn active_attributes(&self) -> AttributeSet {
        AttributeSet::parse(&self.fetching_attributes)
    }

    pub fn exclude_dir_names(&self) -> Vec<String> {
        self.exclude_dirs
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// Handle to an initialized workspace rooted at a directory containing
/// `<meta>/`.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config: WorkspaceConfig,
    jobs: usize,
    attempts: u32,
    failures: Arc<AtomicU32>,
    cancel: Arc<AtomicBool>,
}

impl Workspace {
    /// Create a fresh workspace at `root`, writing the metadata directory and
    /// a default config. Fails if one already exists.
    pub fn init(root: &Path) -> Result<Self> {
        let meta = root.join(META_DIR);
        if meta.exists() {
            return Err(Error::Usage(format!(
                "{} already contains a workspace",
                root.display()
            )));
        }
        std::fs::create_dir_all(meta.join("bin"))?;
        std::fs::create_dir_all(meta.join("swap"))?;
        std::fs::create_dir_all(meta.join("scripts"))?;
        std::fs::create_dir_all(meta.join("update-history"))?;
        let config = WorkspaceConfig::default();
        fsops::safe_write(&meta.join("config"), config.to_xml()?.as_bytes())?;
        Self::load(root)
    }

    /// Open the workspace at exactly `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|e| Error::NotFound(format!("workspace root {}: {e}", root.display())))?;
        let config_path = root.join(META_DIR).join("config");
        let config = match std::fs::read_to_string(&config_path) {
            Ok(content) => WorkspaceConfig::parse(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => WorkspaceConfig::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            root,
            config,
            jobs: default_jobs(),
            attempts: 3,
            failures: Arc::new(AtomicU32::new(0)),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Walk upward from `start` looking for a directory containing `<meta>/`.
    pub fn find(start: &Path) -> Result<Self> {
        let mut current = start
            .canonicalize()
            .map_err(|e| Error::NotFound(format!("{}: {e}", start.display())))?;
        loop {
            if current.join(META_DIR).is_dir() {
                return Self::load(&current);
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => {
                    return Err(Error::NotFound(format!(
                        "no {META_DIR} directory above {}",
                        start.display()
                    )));
                }
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.meta_dir().join("bin")
    }

    pub fn swap_dir(&self) -> PathBuf {
        self.meta_dir().join("swap")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.meta_dir().join("scripts")
    }

    pub fn update_history_dir(&self) -> PathBuf {
        self.meta_dir().join("update-history")
    }

    pub fn history_log_path(&self) -> PathBuf {
        self.meta_dir().join("update-history-log")
    }

    pub fn config_path(&self) -> PathBuf {
        self.meta_dir().join("config")
    }

    pub fn root_manifest_path(&self) -> PathBuf {
        self.root.join(ROOT_MANIFEST)
    }

    /// The index of managed project paths the fast scan trusts.
    pub fn project_index_path(&self) -> PathBuf {
        self.meta_dir().join("projects.json")
    }

    /// Resolved object-cache directory, if caching is configured.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if self.config.cache_path.is_empty() {
            return None;
        }
        let path = PathBuf::from(&self.config.cache_path);
        Some(if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        })
    }

    /// Absolute lockfile path next to the root manifest, when enabled.
    pub fn lockfile_path(&self) -> Option<PathBuf> {
        self.config
            .lockfile_enabled
            .then(|| self.root.join(&self.config.lockfile_name))
    }

    pub fn save_config(&self, config: &WorkspaceConfig) -> Result<()> {
        fsops::safe_write(&self.config_path(), config.to_xml()?.as_bytes())
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn set_jobs(&mut self, jobs: usize) {
        self.jobs = jobs.clamp(1, MAX_JOBS);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn set_attempts(&mut self, attempts: u32) {
        self.attempts = attempts.max(1);
    }

    // Run-wide counters, shared across clones.

    pub fn count_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// PATH for child processes: the workspace bin dir first, unless
    /// `PRESERVE_PATH` is set non-empty.
    pub fn child_path_env(&self) -> String {
        let inherited = std::env::var("PATH").unwrap_or_default();
        let preserve = std::env::var("PRESERVE_PATH")
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        if preserve {
            return inherited;
        }
        let bin = self.bin_dir();
        if inherited.is_empty() {
            bin.display().to_string()
        } else {
            format!("{}:{inherited}", bin.display())
        }
    }

    /// Read the managed-project path index; empty when absent.
    pub fn read_project_index(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(self.project_index_path()) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("malformed project index: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_project_index(&self, mut paths: Vec<String>) -> Result<()> {
        paths.sort();
        let content = serde_json::to_string_pretty(&paths)
            .map_err(|e| Error::Config(format!("cannot serialize project index: {e}")))?;
        fsops::safe_write(&self.project_index_path(), content.as_bytes())
    }
}

/// Default worker pool size: `min(2 x CPUs, 50)`.
pub fn default_jobs() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (2 * cpus).min(MAX_JOBS)
}
