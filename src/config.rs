//! Configuration loaded from `relaunch.yaml` and overridden from the command line

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::BuildSpec;

/// Config file looked up in the working directory when `--config` is not given
pub const CONFIG_FILE: &str = "relaunch.yaml";

/// Everything needed to start a watch session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory to watch for changes
    pub path: PathBuf,

    /// Directory to build from, defaults to `path`
    pub build: Option<PathBuf>,

    /// Name of the generated binary, relative to the working directory
    pub bin: String,

    /// Directories, relative to the working directory, whose changes are
    /// ignored. Matched by whole path components, so `vendor` does not
    /// cover `vendored`.
    pub exclude_dirs: Vec<PathBuf>,

    /// React to every file instead of source files only
    pub all: bool,

    /// Extra compiler arguments, split like a shell would
    pub build_args: String,

    /// Prefix printed in front of every log line
    pub log_prefix: String,

    /// Compiler executable, invoked as `<compiler> build -o <bin> ... <build>`
    pub compiler: String,

    /// Source file extension, without the dot
    pub extension: String,

    /// Recursive file-event tool, optional at runtime
    pub native_watcher: String,

    /// Quiet period before a burst of changes triggers a rebuild
    pub debounce_ms: u64,

    /// Arguments passed to the supervised binary
    pub run_args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            build: None,
            bin: ".relaunch".to_string(),
            exclude_dirs: Vec::new(),
            all: false,
            build_args: String::new(),
            log_prefix: "relaunch".to_string(),
            compiler: "go".to_string(),
            extension: "go".to_string(),
            native_watcher: "fswatch".to_string(),
            debounce_ms: 100,
            run_args: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration for a session started in `wd`.
    ///
    /// An explicit file must exist. Without one, `relaunch.yaml` is used when
    /// present and the defaults otherwise.
    pub fn load(wd: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => wd.join(path),
            None => {
                let path = wd.join(CONFIG_FILE);
                if !path.exists() {
                    debug!("No {} found, using defaults", CONFIG_FILE);
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| Error::ConfigParse { path, source })
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not to a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Directory handed to the compiler
    pub fn build_path(&self) -> &Path {
        self.build.as_deref().unwrap_or(&self.path)
    }

    /// Binary file name, with the platform executable suffix
    pub fn binary_name(&self) -> String {
        let mut bin = if self.bin.is_empty() {
            "bin".to_string()
        } else {
            self.bin.clone()
        };
        if cfg!(windows) && !bin.ends_with(".exe") {
            bin.push_str(".exe");
        }
        bin
    }

    pub fn binary_path(&self, wd: &Path) -> PathBuf {
        wd.join(self.binary_name())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn extra_build_args(&self) -> Result<Vec<String>> {
        shell_words::split(&self.build_args).map_err(|source| Error::BuildArgs {
            args: self.build_args.clone(),
            source,
        })
    }

    /// Derive the build description for a session rooted at `wd`
    pub fn build_spec(&self, wd: &Path) -> Result<BuildSpec> {
        let build = self.build_path();
        let source = if build.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            wd.join(build)
        };

        Ok(BuildSpec {
            source,
            output: self.binary_path(wd),
            extra_args: self.extra_build_args()?,
        })
    }
}
