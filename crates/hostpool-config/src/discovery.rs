//! Finding and layering config files.
//!
//! Two layers are read, lowest precedence first:
//! 1. the user layer, `config.toml` in `HOSTPOOL_CONFIG_DIR` or the platform
//!    config dir (`~/.config/hostpool` on Linux)
//! 2. the project layer, `hostpool.toml` in the project directory
//!
//! A layer that fails to read or validate is reported and skipped, so one bad
//! file never takes the cache down with it.

use std::path::{Path, PathBuf};

use crate::{ConfigError, HostpoolConfig, Result};

const USER_FILE: &str = "config.toml";
const PROJECT_FILE: &str = "hostpool.toml";
const CONFIG_DIR_ENV: &str = "HOSTPOOL_CONFIG_DIR";

/// Which layer a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    User,
    Project,
}

/// What happened to one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    /// Merged into the result.
    Applied,
    /// No file at the path.
    Absent,
    /// Present but unusable; the message says why.
    Rejected(String),
}

/// One candidate file and its outcome.
#[derive(Debug, Clone)]
pub struct LayerReport {
    pub layer: Layer,
    pub path: PathBuf,
    pub status: LayerStatus,
}

/// Merged configuration plus a report per candidate file.
#[derive(Debug, Clone, Default)]
pub struct Discovered {
    pub config: HostpoolConfig,
    pub layers: Vec<LayerReport>,
}

impl Discovered {
    /// Paths that contributed to `config`.
    pub fn applied(&self) -> impl Iterator<Item = &Path> {
        self.layers
            .iter()
            .filter(|r| r.status == LayerStatus::Applied)
            .map(|r| r.path.as_path())
    }

    /// Files that existed but were skipped, with the reason.
    pub fn rejected(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.layers.iter().filter_map(|r| match &r.status {
            LayerStatus::Rejected(reason) => Some((r.path.as_path(), reason.as_str())),
            _ => None,
        })
    }
}

/// Where to look for config files.
///
/// ```rust,ignore
/// let found = Discovery::new().project_dir(repo_root).load();
/// for (path, reason) in found.rejected() {
///     eprintln!("skipped {}: {reason}", path.display());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Discovery {
    user_dir: Option<PathBuf>,
    project_dir: PathBuf,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            user_dir: user_config_dir(),
            project_dir: PathBuf::from("."),
        }
    }
}

impl Discovery {
    /// Look in the default user dir and the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `dir` instead of the environment or platform user dir.
    pub fn user_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_dir = Some(dir.into());
        self
    }

    /// Skip the user layer entirely.
    pub fn without_user_dir(mut self) -> Self {
        self.user_dir = None;
        self
    }

    /// Look for `hostpool.toml` in `dir`.
    pub fn project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    /// Candidate files, lowest precedence first.
    pub fn candidates(&self) -> Vec<(Layer, PathBuf)> {
        let mut out = Vec::with_capacity(2);
        if let Some(dir) = &self.user_dir {
            out.push((Layer::User, dir.join(USER_FILE)));
        }
        out.push((Layer::Project, self.project_dir.join(PROJECT_FILE)));
        out
    }

    /// Read every candidate and merge the usable ones.
    ///
    /// Unusable files show up as [`LayerStatus::Rejected`] in the result.
    pub fn load(&self) -> Discovered {
        let mut found = Discovered::default();
        for (layer, path) in self.candidates() {
            let status = if !path.is_file() {
                LayerStatus::Absent
            } else {
                match read_config(&path) {
                    Ok(config) => {
                        found.config.merge(config);
                        LayerStatus::Applied
                    }
                    Err(e) => LayerStatus::Rejected(e.to_string()),
                }
            };
            found.layers.push(LayerReport {
                layer,
                path,
                status,
            });
        }
        found
    }
}

/// Read and validate one config file.
pub fn read_config(path: &Path) -> Result<HostpoolConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    HostpoolConfig::from_toml(&text)
}

/// The user config directory: `HOSTPOOL_CONFIG_DIR` if set and non-empty,
/// else `<platform config dir>/hostpool`.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join("hostpool")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn discovery(user: &TempDir, project: &TempDir) -> Discovery {
        Discovery::new().user_dir(user.path()).project_dir(project.path())
    }

    #[test]
    fn test_candidates_order() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let layers: Vec<Layer> = discovery(&user, &project)
            .candidates()
            .into_iter()
            .map(|(layer, _)| layer)
            .collect();
        assert_eq!(layers, vec![Layer::User, Layer::Project]);

        let only_project = Discovery::new().without_user_dir().candidates();
        assert_eq!(only_project.len(), 1);
        assert!(only_project[0].1.ends_with("hostpool.toml"));
    }

    #[test]
    fn test_nothing_found_gives_defaults() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        let found = discovery(&user, &project).load();
        assert_eq!(found.config, HostpoolConfig::default());
        assert_eq!(found.applied().count(), 0);
        assert!(found.layers.iter().all(|r| r.status == LayerStatus::Absent));
    }

    #[test]
    fn test_project_overrides_user_per_section() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            "[pool]\nidle_threshold_secs = 30\n\n[logging]\njson = true\n",
        )
        .unwrap();
        fs::write(
            project.path().join("hostpool.toml"),
            "[pool]\nidle_threshold_secs = 5\nsweep_interval_secs = 10\n",
        )
        .unwrap();

        let found = discovery(&user, &project).load();
        assert_eq!(found.applied().count(), 2);
        assert_eq!(found.config.pool().idle_threshold_secs, 5);
        assert_eq!(found.config.pool().sweep_interval_secs, 10);
        assert!(found.config.logging().json);
    }

    #[test]
    fn test_invalid_layer_is_rejected_not_fatal() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(user.path().join("config.toml"), "[http]\ntimeout_secs = 3\n").unwrap();
        fs::write(
            project.path().join("hostpool.toml"),
            "[pool]\nsweep_interval_secs = 0\n",
        )
        .unwrap();

        let found = discovery(&user, &project).load();
        let rejected: Vec<_> = found.rejected().collect();
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].0.ends_with("hostpool.toml"));
        assert!(rejected[0].1.contains("sweep_interval_secs"));
        assert_eq!(found.config.http().timeout_secs, 3);
        assert_eq!(found.config.pool().sweep_interval_secs, 120);
    }

    #[test]
    fn test_read_config_errors() {
        let err = read_config(Path::new("/nonexistent/hostpool.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hostpool.toml");
        fs::write(&path, "not toml {{").unwrap();
        assert!(matches!(read_config(&path).unwrap_err(), ConfigError::Parse(_)));
    }
}
