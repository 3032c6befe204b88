//! Configuration for luma.
//!
//! Loads config from:
//! 1. Global: ~/.config/luma/config.toml
//! 2. Per-project: .luma/config.toml (overrides global)
//!
//! Example config.toml:
//! ```toml
//! [render]
//! indent = "    "
//!
//! [backend]
//! kind = "dylib"
//! search_paths = ["/opt/luma/backends"]
//! ```

use crate::backend::{DylibLoader, LazyBackend};
use luma_syntax::output::DEFAULT_INDENT;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Where the `ast -> proto -> bytecode` backend comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process backend (requires the `native-backend` feature).
    Native,
    /// Shared library found on the search paths.
    Dylib,
    /// No backend; the backend stages report `BackendUnavailable`.
    None,
}

/// Regenerator configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RenderConfig {
    /// Indentation unit. Defaults to three spaces.
    pub indent: Option<String>,
}

/// Backend configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: Option<BackendKind>,
    /// Extra directories searched for the backend library.
    pub search_paths: Vec<PathBuf>,
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LumaConfig {
    pub render: RenderConfig,
    pub backend: BackendConfig,
}

impl LumaConfig {
    /// Load configuration for a project.
    ///
    /// Loads global config from ~/.config/luma/config.toml,
    /// then merges with per-project config from .luma/config.toml.
    pub fn load(root: &Path) -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::load_file(&global_path) {
                config = config.merge(global);
            }
        }

        let project_path = root.join(".luma").join("config.toml");
        if let Some(project) = Self::load_file(&project_path) {
            config = config.merge(project);
        }

        config
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn global_config_path() -> Option<PathBuf> {
        let config_home = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))?;
        Some(config_home.join("luma").join("config.toml"))
    }

    /// Load config from a file path. Missing files are skipped silently.
    fn load_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::from_toml(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring invalid config file");
                None
            }
        }
    }

    /// Merge another config into this one. Fields set in `other` win.
    fn merge(self, other: Self) -> Self {
        Self {
            render: RenderConfig {
                indent: other.render.indent.or(self.render.indent),
            },
            backend: BackendConfig {
                kind: other.backend.kind.or(self.backend.kind),
                search_paths: if other.backend.search_paths.is_empty() {
                    self.backend.search_paths
                } else {
                    other.backend.search_paths
                },
            },
        }
    }

    pub fn indent(&self) -> &str {
        self.render.indent.as_deref().unwrap_or(DEFAULT_INDENT)
    }

    /// The configured backend kind, or the default for the enabled features.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind.unwrap_or(if cfg!(feature = "native-backend") {
            BackendKind::Native
        } else {
            BackendKind::Dylib
        })
    }

    /// A fresh, not yet loaded backend as configured.
    pub fn lazy_backend(&self) -> LazyBackend {
        match self.backend_kind() {
            BackendKind::Native => native_backend(),
            BackendKind::Dylib => {
                LazyBackend::lazy(DylibLoader::new(self.backend.search_paths.clone()))
            }
            BackendKind::None => LazyBackend::none("backend disabled by configuration"),
        }
    }
}

#[cfg(feature = "native-backend")]
fn native_backend() -> LazyBackend {
    LazyBackend::ready(std::sync::Arc::new(crate::backend::NativeBackend))
}

#[cfg(not(feature = "native-backend"))]
fn native_backend() -> LazyBackend {
    LazyBackend::none("native backend not compiled in (enable the `native-backend` feature)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_project_config(dir: &TempDir, text: &str) {
        let luma_dir = dir.path().join(".luma");
        std::fs::create_dir_all(&luma_dir).unwrap();
        let mut file = std::fs::File::create(luma_dir.join("config.toml")).unwrap();
        writeln!(file, "{text}").unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = LumaConfig::default();
        assert_eq!(config.indent(), "   ");
        assert!(config.backend.search_paths.is_empty());
    }

    #[test]
    fn test_load_project_config() {
        let dir = TempDir::new().unwrap();
        write_project_config(
            &dir,
            r#"
[render]
indent = "\t"

[backend]
kind = "none"
"#,
        );

        let config = LumaConfig::load(dir.path());
        assert_eq!(config.indent(), "\t");
        assert_eq!(config.backend_kind(), BackendKind::None);
        assert!(!config.lazy_backend().is_available());
    }

    #[test]
    fn test_invalid_config_is_ignored() {
        let dir = TempDir::new().unwrap();
        write_project_config(&dir, "[backend]\nkind = \"jit\"");
        let project = LumaConfig::load_file(&dir.path().join(".luma/config.toml"));
        assert!(project.is_none());
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let global = LumaConfig::from_toml(
            r#"
[render]
indent = "  "

[backend]
search_paths = ["/opt/luma"]
"#,
        )
        .unwrap();
        let project = LumaConfig::from_toml("[backend]\nkind = \"dylib\"").unwrap();

        let config = LumaConfig::default().merge(global).merge(project);
        assert_eq!(config.indent(), "  ");
        assert_eq!(config.backend_kind(), BackendKind::Dylib);
        assert_eq!(config.backend.search_paths, vec![PathBuf::from("/opt/luma")]);
    }

    #[test]
    fn test_dylib_backend_is_lazy() {
        let config = LumaConfig::from_toml("[backend]\nkind = \"dylib\"").unwrap();
        let backend = config.lazy_backend();
        assert!(!backend.is_loaded());
    }
}
