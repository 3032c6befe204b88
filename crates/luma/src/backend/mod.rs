//! The optional backend behind the `ast -> proto -> bytecode` stages.
//!
//! A pipeline holds a [`LazyBackend`]. Nothing is loaded until a conversion
//! first needs the backend; the outcome of that one attempt, success or
//! failure, is kept for the lifetime of the pipeline.

mod dylib;
#[cfg(feature = "native-backend")]
mod native;

pub use dylib::{BACKEND_PATH_ENV, DylibBackend, DylibLoader, library_name};
#[cfg(feature = "native-backend")]
pub use native::NativeBackend;

use crate::error::{Error, Result};
use crate::proto::Proto;
use luma_syntax::Block;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Failure reported by a backend while compiling or assembling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A compiler from trees to prototypes and from prototypes to binary form.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Compile the main chunk `block`, named `source` in diagnostics.
    fn compile(&self, block: &Block, source: &str) -> std::result::Result<Proto, BackendError>;

    fn assemble(&self, proto: &Proto) -> std::result::Result<Vec<u8>, BackendError>;
}

/// Something that can produce a backend on demand.
pub trait BackendLoader: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    fn load(&self) -> std::result::Result<Arc<dyn Backend>, String>;
}

enum Source {
    Unavailable(String),
    Ready(Arc<dyn Backend>),
    Lazy(Box<dyn BackendLoader>),
}

/// A backend that is resolved at most once.
pub struct LazyBackend {
    source: Source,
    state: OnceLock<std::result::Result<Arc<dyn Backend>, String>>,
}

impl LazyBackend {
    /// No backend; every request fails with `reason`.
    pub fn none(reason: impl Into<String>) -> Self {
        Self::from_source(Source::Unavailable(reason.into()))
    }

    /// An already constructed backend.
    pub fn ready(backend: Arc<dyn Backend>) -> Self {
        Self::from_source(Source::Ready(backend))
    }

    /// A backend loaded on first use.
    pub fn lazy(loader: impl BackendLoader + 'static) -> Self {
        Self::from_source(Source::Lazy(Box::new(loader)))
    }

    fn from_source(source: Source) -> Self {
        Self {
            source,
            state: OnceLock::new(),
        }
    }

    /// The native backend when compiled in, otherwise a shared library from
    /// the default search paths.
    pub fn default_for_features() -> Self {
        #[cfg(feature = "native-backend")]
        {
            Self::ready(Arc::new(NativeBackend))
        }
        #[cfg(not(feature = "native-backend"))]
        {
            Self::lazy(DylibLoader::new(Vec::new()))
        }
    }

    /// The backend, loading it on the first call.
    pub fn get(&self) -> Result<Arc<dyn Backend>> {
        self.state
            .get_or_init(|| self.resolve())
            .clone()
            .map_err(|reason| Error::BackendUnavailable { reason })
    }

    fn resolve(&self) -> std::result::Result<Arc<dyn Backend>, String> {
        match &self.source {
            Source::Unavailable(reason) => Err(reason.clone()),
            Source::Ready(backend) => Ok(Arc::clone(backend)),
            Source::Lazy(loader) => {
                let description = loader.describe();
                let loaded = loader.load();
                match &loaded {
                    Ok(backend) => info!(backend = backend.name(), from = %description, "backend loaded"),
                    Err(reason) => warn!(from = %description, %reason, "backend unavailable"),
                }
                loaded
            }
        }
    }

    /// Whether a backend can be used. Forces the load.
    pub fn is_available(&self) -> bool {
        self.get().is_ok()
    }

    /// Whether a backend has been loaded successfully. Never forces the load.
    pub fn is_loaded(&self) -> bool {
        matches!(self.state.get(), Some(Ok(_)))
    }
}

impl Default for LazyBackend {
    fn default() -> Self {
        Self::default_for_features()
    }
}

impl fmt::Debug for LazyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Unavailable(reason) => format!("none ({reason})"),
            Source::Ready(backend) => backend.name().to_string(),
            Source::Lazy(loader) => loader.describe(),
        };
        let state = match self.state.get() {
            None => "pending",
            Some(Ok(_)) => "loaded",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("LazyBackend")
            .field("source", &source)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing(Arc<AtomicUsize>);

    impl BackendLoader for Failing {
        fn describe(&self) -> String {
            "failing loader".to_string()
        }

        fn load(&self) -> std::result::Result<Arc<dyn Backend>, String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err("nothing here".to_string())
        }
    }

    #[test]
    fn test_failed_load_is_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let backend = LazyBackend::lazy(Failing(Arc::clone(&attempts)));
        assert!(!backend.is_loaded());
        for _ in 0..3 {
            let err = backend.get().err().unwrap();
            assert!(matches!(err, Error::BackendUnavailable { ref reason } if reason == "nothing here"));
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(!backend.is_loaded());
    }

    #[test]
    fn test_none_reports_reason() {
        let backend = LazyBackend::none("disabled");
        assert!(!backend.is_available());
        assert_eq!(
            backend.get().err().unwrap().to_string(),
            "backend unavailable: disabled"
        );
    }

    #[cfg(feature = "native-backend")]
    #[test]
    fn test_ready_is_loaded_after_first_use() {
        let backend = LazyBackend::ready(Arc::new(NativeBackend));
        assert!(!backend.is_loaded());
        assert_eq!(backend.get().unwrap().name(), "native");
        assert!(backend.is_loaded());
    }

    #[test]
    fn test_debug_shows_state() {
        let backend = LazyBackend::none("off");
        backend.get().err();
        let debug = format!("{backend:?}");
        assert!(debug.contains("none (off)"));
        assert!(debug.contains("failed"));
    }
}
