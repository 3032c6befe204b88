//! Backends loaded from shared libraries (.so/.dylib/.dll).
//!
//! # ABI
//!
//! A backend library exports three C functions:
//!
//! ```text
//! int32_t luma_backend_compile(const uint8_t *input, size_t input_len,
//!                              uint8_t **output, size_t *output_len);
//! int32_t luma_backend_assemble(const uint8_t *input, size_t input_len,
//!                               uint8_t **output, size_t *output_len);
//! void    luma_backend_free(uint8_t *output, size_t output_len);
//! ```
//!
//! `compile` takes the JSON object `{ "source": <name>, "block": <tree> }` and
//! returns a JSON prototype. `assemble` takes a JSON prototype and returns the
//! binary chunk. A zero return means success; otherwise the output buffer
//! holds a UTF-8 error message. Every output buffer is handed back through
//! `luma_backend_free`.
//!
//! # Lifetime
//!
//! The function pointers point into the loaded library, so [`DylibBackend`]
//! keeps the `Library` alive for as long as it exists.

use super::{Backend, BackendError, BackendLoader};
use crate::proto::Proto;
use libloading::{Library, Symbol};
use luma_syntax::Block;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable with extra search paths (colon-separated).
pub const BACKEND_PATH_ENV: &str = "LUMA_BACKEND_PATH";

const COMPILE_SYMBOL: &[u8] = b"luma_backend_compile";
const ASSEMBLE_SYMBOL: &[u8] = b"luma_backend_assemble";
const FREE_SYMBOL: &[u8] = b"luma_backend_free";

type ConvertFn = unsafe extern "C" fn(*const u8, usize, *mut *mut u8, *mut usize) -> i32;
type FreeFn = unsafe extern "C" fn(*mut u8, usize);

/// Finds and loads the backend library.
#[derive(Debug, Clone)]
pub struct DylibLoader {
    search_paths: Vec<PathBuf>,
}

impl DylibLoader {
    /// Loader with the default search paths followed by `configured`.
    ///
    /// Search order:
    /// 1. `LUMA_BACKEND_PATH` environment variable (colon-separated)
    /// 2. `~/.config/luma/backends/`
    /// 3. `configured`
    pub fn new(configured: Vec<PathBuf>) -> Self {
        let mut paths = Vec::new();

        if let Ok(env_path) = std::env::var(BACKEND_PATH_ENV) {
            for p in env_path.split(':') {
                if !p.is_empty() {
                    paths.push(PathBuf::from(p));
                }
            }
        }

        if let Some(config) = dirs::config_dir() {
            paths.push(config.join("luma/backends"));
        }

        paths.extend(configured);
        Self {
            search_paths: paths,
        }
    }

    /// Loader with exactly these search paths.
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths: paths,
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// First search path holding the backend library.
    pub fn find(&self) -> Option<PathBuf> {
        let name = library_name();
        self.search_paths
            .iter()
            .map(|dir| dir.join(&name))
            .find(|path| path.exists())
    }
}

impl BackendLoader for DylibLoader {
    fn describe(&self) -> String {
        format!("{} in {} search path(s)", library_name(), self.search_paths.len())
    }

    fn load(&self) -> Result<Arc<dyn Backend>, String> {
        let Some(path) = self.find() else {
            let searched: Vec<_> = self
                .search_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            return Err(format!(
                "{} not found (searched: {})",
                library_name(),
                if searched.is_empty() {
                    "nothing".to_string()
                } else {
                    searched.join(", ")
                }
            ));
        };
        let backend = DylibBackend::open(&path)?;
        Ok(Arc::new(backend))
    }
}

/// A backend living in a shared library.
pub struct DylibBackend {
    compile: ConvertFn,
    assemble: ConvertFn,
    free: FreeFn,
    /// Backing shared library; must outlive the function pointers above.
    _library: Library,
}

#[derive(Serialize)]
struct CompileRequest<'a> {
    source: &'a str,
    block: &'a Block,
}

impl DylibBackend {
    pub fn open(path: &Path) -> Result<Self, String> {
        // SAFETY: Loading a shared library runs its initializers. Backends come
        // from search paths the user configured.
        let library = unsafe { Library::new(path) }
            .map_err(|e| format!("cannot load {}: {e}", path.display()))?;

        // SAFETY: The symbols are declared with the signatures of the backend
        // ABI above. The copied function pointers stay valid while `library`
        // is loaded, and it is stored next to them.
        let (compile, assemble, free) = unsafe {
            let compile: Symbol<ConvertFn> = library
                .get(COMPILE_SYMBOL)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            let assemble: Symbol<ConvertFn> = library
                .get(ASSEMBLE_SYMBOL)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            let free: Symbol<FreeFn> = library
                .get(FREE_SYMBOL)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            (*compile, *assemble, *free)
        };

        Ok(Self {
            compile,
            assemble,
            free,
            _library: library,
        })
    }

    fn call(&self, function: ConvertFn, input: &[u8]) -> Result<Vec<u8>, BackendError> {
        let mut output: *mut u8 = std::ptr::null_mut();
        let mut output_len: usize = 0;
        // SAFETY: `input` is valid for `input.len()` bytes during the call and
        // both out-pointers refer to live locals.
        let status = unsafe { function(input.as_ptr(), input.len(), &mut output, &mut output_len) };
        let bytes = if output.is_null() {
            Vec::new()
        } else {
            // SAFETY: The backend wrote `output_len` initialized bytes at
            // `output`; they stay valid until the buffer is freed below.
            let bytes = unsafe { std::slice::from_raw_parts(output, output_len) }.to_vec();
            // SAFETY: The buffer came from this backend and is released once.
            unsafe { (self.free)(output, output_len) };
            bytes
        };
        if status == 0 {
            Ok(bytes)
        } else {
            Err(BackendError::new(String::from_utf8_lossy(&bytes).into_owned()))
        }
    }
}

impl Backend for DylibBackend {
    fn name(&self) -> &str {
        "dylib"
    }

    fn compile(&self, block: &Block, source: &str) -> Result<Proto, BackendError> {
        let request = serde_json::to_vec(&CompileRequest { source, block })
            .map_err(|e| BackendError::new(format!("cannot encode tree: {e}")))?;
        let response = self.call(self.compile, &request)?;
        serde_json::from_slice(&response)
            .map_err(|e| BackendError::new(format!("backend returned an invalid prototype: {e}")))
    }

    fn assemble(&self, proto: &Proto) -> Result<Vec<u8>, BackendError> {
        let request = serde_json::to_vec(proto)
            .map_err(|e| BackendError::new(format!("cannot encode prototype: {e}")))?;
        self.call(self.assemble, &request)
    }
}

/// File name of the backend library on this platform.
pub fn library_name() -> String {
    if cfg!(target_os = "macos") {
        "libluma_backend.dylib".to_string()
    } else if cfg!(target_os = "windows") {
        "luma_backend.dll".to_string()
    } else {
        "libluma_backend.so".to_string()
    }
}
