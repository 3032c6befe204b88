//! Staged Lua toolchain.
//!
//! A program moves through a fixed sequence of representations:
//!
//! ```text
//!  srcfile ─> src ─> lexstream ─> ast ─> proto ─> bytecode ─> function
//!                                  │   └───── backend ─────┘      │
//!              <──── ast_to_src ───┘          <─ function_to_bytecode
//! ```
//!
//! [`Pipeline`] composes every forward conversion from the adjacent-stage
//! converters in [`convert`]. The two backend stages go through a lazily
//! loaded [`Backend`](backend::Backend); the last stage is a callable
//! [`Function`] run by the tree-walking interpreter in [`vm`].
//!
//! # Example
//!
//! ```
//! use luma::{Artifact, Pipeline, Stage};
//!
//! let pipeline = Pipeline::new();
//! let out = pipeline
//!     .convert(Stage::Src, Stage::Function, Artifact::source("return 6 * 7"))
//!     .unwrap();
//! let function = out.into_function().unwrap();
//! assert_eq!(function.call(Vec::new()).unwrap()[0].to_number(), Some(42.0));
//! ```

pub mod backend;
pub mod bytecode;
pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod proto;
pub mod stage;
pub mod vm;

pub use backend::{Backend, BackendError, LazyBackend};
pub use config::LumaConfig;
pub use convert::{Artifact, Context, Converter, Payload};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use proto::Proto;
pub use stage::Stage;
pub use vm::{Function, RuntimeError, Value};
