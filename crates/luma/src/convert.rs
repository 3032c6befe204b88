//! Payloads and the converters between adjacent stages.

use crate::backend::LazyBackend;
use crate::error::{Error, Result};
use crate::proto::Proto;
use crate::stage::{Stage, conversion_name};
use crate::vm::Function;
use luma_syntax::output::DEFAULT_INDENT;
use luma_syntax::{Block, LuaWriter, TokenStream, lex, parse};
use std::path::PathBuf;

/// Diagnostic name given to source text without one.
pub const DEFAULT_SOURCE_NAME: &str = "=(source)";

/// A program in one of its representations.
#[derive(Debug, Clone)]
pub enum Payload {
    Srcfile(PathBuf),
    Src(String),
    Lexstream(TokenStream),
    Ast(Block),
    Proto(Proto),
    Bytecode(Vec<u8>),
    Function(Function),
}

impl Payload {
    pub fn stage(&self) -> Stage {
        match self {
            Payload::Srcfile(_) => Stage::Srcfile,
            Payload::Src(_) => Stage::Src,
            Payload::Lexstream(_) => Stage::Lexstream,
            Payload::Ast(_) => Stage::Ast,
            Payload::Proto(_) => Stage::Proto,
            Payload::Bytecode(_) => Stage::Bytecode,
            Payload::Function(_) => Stage::Function,
        }
    }
}

/// A payload with its optional diagnostic name (`@file.lua`, `=(source)`).
#[derive(Debug, Clone)]
pub struct Artifact {
    pub payload: Payload,
    pub name: Option<String>,
}

impl Artifact {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            name: None,
        }
    }

    pub fn named(payload: Payload, name: impl Into<String>) -> Self {
        Self {
            payload,
            name: Some(name.into()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Payload::Srcfile(path.into()))
    }

    pub fn source(text: impl Into<String>) -> Self {
        Self::new(Payload::Src(text.into()))
    }

    pub fn stage(&self) -> Stage {
        self.payload.stage()
    }

    /// The diagnostic name, or `default` when unnamed.
    pub fn name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(default)
    }

    pub fn as_src(&self) -> Option<&str> {
        match &self.payload {
            Payload::Src(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_ast(&self) -> Option<&Block> {
        match &self.payload {
            Payload::Ast(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_bytecode(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Bytecode(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_function(self) -> Option<Function> {
        match self.payload {
            Payload::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// Shared state the converters of one pipeline read.
#[derive(Debug)]
pub struct Context {
    pub backend: LazyBackend,
    /// Indentation unit for rendering.
    pub indent: String,
}

impl Context {
    pub fn new(backend: LazyBackend, indent: impl Into<String>) -> Self {
        Self {
            backend,
            indent: indent.into(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(LazyBackend::default_for_features(), DEFAULT_INDENT)
    }
}

/// A conversion from one stage to another.
pub trait Converter: Send + Sync {
    fn source(&self) -> Stage;

    fn target(&self) -> Stage;

    fn name(&self) -> String {
        conversion_name(self.source(), self.target())
    }

    /// Whether this converter goes through the backend.
    fn needs_backend(&self) -> bool {
        false
    }

    fn convert(&self, artifact: Artifact, cx: &Context) -> Result<Artifact>;
}

/// The error for a payload at the wrong stage.
pub fn shape_mismatch(converter: &dyn Converter, payload: &Payload) -> Error {
    Error::ShapeMismatch {
        converter: converter.name(),
        expected: converter.source(),
        found: payload.stage(),
    }
}

/// `srcfile -> src`: read a UTF-8 file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadFile;

impl Converter for ReadFile {
    fn source(&self) -> Stage {
        Stage::Srcfile
    }

    fn target(&self) -> Stage {
        Stage::Src
    }

    fn convert(&self, artifact: Artifact, _: &Context) -> Result<Artifact> {
        let Payload::Srcfile(path) = &artifact.payload else {
            return Err(shape_mismatch(self, &artifact.payload));
        };
        let text = std::fs::read_to_string(path).map_err(|source| Error::Resource {
            path: path.clone(),
            source,
        })?;
        let name = artifact
            .name
            .unwrap_or_else(|| format!("@{}", path.display()));
        Ok(Artifact::named(Payload::Src(text), name))
    }
}

/// `src -> lexstream`: tokenize.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenize;

impl Converter for Tokenize {
    fn source(&self) -> Stage {
        Stage::Src
    }

    fn target(&self) -> Stage {
        Stage::Lexstream
    }

    fn convert(&self, artifact: Artifact, _: &Context) -> Result<Artifact> {
        let Payload::Src(text) = &artifact.payload else {
            return Err(shape_mismatch(self, &artifact.payload));
        };
        let name = artifact.name_or(DEFAULT_SOURCE_NAME).to_string();
        let tokens = lex(text).map_err(|source| Error::Syntax {
            name: name.clone(),
            source,
        })?;
        Ok(Artifact::named(Payload::Lexstream(tokens), name))
    }
}

/// `lexstream -> ast`: parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parse;

impl Converter for Parse {
    fn source(&self) -> Stage {
        Stage::Lexstream
    }

    fn target(&self) -> Stage {
        Stage::Ast
    }

    fn convert(&self, artifact: Artifact, _: &Context) -> Result<Artifact> {
        let Payload::Lexstream(tokens) = &artifact.payload else {
            return Err(shape_mismatch(self, &artifact.payload));
        };
        let block = parse(tokens).map_err(|source| Error::Syntax {
            name: artifact.name_or(DEFAULT_SOURCE_NAME).to_string(),
            source,
        })?;
        Ok(Artifact {
            payload: Payload::Ast(block),
            name: artifact.name,
        })
    }
}

/// `ast -> proto`: backend compile.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compile;

impl Converter for Compile {
    fn source(&self) -> Stage {
        Stage::Ast
    }

    fn target(&self) -> Stage {
        Stage::Proto
    }

    fn needs_backend(&self) -> bool {
        true
    }

    fn convert(&self, artifact: Artifact, cx: &Context) -> Result<Artifact> {
        let Payload::Ast(block) = &artifact.payload else {
            return Err(shape_mismatch(self, &artifact.payload));
        };
        let backend = cx.backend.get()?;
        let proto = backend.compile(block, artifact.name_or(DEFAULT_SOURCE_NAME))?;
        Ok(Artifact {
            payload: Payload::Proto(proto),
            name: artifact.name,
        })
    }
}

/// `proto -> bytecode`: backend assemble.
#[derive(Debug, Clone, Copy, Default)]
pub struct Assemble;

impl Converter for Assemble {
    fn source(&self) -> Stage {
        Stage::Proto
    }

    fn target(&self) -> Stage {
        Stage::Bytecode
    }

    fn needs_backend(&self) -> bool {
        true
    }

    fn convert(&self, artifact: Artifact, cx: &Context) -> Result<Artifact> {
        let Payload::Proto(proto) = &artifact.payload else {
            return Err(shape_mismatch(self, &artifact.payload));
        };
        let bytes = cx.backend.get()?.assemble(proto)?;
        Ok(Artifact {
            payload: Payload::Bytecode(bytes),
            name: artifact.name,
        })
    }
}

/// `bytecode -> function`: load a binary chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct Load;

impl Converter for Load {
    fn source(&self) -> Stage {
        Stage::Bytecode
    }

    fn target(&self) -> Stage {
        Stage::Function
    }

    fn convert(&self, artifact: Artifact, _: &Context) -> Result<Artifact> {
        let Payload::Bytecode(bytes) = &artifact.payload else {
            return Err(shape_mismatch(self, &artifact.payload));
        };
        let function = Function::load(bytes)?;
        let name = artifact
            .name
            .unwrap_or_else(|| function.proto().source.clone());
        Ok(Artifact::named(Payload::Function(function), name))
    }
}

/// `ast -> src`: regenerate source text. Standalone.
#[derive(Debug, Clone, Copy, Default)]
pub struct Render;

impl Converter for Render {
    fn source(&self) -> Stage {
        Stage::Ast
    }

    fn target(&self) -> Stage {
        Stage::Src
    }

    fn convert(&self, artifact: Artifact, cx: &Context) -> Result<Artifact> {
        let Payload::Ast(block) = &artifact.payload else {
            return Err(shape_mismatch(self, &artifact.payload));
        };
        let text = LuaWriter::with_indent(cx.indent.as_str()).render(block)?;
        Ok(Artifact {
            payload: Payload::Src(text),
            name: artifact.name,
        })
    }
}

/// `function -> bytecode`: dump a loaded function. Standalone.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dump;

impl Converter for Dump {
    fn source(&self) -> Stage {
        Stage::Function
    }

    fn target(&self) -> Stage {
        Stage::Bytecode
    }

    fn convert(&self, artifact: Artifact, _: &Context) -> Result<Artifact> {
        let Payload::Function(function) = &artifact.payload else {
            return Err(shape_mismatch(self, &artifact.payload));
        };
        let bytes = function.dump()?;
        Ok(Artifact {
            payload: Payload::Bytecode(bytes),
            name: artifact.name,
        })
    }
}
