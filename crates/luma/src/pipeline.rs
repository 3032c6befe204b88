//! The stage graph: adjacent-stage converters and their compositions.
//!
//! Every forward conversion `from -> to` is composed once, when the pipeline
//! is built, from the atomic converters between the two stages. Conversions
//! that are not part of the forward chain (`ast_to_src`, `function_to_bytecode`)
//! are registered standalone and can only be reached by name.

use crate::backend::LazyBackend;
use crate::config::LumaConfig;
use crate::convert::{
    Artifact, Assemble, Compile, Context, Converter, Dump, Load, Parse, ReadFile, Render,
    Tokenize, shape_mismatch,
};
use crate::error::{Error, Result};
use crate::stage::{Stage, conversion_name};
use luma_syntax::output::DEFAULT_INDENT;
use luma_syntax::{LuaWriter, Term};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

type Chain = Vec<Arc<dyn Converter>>;

/// Converts artifacts between any two stages.
pub struct Pipeline {
    chains: HashMap<(Stage, Stage), Chain>,
    names: HashMap<String, (Stage, Stage)>,
    standalone: BTreeMap<String, Arc<dyn Converter>>,
    context: Context,
}

impl Pipeline {
    /// Built-in converters with the default backend for the enabled features.
    pub fn new() -> Self {
        compose(builtin_links(), builtin_standalone(), Context::default())
    }

    /// Built-in converters with the configured indentation and backend.
    pub fn from_config(config: &LumaConfig) -> Self {
        let context = Context::new(config.lazy_backend(), config.indent());
        compose(builtin_links(), builtin_standalone(), context)
    }

    /// A builder preloaded with the built-in converters.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder {
            atomic: builtin_links(),
            standalone: builtin_standalone(),
            ..PipelineBuilder::empty()
        }
    }

    /// Convert `artifact` from stage `from` to the later stage `to`.
    #[instrument(level = "debug", skip_all, fields(from = %from, to = %to))]
    pub fn convert(&self, from: Stage, to: Stage, artifact: Artifact) -> Result<Artifact> {
        if to <= from {
            return Err(Error::StageOrder { from, to });
        }
        let chain = self
            .chains
            .get(&(from, to))
            .ok_or(Error::MissingConverter { from, to })?;
        self.run(chain, artifact)
    }

    /// Run a conversion by its registered name, standalone ones included.
    pub fn convert_named(&self, name: &str, artifact: Artifact) -> Result<Artifact> {
        if let Some(&(from, to)) = self.names.get(name) {
            return self.convert(from, to, artifact);
        }
        match self.standalone.get(name) {
            Some(converter) => self.run(std::slice::from_ref(converter), artifact),
            None => Err(Error::UnknownConversion(name.to_string())),
        }
    }

    fn run(&self, chain: &[Arc<dyn Converter>], mut artifact: Artifact) -> Result<Artifact> {
        if let Some(first) = chain.first() {
            if artifact.stage() != first.source() {
                return Err(shape_mismatch(first.as_ref(), &artifact.payload));
            }
        }
        if chain.iter().any(|c| c.needs_backend()) {
            self.context.backend.get()?;
        }
        for converter in chain {
            debug!(
                name = %converter.name(),
                from = %converter.source(),
                to = %converter.target(),
                "conversion step"
            );
            artifact = converter.convert(artifact, &self.context)?;
        }
        Ok(artifact)
    }

    /// The atomic converters a forward conversion runs, in order.
    pub fn chain(&self, from: Stage, to: Stage) -> Option<&[Arc<dyn Converter>]> {
        self.chains.get(&(from, to)).map(Vec::as_slice)
    }

    /// Every conversion name this pipeline answers to, sorted.
    pub fn conversions(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .names
            .keys()
            .chain(self.standalone.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Whether the backend stages can run. Forces the backend load.
    pub fn backend_available(&self) -> bool {
        self.context.backend.is_available()
    }

    /// Regenerate source text with the configured indentation.
    pub fn render(&self, block: &[Term]) -> Result<String> {
        Ok(LuaWriter::with_indent(self.context.indent.as_str()).render(block)?)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("conversions", &self.conversions())
            .field("context", &self.context)
            .finish()
    }
}

/// Collects converters and settings for a [`Pipeline`].
pub struct PipelineBuilder {
    atomic: Vec<Arc<dyn Converter>>,
    standalone: BTreeMap<String, Arc<dyn Converter>>,
    backend: Option<LazyBackend>,
    indent: Option<String>,
}

impl PipelineBuilder {
    /// A builder with no converters at all.
    pub fn empty() -> Self {
        Self {
            atomic: Vec::new(),
            standalone: BTreeMap::new(),
            backend: None,
            indent: None,
        }
    }

    /// Register an adjacent-stage converter, replacing any earlier one with
    /// the same source stage.
    pub fn converter(mut self, converter: impl Converter + 'static) -> Self {
        self.atomic.push(Arc::new(converter));
        self
    }

    /// Register a converter reachable only by name.
    pub fn standalone(mut self, converter: impl Converter + 'static) -> Self {
        self.standalone.insert(converter.name(), Arc::new(converter));
        self
    }

    pub fn backend(mut self, backend: LazyBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = Some(indent.into());
        self
    }

    /// Compose every forward conversion. Fails on a non-adjacent converter or
    /// a gap in the stage chain.
    pub fn build(self) -> Result<Pipeline> {
        let mut by_source: HashMap<Stage, Arc<dyn Converter>> = HashMap::new();
        for converter in self.atomic {
            let (from, to) = (converter.source(), converter.target());
            if from.next() != Some(to) {
                return Err(Error::NonAdjacent {
                    converter: converter.name(),
                    from,
                    to,
                });
            }
            by_source.insert(from, converter);
        }

        let mut links = Vec::with_capacity(Stage::ALL.len() - 1);
        for pair in Stage::ALL.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let link = by_source
                .remove(&from)
                .ok_or(Error::MissingConverter { from, to })?;
            links.push(link);
        }

        let context = Context::new(
            self.backend.unwrap_or_default(),
            self.indent.unwrap_or_else(|| DEFAULT_INDENT.to_string()),
        );
        Ok(compose(links, self.standalone, context))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Pipeline::builder()
    }
}

/// `links[i]` converts `Stage::ALL[i]` to `Stage::ALL[i + 1]`.
fn compose(
    links: Vec<Arc<dyn Converter>>,
    standalone: BTreeMap<String, Arc<dyn Converter>>,
    context: Context,
) -> Pipeline {
    let mut chains = HashMap::new();
    let mut names = HashMap::new();
    for (i, &from) in Stage::ALL.iter().enumerate() {
        for (j, &to) in Stage::ALL.iter().enumerate().skip(i + 1) {
            let chain: Chain = links[i..j].to_vec();
            let name = conversion_name(from, to);
            trace!(%name, steps = chain.len(), "composed conversion");
            names.insert(name, (from, to));
            chains.insert((from, to), chain);
        }
    }
    Pipeline {
        chains,
        names,
        standalone,
        context,
    }
}

fn builtin_links() -> Vec<Arc<dyn Converter>> {
    let links: [Arc<dyn Converter>; 6] = [
        Arc::new(ReadFile),
        Arc::new(Tokenize),
        Arc::new(Parse),
        Arc::new(Compile),
        Arc::new(Assemble),
        Arc::new(Load),
    ];
    links.into()
}

fn builtin_standalone() -> BTreeMap<String, Arc<dyn Converter>> {
    let converters: [Arc<dyn Converter>; 2] = [Arc::new(Render), Arc::new(Dump)];
    converters.into_iter().map(|c| (c.name(), c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_forward_pair_is_composed() {
        let pipeline = Pipeline::new();
        for (i, &from) in Stage::ALL.iter().enumerate() {
            for &to in &Stage::ALL[i + 1..] {
                let chain = pipeline.chain(from, to).unwrap();
                assert_eq!(chain.len(), to.index() - from.index());
                assert_eq!(chain[0].source(), from);
                assert_eq!(chain[chain.len() - 1].target(), to);
            }
        }
        assert!(pipeline.chain(Stage::Ast, Stage::Src).is_none());
    }

    #[test]
    fn test_conversion_names() {
        let names = Pipeline::new().conversions();
        // 21 forward pairs plus the two standalone conversions
        assert_eq!(names.len(), 23);
        assert!(names.contains(&"src_to_ast".to_string()));
        assert!(names.contains(&"ast_to_src".to_string()));
        assert!(names.contains(&"function_to_bytecode".to_string()));
        assert!(!names.contains(&"src_to_src".to_string()));
    }

    #[test]
    fn test_stage_order_rejected() {
        let err = Pipeline::new()
            .convert(Stage::Ast, Stage::Src, Artifact::source("x = 1"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StageOrder {
                from: Stage::Ast,
                to: Stage::Src
            }
        ));
        let err = Pipeline::new()
            .convert(Stage::Src, Stage::Src, Artifact::source("x = 1"))
            .unwrap_err();
        assert!(matches!(err, Error::StageOrder { .. }));
    }

    #[test]
    fn test_shape_checked_before_backend() {
        let pipeline = Pipeline::builder()
            .backend(LazyBackend::none("off"))
            .build()
            .unwrap();
        let err = pipeline
            .convert(Stage::Ast, Stage::Bytecode, Artifact::source("x = 1"))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert!(!pipeline.context().backend.is_loaded());
    }

    #[test]
    fn test_gap_in_chain() {
        let err = PipelineBuilder::empty()
            .converter(ReadFile)
            .converter(Tokenize)
            .converter(Parse)
            .converter(Assemble)
            .converter(Load)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingConverter {
                from: Stage::Ast,
                to: Stage::Proto
            }
        ));
    }

    #[test]
    fn test_non_adjacent_converter_rejected() {
        let err = Pipeline::builder().converter(Render).build().unwrap_err();
        assert!(matches!(err, Error::NonAdjacent { ref converter, .. } if converter == "ast_to_src"));
    }

    #[test]
    fn test_pipeline_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
    }
}
