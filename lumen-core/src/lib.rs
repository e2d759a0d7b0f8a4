pub mod analyzer;
pub mod ast;
pub mod builtins;
pub mod diags;
pub mod error;
pub mod lexer;
pub mod linker;
pub mod parser;
pub mod scope;
pub mod shader;
pub mod syntax;
pub mod types;

#[cfg(test)]
mod analyzer_tests;

#[cfg(test)]
mod linker_tests;

pub use builtins::BaseScope;
pub use error::{CompilerError, Result};
pub use shader::{CompiledShader, OutputDescriptor, UniformDescriptor};
pub use syntax::{Span, Stage};
pub use types::{Type, TypeExported};

use log::debug;

/// Front-end entry point. Holds only the base scope, so one `Compiler` can be
/// shared between threads compiling independent sources.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    base: BaseScope,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            base: BaseScope::standard(),
        }
    }

    /// Use `base` instead of the standard intrinsics as the root bindings.
    pub fn with_base_scope(base: BaseScope) -> Self {
        Compiler { base }
    }

    pub fn base_scope(&self) -> &BaseScope {
        &self.base
    }

    /// Parse, declare and define, leaving the stage blocks unresolved.
    pub fn analyze(&self, source: &str) -> Result<analyzer::Program> {
        // Parse
        let unit = parser::parse(source)?;
        debug!("parsed {} items", unit.items.len());

        // Declare and define
        analyzer::build(&unit, &self.base)
    }

    pub fn compile(&self, source: &str) -> Result<CompiledShader> {
        let program = self.analyze(source)?;

        // Resolve stages and link
        let shader = linker::link(program)?;
        debug!(
            "compiled shader with {} outputs and {} uniforms",
            shader.outputs().len(),
            shader.uniforms().len()
        );
        Ok(shader)
    }
}
