//! The linked, immutable compilation artifact handed to code generators.

use crate::ast::{Function, GlobalVariable, StageBody};
use crate::syntax::Stage;
use crate::types::TypeExported;
use indexmap::IndexMap;
use serde::Serialize;

/// An interface variable written by one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputDescriptor {
    pub name: String,
    /// Stage that writes the value.
    pub stage: Stage,
    pub ty: TypeExported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniformDescriptor {
    pub name: String,
    pub ty: TypeExported,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledShader {
    declarations: IndexMap<String, GlobalVariable>,
    functions: IndexMap<String, Function>,
    shader_vertex: Option<StageBody>,
    shader_fragment: Option<StageBody>,
    outputs: Vec<OutputDescriptor>,
    uniforms: Vec<UniformDescriptor>,
    properties: IndexMap<String, String>,
}

impl CompiledShader {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        declarations: IndexMap<String, GlobalVariable>,
        functions: IndexMap<String, Function>,
        shader_vertex: Option<StageBody>,
        shader_fragment: Option<StageBody>,
        outputs: Vec<OutputDescriptor>,
        uniforms: Vec<UniformDescriptor>,
        properties: IndexMap<String, String>,
    ) -> Self {
        CompiledShader {
            declarations,
            functions,
            shader_vertex,
            shader_fragment,
            outputs,
            uniforms,
            properties,
        }
    }

    pub fn declarations(&self) -> &IndexMap<String, GlobalVariable> {
        &self.declarations
    }

    pub fn functions(&self) -> &IndexMap<String, Function> {
        &self.functions
    }

    pub fn shader_vertex(&self) -> Option<&StageBody> {
        self.shader_vertex.as_ref()
    }

    pub fn shader_fragment(&self) -> Option<&StageBody> {
        self.shader_fragment.as_ref()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageBody> {
        match stage {
            Stage::Vertex => self.shader_vertex(),
            Stage::Fragment => self.shader_fragment(),
        }
    }

    /// Stage outputs in declaration order.
    pub fn outputs(&self) -> &[OutputDescriptor] {
        &self.outputs
    }

    pub fn uniforms(&self) -> &[UniformDescriptor] {
        &self.uniforms
    }

    pub fn properties(&self) -> &IndexMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}
