//! Predefined interface variables, engine intrinsics and the base scope.

use crate::ast::{Declaration, FunctionSignature, Storage};
use crate::syntax::Stage;
use crate::types::{ScalarKind, Type};
use indexmap::IndexMap;
use log::debug;

/// Clip-space position written by the vertex stage.
pub const OUT_POSITION: &str = "out_Position";
/// Color written by the fragment stage.
pub const VARYING_FRAGMENT: &str = "varying_Fragment";

/// Bindings every translation unit sees, regardless of the base scope.
pub fn predefined_globals() -> Vec<(String, Declaration)> {
    vec![
        (
            OUT_POSITION.to_string(),
            Declaration::variable(Type::vec(4), Storage::Output(Stage::Vertex), None),
        ),
        (
            VARYING_FRAGMENT.to_string(),
            Declaration::variable(Type::vec(4), Storage::Output(Stage::Fragment), None),
        ),
    ]
}

fn sig(name: &str, ret: Type, params: &[Type]) -> FunctionSignature {
    FunctionSignature {
        name: name.to_string(),
        ret: Some(ret),
        params: params
            .iter()
            .enumerate()
            .map(|(i, ty)| (format!("arg{}", i), ty.clone()))
            .collect(),
    }
}

fn float_gen_types() -> [Type; 4] {
    [Type::FLOAT, Type::vec(2), Type::vec(3), Type::vec(4)]
}

fn int_gen_types() -> [Type; 4] {
    let ivec = |size| Type::Vector { scalar: ScalarKind::Int, size };
    [Type::INT, ivec(2), ivec(3), ivec(4)]
}

/// GLSL-style intrinsics, expanded into concrete overloads per generic type.
pub fn intrinsics() -> IndexMap<String, Vec<FunctionSignature>> {
    let mut table: IndexMap<String, Vec<FunctionSignature>> = IndexMap::new();
    let mut add = |sig: FunctionSignature| table.entry(sig.name.clone()).or_default().push(sig);

    const UNARY: [&str; 20] = [
        "sin", "cos", "tan", "asin", "acos", "atan", "exp", "log", "exp2", "log2", "sqrt",
        "inversesqrt", "abs", "sign", "floor", "ceil", "fract", "normalize", "radians", "degrees",
    ];
    const BINARY: [&str; 7] = ["pow", "min", "max", "mod", "step", "atan", "reflect"];

    for g in float_gen_types() {
        for name in UNARY {
            add(sig(name, g.clone(), &[g.clone()]));
        }
        for name in BINARY {
            add(sig(name, g.clone(), &[g.clone(), g.clone()]));
        }
        add(sig("length", Type::FLOAT, &[g.clone()]));
        for name in ["distance", "dot"] {
            add(sig(name, Type::FLOAT, &[g.clone(), g.clone()]));
        }
        add(sig("clamp", g.clone(), &[g.clone(), g.clone(), g.clone()]));
        add(sig("mix", g.clone(), &[g.clone(), g.clone(), g.clone()]));
        add(sig("smoothstep", g.clone(), &[g.clone(), g.clone(), g.clone()]));
        if g != Type::FLOAT {
            // Vector with scalar bounds or factor
            for name in ["min", "max", "mod"] {
                add(sig(name, g.clone(), &[g.clone(), Type::FLOAT]));
            }
            add(sig("clamp", g.clone(), &[g.clone(), Type::FLOAT, Type::FLOAT]));
            add(sig("mix", g.clone(), &[g.clone(), g.clone(), Type::FLOAT]));
            add(sig("smoothstep", g.clone(), &[Type::FLOAT, Type::FLOAT, g.clone()]));
        }
    }

    for g in int_gen_types() {
        add(sig("abs", g.clone(), &[g.clone()]));
        add(sig("min", g.clone(), &[g.clone(), g.clone()]));
        add(sig("max", g.clone(), &[g.clone(), g.clone()]));
        add(sig("clamp", g.clone(), &[g.clone(), g.clone(), g.clone()]));
    }

    add(sig("cross", Type::vec(3), &[Type::vec(3), Type::vec(3)]));
    for size in 2..=4 {
        let mat = Type::Matrix { size };
        add(sig("transpose", mat.clone(), &[mat.clone()]));
        add(sig("inverse", mat.clone(), &[mat.clone()]));
        add(sig("determinant", Type::FLOAT, &[mat]));
    }

    table
}

/// Externally supplied bindings placed in the root scope before analysis.
///
/// The default base scope holds the intrinsics; engines add their own
/// uniforms or helper functions on top.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseScope {
    entries: Vec<(String, Declaration)>,
}

impl Default for BaseScope {
    fn default() -> Self {
        Self::standard()
    }
}

impl BaseScope {
    pub fn empty() -> Self {
        BaseScope { entries: Vec::new() }
    }

    pub fn standard() -> Self {
        let entries: Vec<_> = intrinsics()
            .into_iter()
            .map(|(name, overloads)| (name, Declaration::Intrinsic(overloads)))
            .collect();
        debug!("standard base scope: {} intrinsics", entries.len());
        BaseScope { entries }
    }

    pub fn with(mut self, name: impl Into<String>, declaration: Declaration) -> Self {
        self.entries.push((name.into(), declaration));
        self
    }

    /// Engine-provided uniform visible to every shader.
    pub fn with_uniform(self, name: impl Into<String>, ty: Type) -> Self {
        self.with(name, Declaration::variable(ty, Storage::Uniform, None))
    }

    pub fn entries(&self) -> &[(String, Declaration)] {
        &self.entries
    }
}
