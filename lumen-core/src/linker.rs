//! Stage linking: resolves the fragment and vertex stages and matches the
//! vertex outputs against the fragment inputs.

use crate::analyzer::{Program, resolve_stage};
use crate::ast::{Declaration, InterfaceVariable, StageBody, Storage, VariableDecl};
use crate::error::{CompilerError, Result};
use crate::scope::{ScopeId, ScopeTree};
use crate::shader::{CompiledShader, OutputDescriptor, UniformDescriptor};
use crate::syntax::Stage;
use crate::types::compatible;
use indexmap::IndexMap;
use log::debug;

pub fn link(program: Program) -> Result<CompiledShader> {
    let Program {
        mut scopes,
        global,
        declarations,
        functions,
        mut stages,
        properties,
    } = program;
    let vertex_block = stages.shift_remove(&Stage::Vertex);
    let fragment_block = stages.shift_remove(&Stage::Fragment);

    let shader_fragment = match &fragment_block {
        Some(block) => Some(resolve_stage(&mut scopes, global, block)?),
        None => None,
    };

    let (shader_vertex, seed) = match (&vertex_block, &shader_fragment) {
        (Some(block), None) => return Err(CompilerError::MissingFragmentStage(Some(block.span))),
        (Some(block), Some(fragment)) => {
            let seed = seed_fragment_inputs(&mut scopes, global, fragment)?;
            let vertex = resolve_stage(&mut scopes, seed, block)?;
            check_linked(fragment, &vertex)?;
            (Some(vertex), Some(seed))
        }
        (None, _) => (None, None),
    };

    let (outputs, uniforms) = collect_interface(&scopes, global, seed);
    if let Some(seed) = seed {
        scopes.discard(seed);
    }
    debug!(
        "linked: vertex={} fragment={} outputs={} uniforms={}",
        shader_vertex.is_some(),
        shader_fragment.is_some(),
        outputs.len(),
        uniforms.len()
    );

    Ok(CompiledShader::new(
        declarations,
        functions,
        shader_vertex,
        shader_fragment,
        outputs,
        uniforms,
        properties,
    ))
}

/// Scope the vertex stage is resolved in: the fragment inputs bound as
/// varyings on top of the global scope.
fn seed_fragment_inputs(scopes: &mut ScopeTree, global: ScopeId, fragment: &StageBody) -> Result<ScopeId> {
    let seed = scopes.push_child(global);
    for input in &fragment.inputs {
        if let Some(Declaration::Variable(var)) = scopes.resolve(global, &input.name) {
            if var.storage == Storage::Varying && !compatible(&var.ty, &input.ty) {
                return Err(CompilerError::TypeMismatch(
                    format!(
                        "fragment input '{}' has type {} but the varying is declared as {}",
                        input.name, input.ty, var.ty
                    ),
                    input.span,
                ));
            }
        }
        scopes.add(
            seed,
            &input.name,
            Declaration::variable(input.ty.clone(), Storage::Varying, input.span),
        )?;
    }
    Ok(seed)
}

/// Every fragment input must be written by the vertex stage.
fn check_linked(fragment: &StageBody, vertex: &StageBody) -> Result<()> {
    for input in &fragment.inputs {
        if vertex.output(&input.name).is_none() {
            return Err(unlinked(input));
        }
    }
    Ok(())
}

fn unlinked(input: &InterfaceVariable) -> CompilerError {
    CompilerError::UnlinkedVarying(
        format!("fragment input '{}' is never written by the vertex stage", input.name),
        input.span,
    )
}

/// Outputs and uniforms of the merged global scope: root bindings not
/// shadowed by the unit's globals, then the globals, then the varyings the
/// fragment stage declared in its header.
fn collect_interface(
    scopes: &ScopeTree,
    global: ScopeId,
    seed: Option<ScopeId>,
) -> (Vec<OutputDescriptor>, Vec<UniformDescriptor>) {
    let variables = |scope: ScopeId| {
        scopes.bindings(scope).filter_map(|(name, decl)| match decl {
            Declaration::Variable(var) => Some((name, var)),
            _ => None,
        })
    };

    let mut merged: IndexMap<&str, &VariableDecl> = IndexMap::new();
    for (name, var) in variables(scopes.root()) {
        if scopes.resolve_local(global, name).is_none() {
            merged.insert(name, var);
        }
    }
    merged.extend(variables(global));
    if let Some(seed) = seed {
        for (name, var) in variables(seed) {
            merged.entry(name).or_insert(var);
        }
    }

    let mut outputs = Vec::new();
    let mut uniforms = Vec::new();
    for (name, var) in merged {
        let stage = match var.storage {
            Storage::Uniform => {
                uniforms.push(UniformDescriptor {
                    name: name.to_string(),
                    ty: var.ty.exported(),
                });
                continue;
            }
            Storage::Varying => Stage::Vertex,
            Storage::Output(stage) => stage,
            _ => continue,
        };
        outputs.push(OutputDescriptor {
            name: name.to_string(),
            stage,
            ty: var.ty.exported(),
        });
    }
    (outputs, uniforms)
}
