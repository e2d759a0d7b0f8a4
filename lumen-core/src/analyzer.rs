//! Semantic analysis: builds the typed AST from the parse tree.
//!
//! `build` declares every global, function, stage and property first and
//! then defines global initializers and function bodies, so forward
//! references inside one translation unit resolve. Stage blocks are kept
//! unresolved in the `Program`; the linker resolves them with
//! `resolve_stage` once it knows which scope each stage sees.

use crate::ast::{
    Block, Callee, Declaration, Expression, ExprKind, Function, FunctionSignature, GlobalVariable,
    InterfaceVariable, Literal, Statement, StageBody, Storage, VariableDecl,
};
use crate::builtins::{BaseScope, predefined_globals};
use crate::error::{CompilerError, Result, ResultExt};
use crate::scope::{ScopeId, ScopeTree};
use crate::syntax::{self, AssignOp, Ident, Item, Qualifier, Span, Stage, StageBlock, StmtKind, TranslationUnit, TypeSpec, UnaryOp};
use crate::types::{self, Type, compatible, is_type_name, named_type};
use crate::{bail_type, bail_type_at, bail_undef_at, bail_usage, bail_usage_at};
use indexmap::IndexMap;
use log::debug;
use std::collections::HashSet;

/// Result of the declare/define passes over one translation unit.
#[derive(Debug)]
pub struct Program {
    /// Root scope (predefined and base bindings) plus the unit's global scope.
    pub scopes: ScopeTree,
    pub global: ScopeId,
    pub declarations: IndexMap<String, GlobalVariable>,
    pub functions: IndexMap<String, Function>,
    /// Stage blocks by stage, resolved later by the linker.
    pub stages: IndexMap<Stage, StageBlock>,
    pub properties: IndexMap<String, String>,
}

/// Resolve a written type against the closed set of type names.
pub fn resolve_type(spec: &TypeSpec) -> Result<Type> {
    let Some(base) = named_type(&spec.name) else {
        bail_undef_at!(spec.span, spec.name);
    };
    Ok(match spec.array_len {
        Some(len) => Type::array(base, len),
        None => base,
    })
}

fn check_declarable(name: &Ident) -> Result<()> {
    if is_type_name(&name.name) {
        bail_usage_at!(name.span, "'{}' is a type name and cannot be declared", name.name);
    }
    Ok(())
}

pub fn build(unit: &TranslationUnit, base: &BaseScope) -> Result<Program> {
    let mut scopes = ScopeTree::new();
    let root = scopes.root();
    for (name, decl) in predefined_globals() {
        scopes.add(root, &name, decl)?;
    }
    for (name, decl) in base.entries() {
        scopes.add(root, name, decl.clone())?;
    }
    let global = scopes.push_child(root);

    let mut program = Program {
        scopes,
        global,
        declarations: IndexMap::new(),
        functions: IndexMap::new(),
        stages: IndexMap::new(),
        properties: IndexMap::new(),
    };

    // Pass 1: declare
    let mut storages = Vec::new();
    for item in &unit.items {
        match item {
            Item::Property(property) => {
                if program.properties.contains_key(&property.key.name) {
                    return Err(CompilerError::DuplicateDeclaration(
                        property.key.name.clone(),
                        Some(property.key.span),
                    ));
                }
                program.properties.insert(property.key.name.clone(), property.value.clone());
            }
            Item::Global(decl) => {
                let (ty, storage) = declare_global(&mut program.scopes, global, decl)?;
                storages.push((ty, storage));
            }
            Item::Function(def) => {
                check_declarable(&def.name)?;
                let signature = function_signature(def)?;
                program
                    .scopes
                    .add(global, &def.name.name, Declaration::Function(signature))
                    .at(def.name.span)?;
            }
            Item::Stage(block) => {
                if program.stages.contains_key(&block.stage) {
                    return Err(CompilerError::DuplicateDeclaration(
                        block.stage.name().to_string(),
                        Some(block.span),
                    ));
                }
                program.stages.insert(block.stage, block.clone());
            }
        }
    }
    debug!(
        "declared {} globals, {} bindings in global scope, {} stages",
        storages.len(),
        program.scopes.bindings(global).count(),
        program.stages.len()
    );

    // Pass 2: define functions, then global initializers in declaration order
    let mut dependencies = IndexMap::new();
    for item in &unit.items {
        if let Item::Function(def) = item {
            let (function, deps) = define_function(&mut program.scopes, global, def)?;
            program.functions.insert(def.name.name.clone(), function);
            dependencies.insert(def.name.name.clone(), deps);
        }
    }

    let mut storages = storages.into_iter();
    for item in &unit.items {
        let Item::Global(decl) = item else {
            continue;
        };
        let Some((ty, storage)) = storages.next() else {
            continue;
        };
        let init = match &decl.init {
            Some(expr) => {
                let mut analyzer = BodyAnalyzer::new(&mut program.scopes, global, Context::Global);
                let value = analyzer.expression(expr)?;
                if !compatible(&ty, &value.ty) {
                    bail_type_at!(
                        expr.span,
                        "cannot initialize '{}' of type {} with a value of type {}",
                        decl.name.name,
                        ty,
                        value.ty
                    );
                }
                check_initialization_order(&decl.name.name, &analyzer.deps, &dependencies, &program.declarations)?;
                Some(value)
            }
            None => None,
        };
        program.declarations.insert(
            decl.name.name.clone(),
            GlobalVariable {
                name: decl.name.name.clone(),
                ty,
                storage,
                init,
                span: decl.name.span,
            },
        );
    }
    debug!(
        "defined {} globals and {} functions",
        program.declarations.len(),
        program.functions.len()
    );

    Ok(program)
}

fn declare_global(scopes: &mut ScopeTree, global: ScopeId, decl: &syntax::GlobalDecl) -> Result<(Type, Storage)> {
    let name = &decl.name;
    check_declarable(name)?;
    let ty = resolve_type(&decl.ty)?;

    // Re-stating a predefined interface variable binds that variable
    let predefined = match scopes.resolve_local(scopes.root(), &name.name) {
        Some(Declaration::Variable(var)) if var.storage.is_exported() => Some(var.clone()),
        _ => None,
    };

    let storage = if let Some(predefined) = predefined {
        if matches!(decl.qualifier, Some(Qualifier::Uniform | Qualifier::Const | Qualifier::In)) {
            bail_usage_at!(
                name.span,
                "'{}' is a predefined {} and cannot be redeclared as {}",
                name.name,
                predefined.storage.describe(),
                decl.qualifier.map(Qualifier::keyword).unwrap_or_default()
            );
        }
        if !compatible(&ty, &predefined.ty) {
            bail_type_at!(
                decl.ty.span,
                "'{}' is predefined as {} and cannot be redeclared as {}",
                name.name,
                predefined.ty,
                ty
            );
        }
        predefined.storage
    } else {
        match decl.qualifier {
            None => Storage::Global,
            Some(Qualifier::Const) => Storage::Const,
            Some(Qualifier::Uniform) => Storage::Uniform,
            Some(Qualifier::Varying) => Storage::Varying,
            Some(Qualifier::In) => Storage::Attribute,
            Some(Qualifier::Out) => Storage::Output(Stage::Fragment),
        }
    };

    match (storage, &decl.init) {
        (Storage::Global, _) | (Storage::Const, Some(_)) => {}
        (Storage::Const, None) => {
            bail_usage_at!(name.span, "constant '{}' must be initialized", name.name)
        }
        (storage, Some(init)) => {
            bail_usage_at!(init.span, "{} '{}' cannot have an initializer", storage.describe(), name.name)
        }
        (_, None) => {}
    }

    scopes
        .add(global, &name.name, Declaration::variable(ty.clone(), storage, Some(name.span)))
        .at(name.span)?;
    Ok((ty, storage))
}

fn function_signature(def: &syntax::FunctionDef) -> Result<FunctionSignature> {
    let ret = def.ret.as_ref().map(resolve_type).transpose()?;
    let params = def
        .params
        .iter()
        .map(|param| Ok((param.name.name.clone(), resolve_type(&param.ty)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(FunctionSignature {
        name: def.name.name.clone(),
        ret,
        params,
    })
}

fn define_function(
    scopes: &mut ScopeTree,
    global: ScopeId,
    def: &syntax::FunctionDef,
) -> Result<(Function, Dependencies)> {
    let signature = function_signature(def)?;
    let scope = scopes.push_child(global);
    for (param, (name, ty)) in def.params.iter().zip(&signature.params) {
        check_declarable(&param.name)?;
        scopes
            .add(scope, name, Declaration::variable(ty.clone(), Storage::Parameter, Some(param.name.span)))
            .at(param.name.span)?;
    }

    let mut analyzer = BodyAnalyzer::new(scopes, scope, Context::Function { ret: signature.ret.clone() });
    // Parameters and the outermost body statements share one scope
    let body = analyzer.statements(&def.body.stmts)?;
    let deps = analyzer.deps;
    scopes.discard(scope);

    if signature.ret.is_some() && !body.always_returns() {
        bail_usage_at!(def.name.span, "function '{}' may end without returning a value", def.name.name);
    }
    let function = Function {
        signature,
        body,
        span: def.name.span,
    };
    Ok((function, deps))
}

/// Unit globals and user functions a body refers to, each with its first
/// reference.
#[derive(Debug, Default)]
struct Dependencies {
    reads: IndexMap<String, Span>,
    calls: IndexMap<String, Span>,
}

/// A global initializer may only read globals defined before it, directly
/// or through the functions it calls. Reads through a call are reported at
/// the call in the initializer.
fn check_initialization_order(
    name: &str,
    init: &Dependencies,
    functions: &IndexMap<String, Dependencies>,
    defined: &IndexMap<String, GlobalVariable>,
) -> Result<()> {
    let mut reads: Vec<(&str, Span)> = init.reads.iter().map(|(n, span)| (n.as_str(), *span)).collect();
    let mut pending: Vec<(&str, Span)> = init.calls.iter().rev().map(|(n, span)| (n.as_str(), *span)).collect();
    let mut visited = HashSet::new();
    while let Some((function, span)) = pending.pop() {
        if !visited.insert(function) {
            continue;
        }
        if let Some(deps) = functions.get(function) {
            reads.extend(deps.reads.keys().map(|n| (n.as_str(), span)));
            pending.extend(deps.calls.keys().rev().map(|n| (n.as_str(), span)));
        }
    }

    for (read, span) in reads {
        if read == name {
            bail_usage_at!(span, "'{}' is used in its own initializer", name);
        }
        if !defined.contains_key(read) {
            bail_usage_at!(span, "initializer of '{}' reads '{}' before it is defined", name, read);
        }
    }
    Ok(())
}

/// Analyze a stage block in a fresh child of `parent` and collect its interface.
pub fn resolve_stage(scopes: &mut ScopeTree, parent: ScopeId, block: &StageBlock) -> Result<StageBody> {
    debug!("resolving {} stage", block.stage);
    let scope = scopes.push_child(parent);
    let mut inputs = IndexMap::new();
    for param in &block.inputs {
        check_declarable(&param.name)?;
        let ty = resolve_type(&param.ty)?;
        scopes
            .add(
                scope,
                &param.name.name,
                Declaration::variable(ty.clone(), Storage::FragmentInput, Some(param.name.span)),
            )
            .at(param.name.span)?;
        inputs.insert(
            param.name.name.clone(),
            InterfaceVariable {
                name: param.name.name.clone(),
                ty,
                storage: Storage::FragmentInput,
                span: Some(param.name.span),
            },
        );
    }

    let mut analyzer = BodyAnalyzer::new(scopes, scope, Context::Stage(block.stage));
    analyzer.inputs = inputs;
    let body = analyzer.statements(&block.body.stmts)?;
    let BodyAnalyzer { inputs, outputs, .. } = analyzer;
    scopes.discard(scope);

    debug!(
        "{} stage: {} inputs, {} outputs",
        block.stage,
        inputs.len(),
        outputs.len()
    );
    Ok(StageBody {
        stage: block.stage,
        inputs: inputs.into_values().collect(),
        outputs: outputs.into_values().collect(),
        body,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Context {
    /// Global initializer.
    Global,
    Function { ret: Option<Type> },
    Stage(Stage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    fn reads(self) -> bool {
        self != Access::Write
    }

    fn writes(self) -> bool {
        self != Access::Read
    }
}

struct BodyAnalyzer<'a> {
    scopes: &'a mut ScopeTree,
    scope: ScopeId,
    context: Context,
    loop_depth: usize,
    inputs: IndexMap<String, InterfaceVariable>,
    outputs: IndexMap<String, InterfaceVariable>,
    deps: Dependencies,
}

impl<'a> BodyAnalyzer<'a> {
    fn new(scopes: &'a mut ScopeTree, scope: ScopeId, context: Context) -> Self {
        BodyAnalyzer {
            scopes,
            scope,
            context,
            loop_depth: 0,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            deps: Dependencies::default(),
        }
    }

    /// Run `f` inside a new child scope, discarding it afterwards.
    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let outer = self.scope;
        self.scope = self.scopes.push_child(outer);
        let result = f(self);
        self.scopes.discard(self.scope);
        self.scope = outer;
        result
    }

    fn statements(&mut self, stmts: &[syntax::Stmt]) -> Result<Block> {
        let statements = stmts.iter().map(|s| self.statement(s)).collect::<Result<Vec<_>>>()?;
        Ok(Block { statements })
    }

    fn block(&mut self, block: &syntax::Block) -> Result<Block> {
        self.scoped(|this| this.statements(&block.stmts))
    }

    fn statement(&mut self, stmt: &syntax::Stmt) -> Result<Statement> {
        self.statement_kind(stmt).at(stmt.span)
    }

    fn statement_kind(&mut self, stmt: &syntax::Stmt) -> Result<Statement> {
        match &stmt.kind {
            StmtKind::Local { ty, name, init } => {
                check_declarable(name)?;
                let ty = resolve_type(ty)?;
                // The initializer sees the outer binding of a shadowed name
                let init = match init {
                    Some(expr) => {
                        let value = self.expression(expr)?;
                        if !compatible(&ty, &value.ty) {
                            bail_type_at!(
                                expr.span,
                                "cannot initialize '{}' of type {} with a value of type {}",
                                name.name,
                                ty,
                                value.ty
                            );
                        }
                        Some(value)
                    }
                    None => None,
                };
                self.scopes
                    .add(self.scope, &name.name, Declaration::variable(ty.clone(), Storage::Local, Some(name.span)))
                    .at(name.span)?;
                Ok(Statement::Local {
                    name: name.name.clone(),
                    ty,
                    init,
                    span: name.span,
                })
            }
            StmtKind::Assign { target, op, value } => {
                let access = match op {
                    AssignOp::Assign => Access::Write,
                    AssignOp::Compound(_) => Access::ReadWrite,
                };
                let target = self.lvalue(target, access)?;
                let value = self.expression(value)?;
                let result = match op {
                    AssignOp::Assign => value.ty.clone(),
                    AssignOp::Compound(op) => types::binary_result(*op, &target.ty, &value.ty)?,
                };
                if !compatible(&target.ty, &result) {
                    bail_type!("cannot assign a value of type {} to a target of type {}", result, target.ty);
                }
                Ok(Statement::Assign { target, op: *op, value })
            }
            StmtKind::Increment { target, op } => {
                let target = self.lvalue(target, Access::ReadWrite)?;
                let one = match target.ty.scalar_kind() {
                    types::ScalarKind::Int => (Literal::Int(1), Type::INT),
                    _ => (Literal::Float(1.0), Type::FLOAT),
                };
                let result = types::binary_result(*op, &target.ty, &one.1)?;
                if !compatible(&target.ty, &result) {
                    bail_type!("operator '{}{}' cannot be applied to {}", op.symbol(), op.symbol(), target.ty);
                }
                Ok(Statement::Assign {
                    target,
                    op: AssignOp::Compound(*op),
                    value: Expression {
                        kind: ExprKind::Literal(one.0),
                        ty: one.1,
                        span: stmt.span,
                    },
                })
            }
            StmtKind::Expr(expr) => {
                if let syntax::ExprKind::Call { callee, args } = &expr.kind {
                    let (callee, ret, args) = self.call(callee, args).at(expr.span)?;
                    return Ok(match ret {
                        Some(ty) => Statement::Expr(Expression {
                            kind: ExprKind::Call { callee, args },
                            ty,
                            span: expr.span,
                        }),
                        None => Statement::VoidCall {
                            callee,
                            args,
                            span: expr.span,
                        },
                    });
                }
                Ok(Statement::Expr(self.expression(expr)?))
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.condition(cond)?;
                let then_branch = Box::new(self.scoped(|this| this.statement(then_branch))?);
                let else_branch = match else_branch {
                    Some(stmt) => Some(Box::new(self.scoped(|this| this.statement(stmt))?)),
                    None => None,
                };
                Ok(Statement::If {
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            StmtKind::While { cond, body } => {
                let cond = self.condition(cond)?;
                let body = Box::new(self.loop_body(body)?);
                Ok(Statement::While { cond, body })
            }
            StmtKind::For { init, cond, step, body } => self.scoped(|this| {
                let init = match init {
                    Some(stmt) => Some(Box::new(this.statement(stmt)?)),
                    None => None,
                };
                let cond = match cond {
                    Some(expr) => Some(this.condition(expr)?),
                    None => None,
                };
                let step = match step {
                    Some(stmt) => Some(Box::new(this.statement(stmt)?)),
                    None => None,
                };
                let body = Box::new(this.loop_body(body)?);
                Ok(Statement::For { init, cond, step, body })
            }),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => Some(self.expression(expr)?),
                    None => None,
                };
                match (&self.context, &value) {
                    (Context::Function { ret: None }, Some(_)) => {
                        bail_type!("a void function cannot return a value")
                    }
                    (Context::Function { ret: Some(ret) }, None) => {
                        bail_type!("missing return value of type {}", ret)
                    }
                    (Context::Function { ret: Some(ret) }, Some(value)) if !compatible(ret, &value.ty) => {
                        bail_type!("cannot return a value of type {} from a function returning {}", value.ty, ret)
                    }
                    (Context::Stage(stage), Some(_)) => {
                        bail_usage!("the {} stage cannot return a value", stage)
                    }
                    (Context::Global, _) => bail_usage!("return outside of a function"),
                    _ => {}
                }
                Ok(Statement::Return { value, span: stmt.span })
            }
            StmtKind::Discard => {
                if self.context != Context::Stage(Stage::Fragment) {
                    bail_usage!("discard is only allowed in the fragment stage");
                }
                Ok(Statement::Discard { span: stmt.span })
            }
            StmtKind::Break | StmtKind::Continue => {
                let keyword = if matches!(stmt.kind, StmtKind::Break) { "break" } else { "continue" };
                if self.loop_depth == 0 {
                    bail_usage!("'{}' outside of a loop", keyword);
                }
                Ok(if keyword == "break" { Statement::Break } else { Statement::Continue })
            }
            StmtKind::Block(block) => Ok(Statement::Block(self.block(block)?)),
        }
    }

    fn loop_body(&mut self, body: &syntax::Stmt) -> Result<Statement> {
        self.loop_depth += 1;
        let body = self.scoped(|this| this.statement(body));
        self.loop_depth -= 1;
        body
    }

    fn condition(&mut self, cond: &syntax::Expr) -> Result<Expression> {
        let cond = self.expression(cond)?;
        if !cond.ty.is_bool_scalar() {
            bail_type_at!(cond.span, "condition must be bool, found {}", cond.ty);
        }
        Ok(cond)
    }

    fn expression(&mut self, expr: &syntax::Expr) -> Result<Expression> {
        self.expression_kind(expr).at(expr.span)
    }

    fn expression_kind(&mut self, expr: &syntax::Expr) -> Result<Expression> {
        let span = expr.span;
        let (kind, ty) = match &expr.kind {
            syntax::ExprKind::IntLiteral(n) => (ExprKind::Literal(Literal::Int(*n)), Type::INT),
            syntax::ExprKind::FloatLiteral(f) => (ExprKind::Literal(Literal::Float(*f)), Type::FLOAT),
            syntax::ExprKind::BoolLiteral(b) => (ExprKind::Literal(Literal::Bool(*b)), Type::BOOL),
            syntax::ExprKind::Identifier(name) => {
                let var = self.variable(name, span, Access::Read)?;
                (
                    ExprKind::Variable {
                        name: name.clone(),
                        storage: var.storage,
                    },
                    var.ty,
                )
            }
            syntax::ExprKind::Call { callee, args } => {
                let (callee, ret, args) = self.call(callee, args)?;
                let Some(ty) = ret else {
                    bail_type!("void call used as a value");
                };
                (ExprKind::Call { callee, args }, ty)
            }
            syntax::ExprKind::ArrayConstructor { ty, args } => {
                let target = resolve_type(ty)?;
                let args = self.arguments(args)?;
                let arg_types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
                types::check_array_constructor(&target, &arg_types)?;
                (
                    ExprKind::Call {
                        callee: Callee::Constructor(target.clone()),
                        args,
                    },
                    target,
                )
            }
            syntax::ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.expression(lhs)?;
                let rhs = self.expression(rhs)?;
                let ty = types::binary_result(*op, &lhs.ty, &rhs.ty)?;
                (
                    ExprKind::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    ty,
                )
            }
            syntax::ExprKind::Unary { op, operand } => {
                let operand = self.expression(operand)?;
                let ty = types::unary_result(*op, &operand.ty)?;
                (
                    ExprKind::Unary {
                        op: *op,
                        operand: Box::new(operand),
                    },
                    ty,
                )
            }
            syntax::ExprKind::Member { base, field } => {
                let base = self.expression(base)?;
                let (components, ty) = types::swizzle(&base.ty, &field.name).at(field.span)?;
                (
                    ExprKind::Swizzle {
                        base: Box::new(base),
                        components,
                    },
                    ty,
                )
            }
            syntax::ExprKind::Index { base, index } => {
                let base = self.expression(base)?;
                return self.index(base, index, span);
            }
        };
        Ok(Expression { kind, ty, span })
    }

    fn arguments(&mut self, args: &[syntax::Expr]) -> Result<Vec<Expression>> {
        args.iter().map(|arg| self.expression(arg)).collect()
    }

    fn index(&mut self, base: Expression, index: &syntax::Expr, span: Span) -> Result<Expression> {
        let index = self.expression(index)?;
        if !index.ty.is_int_scalar() {
            bail_type_at!(index.span, "index must be int, found {}", index.ty);
        }
        let Some((ty, len)) = base.ty.indexed() else {
            bail_type!("type {} cannot be indexed", base.ty);
        };
        if let Some(value) = constant_int(&index) {
            if value < 0 || value as usize >= len {
                bail_usage_at!(index.span, "index {} is out of bounds for {}", value, base.ty);
            }
        }
        Ok(Expression {
            kind: ExprKind::Index {
                base: Box::new(base),
                index: Box::new(index),
            },
            ty,
            span,
        })
    }

    /// Analyze an assignment target.
    fn lvalue(&mut self, target: &syntax::Expr, access: Access) -> Result<Expression> {
        self.lvalue_kind(target, access).at(target.span)
    }

    fn lvalue_kind(&mut self, target: &syntax::Expr, access: Access) -> Result<Expression> {
        let span = target.span;
        match &target.kind {
            syntax::ExprKind::Identifier(name) => {
                let var = self.variable(name, span, access)?;
                Ok(Expression {
                    kind: ExprKind::Variable {
                        name: name.clone(),
                        storage: var.storage,
                    },
                    ty: var.ty,
                    span,
                })
            }
            syntax::ExprKind::Member { base, field } => {
                let base = self.lvalue(base, access)?;
                let (components, ty) = types::swizzle(&base.ty, &field.name).at(field.span)?;
                let mut seen = [false; 4];
                for &c in &components {
                    if std::mem::replace(&mut seen[c as usize], true) {
                        bail_usage_at!(field.span, "swizzle '{}' repeats a component and cannot be assigned", field.name);
                    }
                }
                Ok(Expression {
                    kind: ExprKind::Swizzle {
                        base: Box::new(base),
                        components,
                    },
                    ty,
                    span,
                })
            }
            syntax::ExprKind::Index { base, index } => {
                let base = self.lvalue(base, access)?;
                self.index(base, index, span)
            }
            _ => bail_usage!("expression cannot be assigned to"),
        }
    }

    fn call(
        &mut self,
        callee: &Ident,
        args: &[syntax::Expr],
    ) -> Result<(Callee, Option<Type>, Vec<Expression>)> {
        let args = self.arguments(args)?;
        let arg_types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
        let listed = || arg_types.iter().map(Type::to_string).collect::<Vec<_>>().join(", ");

        if let Some(target) = named_type(&callee.name) {
            types::check_constructor(&target, &arg_types).at(callee.span)?;
            return Ok((Callee::Constructor(target.clone()), Some(target), args));
        }

        match self.scopes.resolve(self.scope, &callee.name) {
            None => bail_undef_at!(callee.span, callee.name),
            Some(Declaration::Function(signature)) => {
                if !signature.accepts(&arg_types) {
                    bail_type_at!(callee.span, "cannot call {} with ({})", signature, listed());
                }
                self.deps.calls.entry(callee.name.clone()).or_insert(callee.span);
                Ok((Callee::Function(callee.name.clone()), signature.ret.clone(), args))
            }
            Some(Declaration::Intrinsic(overloads)) => {
                let Some(signature) = overloads.iter().find(|s| s.accepts(&arg_types)) else {
                    bail_type_at!(callee.span, "no overload of '{}' accepts ({})", callee.name, listed());
                };
                Ok((Callee::Intrinsic(callee.name.clone()), signature.ret.clone(), args))
            }
            Some(Declaration::Variable(_)) => {
                bail_usage_at!(callee.span, "'{}' is a variable, not a function", callee.name)
            }
        }
    }

    /// Resolve a variable reference and enforce the storage access rules.
    fn variable(&mut self, name: &str, span: Span, access: Access) -> Result<VariableDecl> {
        let (found, var) = match self.scopes.resolve_with_scope(self.scope, name) {
            Some((found, Declaration::Variable(var))) => (found, var.clone()),
            Some(_) => bail_usage_at!(span, "'{}' is a function, not a variable", name),
            None => bail_undef_at!(span, name),
        };
        let storage = var.storage;
        let what = storage.describe();

        if storage.is_interface() {
            let Context::Stage(stage) = self.context else {
                bail_usage_at!(span, "{} '{}' can only be used inside a stage block", what, name);
            };
            match storage {
                Storage::Attribute if stage != Stage::Vertex => {
                    bail_usage_at!(span, "{} '{}' is not available in the {} stage", what, name, stage)
                }
                Storage::Output(owner) if owner != stage => {
                    bail_usage_at!(span, "{} '{}' is only available in the {} stage", what, name, owner)
                }
                Storage::Attribute | Storage::FragmentInput if access.writes() => {
                    bail_usage_at!(span, "cannot assign to {} '{}'", what, name)
                }
                Storage::Varying if stage == Stage::Fragment && access.writes() => {
                    bail_usage_at!(span, "varying '{}' is read-only in the fragment stage", name)
                }
                _ => {}
            }
            self.record_interface(name, &var, stage, access);
        } else if matches!(storage, Storage::Uniform | Storage::Const) && access.writes() {
            bail_usage_at!(span, "cannot assign to {} '{}'", what, name);
        }

        // The unit's global scope is the only direct child of the root
        let unit_global = self.scopes.parent(found) == Some(self.scopes.root());
        if unit_global && matches!(storage, Storage::Global | Storage::Const) && access.reads() {
            self.deps.reads.entry(name.to_string()).or_insert(span);
        }
        Ok(var)
    }

    fn record_interface(&mut self, name: &str, var: &VariableDecl, stage: Stage, access: Access) {
        let entry = || InterfaceVariable {
            name: name.to_string(),
            ty: var.ty.clone(),
            storage: var.storage,
            span: var.span,
        };
        match var.storage {
            Storage::Varying if stage == Stage::Fragment && access.reads() => {
                self.inputs.entry(name.to_string()).or_insert_with(entry);
            }
            Storage::Attribute if access.reads() => {
                self.inputs.entry(name.to_string()).or_insert_with(entry);
            }
            Storage::Varying | Storage::Output(_) if access.writes() => {
                self.outputs.entry(name.to_string()).or_insert_with(entry);
            }
            _ => {}
        }
    }
}

/// Value of an integer literal index, possibly negated.
fn constant_int(expr: &Expression) -> Option<i64> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(n)) => Some(*n),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => constant_int(operand).map(|n| -n),
        _ => None,
    }
}

#[cfg(test)]
impl Program {
    /// Global variable or function signature by name, for tests.
    pub(crate) fn global_binding(&self, name: &str) -> Option<&Declaration> {
        self.scopes.resolve(self.global, name)
    }
}
