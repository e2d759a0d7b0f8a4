//! Typed AST produced by the analyzer.
//!
//! Every expression carries exactly one resolved `Type` and the span of the
//! token it came from. Node kinds are closed enums so later passes match
//! exhaustively.

use crate::syntax::{AssignOp, BinaryOp, Span, Stage, UnaryOp};
use crate::types::{Type, TypeExported};
use serde::Serialize;
use std::fmt;

/// Where a variable lives and who may touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    Local,
    Parameter,
    Global,
    Const,
    Uniform,
    /// Per-vertex input (`in`), vertex stage only.
    Attribute,
    /// Vertex output consumed by the fragment stage.
    Varying,
    /// Stage-owned output such as `out_Position`.
    Output(Stage),
    /// Parameter of the fragment stage header.
    FragmentInput,
}

impl Storage {
    /// Interface variables only make sense inside stage blocks.
    pub fn is_interface(self) -> bool {
        matches!(
            self,
            Storage::Attribute | Storage::Varying | Storage::Output(_) | Storage::FragmentInput
        )
    }

    /// Exported storage crosses the stage boundary and is listed in `outputs`.
    pub fn is_exported(self) -> bool {
        matches!(self, Storage::Varying | Storage::Output(_))
    }

    pub fn describe(self) -> &'static str {
        match self {
            Storage::Local => "local variable",
            Storage::Parameter => "parameter",
            Storage::Global => "global variable",
            Storage::Const => "constant",
            Storage::Uniform => "uniform",
            Storage::Attribute => "vertex attribute",
            Storage::Varying => "varying",
            Storage::Output(Stage::Vertex) => "vertex output",
            Storage::Output(Stage::Fragment) => "fragment output",
            Storage::FragmentInput => "fragment input",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub ty: Type,
    pub storage: Storage,
    /// `None` for predefined and externally supplied bindings.
    pub span: Option<Span>,
}

/// Named entity bound in a scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Variable(VariableDecl),
    Function(FunctionSignature),
    /// Engine-provided function with one or more overloads.
    Intrinsic(Vec<FunctionSignature>),
}

impl Declaration {
    pub fn variable(ty: Type, storage: Storage, span: Option<Span>) -> Self {
        Declaration::Variable(VariableDecl { ty, storage, span })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSignature {
    pub name: String,
    /// `None` for `void`.
    pub ret: Option<Type>,
    pub params: Vec<(String, Type)>,
}

/// Boundary-safe projection of a signature, used for call matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionExportedSignature {
    pub name: String,
    pub ret: Option<TypeExported>,
    pub params: Vec<TypeExported>,
}

impl FunctionSignature {
    pub fn exported(&self) -> FunctionExportedSignature {
        FunctionExportedSignature {
            name: self.name.clone(),
            ret: self.ret.as_ref().map(Type::exported),
            params: self.params.iter().map(|(_, ty)| ty.exported()).collect(),
        }
    }

    /// True if `args` can be passed to this signature.
    pub fn accepts(&self, args: &[Type]) -> bool {
        let exported = self.exported();
        exported.params.len() == args.len()
            && exported.params.iter().zip(args).all(|(param, arg)| *param == arg.exported())
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.ret {
            Some(ret) => write!(f, "{} ", ret)?,
            None => f.write_str("void ")?,
        }
        let params: Vec<String> = self.params.iter().map(|(_, ty)| ty.to_string()).collect();
        write!(f, "{}({})", self.name, params.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Callee {
    Function(String),
    Intrinsic(String),
    Constructor(Type),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    Literal(Literal),
    Variable { name: String, storage: Storage },
    Call { callee: Callee, args: Vec<Expression> },
    Binary { op: BinaryOp, lhs: Box<Expression>, rhs: Box<Expression> },
    Unary { op: UnaryOp, operand: Box<Expression> },
    Swizzle { base: Box<Expression>, components: Vec<u8> },
    Index { base: Box<Expression>, index: Box<Expression> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    Local {
        name: String,
        ty: Type,
        init: Option<Expression>,
        span: Span,
    },
    Assign {
        target: Expression,
        op: AssignOp,
        value: Expression,
    },
    Expr(Expression),
    /// Call to a `void` function; has no value and so no expression type.
    VoidCall {
        callee: Callee,
        args: Vec<Expression>,
        span: Span,
    },
    If {
        cond: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    While {
        cond: Expression,
        body: Box<Statement>,
    },
    For {
        init: Option<Box<Statement>>,
        cond: Option<Expression>,
        step: Option<Box<Statement>>,
        body: Box<Statement>,
    },
    Return {
        value: Option<Expression>,
        span: Span,
    },
    Discard {
        span: Span,
    },
    Break,
    Continue,
    Block(Block),
}

impl Statement {
    /// Conservative check that control never falls off the end.
    pub fn always_returns(&self) -> bool {
        match self {
            Statement::Return { .. } | Statement::Discard { .. } => true,
            Statement::Block(block) => block.always_returns(),
            Statement::If {
                then_branch,
                else_branch: Some(else_branch),
                ..
            } => then_branch.always_returns() && else_branch.always_returns(),
            _ => false,
        }
    }
}

impl Block {
    pub fn always_returns(&self) -> bool {
        self.statements.iter().any(Statement::always_returns)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub signature: FunctionSignature,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: Type,
    pub storage: Storage,
    pub init: Option<Expression>,
    pub span: Span,
}

/// One entry of a stage interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceVariable {
    pub name: String,
    pub ty: Type,
    pub storage: Storage,
    pub span: Option<Span>,
}

/// A resolved `vertex` or `fragment` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageBody {
    pub stage: Stage,
    /// Values the stage consumes: fragment header inputs and varyings it
    /// reads, or vertex attributes.
    pub inputs: Vec<InterfaceVariable>,
    /// Interface variables the stage writes.
    pub outputs: Vec<InterfaceVariable>,
    pub body: Block,
}

impl StageBody {
    pub fn input(&self, name: &str) -> Option<&InterfaceVariable> {
        self.inputs.iter().find(|v| v.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&InterfaceVariable> {
        self.outputs.iter().find(|v| v.name == name)
    }
}
