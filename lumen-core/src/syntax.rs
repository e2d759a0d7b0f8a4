//! Parse tree produced by the parser.
//!
//! Nodes own their children and carry the span of the token that starts them.
//! Type names are kept as written; the analyzer resolves them.

use serde::Serialize;
use std::fmt;

/// 1-based line/column of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Span { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node<T> {
    pub span: Span,
    pub kind: T,
}

impl<T> Node<T> {
    pub fn new(span: Span, kind: T) -> Self {
        Node { span, kind }
    }
}

/// Pipeline stage a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::Fragment => "fragment",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationUnit {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Property(Property),
    Global(GlobalDecl),
    Function(FunctionDef),
    Stage(StageBlock),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// `#[key = value]` metadata item.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: Ident,
    pub value: String,
}

/// A type as written: `vec3` or `float[4]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub name: String,
    pub array_len: Option<usize>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Uniform,
    Varying,
    In,
    Out,
    Const,
}

impl Qualifier {
    pub fn keyword(self) -> &'static str {
        match self {
            Qualifier::Uniform => "uniform",
            Qualifier::Varying => "varying",
            Qualifier::In => "in",
            Qualifier::Out => "out",
            Qualifier::Const => "const",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDecl {
    pub qualifier: Option<Qualifier>,
    pub ty: TypeSpec,
    pub name: Ident,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeSpec,
    pub name: Ident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// `None` for `void`.
    pub ret: Option<TypeSpec>,
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Block,
}

/// `vertex { ... }` or `fragment(vec3 v_color) { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageBlock {
    pub stage: Stage,
    pub inputs: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

/// Assignment operator; compound forms carry the arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
}

pub type Stmt = Node<StmtKind>;

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Local {
        ty: TypeSpec,
        name: Ident,
        init: Option<Expr>,
    },
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
    },
    /// `target++` or `target--`; `op` is `Add` or `Sub`.
    Increment {
        target: Expr,
        op: BinaryOp,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Discard,
    Break,
    Continue,
    Block(Block),
}

pub type Expr = Node<ExprKind>;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    Identifier(String),
    /// `name(args)`: user function, intrinsic or scalar/vector/matrix constructor.
    Call { callee: Ident, args: Vec<Expr> },
    /// `T[N](args)`
    ArrayConstructor { ty: TypeSpec, args: Vec<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Member { base: Box<Expr>, field: Ident },
    Index { base: Box<Expr>, index: Box<Expr> },
}
