//! The closed set of shader types and their boundary-safe exported forms.
//!
//! Typing is strict: two types are compatible only when their exported forms
//! are equal. Operators and constructors have fixed signatures; nothing is
//! ever widened implicitly.

use crate::error::{CompilerError, Result};
use crate::syntax::{BinaryOp, UnaryOp};
use crate::{bail_type, bail_usage};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Float,
    Int,
    Bool,
}

impl ScalarKind {
    fn name(self) -> &'static str {
        match self {
            ScalarKind::Float => "float",
            ScalarKind::Int => "int",
            ScalarKind::Bool => "bool",
        }
    }

    fn vector_prefix(self) -> &'static str {
        match self {
            ScalarKind::Float => "vec",
            ScalarKind::Int => "ivec",
            ScalarKind::Bool => "bvec",
        }
    }

    pub fn is_numeric(self) -> bool {
        self != ScalarKind::Bool
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Type {
    Scalar { scalar: ScalarKind },
    Vector { scalar: ScalarKind, size: u8 },
    /// Square float matrix with `size` columns.
    Matrix { size: u8 },
    Array { element: Box<Type>, len: usize },
}

/// Element part of an exported type: everything except array-ness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ElementKind {
    Scalar { scalar: ScalarKind },
    Vector { scalar: ScalarKind, size: u8 },
    Matrix { size: u8 },
}

/// How a type crosses a stage or API boundary: element kind plus array flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeExported {
    pub element: ElementKind,
    pub is_array: bool,
}

impl Type {
    pub const FLOAT: Type = Type::Scalar { scalar: ScalarKind::Float };
    pub const INT: Type = Type::Scalar { scalar: ScalarKind::Int };
    pub const BOOL: Type = Type::Scalar { scalar: ScalarKind::Bool };

    pub fn vec(size: u8) -> Type {
        Type::Vector { scalar: ScalarKind::Float, size }
    }

    pub fn array(element: Type, len: usize) -> Type {
        Type::Array { element: Box::new(element), len }
    }

    /// Scalar kind of the innermost component.
    pub fn scalar_kind(&self) -> ScalarKind {
        match self {
            Type::Scalar { scalar } | Type::Vector { scalar, .. } => *scalar,
            Type::Matrix { .. } => ScalarKind::Float,
            Type::Array { element, .. } => element.scalar_kind(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Scalar { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    pub fn is_bool_scalar(&self) -> bool {
        *self == Type::BOOL
    }

    pub fn is_int_scalar(&self) -> bool {
        *self == Type::INT
    }

    /// Number of scalar components; arrays have none.
    pub fn component_count(&self) -> Option<usize> {
        match self {
            Type::Scalar { .. } => Some(1),
            Type::Vector { size, .. } => Some(*size as usize),
            Type::Matrix { size } => Some((*size as usize) * (*size as usize)),
            Type::Array { .. } => None,
        }
    }

    /// Type produced by `value[i]` and the static bound of `i`.
    pub fn indexed(&self) -> Option<(Type, usize)> {
        match self {
            Type::Array { element, len } => Some(((**element).clone(), *len)),
            Type::Vector { scalar, size } => Some((Type::Scalar { scalar: *scalar }, *size as usize)),
            Type::Matrix { size } => Some((Type::vec(*size), *size as usize)),
            Type::Scalar { .. } => None,
        }
    }

    pub fn exported(&self) -> TypeExported {
        exported_form_of(self)
    }
}

fn element_kind(ty: &Type) -> ElementKind {
    match ty {
        Type::Scalar { scalar } => ElementKind::Scalar { scalar: *scalar },
        Type::Vector { scalar, size } => ElementKind::Vector { scalar: *scalar, size: *size },
        Type::Matrix { size } => ElementKind::Matrix { size: *size },
        Type::Array { element, .. } => element_kind(element),
    }
}

pub fn exported_form_of(ty: &Type) -> TypeExported {
    TypeExported {
        element: element_kind(ty),
        is_array: ty.is_array(),
    }
}

/// Assignment and parameter-passing compatibility.
pub fn compatible(a: &Type, b: &Type) -> bool {
    exported_form_of(a) == exported_form_of(b)
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Scalar { scalar } => f.write_str(scalar.name()),
            Type::Vector { scalar, size } => write!(f, "{}{}", scalar.vector_prefix(), size),
            Type::Matrix { size } => write!(f, "mat{}", size),
            Type::Array { element, len } => write!(f, "{}[{}]", element, len),
        }
    }
}

impl fmt::Display for TypeExported {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.element {
            ElementKind::Scalar { scalar } => f.write_str(scalar.name())?,
            ElementKind::Vector { scalar, size } => write!(f, "{}{}", scalar.vector_prefix(), size)?,
            ElementKind::Matrix { size } => write!(f, "mat{}", size)?,
        }
        if self.is_array {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

/// Look up a non-array type by its source name.
pub fn named_type(name: &str) -> Option<Type> {
    let ty = match name {
        "float" => Type::FLOAT,
        "int" => Type::INT,
        "bool" => Type::BOOL,
        _ => {
            let (scalar, size) = if let Some(n) = name.strip_prefix("ivec") {
                (Some(ScalarKind::Int), n)
            } else if let Some(n) = name.strip_prefix("bvec") {
                (Some(ScalarKind::Bool), n)
            } else if let Some(n) = name.strip_prefix("vec") {
                (Some(ScalarKind::Float), n)
            } else if let Some(n) = name.strip_prefix("mat") {
                (None, n)
            } else {
                return None;
            };
            let size = match size {
                "2" => 2,
                "3" => 3,
                "4" => 4,
                _ => return None,
            };
            match scalar {
                Some(scalar) => Type::Vector { scalar, size },
                None => Type::Matrix { size },
            }
        }
    };
    Some(ty)
}

pub fn is_type_name(name: &str) -> bool {
    named_type(name).is_some()
}

impl FromStr for Type {
    type Err = CompilerError;

    /// Parses `vec3` or `float[4]`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (base, len) = match s.split_once('[') {
            Some((base, rest)) => {
                let digits = rest
                    .strip_suffix(']')
                    .ok_or_else(|| CompilerError::UnknownIdentifier(s.to_string(), None))?;
                let len = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| CompilerError::UnknownIdentifier(s.to_string(), None))?;
                (base.trim(), Some(len))
            }
            None => (s, None),
        };
        let base = named_type(base).ok_or_else(|| CompilerError::UnknownIdentifier(base.to_string(), None))?;
        match len {
            Some(0) => bail_usage!("array type '{}' must have a non-zero length", s),
            Some(len) => Ok(Type::array(base, len)),
            None => Ok(base),
        }
    }
}

/// Result type of `lhs op rhs`.
pub fn binary_result(op: BinaryOp, lhs: &Type, rhs: &Type) -> Result<Type> {
    let mismatch = || {
        Err(CompilerError::TypeMismatch(
            format!("operator '{}' cannot be applied to {} and {}", op.symbol(), lhs, rhs),
            None,
        ))
    };
    if lhs.is_array() || rhs.is_array() {
        return mismatch();
    }

    match op {
        BinaryOp::And | BinaryOp::Or => {
            if lhs.is_bool_scalar() && rhs.is_bool_scalar() { Ok(Type::BOOL) } else { mismatch() }
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            if compatible(lhs, rhs) { Ok(Type::BOOL) } else { mismatch() }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if lhs == rhs && lhs.is_scalar() && lhs.scalar_kind().is_numeric() {
                Ok(Type::BOOL)
            } else {
                mismatch()
            }
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let kind = lhs.scalar_kind();
            if kind != rhs.scalar_kind() || !kind.is_numeric() {
                return mismatch();
            }
            if op == BinaryOp::Rem && kind != ScalarKind::Int {
                return mismatch();
            }
            match (lhs, rhs) {
                (a, b) if a == b => Ok(a.clone()),
                // Component-wise with a scalar on either side
                (Type::Scalar { .. }, other) | (other, Type::Scalar { .. }) => Ok(other.clone()),
                (Type::Matrix { size: m }, Type::Vector { size: v, .. })
                | (Type::Vector { size: v, .. }, Type::Matrix { size: m })
                    if op == BinaryOp::Mul && m == v =>
                {
                    Ok(Type::vec(*v))
                }
                _ => mismatch(),
            }
        }
    }
}

pub fn unary_result(op: UnaryOp, operand: &Type) -> Result<Type> {
    let ok = match op {
        UnaryOp::Neg => !operand.is_array() && operand.scalar_kind().is_numeric(),
        UnaryOp::Not => operand.is_bool_scalar(),
    };
    if ok {
        Ok(operand.clone())
    } else {
        bail_type!("operator '{}' cannot be applied to {}", op.symbol(), operand)
    }
}

/// Check the argument types of a scalar, vector or matrix constructor.
pub fn check_constructor(target: &Type, args: &[Type]) -> Result<()> {
    let listed = || args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
    if args.is_empty() {
        bail_type!("constructor {} needs at least one argument", target);
    }
    if args.iter().any(Type::is_array) {
        bail_type!("constructor {} cannot take array arguments ({})", target, listed());
    }

    match target {
        Type::Scalar { .. } => {
            if args.len() == 1 && args[0].is_scalar() {
                return Ok(());
            }
        }
        Type::Vector { scalar, size } => {
            // One scalar splats and one vector of the same arity converts,
            // both from any element kind
            if args.len() == 1 {
                match &args[0] {
                    Type::Scalar { .. } => return Ok(()),
                    Type::Vector { size: n, .. } if n == size => return Ok(()),
                    _ => {}
                }
            }
            let same_kind = args.iter().all(|a| a.scalar_kind() == *scalar && !matches!(a, Type::Matrix { .. }));
            let total: usize = args.iter().filter_map(Type::component_count).sum();
            if same_kind && total == *size as usize {
                return Ok(());
            }
        }
        Type::Matrix { size } => {
            let n = *size as usize;
            if args.len() == 1 && args[0] == Type::FLOAT {
                return Ok(());
            }
            if args.len() == n * n && args.iter().all(|a| *a == Type::FLOAT) {
                return Ok(());
            }
            if args.len() == n && args.iter().all(|a| *a == Type::vec(*size)) {
                return Ok(());
            }
        }
        Type::Array { .. } => return check_array_constructor(target, args),
    }
    bail_type!("no constructor {}({})", target, listed())
}

pub fn check_array_constructor(target: &Type, args: &[Type]) -> Result<()> {
    let Type::Array { element, len } = target else {
        return check_constructor(target, args);
    };
    if args.len() != *len {
        bail_type!("array constructor {} expects {} elements, got {}", target, len, args.len());
    }
    if let Some(bad) = args.iter().find(|a| !compatible(element, a)) {
        bail_type!("array constructor {} cannot take an element of type {}", target, bad);
    }
    Ok(())
}

/// Resolve a swizzle like `xy` or `rgba` against a vector type.
///
/// Returns the component indices and the resulting type.
pub fn swizzle(base: &Type, field: &str) -> Result<(Vec<u8>, Type)> {
    let Type::Vector { scalar, size } = base else {
        bail_type!("type {} has no member '{}'", base, field);
    };
    const SETS: [&str; 3] = ["xyzw", "rgba", "stpq"];
    let first = field.chars().next();
    let set = SETS
        .iter()
        .find(|set| first.is_some_and(|c| set.contains(c)))
        .ok_or_else(|| CompilerError::TypeMismatch(format!("type {} has no member '{}'", base, field), None))?;
    if field.len() > 4 {
        bail_type!("swizzle '{}' has more than four components", field);
    }

    let mut components = Vec::with_capacity(field.len());
    for c in field.chars() {
        match set.find(c) {
            Some(i) if i < *size as usize => components.push(i as u8),
            _ => bail_type!("type {} has no component '{}' in swizzle '{}'", base, c, field),
        }
    }
    let ty = match components.len() {
        1 => Type::Scalar { scalar: *scalar },
        n => Type::Vector { scalar: *scalar, size: n as u8 },
    };
    Ok((components, ty))
}
