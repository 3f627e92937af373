use crate::compiler::codegen::register::Reg;
use crate::compiler::common::environment::SymbolRef;
use crate::compiler::common::token::escape_string;
use crate::compiler::common::types::{Specifier, Type};
use std::cell::Cell;
use std::fmt::Display;
use std::rc::Rc;

/// Expressions are shared so the register file can hold non-owning
/// references back into the tree while code is being emitted.
pub type ExprRef = Rc<Expr>;

/// An expression node. The type and lvalue predicate are fixed by the
/// checker when the node is built; `register` and `offset` belong to the
/// code generator and change while the node is live.
#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub lvalue: bool,

    /// Register currently holding this expression, if any
    pub register: Cell<Option<Reg>>,

    /// Frame displacement of the spill slot; 0 means not spilled
    pub offset: Cell<i64>,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Number(u64),
    String(Vec<u8>),
    Ident(SymbolRef),
    Call { id: SymbolRef, args: Vec<ExprRef> },
    Not(ExprRef),
    Negate(ExprRef),
    Address(ExprRef),
    Deref(ExprRef),
    /// The target type is the node's own type
    Cast(ExprRef),
    Binary { op: BinaryOp, left: ExprRef, right: ExprRef },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Remainder => "%",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type, lvalue: bool) -> ExprRef {
        Rc::new(Expr {
            kind,
            ty,
            lvalue,
            register: Cell::new(None),
            offset: Cell::new(0),
        })
    }

    /// An integer literal as written in the source: type int unless the
    /// value needs more than 32 bits.
    pub fn number(value: u64) -> ExprRef {
        let specifier = if i32::try_from(value).is_ok() {
            Specifier::Int
        } else {
            Specifier::Long
        };
        Expr::new(ExprKind::Number(value), Type::scalar(specifier, 0), false)
    }

    /// An integer literal synthesized by the checker (scaling, folded
    /// extensions, sizeof), which always has type long.
    pub fn long_number(value: u64) -> ExprRef {
        Expr::new(
            ExprKind::Number(value),
            Type::scalar(Specifier::Long, 0),
            false,
        )
    }

    pub fn is_number(&self) -> Option<u64> {
        match self.kind {
            ExprKind::Number(value) => Some(value),
            _ => None,
        }
    }

    /// If this is a dereference, return the pointer subtree.
    pub fn is_dereference(&self) -> Option<&ExprRef> {
        match &self.kind {
            ExprKind::Deref(pointer) => Some(pointer),
            _ => None,
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ExprKind::Number(value) => {
                write!(f, "{}", value)?;
                if self.ty == Type::scalar(Specifier::Long, 0) {
                    write!(f, "L")?;
                }
                Ok(())
            }
            ExprKind::String(value) => write!(f, "{}", escape_string(value)),
            ExprKind::Ident(symbol) => write!(f, "{}", symbol.name),
            ExprKind::Call { id, args } => {
                write!(f, "({}", id.name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::Not(expr) => write!(f, "(! {})", expr),
            ExprKind::Negate(expr) => write!(f, "(- {})", expr),
            ExprKind::Address(expr) => write!(f, "(& {})", expr),
            ExprKind::Deref(expr) => write!(f, "(* {})", expr),
            ExprKind::Cast(expr) => write!(f, "({} {})", self.ty, expr),
            ExprKind::Binary { op, left, right } => {
                write!(f, "({} {} {})", op.symbol(), left, right)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_typing() {
        assert_eq!(Expr::number(42).ty, Type::scalar(Specifier::Int, 0));
        assert_eq!(
            Expr::number(2147483647).ty,
            Type::scalar(Specifier::Int, 0)
        );
        assert_eq!(
            Expr::number(4294967296).ty,
            Type::scalar(Specifier::Long, 0)
        );
        assert_eq!(Expr::long_number(8).ty, Type::scalar(Specifier::Long, 0));
    }
}
