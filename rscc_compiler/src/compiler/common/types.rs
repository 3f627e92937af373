use crate::compiler::codegen::machine::*;
use std::fmt::Display;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Specifier {
    Char,
    Int,
    Long,
    Void,
}

impl Specifier {
    fn size(&self) -> u64 {
        match self {
            Specifier::Char => SIZEOF_CHAR,
            Specifier::Int => SIZEOF_INT,
            Specifier::Long => SIZEOF_LONG,
            Specifier::Void => 0,
        }
    }
}

impl Display for Specifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Specifier::Char => "char",
                Specifier::Int => "int",
                Specifier::Long => "long",
                Specifier::Void => "void",
            }
        )
    }
}

/// A type in Simple C is a scalar, an array, or a function, each with a
/// base specifier and some number of pointer layers. The error type
/// compares equal to itself and propagates through the checker.
#[derive(Clone, Debug)]
pub enum Type {
    Error,
    Scalar {
        specifier: Specifier,
        indirection: u32,
    },
    Array {
        specifier: Specifier,
        indirection: u32,
        length: u64,
    },
    /// A function declared as `f()` carries no parameter list; one
    /// declared or defined with parentheses contents carries the list,
    /// which is empty for `f(void)`.
    Function {
        specifier: Specifier,
        indirection: u32,
        parameters: Option<Vec<Type>>,
    },
}

const VOIDPTR: Type = Type::Scalar { specifier: Specifier::Void, indirection: 1 };

impl Type {
    pub fn scalar(specifier: Specifier, indirection: u32) -> Type {
        Type::Scalar { specifier, indirection }
    }
    pub fn array(specifier: Specifier, indirection: u32, length: u64) -> Type {
        Type::Array { specifier, indirection, length }
    }
    pub fn function(specifier: Specifier, indirection: u32, parameters: Option<Vec<Type>>) -> Type {
        Type::Function { specifier, indirection, parameters }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Scalar { .. })
    }
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }
    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    pub fn specifier(&self) -> Specifier {
        match self {
            Type::Scalar { specifier, .. }
            | Type::Array { specifier, .. }
            | Type::Function { specifier, .. } => *specifier,
            Type::Error => unreachable!("specifier of error type"),
        }
    }
    pub fn indirection(&self) -> u32 {
        match self {
            Type::Scalar { indirection, .. }
            | Type::Array { indirection, .. }
            | Type::Function { indirection, .. } => *indirection,
            Type::Error => unreachable!("indirection of error type"),
        }
    }
    pub fn length(&self) -> u64 {
        match self {
            Type::Array { length, .. } => *length,
            _ => unreachable!("length of non-array type"),
        }
    }
    pub fn parameters(&self) -> Option<&Vec<Type>> {
        match self {
            Type::Function { parameters, .. } => parameters.as_ref(),
            _ => unreachable!("parameters of non-function type"),
        }
    }

    /// A pointer type after implicit promotion: a scalar with at least one
    /// pointer layer, or an array.
    pub fn is_pointer(&self) -> bool {
        match self {
            Type::Scalar { indirection, .. } => *indirection > 0,
            Type::Array { .. } => true,
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Scalar { specifier, indirection: 0 } if *specifier != Specifier::Void
        )
    }

    pub fn is_predicate(&self) -> bool {
        self.is_numeric() || self.is_pointer()
    }

    /// Two types are compatible if both are numeric, or both are pointers
    /// with identical promoted types, or either is a pointer to void.
    pub fn is_compatible_with(&self, other: &Type) -> bool {
        if self.is_numeric() && other.is_numeric() {
            return true;
        }

        if !self.is_pointer() || !other.is_pointer() {
            return false;
        }

        self.promote() == other.promote() || *self == VOIDPTR || *other == VOIDPTR
    }

    /// Type promotion: char becomes int, an array becomes a pointer to its
    /// element type.
    pub fn promote(&self) -> Type {
        match self {
            Type::Scalar { specifier: Specifier::Char, indirection: 0 } => {
                Type::scalar(Specifier::Int, 0)
            }
            Type::Array { specifier, indirection, .. } => {
                Type::scalar(*specifier, indirection + 1)
            }
            _ => self.clone(),
        }
    }

    /// The result of dereferencing, defined only on scalar pointer types.
    pub fn deref(&self) -> Type {
        match self {
            Type::Scalar { specifier, indirection } if *indirection > 0 => {
                Type::scalar(*specifier, indirection - 1)
            }
            _ => unreachable!("dereference of non-pointer type"),
        }
    }

    /// Size of the type in bytes.
    pub fn size(&self) -> u64 {
        let (specifier, indirection, count) = match self {
            Type::Scalar { specifier, indirection } => (*specifier, *indirection, 1),
            Type::Array { specifier, indirection, length } => (*specifier, *indirection, *length),
            _ => unreachable!("size of function or error type"),
        };

        if indirection > 0 {
            count * SIZEOF_PTR
        } else {
            count * specifier.size()
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Error, Type::Error) => true,
            (
                Type::Scalar { specifier: s1, indirection: i1 },
                Type::Scalar { specifier: s2, indirection: i2 },
            ) => s1 == s2 && i1 == i2,
            (
                Type::Array { specifier: s1, indirection: i1, length: l1 },
                Type::Array { specifier: s2, indirection: i2, length: l2 },
            ) => s1 == s2 && i1 == i2 && l1 == l2,
            (
                Type::Function { specifier: s1, indirection: i1, parameters: p1 },
                Type::Function { specifier: s2, indirection: i2, parameters: p2 },
            ) => {
                // a missing parameter list matches any parameter list
                s1 == s2
                    && i1 == i2
                    && match (p1, p2) {
                        (Some(p1), Some(p2)) => p1 == p2,
                        _ => true,
                    }
            }
            _ => false,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_error() {
            return write!(f, "error");
        }

        write!(f, "{}", self.specifier())?;

        if self.indirection() > 0 {
            write!(f, " {}", "*".repeat(self.indirection() as usize))?;
        }

        if self.is_array() {
            write!(f, "[{}]", self.length())?;
        } else if self.is_function() {
            write!(f, "()")?;
        }

        Ok(())
    }
}
