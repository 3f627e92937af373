use crate::compiler::common::environment::{Scope, SymbolRef};
use crate::compiler::common::expr::ExprRef;
use std::fmt::Display;

#[derive(Debug)]
pub enum Stmt {
    Simple(ExprRef),
    Assignment {
        left: ExprRef,
        right: ExprRef,
    },
    Return(ExprRef),
    While {
        cond: ExprRef,
        body: Box<Stmt>,
    },
    For {
        init: Box<Stmt>,
        cond: ExprRef,
        incr: Box<Stmt>,
        body: Box<Stmt>,
    },
    If {
        cond: ExprRef,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    /// A compound statement owns the scope it opened
    Block {
        scope: Scope,
        stmts: Vec<Stmt>,
    },
}

/// A function definition, ready for allocation and code generation.
#[derive(Debug)]
pub struct Function {
    pub id: SymbolRef,
    pub body: Stmt,
}

// The rest of this file writes the tree back out in a LISP-like syntax
// with C-style operators, which is only used by --dump-ast.

impl Display for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stmt::Simple(expr) => write!(f, "{}", expr),
            Stmt::Assignment { left, right } => write!(f, "(= {} {})", left, right),
            Stmt::Return(expr) => write!(f, "(return {})", expr),
            Stmt::While { cond, body } => write!(f, "(while {} {})", cond, body),
            // the increment is not written
            Stmt::For { init, cond, body, .. } => {
                write!(f, "(for {} {} {})", init, cond, body)
            }
            Stmt::If { cond, then_branch, else_branch } => {
                write!(f, "(if {} {}", cond, then_branch)?;
                if let Some(else_branch) = else_branch {
                    write!(f, " {}", else_branch)?;
                }
                write!(f, ")")
            }
            Stmt::Block { stmts, .. } => {
                write!(f, "(begin")?;
                for stmt in stmts {
                    write!(f, " {}", stmt)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let num = self
            .id
            .ty
            .parameters()
            .expect("function definitions carry a parameter list")
            .len();
        let Stmt::Block { scope, .. } = &self.body else {
            unreachable!("function body is a block");
        };

        write!(f, "(define {}{}", if num > 0 { "(" } else { "" }, self.id.name)?;

        for symbol in &scope.symbols()[..num] {
            write!(f, " {}", symbol.name)?;
        }

        if num > 0 {
            write!(f, ")")?;
        }
        write!(f, " {})", self.body)
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::parser::tests::parse_function;

    #[test]
    fn functions_and_blocks() {
        assert_eq!(
            parse_function("int main(void) { return 0; }").to_string(),
            "(define main (begin (return 0)))"
        );
        assert_eq!(
            parse_function("int f(int a, int b) { return a + b; }").to_string(),
            "(define (f a b) (begin (return (+ a b))))"
        );
    }

    #[test]
    fn assignments_loops_and_branches() {
        assert_eq!(
            parse_function(
                "int main(void) { int i; i = 0; while (i < 10) i = i + 1; return i; }"
            )
            .to_string(),
            "(define main (begin (= i 0) (while (< i 10) (= i (+ i 1))) (return i)))"
        );
        assert_eq!(
            parse_function("int main(void) { int i; if (i) i = 1; else i = 2; return i; }")
                .to_string(),
            "(define main (begin (if i (= i 1) (= i 2)) (return i)))"
        );
    }

    #[test]
    fn for_writes_init_condition_and_body() {
        assert_eq!(
            parse_function(
                "int main(void) { int i; for (i = 0; i < 3; i = i + 1) i; return 0; }"
            )
            .to_string(),
            "(define main (begin (for (= i 0) (< i 3) i) (return 0)))"
        );
    }

    #[test]
    fn inserted_coercions_appear_as_casts() {
        assert_eq!(
            parse_function("long f(long l, char c) { return l + c; }").to_string(),
            "(define (f l c) (begin (return (+ l (long c)))))"
        );
    }

    #[test]
    fn long_literals_carry_a_suffix() {
        assert_eq!(
            parse_function("long f(void) { return sizeof 1; }").to_string(),
            "(define f (begin (return 4L)))"
        );
    }
}
