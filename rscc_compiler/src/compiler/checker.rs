//! Semantic analysis for Simple C
//!
//! The parser calls into the checker as it consumes tokens. Each entry
//! point types the construct, inserts any implicit promotions, coercions
//! and pointer scaling, and builds the corresponding tree node. A node is
//! built even when an error is reported so parsing can continue; the
//! error type propagates silently through every later rule. If a symbol
//! is redeclared, the redeclaration is discarded and the original binding
//! is kept.

use crate::compiler::common::environment::{Scope, Symbol, SymbolRef};
use crate::compiler::common::error::{Diagnostics, ErrorKind};
use crate::compiler::common::expr::{BinaryOp, Expr, ExprKind, ExprRef};
use crate::compiler::common::stmt::Stmt;
use crate::compiler::common::types::{Specifier, Type};
use std::rc::Rc;

const ERROR: Type = Type::Error;
const INTEGER: Type = Type::Scalar { specifier: Specifier::Int, indirection: 0 };
const CHARACTER: Type = Type::Scalar { specifier: Specifier::Char, indirection: 0 };
const LONGINT: Type = Type::Scalar { specifier: Specifier::Long, indirection: 0 };
const VOIDPTR: Type = Type::Scalar { specifier: Specifier::Void, indirection: 1 };

#[derive(Debug)]
pub struct Checker {
    /// The scope chain, innermost last. The first entry is the outermost
    /// scope holding globals and functions.
    scopes: Vec<Scope>,

    pub diagnostics: Diagnostics,
}

impl Checker {
    pub fn new() -> Self {
        Checker {
            scopes: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn open_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    /// Detaches the innermost scope and hands it to the caller, which
    /// stores it in the block that delimited it.
    pub fn close_scope(&mut self) -> Scope {
        self.scopes.pop().expect("scope chain is never empty while parsing")
    }

    fn toplevel(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope chain is never empty while parsing")
    }

    fn outermost(&mut self) -> &mut Scope {
        self.scopes.first_mut().expect("scope chain is never empty while parsing")
    }

    fn lookup(&self, name: &str) -> Option<SymbolRef> {
        self.scopes.iter().rev().find_map(|scope| scope.find(name))
    }

    fn report(&mut self, kind: ErrorKind) {
        self.diagnostics.report(kind);
    }

    /// Defines a function in the outermost scope, replacing any previous
    /// definition or declaration.
    pub fn define_function(&mut self, name: &str, ty: Type) -> SymbolRef {
        if let Some(symbol) = self.outermost().find(name) {
            if symbol.ty.is_function() && symbol.ty.parameters().is_some() {
                self.report(ErrorKind::Redefined(name.to_string()));
            } else if ty != symbol.ty {
                self.report(ErrorKind::Conflicting(name.to_string()));
            }
            self.outermost().remove(name);
        }

        let symbol = Symbol::new(name.to_string(), ty);
        self.outermost().insert(Rc::clone(&symbol));
        symbol
    }

    /// Declares a function in the outermost scope. Redeclarations are
    /// discarded.
    pub fn declare_function(&mut self, name: &str, ty: Type) -> SymbolRef {
        match self.outermost().find(name) {
            Some(symbol) => {
                if ty != symbol.ty {
                    self.report(ErrorKind::Conflicting(name.to_string()));
                }
                symbol
            }
            None => {
                let symbol = Symbol::new(name.to_string(), ty);
                self.outermost().insert(Rc::clone(&symbol));
                symbol
            }
        }
    }

    /// Declares a variable in the current scope. Redeclarations are
    /// discarded.
    pub fn declare_variable(&mut self, name: &str, ty: Type) -> SymbolRef {
        match self.toplevel().find(name) {
            Some(symbol) => {
                if self.scopes.len() > 1 {
                    self.report(ErrorKind::Redeclared(name.to_string()));
                } else if ty != symbol.ty {
                    self.report(ErrorKind::Conflicting(name.to_string()));
                }
                symbol
            }
            None => {
                if ty == Type::scalar(Specifier::Void, 0) {
                    self.report(ErrorKind::VoidObject(name.to_string()));
                }
                let symbol = Symbol::new(name.to_string(), ty);
                self.toplevel().insert(Rc::clone(&symbol));
                symbol
            }
        }
    }

    /// Looks a name up through the scope chain. An undeclared name is
    /// inserted with the error type so it is only reported once.
    pub fn check_identifier(&mut self, name: &str) -> SymbolRef {
        match self.lookup(name) {
            Some(symbol) => symbol,
            None => {
                self.report(ErrorKind::Undeclared(name.to_string()));
                let symbol = Symbol::new(name.to_string(), ERROR);
                self.toplevel().insert(Rc::clone(&symbol));
                symbol
            }
        }
    }

    /// Promotion on an expression. An array becomes a pointer by
    /// explicitly inserting an address operator; a char becomes an int by
    /// explicitly inserting a cast.
    fn promote(expr: ExprRef) -> ExprRef {
        if expr.ty.is_array() {
            let ty = expr.ty.promote();
            Expr::new(ExprKind::Address(expr), ty, false)
        } else if expr.ty == CHARACTER {
            Expr::new(ExprKind::Cast(expr), INTEGER, false)
        } else {
            expr
        }
    }

    /// Casts the expression to the given type. An int literal extended to
    /// long is folded into the literal instead.
    fn cast(expr: ExprRef, ty: Type) -> ExprRef {
        if let Some(value) = expr.is_number() {
            if expr.ty == INTEGER && ty == LONGINT {
                return Expr::long_number(value);
            }
        }

        Expr::new(ExprKind::Cast(expr), ty, false)
    }

    /// Conversion as if by assignment: promote an array toward a pointer
    /// target, then coerce numeric types to the exact target type. Unlike
    /// extension, conversion may narrow.
    fn convert(expr: ExprRef, ty: &Type) -> ExprRef {
        let mut expr = expr;

        if expr.ty.is_array() && ty.is_pointer() {
            expr = Self::promote(expr);
        }

        if expr.ty != *ty && expr.ty.is_numeric() && ty.is_numeric() {
            expr = Self::cast(expr, ty.clone());
        }

        expr
    }

    /// Widens the expression toward the given type, never narrowing:
    /// a cast is inserted only when the source is char or the target is
    /// long. Always finishes with a promotion.
    fn extend(expr: ExprRef, ty: &Type) -> ExprRef {
        let mut expr = expr;

        if expr.ty != *ty
            && expr.ty.is_numeric()
            && ty.is_numeric()
            && (expr.ty == CHARACTER || *ty == LONGINT)
        {
            expr = Self::cast(expr, ty.clone());
        }

        Self::promote(expr)
    }

    /// Scales a pointer-arithmetic operand by the element size. A literal
    /// is folded; anything else is extended to long and multiplied.
    fn scale(expr: ExprRef, size: u64) -> ExprRef {
        if let Some(value) = expr.is_number() {
            return Expr::long_number(value * size);
        }

        let expr = Self::extend(expr, &LONGINT);
        Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Multiply,
                left: expr,
                right: Expr::long_number(size),
            },
            LONGINT,
            false,
        )
    }

    /// A call `id(args)`. The callee must have a function type; with a
    /// declared parameter list the count and each converted argument type
    /// must agree, without one every promoted argument must be a
    /// predicate.
    pub fn check_call(&mut self, id: SymbolRef, mut args: Vec<ExprRef>) -> ExprRef {
        let ty = id.ty.clone();
        let mut result = ERROR;

        if ty != ERROR {
            if ty.is_function() {
                result = Type::scalar(ty.specifier(), ty.indirection());

                match ty.parameters() {
                    None => {
                        for arg in args.iter_mut() {
                            *arg = Self::promote(Rc::clone(arg));

                            if arg.ty != ERROR && !arg.ty.is_predicate() {
                                self.report(ErrorKind::InvalidArguments);
                                result = ERROR;
                                break;
                            }
                        }
                    }
                    Some(params) if params.len() != args.len() => {
                        self.report(ErrorKind::InvalidArguments);
                    }
                    Some(params) => {
                        for (arg, param) in args.iter_mut().zip(params) {
                            *arg = Self::convert(Rc::clone(arg), param);

                            if !arg.ty.is_compatible_with(param) {
                                self.report(ErrorKind::InvalidArguments);
                                result = ERROR;
                                break;
                            }
                        }
                    }
                }
            } else {
                self.report(ErrorKind::InvalidFunction);
            }
        }

        Expr::new(ExprKind::Call { id, args }, result, false)
    }

    /// An index expression `left[right]`, rewritten as `*(left + right)`
    /// with the index scaled by the element size.
    pub fn check_array(&mut self, left: ExprRef, mut right: ExprRef) -> ExprRef {
        let left = Self::promote(left);
        let t1 = left.ty.clone();
        let t2 = right.ty.clone();
        let mut result = ERROR;

        if t1 != ERROR && t2 != ERROR {
            if t1.is_pointer() && t2.is_numeric() && t1 != VOIDPTR {
                right = Self::scale(right, t1.deref().size());
                result = t1.deref();
            } else {
                self.report(ErrorKind::InvalidBinary("[]"));
            }
        }

        let sum = Expr::new(
            ExprKind::Binary { op: BinaryOp::Add, left, right },
            t1,
            false,
        );
        Expr::new(ExprKind::Deref(sum), result, true)
    }

    pub fn check_not(&mut self, expr: ExprRef) -> ExprRef {
        let expr = Self::promote(expr);
        let mut result = ERROR;

        if expr.ty != ERROR {
            if expr.ty.is_predicate() {
                result = INTEGER;
            } else {
                self.report(ErrorKind::InvalidUnary("!"));
            }
        }

        Expr::new(ExprKind::Not(expr), result, false)
    }

    pub fn check_negate(&mut self, expr: ExprRef) -> ExprRef {
        let expr = Self::promote(expr);
        let mut result = ERROR;

        if expr.ty != ERROR {
            if expr.ty.is_numeric() {
                result = expr.ty.clone();
            } else {
                self.report(ErrorKind::InvalidUnary("-"));
            }
        }

        Expr::new(ExprKind::Negate(expr), result, false)
    }

    pub fn check_dereference(&mut self, expr: ExprRef) -> ExprRef {
        let expr = Self::promote(expr);
        let mut result = ERROR;

        if expr.ty != ERROR {
            if expr.ty.is_pointer() && expr.ty != VOIDPTR {
                result = expr.ty.deref();
            } else {
                self.report(ErrorKind::InvalidUnary("*"));
            }
        }

        Expr::new(ExprKind::Deref(expr), result, true)
    }

    /// The operand of `&` is not promoted; it must be an lvalue.
    pub fn check_address(&mut self, expr: ExprRef) -> ExprRef {
        let ty = expr.ty.clone();
        let mut result = ERROR;

        if ty != ERROR {
            if expr.lvalue {
                result = Type::scalar(ty.specifier(), ty.indirection() + 1);
            } else {
                self.report(ErrorKind::InvalidLvalue);
            }
        }

        Expr::new(ExprKind::Address(expr), result, false)
    }

    /// `sizeof expr` folds to a long literal; the operand is discarded and
    /// never reaches code generation.
    pub fn check_sizeof(&mut self, expr: ExprRef) -> ExprRef {
        let ty = &expr.ty;

        if *ty == ERROR {
            return Expr::new(ExprKind::Number(0), ERROR, false);
        }

        if !ty.is_predicate() {
            self.report(ErrorKind::InvalidUnary("sizeof"));
            return Expr::long_number(0);
        }

        Expr::long_number(ty.size())
    }

    /// `* / %`: both operands numeric after cross-extension; the result is
    /// long if either operand is long and int otherwise.
    pub fn check_multiplicative(
        &mut self,
        op: BinaryOp,
        left: ExprRef,
        right: ExprRef,
    ) -> ExprRef {
        let right_ty = right.ty.clone();
        let left = Self::extend(left, &right_ty);
        let right = Self::extend(right, &left.ty.clone());
        let (t1, t2) = (left.ty.clone(), right.ty.clone());
        let mut result = ERROR;

        if t1 != ERROR && t2 != ERROR {
            if t1.is_numeric() && t2.is_numeric() {
                result = t1;
            } else {
                self.report(ErrorKind::InvalidBinary(op.symbol()));
            }
        }

        Expr::new(ExprKind::Binary { op, left, right }, result, false)
    }

    /// `+`: numeric addition with cross-extension, or pointer plus scaled
    /// numeric in either order.
    pub fn check_add(&mut self, mut left: ExprRef, mut right: ExprRef) -> ExprRef {
        let mut t1 = left.ty.clone();
        let t2 = right.ty.clone();
        let mut result = ERROR;

        if t1 != ERROR && t2 != ERROR {
            if t1.is_numeric() && t2.is_numeric() {
                left = Self::extend(left, &t2);
                t1 = left.ty.clone();
                right = Self::extend(right, &t1);
                result = t1;
            } else if t1.is_pointer() && t2.is_numeric() && t1 != VOIDPTR {
                left = Self::promote(left);
                t1 = left.ty.clone();
                right = Self::scale(right, t1.deref().size());
                result = t1;
            } else if t1.is_numeric() && t2.is_pointer() && t2 != VOIDPTR {
                right = Self::promote(right);
                let t2 = right.ty.clone();
                left = Self::scale(left, t2.deref().size());
                result = t2;
            } else {
                self.report(ErrorKind::InvalidBinary("+"));
            }
        }

        Expr::new(
            ExprKind::Binary { op: BinaryOp::Add, left, right },
            result,
            false,
        )
    }

    /// `-`: numeric subtraction, pointer minus scaled numeric, or the
    /// difference of identical pointers, which is divided by the element
    /// size and has type long.
    pub fn check_subtract(&mut self, mut left: ExprRef, mut right: ExprRef) -> ExprRef {
        let mut t1 = left.ty.clone();
        let mut t2 = right.ty.clone();
        let mut result = ERROR;

        if t1 != ERROR && t2 != ERROR {
            if t1.is_numeric() && t2.is_numeric() {
                left = Self::extend(left, &t2);
                t1 = left.ty.clone();
                right = Self::extend(right, &t1);
                t2 = right.ty.clone();
                result = t1.clone();
            } else {
                left = Self::promote(left);
                t1 = left.ty.clone();

                if t1.is_pointer() && t2.is_numeric() && t1 != VOIDPTR {
                    right = Self::scale(right, t1.deref().size());
                    result = t1.clone();
                } else {
                    right = Self::promote(right);
                    t2 = right.ty.clone();

                    if t1.is_pointer() && t1 == t2 && t1 != VOIDPTR {
                        result = LONGINT;
                    } else {
                        self.report(ErrorKind::InvalidBinary("-"));
                    }
                }
            }
        }

        let mut expr = Expr::new(
            ExprKind::Binary { op: BinaryOp::Subtract, left, right },
            result,
            false,
        );

        if t1.is_pointer() && t1 == t2 {
            expr = Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Divide,
                    left: expr,
                    right: Expr::long_number(t1.deref().size()),
                },
                LONGINT,
                false,
            );
        }

        expr
    }

    /// `< > <= >=`: after cross-extension both operands must be numeric or
    /// identical predicate types; the result has type int.
    pub fn check_relational(&mut self, op: BinaryOp, left: ExprRef, right: ExprRef) -> ExprRef {
        let right_ty = right.ty.clone();
        let left = Self::extend(left, &right_ty);
        let right = Self::extend(right, &left.ty.clone());
        let (t1, t2) = (left.ty.clone(), right.ty.clone());
        let mut result = ERROR;

        if t1 != ERROR && t2 != ERROR {
            if t1 == t2 && t1.is_predicate() {
                result = INTEGER;
            } else {
                self.report(ErrorKind::InvalidBinary(op.symbol()));
            }
        }

        Expr::new(ExprKind::Binary { op, left, right }, result, false)
    }

    /// `== !=`: the operand types must be compatible; the result has type
    /// int.
    pub fn check_equality(&mut self, op: BinaryOp, left: ExprRef, right: ExprRef) -> ExprRef {
        let right_ty = right.ty.clone();
        let left = Self::extend(left, &right_ty);
        let right = Self::extend(right, &left.ty.clone());
        let (t1, t2) = (left.ty.clone(), right.ty.clone());
        let mut result = ERROR;

        if t1 != ERROR && t2 != ERROR {
            if t1.is_compatible_with(&t2) {
                result = INTEGER;
            } else {
                self.report(ErrorKind::InvalidBinary(op.symbol()));
            }
        }

        Expr::new(ExprKind::Binary { op, left, right }, result, false)
    }

    /// `&& ||`: both operands must be predicates; the result has type int.
    pub fn check_logical(&mut self, op: BinaryOp, left: ExprRef, right: ExprRef) -> ExprRef {
        let right_ty = right.ty.clone();
        let left = Self::extend(left, &right_ty);
        let right = Self::extend(right, &left.ty.clone());
        let (t1, t2) = (left.ty.clone(), right.ty.clone());
        let mut result = ERROR;

        if t1 != ERROR && t2 != ERROR {
            if t1.is_predicate() && t2.is_predicate() {
                result = INTEGER;
            } else {
                self.report(ErrorKind::InvalidBinary(op.symbol()));
            }
        }

        Expr::new(ExprKind::Binary { op, left, right }, result, false)
    }

    /// `left = right`: the left operand must be an lvalue and the operand
    /// types must be compatible.
    pub fn check_assignment(&mut self, left: ExprRef, right: ExprRef) -> Stmt {
        let t1 = left.ty.clone();
        let right = Self::convert(right, &t1);
        let t2 = right.ty.clone();

        if t1 != ERROR && t2 != ERROR {
            if !left.lvalue {
                self.report(ErrorKind::InvalidLvalue);
            } else if !t1.is_compatible_with(&t2) {
                self.report(ErrorKind::InvalidBinary("="));
            }
        }

        Stmt::Assignment { left, right }
    }

    /// The returned expression must be compatible with the return type of
    /// the enclosing function.
    pub fn check_return(&mut self, expr: ExprRef, ty: &Type) -> ExprRef {
        let expr = Self::convert(expr, ty);

        if expr.ty != ERROR && !expr.ty.is_compatible_with(ty) {
            self.report(ErrorKind::InvalidReturn);
        }

        expr
    }

    /// The test of a while, for, or if must have a predicate type after
    /// promotion.
    pub fn check_test(&mut self, expr: ExprRef) -> ExprRef {
        let expr = Self::promote(expr);

        if expr.ty != ERROR && !expr.ty.is_predicate() {
            self.report(ErrorKind::InvalidTest);
        }

        expr
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::parser::tests::errors_for;

    #[test]
    fn void_objects() {
        assert_eq!(errors_for("void x;"), 1);
        assert_eq!(errors_for("void *x;"), 0);
        assert_eq!(errors_for("int f(void v) { return 0; }"), 1);
    }

    #[test]
    fn undeclared_is_reported_once() {
        assert_eq!(errors_for("int main(void) { y = 1; y = 2; return y; }"), 1);
    }

    #[test]
    fn redefinition_of_function() {
        assert_eq!(
            errors_for("int f(void) { return 0; } int f(void) { return 0; }"),
            1
        );
        // a declaration followed by a definition is fine
        assert_eq!(errors_for("int f(); int f(int a) { return a; }"), 0);
    }

    #[test]
    fn conflicting_global_types() {
        assert_eq!(errors_for("int x; long x;"), 1);
        assert_eq!(errors_for("int x; int x;"), 0);
    }

    #[test]
    fn redeclaration_in_same_scope() {
        assert_eq!(errors_for("int main(void) { int a; int a; return 0; }"), 1);
        // shadowing in a nested block is allowed
        assert_eq!(
            errors_for("int main(void) { int a; { long a; a = 1; } return 0; }"),
            0
        );
    }

    #[test]
    fn assignment_conversions() {
        // narrowing is inserted as a cast, not an error
        assert_eq!(
            errors_for("int main(void) { char c; long l; l = 300; c = l; return c; }"),
            0
        );
        // a pointer cannot absorb a long
        assert_eq!(
            errors_for("int main(void) { int *p; long l; l = 0; p = l; return 0; }"),
            1
        );
        // but any pointer converts through void *
        assert_eq!(
            errors_for("int main(void) { int *p; void *v; int i; v = &i; p = v; return 0; }"),
            0
        );
    }

    #[test]
    fn lvalue_required() {
        assert_eq!(errors_for("int main(void) { int a; a + 1 = 2; return 0; }"), 1);
        assert_eq!(errors_for("int main(void) { int a; (a) = 2; return 0; }"), 1);
        assert_eq!(errors_for("int a[4]; int main(void) { a = 0; return 0; }"), 1);
        assert_eq!(errors_for("int main(void) { int a; int *p; p = &a; *p = 2; return 0; }"), 0);
    }

    #[test]
    fn address_needs_lvalue() {
        assert_eq!(errors_for("int main(void) { int *p; p = &3; return 0; }"), 1);
        assert_eq!(errors_for("int a[4]; int main(void) { int **p; p = &a; return 0; }"), 1);
    }

    #[test]
    fn call_checking() {
        // declared parameter list: arity and types must match
        assert_eq!(
            errors_for("int f(int a) { return a; } int main(void) { return f(1, 2); }"),
            1
        );
        assert_eq!(
            errors_for("int f(int *p) { return 0; } int main(void) { long l; l = 0; return f(l); }"),
            1
        );
        // absent parameter list: any predicate arguments go
        assert_eq!(errors_for("int g(); int main(void) { return g(1, 2, 3); }"), 0);
        // empty parameter list accepts no arguments
        assert_eq!(
            errors_for("int f(void) { return 0; } int main(void) { return f(1); }"),
            1
        );
        // arrays decay to pointers at the call boundary
        assert_eq!(
            errors_for("int f(char *s) { return 0; } char b[8]; int main(void) { return f(b); }"),
            0
        );
    }

    #[test]
    fn called_object_must_be_function() {
        assert_eq!(errors_for("int x; int main(void) { return x(); }"), 1);
    }

    #[test]
    fn dereference_rules() {
        assert_eq!(errors_for("void *v; int main(void) { return *v; }"), 1);
        assert_eq!(errors_for("int main(void) { int i; return *i; }"), 1);
        assert_eq!(errors_for("int *p; int main(void) { return *p; }"), 0);
    }

    #[test]
    fn pointer_arithmetic_typing() {
        // identical pointers subtract; mismatched ones do not
        assert_eq!(
            errors_for("int *p, *q; long d; int main(void) { d = p - q; return 0; }"),
            0
        );
        assert_eq!(
            errors_for("int *p; char *q; long d; int main(void) { d = p - q; return 0; }"),
            1
        );
        // void pointers take part in no arithmetic, and the error type
        // silences the dereference that follows
        assert_eq!(errors_for("void *v; int main(void) { int i; i = *(v + 1); return 0; }"), 1);
    }

    #[test]
    fn test_expression_must_be_predicate() {
        assert_eq!(errors_for("void g(); int main(void) { while (g()) g(); return 0; }"), 1);
        assert_eq!(errors_for("int main(void) { int i; while (i) i = 0; return 0; }"), 0);
    }

    #[test]
    fn sizeof_rules() {
        assert_eq!(errors_for("int main(void) { return sizeof main; }"), 1);
        assert_eq!(errors_for("int a[12]; long n; int main(void) { n = sizeof a; return 0; }"), 0);
    }

    #[test]
    fn invalid_return() {
        assert_eq!(errors_for("int *f(void) { long l; l = 1; return l; }"), 1);
        assert_eq!(errors_for("long f(void) { return 1; }"), 0);
    }

    #[test]
    fn errors_do_not_cascade() {
        // one undeclared identifier poisons the whole expression silently
        assert_eq!(
            errors_for("int main(void) { int a; a = y + 1 * 2 - a; return 0; }"),
            1
        );
    }
}
