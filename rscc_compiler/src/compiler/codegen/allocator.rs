//! Storage allocation
//!
//! Walks a function's tree assigning frame displacements to parameters
//! and locals. Parameters passed in registers get negative offsets and
//! are spilled by the prologue; parameters beyond the register count stay
//! where the caller pushed them, at positive offsets from the frame base.
//! Sibling blocks reuse the same slots, so the frame only needs to cover
//! the deepest path of declarations.

use crate::compiler::codegen::machine::{NUM_PARAM_REGS, SIZEOF_PARAM};
use crate::compiler::common::stmt::{Function, Stmt};

/// Assigns offsets to a function's parameters and then to the locals of
/// its body. On entry `offset` is the displacement of the first stack
/// parameter, normally the size of the saved base pointer plus the return
/// address; on exit it is the most negative displacement in use.
pub fn allocate_function(function: &Function, offset: &mut i64) {
    let params = function
        .id
        .ty
        .parameters()
        .expect("function definitions carry a parameter list");
    let Stmt::Block { scope, .. } = &function.body else {
        unreachable!("function body is a block");
    };
    let symbols = scope.symbols();

    for i in NUM_PARAM_REGS..params.len() {
        symbols[i].offset.set(*offset);
        *offset += SIZEOF_PARAM;
    }

    *offset = 0;

    for i in 0..params.len().min(NUM_PARAM_REGS) {
        *offset -= params[i].promote().size() as i64;
        symbols[i].offset.set(*offset);
    }

    allocate(&function.body, offset);
}

/// Assigns decreasing offsets to the unallocated symbols of each block,
/// then lets every child statement allocate from its own copy of the
/// running offset. The block's final offset is the minimum across
/// children, so siblings share slots.
pub fn allocate(stmt: &Stmt, offset: &mut i64) {
    match stmt {
        Stmt::Block { scope, stmts } => {
            for symbol in scope.symbols() {
                if symbol.offset.get() == 0 {
                    *offset -= symbol.ty.size() as i64;
                    symbol.offset.set(*offset);
                }
            }

            let saved = *offset;
            for stmt in stmts {
                let mut temp = saved;
                allocate(stmt, &mut temp);
                *offset = (*offset).min(temp);
            }
        }
        Stmt::While { body, .. } => allocate(body, offset),
        Stmt::For { body, .. } => allocate(body, offset),
        Stmt::If { then_branch, else_branch, .. } => {
            let saved = *offset;
            allocate(then_branch, offset);

            if let Some(else_branch) = else_branch {
                let mut temp = saved;
                allocate(else_branch, &mut temp);
                *offset = (*offset).min(temp);
            }
        }
        Stmt::Simple(_) | Stmt::Assignment { .. } | Stmt::Return(_) => (),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::common::environment::{Scope, Symbol, SymbolRef};
    use crate::compiler::common::expr::Expr;
    use crate::compiler::common::stmt::Function;
    use crate::compiler::common::types::{Specifier, Type};

    fn block(symbols: &[SymbolRef], stmts: Vec<Stmt>) -> Stmt {
        let mut scope = Scope::new();
        for symbol in symbols {
            scope.insert(std::rc::Rc::clone(symbol));
        }
        Stmt::Block { scope, stmts }
    }

    fn function_of(params: Vec<Type>, body: Stmt) -> Function {
        Function {
            id: Symbol::new(
                "f".to_string(),
                Type::function(Specifier::Int, 0, Some(params)),
            ),
            body,
        }
    }

    #[test]
    fn parameters_split_between_registers_and_stack() {
        let int = Type::scalar(Specifier::Int, 0);
        let symbols: Vec<_> = (0..8)
            .map(|i| Symbol::new(format!("p{}", i), int.clone()))
            .collect();
        let function = function_of(vec![int; 8], block(&symbols, Vec::new()));

        let mut offset = 16;
        allocate_function(&function, &mut offset);

        // the first six live in registers and get spill slots
        assert_eq!(symbols[0].offset.get(), -4);
        assert_eq!(symbols[5].offset.get(), -24);

        // the rest stay where the caller pushed them
        assert_eq!(symbols[6].offset.get(), 16);
        assert_eq!(symbols[7].offset.get(), 24);

        assert_eq!(offset, -24);
    }

    #[test]
    fn char_parameters_take_promoted_slots() {
        let chr = Type::scalar(Specifier::Char, 0);
        let symbols = vec![Symbol::new("c".to_string(), chr.clone())];
        let function = function_of(vec![chr], block(&symbols, Vec::new()));

        let mut offset = 16;
        allocate_function(&function, &mut offset);

        assert_eq!(symbols[0].offset.get(), -4);
    }

    #[test]
    fn locals_continue_below_parameters() {
        let int = Type::scalar(Specifier::Int, 0);
        let symbols = vec![
            Symbol::new("a".to_string(), int.clone()),
            Symbol::new("n".to_string(), Type::array(Specifier::Long, 0, 3)),
        ];
        let function = function_of(vec![int], block(&symbols, Vec::new()));

        let mut offset = 16;
        allocate_function(&function, &mut offset);

        assert_eq!(symbols[0].offset.get(), -4);
        assert_eq!(symbols[1].offset.get(), -28);
        assert_eq!(offset, -28);
    }

    #[test]
    fn sibling_branches_share_slots() {
        let b = Symbol::new("b".to_string(), Type::scalar(Specifier::Long, 0));
        let c = Symbol::new("c".to_string(), Type::scalar(Specifier::Int, 0));

        let branch = Stmt::If {
            cond: Expr::number(1),
            then_branch: Box::new(block(&[std::rc::Rc::clone(&b)], Vec::new())),
            else_branch: Some(Box::new(block(&[std::rc::Rc::clone(&c)], Vec::new()))),
        };
        let function = function_of(Vec::new(), block(&[], vec![branch]));

        let mut offset = 16;
        allocate_function(&function, &mut offset);

        // both branches allocate from the same starting offset
        assert_eq!(b.offset.get(), -8);
        assert_eq!(c.offset.get(), -4);
        assert_eq!(offset, -8);
    }

    #[test]
    fn sibling_blocks_share_slots() {
        let a = Symbol::new("a".to_string(), Type::scalar(Specifier::Int, 0));
        let b = Symbol::new("b".to_string(), Type::scalar(Specifier::Long, 0));

        let first = block(&[std::rc::Rc::clone(&a)], Vec::new());
        let second = block(&[std::rc::Rc::clone(&b)], Vec::new());
        let function = function_of(Vec::new(), block(&[], vec![first, second]));

        let mut offset = 16;
        allocate_function(&function, &mut offset);

        assert_eq!(a.offset.get(), -4);
        assert_eq!(b.offset.get(), -8);
        assert_eq!(offset, -8);
    }
}
