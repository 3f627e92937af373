//! Single-pass code generation for x86-64 (AT&T syntax, System V ABI)
//!
//! The generator walks each function's tree once, emitting instructions
//! as it goes. Expressions live in a small register file: `assign` binds
//! a node to a register, `load` makes a node resident and spills whatever
//! was there before, and `getreg` hands out the first free register,
//! evicting the longest-held one when the pool is full. Conditions reach
//! branches through `test`, which never materializes a boolean unless the
//! expression demands it.

pub mod allocator;
pub mod machine;
pub mod register;

use crate::compiler::codegen::machine::*;
use crate::compiler::codegen::register::*;
use crate::compiler::common::environment::{Scope, SymbolRef};
use crate::compiler::common::expr::{BinaryOp, ExprKind, ExprRef};
use crate::compiler::common::stmt::{Function, Stmt};
use crate::compiler::common::token::escape_string;
use std::collections::HashMap;
use std::io::{self, Write};

fn suffix(size: u64) -> &'static str {
    match size {
        1 => "b",
        4 => "l",
        _ => "q",
    }
}

// Bytes needed to bring the given displacement to the stack alignment.
fn align(offset: i64) -> i64 {
    if offset % STACK_ALIGNMENT == 0 {
        0
    } else {
        STACK_ALIGNMENT - offset.abs() % STACK_ALIGNMENT
    }
}

// Condition code for a relational branch, inverted when the jump is
// taken on a false condition.
fn condition(op: BinaryOp, if_true: bool) -> &'static str {
    match (op, if_true) {
        (BinaryOp::Less, true) => "l",
        (BinaryOp::Less, false) => "ge",
        (BinaryOp::Greater, true) => "g",
        (BinaryOp::Greater, false) => "le",
        (BinaryOp::LessEqual, true) => "le",
        (BinaryOp::LessEqual, false) => "g",
        (BinaryOp::GreaterEqual, true) => "ge",
        (BinaryOp::GreaterEqual, false) => "l",
        _ => unreachable!("not a relational operator"),
    }
}

fn set_instruction(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Less => "setl",
        BinaryOp::Greater => "setg",
        BinaryOp::LessEqual => "setle",
        BinaryOp::GreaterEqual => "setge",
        BinaryOp::Equal => "sete",
        BinaryOp::NotEqual => "setne",
        _ => unreachable!("not a comparison operator"),
    }
}

pub struct Generator<W: Write> {
    out: W,

    registers: RegisterFile,

    // running frame displacement, continued below the allocator's result
    // by spills
    offset: i64,

    // name of the function being generated, for its exit label
    function_name: String,

    // index of the next label
    label_index: usize,

    // interned string literals and their labels
    string_labels: HashMap<Vec<u8>, usize>,
}

impl<W: Write> Generator<W> {
    pub fn new(out: W) -> Self {
        Generator {
            out,
            registers: RegisterFile::new(),
            offset: 0,
            function_name: String::new(),
            label_index: 0,
            string_labels: HashMap::new(),
        }
    }

    fn create_label(&mut self) -> usize {
        let index = self.label_index;
        self.label_index += 1;
        index
    }

    /// Binds an expression and a register to each other, detaching any
    /// prior binding on either side. Passing `None` on one side frees the
    /// other.
    fn assign(&mut self, expr: Option<&ExprRef>, reg: Option<Reg>) {
        if let Some(expr) = expr {
            if let Some(old) = expr.register.get() {
                self.registers.set(old, None);
            }
            expr.register.set(reg);
        }

        if let Some(reg) = reg {
            if let Some(node) = self.registers.node(reg) {
                node.register.set(None);
            }
            self.registers.set(reg, expr.cloned());
        }
    }

    /// Makes the expression resident in the given register, spilling the
    /// current occupant to a fresh stack slot first. `load(None, reg)`
    /// just vacates the register.
    fn load(&mut self, expr: Option<&ExprRef>, reg: Reg) -> io::Result<()> {
        let resident = match expr {
            Some(expr) => self.registers.holds(reg, expr),
            None => self.registers.node(reg).is_none(),
        };

        if !resident {
            if let Some(node) = self.registers.node(reg).cloned() {
                let size = node.ty.size();
                self.offset -= size as i64;
                node.offset.set(self.offset);
                writeln!(
                    self.out,
                    "\tmov{}\t{}, {}(%rbp)",
                    suffix(size),
                    reg.name(size),
                    self.offset
                )?;
            }

            if let Some(expr) = expr {
                let size = expr.ty.size();
                let source = self.operand(expr);
                writeln!(self.out, "\tmov{}\t{}, {}", suffix(size), source, reg.name(size))?;
            }

            self.assign(expr, Some(reg));
        }

        Ok(())
    }

    /// The first unused register, spilling the front of the pool when
    /// everything is taken.
    fn getreg(&mut self) -> io::Result<Reg> {
        if let Some(reg) = self.registers.first_free() {
            return Ok(reg);
        }
        self.load(None, SCRATCH[0])?;
        Ok(SCRATCH[0])
    }

    fn load_if_needed(&mut self, expr: &ExprRef) -> io::Result<()> {
        if expr.register.get().is_none() {
            let reg = self.getreg()?;
            self.load(Some(expr), reg)?;
        }
        Ok(())
    }

    /// The operand text of an expression: its register if it has one,
    /// otherwise its memory or immediate form.
    fn operand(&mut self, expr: &ExprRef) -> String {
        if let Some(reg) = expr.register.get() {
            return reg.name(expr.ty.size()).to_string();
        }

        match &expr.kind {
            ExprKind::Number(value) => format!("${}", value),
            ExprKind::String(value) => {
                format!("{}{}", LABEL_PREFIX, self.string_label(value))
            }
            ExprKind::Ident(symbol) => {
                if symbol.offset.get() == 0 {
                    format!("{}(%rip)", symbol.name)
                } else {
                    format!("{}(%rbp)", symbol.offset.get())
                }
            }
            _ => {
                assert!(expr.offset.get() != 0, "temporary is neither resident nor spilled");
                format!("{}(%rbp)", expr.offset.get())
            }
        }
    }

    // Labels are interned by byte content, so identical literals share
    // one entry in the data section.
    fn string_label(&mut self, value: &[u8]) -> usize {
        if let Some(&label) = self.string_labels.get(value) {
            return label;
        }
        let label = self.create_label();
        self.string_labels.insert(value.to_vec(), label);
        label
    }

    fn expression(&mut self, expr: &ExprRef) -> io::Result<()> {
        match &expr.kind {
            // these emit no code and are referenced as operands on demand
            ExprKind::Number(_) | ExprKind::String(_) | ExprKind::Ident(_) => Ok(()),

            ExprKind::Binary { op, left, right } => match op {
                BinaryOp::Add => self.arithmetic(expr, "add", left, right),
                BinaryOp::Subtract => self.arithmetic(expr, "sub", left, right),
                BinaryOp::Multiply => self.arithmetic(expr, "imul", left, right),
                BinaryOp::Divide => self.division(expr, left, right, RAX),
                BinaryOp::Remainder => self.division(expr, left, right, RDX),
                BinaryOp::Less
                | BinaryOp::Greater
                | BinaryOp::LessEqual
                | BinaryOp::GreaterEqual
                | BinaryOp::Equal
                | BinaryOp::NotEqual => self.comparison(expr, *op, left, right),
                BinaryOp::And => self.logical_and(expr, left, right),
                BinaryOp::Or => self.logical_or(expr, left, right),
            },
            ExprKind::Not(operand) => self.not(expr, operand),
            ExprKind::Negate(operand) => self.negate(expr, operand),
            ExprKind::Address(operand) => self.address(expr, operand),
            ExprKind::Deref(operand) => self.dereference(expr, operand),
            ExprKind::Cast(operand) => self.cast(expr, operand),
            ExprKind::Call { id, args } => self.call(expr, id, args),
        }
    }

    // add, sub and imul share one shape: the result replaces the left
    // operand in its register.
    fn arithmetic(
        &mut self,
        expr: &ExprRef,
        op: &str,
        left: &ExprRef,
        right: &ExprRef,
    ) -> io::Result<()> {
        self.expression(left)?;
        self.expression(right)?;
        self.load_if_needed(left)?;

        let size = left.ty.size();
        let source = self.operand(right);
        let target = self.operand(left);
        writeln!(self.out, "\t{}{}\t{}, {}", op, suffix(size), source, target)?;

        self.assign(Some(right), None);
        let reg = left.register.get();
        self.assign(Some(expr), reg);
        Ok(())
    }

    // idiv takes the dividend in rax and leaves the quotient in rax and
    // the remainder in rdx.
    fn division(
        &mut self,
        expr: &ExprRef,
        left: &ExprRef,
        right: &ExprRef,
        result: Reg,
    ) -> io::Result<()> {
        self.expression(left)?;
        self.expression(right)?;

        self.load(Some(left), RAX)?;
        self.load(None, RDX)?;
        self.load(Some(right), RCX)?;

        let size = left.ty.size();
        writeln!(self.out, "\t{}", if size == 4 { "cltd" } else { "cqto" })?;
        writeln!(self.out, "\tidiv{}\t{}", suffix(size), RCX.name(size))?;

        self.assign(Some(left), None);
        self.assign(Some(right), None);
        self.assign(Some(expr), Some(result));
        Ok(())
    }

    fn comparison(
        &mut self,
        expr: &ExprRef,
        op: BinaryOp,
        left: &ExprRef,
        right: &ExprRef,
    ) -> io::Result<()> {
        self.expression(left)?;
        self.expression(right)?;
        self.load_if_needed(left)?;

        let size = left.ty.size();
        let source = self.operand(right);
        let target = self.operand(left);
        writeln!(self.out, "\tcmp{}\t{}, {}", suffix(size), source, target)?;

        self.assign(Some(left), None);
        self.assign(Some(right), None);

        let reg = self.getreg()?;
        self.assign(Some(expr), Some(reg));
        writeln!(self.out, "\t{}\t{}", set_instruction(op), reg.byte())?;
        writeln!(self.out, "\tmovzbl\t{}, {}", reg.byte(), reg.name(4))?;
        Ok(())
    }

    // The boolean result reuses the operand's register.
    fn not(&mut self, expr: &ExprRef, operand: &ExprRef) -> io::Result<()> {
        self.expression(operand)?;
        self.load_if_needed(operand)?;

        let size = operand.ty.size();
        let target = self.operand(operand);
        writeln!(self.out, "\tcmp{}\t$0, {}", suffix(size), target)?;

        let reg = operand.register.get().expect("operand was just loaded");
        writeln!(self.out, "\tsete\t{}", reg.byte())?;
        writeln!(self.out, "\tmovzbl\t{}, {}", reg.byte(), reg.name(4))?;

        self.assign(Some(expr), Some(reg));
        Ok(())
    }

    fn negate(&mut self, expr: &ExprRef, operand: &ExprRef) -> io::Result<()> {
        self.expression(operand)?;
        self.load_if_needed(operand)?;

        let size = operand.ty.size();
        let reg = operand.register.get().expect("operand was just loaded");
        writeln!(self.out, "\tneg{}\t{}", suffix(size), reg.name(size))?;

        self.assign(Some(expr), Some(reg));
        Ok(())
    }

    // Taking the address of a dereference reuses the pointer already in
    // hand; anything else is an object with a memory form.
    fn address(&mut self, expr: &ExprRef, operand: &ExprRef) -> io::Result<()> {
        if let Some(pointer) = operand.is_dereference() {
            self.expression(pointer)?;
            self.load_if_needed(pointer)?;
            let reg = pointer.register.get();
            self.assign(Some(expr), reg);
        } else {
            let reg = self.getreg()?;
            self.assign(Some(expr), Some(reg));
            let source = self.operand(operand);
            writeln!(self.out, "\tleaq\t{}, {}", source, reg.name(8))?;
        }
        Ok(())
    }

    fn dereference(&mut self, expr: &ExprRef, operand: &ExprRef) -> io::Result<()> {
        self.expression(operand)?;
        self.load_if_needed(operand)?;

        let size = expr.ty.size();
        let reg = operand.register.get().expect("operand was just loaded");
        writeln!(self.out, "\tmov{}\t({}), {}", suffix(size), reg.name(8), reg.name(size))?;

        self.assign(Some(expr), Some(reg));
        Ok(())
    }

    // A widening cast sign-extends in place; a narrowing cast costs
    // nothing, the register is simply used through a narrower name.
    fn cast(&mut self, expr: &ExprRef, operand: &ExprRef) -> io::Result<()> {
        self.expression(operand)?;
        self.load_if_needed(operand)?;

        let source = operand.ty.size();
        let target = expr.ty.size();
        let reg = operand.register.get().expect("operand was just loaded");

        if source < target {
            let instruction = match (source, target) {
                (1, 4) => "movsbl",
                (1, 8) => "movsbq",
                (4, 8) => "movslq",
                _ => unreachable!("no widening from {} to {} bytes", source, target),
            };
            writeln!(
                self.out,
                "\t{}\t{}, {}",
                instruction,
                reg.name(source),
                reg.name(target)
            )?;
        }

        self.assign(Some(expr), Some(reg));
        Ok(())
    }

    fn call(&mut self, expr: &ExprRef, id: &SymbolRef, args: &[ExprRef]) -> io::Result<()> {
        for arg in args.iter().rev() {
            self.expression(arg)?;
        }

        // all argument slots are eight bytes, so the stack only needs an
        // adjustment when an odd number of them is pushed
        let mut num_bytes = 0;
        if args.len() > NUM_PARAM_REGS {
            num_bytes = align((args.len() - NUM_PARAM_REGS) as i64 * SIZEOF_PARAM);
            if num_bytes > 0 {
                writeln!(self.out, "\tsubq\t${}, %rsp", num_bytes)?;
            }
        }

        for i in (0..args.len()).rev() {
            if i >= NUM_PARAM_REGS {
                num_bytes += SIZEOF_PARAM;
                self.load(Some(&args[i]), RAX)?;
                writeln!(self.out, "\tpushq\t%rax")?;
            } else {
                self.load(Some(&args[i]), PARAMETERS[i])?;
            }
            self.assign(Some(&args[i]), None);
        }

        // everything still live must survive the call in memory
        for reg in SCRATCH {
            self.load(None, reg)?;
        }

        // a callee declared without a parameter list may be variadic, and
        // the convention wants the count of vector arguments in eax
        if id.ty.parameters().is_none() {
            writeln!(self.out, "\tmovl\t$0, %eax")?;
        }

        writeln!(self.out, "\tcall\t{}", id.name)?;

        if num_bytes > 0 {
            writeln!(self.out, "\taddq\t${}, %rsp", num_bytes)?;
        }

        self.assign(Some(expr), Some(RAX));
        Ok(())
    }

    /// Branches to `label` when the expression is true or false. The
    /// relational operators compare their operands directly; everything
    /// else materializes a value and compares it against zero.
    fn test(&mut self, expr: &ExprRef, label: usize, if_true: bool) -> io::Result<()> {
        if let ExprKind::Binary {
            op:
                op @ (BinaryOp::Less
                | BinaryOp::Greater
                | BinaryOp::LessEqual
                | BinaryOp::GreaterEqual),
            left,
            right,
        } = &expr.kind
        {
            self.expression(left)?;
            self.expression(right)?;

            // cmp allows one memory operand, and an immediate only as the
            // source
            if left.register.get().is_none()
                && (left.is_number().is_some()
                    || (right.register.get().is_none() && right.is_number().is_none()))
            {
                self.load_if_needed(left)?;
            }

            let size = left.ty.size();
            let source = self.operand(right);
            let target = self.operand(left);
            writeln!(self.out, "\tcmp{}\t{}, {}", suffix(size), source, target)?;

            self.assign(Some(left), None);
            self.assign(Some(right), None);

            writeln!(
                self.out,
                "\tj{}\t{}{}",
                condition(*op, if_true),
                LABEL_PREFIX,
                label
            )?;
        } else {
            self.expression(expr)?;
            self.load_if_needed(expr)?;

            let size = expr.ty.size();
            let target = self.operand(expr);
            writeln!(self.out, "\tcmp{}\t$0, {}", suffix(size), target)?;
            writeln!(
                self.out,
                "\t{}\t{}{}",
                if if_true { "jne" } else { "je" },
                LABEL_PREFIX,
                label
            )?;

            self.assign(Some(expr), None);
        }

        Ok(())
    }

    fn logical_and(&mut self, expr: &ExprRef, left: &ExprRef, right: &ExprRef) -> io::Result<()> {
        let done = self.create_label();
        let fail = self.create_label();

        self.test(left, fail, false)?;
        self.test(right, fail, false)?;

        let reg = self.getreg()?;
        self.assign(Some(expr), Some(reg));
        writeln!(self.out, "\tmovl\t$1, {}", reg.name(4))?;
        writeln!(self.out, "\tjmp\t{}{}", LABEL_PREFIX, done)?;
        writeln!(self.out, "{}{}:", LABEL_PREFIX, fail)?;
        writeln!(self.out, "\tmovl\t$0, {}", reg.name(4))?;
        writeln!(self.out, "{}{}:", LABEL_PREFIX, done)?;
        Ok(())
    }

    fn logical_or(&mut self, expr: &ExprRef, left: &ExprRef, right: &ExprRef) -> io::Result<()> {
        let done = self.create_label();
        let success = self.create_label();

        self.test(left, success, true)?;
        self.test(right, success, true)?;

        let reg = self.getreg()?;
        self.assign(Some(expr), Some(reg));
        writeln!(self.out, "\tmovl\t$0, {}", reg.name(4))?;
        writeln!(self.out, "\tjmp\t{}{}", LABEL_PREFIX, done)?;
        writeln!(self.out, "{}{}:", LABEL_PREFIX, success)?;
        writeln!(self.out, "\tmovl\t$1, {}", reg.name(4))?;
        writeln!(self.out, "{}{}:", LABEL_PREFIX, done)?;
        Ok(())
    }

    fn assignment(&mut self, left: &ExprRef, right: &ExprRef) -> io::Result<()> {
        if let Some(pointer) = left.is_dereference() {
            self.expression(pointer)?;
            self.expression(right)?;
            self.load_if_needed(pointer)?;
            self.load_if_needed(right)?;

            let size = right.ty.size();
            let source = self.operand(right);
            let target = pointer.register.get().expect("pointer was just loaded");
            writeln!(self.out, "\tmov{}\t{}, ({})", suffix(size), source, target.name(8))?;

            self.assign(Some(pointer), None);
            self.assign(Some(right), None);
        } else {
            self.expression(right)?;
            self.load_if_needed(right)?;

            let size = right.ty.size();
            let source = self.operand(right);
            let target = self.operand(left);
            writeln!(self.out, "\tmov{}\t{}, {}", suffix(size), source, target)?;

            self.assign(Some(right), None);
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> io::Result<()> {
        match stmt {
            Stmt::Simple(expr) => {
                self.expression(expr)?;
                self.assign(Some(expr), None);
                Ok(())
            }
            Stmt::Assignment { left, right } => self.assignment(left, right),
            Stmt::Return(expr) => {
                self.expression(expr)?;
                self.load(Some(expr), RAX)?;
                writeln!(self.out, "\tjmp\t{}.exit", self.function_name)?;
                self.assign(Some(expr), None);
                Ok(())
            }
            Stmt::While { cond, body } => {
                let top = self.create_label();
                let exit = self.create_label();

                writeln!(self.out, "{}{}:", LABEL_PREFIX, top)?;
                self.test(cond, exit, false)?;
                self.statement(body)?;
                writeln!(self.out, "\tjmp\t{}{}", LABEL_PREFIX, top)?;
                writeln!(self.out, "{}{}:", LABEL_PREFIX, exit)
            }
            Stmt::For { init, cond, incr, body } => {
                let top = self.create_label();
                let exit = self.create_label();

                self.statement(init)?;
                writeln!(self.out, "{}{}:", LABEL_PREFIX, top)?;
                self.test(cond, exit, false)?;
                self.statement(body)?;
                self.statement(incr)?;
                writeln!(self.out, "\tjmp\t{}{}", LABEL_PREFIX, top)?;
                writeln!(self.out, "{}{}:", LABEL_PREFIX, exit)
            }
            Stmt::If { cond, then_branch, else_branch } => {
                let skip = self.create_label();
                let exit = self.create_label();

                self.test(cond, skip, false)?;
                self.statement(then_branch)?;

                if let Some(else_branch) = else_branch {
                    writeln!(self.out, "\tjmp\t{}{}", LABEL_PREFIX, exit)?;
                    writeln!(self.out, "{}{}:", LABEL_PREFIX, skip)?;
                    self.statement(else_branch)?;
                    writeln!(self.out, "{}{}:", LABEL_PREFIX, exit)
                } else {
                    writeln!(self.out, "{}{}:", LABEL_PREFIX, skip)
                }
            }
            Stmt::Block { stmts, .. } => {
                for stmt in stmts {
                    self.statement(stmt)?;
                    assert!(
                        self.registers.is_empty(),
                        "register still bound between statements"
                    );
                }
                Ok(())
            }
        }
    }

    /// Allocates storage for the function, then emits its prologue, the
    /// spills of register-passed parameters, the body, and the epilogue.
    /// The frame size is published as `<name>.size`, aligned to the stack
    /// boundary.
    pub fn generate_function(&mut self, function: &Function) -> io::Result<()> {
        let param_offset = 2 * SIZEOF_REG;
        self.offset = param_offset;
        allocator::allocate_function(function, &mut self.offset);

        self.function_name = function.id.name.clone();

        writeln!(self.out, "{}:", self.function_name)?;
        writeln!(self.out, "\tpushq\t%rbp")?;
        writeln!(self.out, "\tmovq\t%rsp, %rbp")?;
        writeln!(self.out, "\tmovl\t${}.size, %eax", self.function_name)?;
        writeln!(self.out, "\tsubq\t%rax, %rsp")?;

        let params = function
            .id
            .ty
            .parameters()
            .expect("function definitions carry a parameter list");
        let Stmt::Block { scope, .. } = &function.body else {
            unreachable!("function body is a block");
        };

        for i in 0..params.len().min(NUM_PARAM_REGS) {
            let symbol = &scope.symbols()[i];
            let size = symbol.ty.size();
            writeln!(
                self.out,
                "\tmov{}\t{}, {}(%rbp)",
                suffix(size),
                PARAMETERS[i].name(size),
                symbol.offset.get()
            )?;
        }

        self.statement(&function.body)?;

        writeln!(self.out)?;
        writeln!(self.out, "{}.exit:", self.function_name)?;
        writeln!(self.out, "\tmovq\t%rbp, %rsp")?;
        writeln!(self.out, "\tpopq\t%rbp")?;
        writeln!(self.out, "\tret")?;
        writeln!(self.out)?;

        self.offset -= align(self.offset - param_offset);
        writeln!(self.out, "\t.set\t{}.size, {}", self.function_name, -self.offset)?;
        writeln!(self.out, "\t.globl\t{}", self.function_name)?;
        writeln!(self.out)
    }

    /// Emits a `.comm` for every global object and the interned string
    /// literals, in label order, as a data section.
    pub fn generate_globals(&mut self, globals: &Scope) -> io::Result<()> {
        for symbol in globals.symbols() {
            if !symbol.ty.is_function() {
                writeln!(self.out, "\t.comm\t{}, {}", symbol.name, symbol.ty.size())?;
            }
        }

        writeln!(self.out, "\t.data")?;

        let mut strings: Vec<(&Vec<u8>, usize)> =
            self.string_labels.iter().map(|(value, &label)| (value, label)).collect();
        strings.sort_by_key(|&(_, label)| label);

        for (value, label) in strings {
            writeln!(
                self.out,
                "{}{}:\t.asciz\t\"{}\"",
                LABEL_PREFIX,
                label,
                escape_string(value)
            )?;
        }

        Ok(())
    }
}
