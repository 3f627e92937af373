use crate::compiler::common::expr::ExprRef;
use std::rc::Rc;

struct Names {
    qword: &'static str,
    dword: &'static str,
    byte: &'static str,
}

// The scratch pool in allocation order. Spilling picks the front of the
// list, so the longest-held register is evicted first.
const NAMES: [Names; 9] = [
    Names { qword: "%r11", dword: "%r11d", byte: "%r11b" },
    Names { qword: "%r10", dword: "%r10d", byte: "%r10b" },
    Names { qword: "%r9", dword: "%r9d", byte: "%r9b" },
    Names { qword: "%r8", dword: "%r8d", byte: "%r8b" },
    Names { qword: "%rcx", dword: "%ecx", byte: "%cl" },
    Names { qword: "%rdx", dword: "%edx", byte: "%dl" },
    Names { qword: "%rsi", dword: "%esi", byte: "%sil" },
    Names { qword: "%rdi", dword: "%edi", byte: "%dil" },
    Names { qword: "%rax", dword: "%eax", byte: "%al" },
];

/// A general-purpose register, identified by its index in the pool.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Reg(usize);

pub const RAX: Reg = Reg(8);
pub const RCX: Reg = Reg(4);
pub const RDX: Reg = Reg(5);

/// Every register of the pool, in spill order.
pub const SCRATCH: [Reg; 9] = [
    Reg(0),
    Reg(1),
    Reg(2),
    Reg(3),
    Reg(4),
    Reg(5),
    Reg(6),
    Reg(7),
    Reg(8),
];

/// The parameter-passing registers of the calling convention, in order.
pub const PARAMETERS: [Reg; 6] = [Reg(7), Reg(6), Reg(5), Reg(4), Reg(3), Reg(2)];

impl Reg {
    /// The register name for an operand of the given size in bytes.
    pub fn name(&self, size: u64) -> &'static str {
        match size {
            1 => NAMES[self.0].byte,
            4 => NAMES[self.0].dword,
            _ => NAMES[self.0].qword,
        }
    }

    pub fn byte(&self) -> &'static str {
        NAMES[self.0].byte
    }
}

/// Tracks which expression currently owns each register of the pool.
#[derive(Default)]
pub struct RegisterFile {
    nodes: [Option<ExprRef>; 9],
}

impl RegisterFile {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn node(&self, reg: Reg) -> Option<&ExprRef> {
        self.nodes[reg.0].as_ref()
    }

    pub fn set(&mut self, reg: Reg, node: Option<ExprRef>) {
        self.nodes[reg.0] = node;
    }

    pub fn first_free(&self) -> Option<Reg> {
        SCRATCH.into_iter().find(|reg| self.nodes[reg.0].is_none())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(Option::is_none)
    }

    pub fn holds(&self, reg: Reg, expr: &ExprRef) -> bool {
        matches!(&self.nodes[reg.0], Some(node) if Rc::ptr_eq(node, expr))
    }
}
