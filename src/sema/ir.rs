// src/sema/ir.rs
//
// The flat instruction list a code container compiles to. Control flow is
// label-based gotos; operands are symbol handles into the global symbol
// table. The interpreter walks this list directly.

use smallvec::SmallVec;

use crate::frontend::{BinaryOp, UnaryOp};
use crate::sema::symbols::{SymbolId, SymbolTable};
use crate::sema::type_registry::{TypeId, TypeRegistry};

/// Jump target, unique within one code container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum InstKind {
    Nop,
    /// Unconditional when `cond` is None; otherwise jumps iff the condition
    /// symbol equals `jump_on`.
    Goto {
        target: Label,
        cond: Option<SymbolId>,
        jump_on: bool,
    },
    Return {
        value: Option<SymbolId>,
    },
    Binary {
        op: BinaryOp,
        lhs: SymbolId,
        rhs: SymbolId,
        dst: SymbolId,
    },
    Unary {
        op: UnaryOp,
        operand: SymbolId,
        dst: SymbolId,
    },
    /// Allocate a fresh instance of dst's class type into dst
    NewInstance {
        dst: SymbolId,
    },
    Assign {
        src: SymbolId,
        dst: SymbolId,
    },
    ReadMember {
        member: SymbolId,
        owner: SymbolId,
        dst: SymbolId,
    },
    WriteMember {
        member: SymbolId,
        value: SymbolId,
        owner: SymbolId,
    },
    /// Load an enum constant into dst
    ReadEnum {
        member: SymbolId,
        dst: SymbolId,
    },
    /// Store a payload value into an enum-typed operand
    WriteEnum {
        value: SymbolId,
        target: SymbolId,
    },
    AssignLiteral {
        dst: SymbolId,
        ty: TypeId,
        text: String,
    },
    Call {
        func: SymbolId,
        args: Vec<SymbolId>,
        dst: Option<SymbolId>,
    },
    Cast {
        operand: SymbolId,
        ty: TypeId,
        dst: SymbolId,
    },
}

/// One instruction plus the labels that land on it
#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstKind,
    pub labels: SmallVec<[Label; 2]>,
}

impl Instruction {
    pub fn new(kind: InstKind) -> Self {
        Self {
            kind,
            labels: SmallVec::new(),
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self.kind, InstKind::Return { .. })
    }
}

fn sym(symbols: &SymbolTable, id: SymbolId) -> String {
    symbols.get(id).name.clone()
}

fn opt_sym(symbols: &SymbolTable, id: Option<SymbolId>) -> String {
    id.map(|s| sym(symbols, s)).unwrap_or_default()
}

/// Render one container's instructions as the diagnostic table:
/// `Instruction | Operand1 | Operand2 | Result | Labels`.
pub fn dump_table(
    instructions: &[Instruction],
    symbols: &SymbolTable,
    types: &TypeRegistry,
) -> String {
    let mut rows = vec![[
        "Instruction".to_string(),
        "Operand1".to_string(),
        "Operand2".to_string(),
        "Result".to_string(),
        "Labels".to_string(),
    ]];

    for inst in instructions {
        let (name, op1, op2, result) = match &inst.kind {
            InstKind::Nop => ("Nop".into(), String::new(), String::new(), String::new()),
            InstKind::Goto {
                target,
                cond,
                jump_on,
            } => {
                let cond_text = match cond {
                    Some(c) => format!("{} == {}", sym(symbols, *c), jump_on),
                    None => String::new(),
                };
                ("Goto".into(), target.to_string(), cond_text, String::new())
            }
            InstKind::Return { value } => (
                "Return".into(),
                opt_sym(symbols, *value),
                String::new(),
                String::new(),
            ),
            InstKind::Binary { op, lhs, rhs, dst } => (
                format!("Binary[{}]", op.name()),
                sym(symbols, *lhs),
                sym(symbols, *rhs),
                sym(symbols, *dst),
            ),
            InstKind::Unary { op, operand, dst } => (
                format!("Unary[{}]", op.name()),
                sym(symbols, *operand),
                String::new(),
                sym(symbols, *dst),
            ),
            InstKind::NewInstance { dst } => (
                "NewInstance".into(),
                String::new(),
                String::new(),
                sym(symbols, *dst),
            ),
            InstKind::Assign { src, dst } => (
                "Assign".into(),
                sym(symbols, *src),
                String::new(),
                sym(symbols, *dst),
            ),
            InstKind::ReadMember { member, owner, dst } => (
                "ReadMember".into(),
                sym(symbols, *member),
                sym(symbols, *owner),
                sym(symbols, *dst),
            ),
            InstKind::WriteMember {
                member,
                value,
                owner,
            } => (
                "WriteMember".into(),
                sym(symbols, *member),
                sym(symbols, *value),
                sym(symbols, *owner),
            ),
            InstKind::ReadEnum { member, dst } => (
                "ReadEnum".into(),
                sym(symbols, *member),
                String::new(),
                sym(symbols, *dst),
            ),
            InstKind::WriteEnum { value, target } => (
                "WriteEnum".into(),
                sym(symbols, *value),
                String::new(),
                sym(symbols, *target),
            ),
            InstKind::AssignLiteral { dst, ty, text } => (
                "AssignLiteral".into(),
                text.clone(),
                types.full_name(*ty).to_string(),
                sym(symbols, *dst),
            ),
            InstKind::Call { func, args, dst } => {
                let arg_list = args
                    .iter()
                    .map(|a| sym(symbols, *a))
                    .collect::<Vec<_>>()
                    .join(", ");
                (
                    "Call".into(),
                    sym(symbols, *func),
                    arg_list,
                    opt_sym(symbols, *dst),
                )
            }
            InstKind::Cast { operand, ty, dst } => (
                "Cast".into(),
                sym(symbols, *operand),
                types.full_name(*ty).to_string(),
                sym(symbols, *dst),
            ),
        };
        let labels = inst
            .labels
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        rows.push([name, op1, op2, result, labels]);
    }

    let mut widths = [0usize; 5];
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = String::new();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push_str(" | ");
            }
            out.push_str(&format!("{:<width$}", cell, width = widths[i]));
        }
        out.push('\n');
    }
    out
}
