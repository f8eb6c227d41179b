use std::fmt;

use crate::symbols::Type;

/// Types carried by IR values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrType {
    I32,
    I8,
    I1,
    Ptr,
    Void,
}

impl IrType {
    pub fn from_lang(ty: Type) -> IrType {
        match ty {
            Type::Int => IrType::I32,
            Type::Char => IrType::I8,
            Type::String | Type::Pointer => IrType::Ptr,
            Type::Void => IrType::Void,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            IrType::I32 => "i32",
            IrType::I8 => "i8",
            IrType::I1 => "i1",
            IrType::Ptr => "ptr",
            IrType::Void => "void",
        };
        write!(f, "{}", repr)
    }
}

pub type BlockId = usize;
pub type ValueId = usize;
pub type SlotId = usize;

/// A stack slot holding one local or one array allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub ty: IrType,
    /// Element count; 1 for scalars.
    pub len: usize,
    /// Static-sized array slots take the two-index access form; dynamic
    /// allocations take the one-index pointer form.
    pub is_static_array: bool,
}

/// A module-level variable: one scalar or array allocation in static
/// storage, created from a top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVar {
    pub name: String,
    pub ty: IrType,
    /// Element count; 1 for scalars.
    pub len: usize,
    /// Constant initializer values; empty means zero-initialized.
    pub init: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Const(i64, IrType),
    Value(ValueId, IrType),
    /// Address of a stack slot.
    Slot(SlotId),
    /// Address of a module global variable.
    Global(usize),
    /// Address of an interned string constant.
    Str(usize),
}

impl Operand {
    pub fn ty(&self) -> IrType {
        match self {
            Operand::Const(_, ty) => *ty,
            Operand::Value(_, ty) => *ty,
            Operand::Slot(_) => IrType::Ptr,
            Operand::Global(_) => IrType::Ptr,
            Operand::Str(_) => IrType::Ptr,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(v, ty) => write!(f, "{} {}", ty, v),
            Operand::Value(id, ty) => write!(f, "{} %v{}", ty, id),
            Operand::Slot(id) => write!(f, "ptr %s{}", id),
            Operand::Global(id) => write!(f, "ptr @g{}", id),
            Operand::Str(id) => write!(f, "ptr @str.{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinOp {
    Add,
    Sub,
    Mul,
    Sdiv,
    Srem,
}

impl fmt::Display for IrBinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            IrBinOp::Add => "add",
            IrBinOp::Sub => "sub",
            IrBinOp::Mul => "mul",
            IrBinOp::Sdiv => "sdiv",
            IrBinOp::Srem => "srem",
        };
        write!(f, "{}", repr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrCond {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl fmt::Display for IrCond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            IrCond::Eq => "eq",
            IrCond::Ne => "ne",
            IrCond::Slt => "slt",
            IrCond::Sle => "sle",
            IrCond::Sgt => "sgt",
            IrCond::Sge => "sge",
        };
        write!(f, "{}", repr)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Load {
        dst: ValueId,
        ty: IrType,
        addr: Operand,
    },
    Store {
        value: Operand,
        addr: Operand,
    },
    Bin {
        dst: ValueId,
        op: IrBinOp,
        ty: IrType,
        lhs: Operand,
        rhs: Operand,
    },
    Cmp {
        dst: ValueId,
        cond: IrCond,
        lhs: Operand,
        rhs: Operand,
    },
    /// Address of an array element: base allocation plus scaled index.
    Gep {
        dst: ValueId,
        base: Operand,
        elem_ty: IrType,
        index: Operand,
        /// `Some(len)` selects the two-index static-array form.
        static_len: Option<usize>,
    },
    Call {
        dst: Option<(ValueId, IrType)>,
        callee: String,
        args: Vec<Operand>,
    },
    /// Integer-width change, used to bring array indices to address width.
    Cast {
        dst: ValueId,
        value: Operand,
        to: IrType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret(Option<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub instrs: Vec<Inst>,
    pub terminator: Option<Terminator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<IrType>,
    pub ret: IrType,
    pub is_variadic: bool,
    pub is_definition: bool,
    pub slots: Vec<Slot>,
    pub blocks: Vec<Block>,
    pub value_count: usize,
}

/// The in-memory IR of one compilation unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub name: String,
    pub target: String,
    pub strings: Vec<String>,
    pub globals: Vec<GlobalVar>,
    pub functions: Vec<IrFunction>,
}

impl Module {
    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Index of the module global with the given name.
    pub fn global(&self, name: &str) -> Option<usize> {
        self.globals.iter().position(|g| g.name == name)
    }

    /// Intern a string constant, returning its global index.
    pub fn intern_string(&mut self, value: &str) -> usize {
        if let Some(idx) = self.strings.iter().position(|s| s == value) {
            return idx;
        }
        self.strings.push(value.to_string());
        self.strings.len() - 1
    }

    /// Render the module as an assembly-style listing: one flat stream of
    /// labels and operations, target detail left to a real assembler.
    pub fn to_assembly(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("; target {}\n", self.target));
        for (i, s) in self.strings.iter().enumerate() {
            out.push_str(&format!("str.{}: .asciz \"{}\"\n", i, s.escape_default()));
        }
        for (i, g) in self.globals.iter().enumerate() {
            if g.init.is_empty() {
                out.push_str(&format!("g{}: .zero {}  ; {}\n", i, g.len, g.name));
            } else {
                let values = g
                    .init
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<String>>()
                    .join(", ");
                out.push_str(&format!("g{}: .quad {}  ; {}\n", i, values, g.name));
            }
        }
        for f in &self.functions {
            if !f.is_definition {
                continue;
            }
            out.push_str(&format!("{}:\n", f.name));
            for (i, slot) in f.slots.iter().enumerate() {
                out.push_str(&format!("    ; slot {} = {} x{}\n", i, slot.name, slot.len));
            }
            for block in &f.blocks {
                out.push_str(&format!(".{}.{}:\n", f.name, block.label));
                for inst in &block.instrs {
                    out.push_str(&format!("    {}\n", fmt_inst(inst)));
                }
                if let Some(term) = &block.terminator {
                    out.push_str(&format!("    {}\n", fmt_terminator(term, f)));
                }
            }
        }
        out
    }
}

fn fmt_inst(inst: &Inst) -> String {
    match inst {
        Inst::Load { dst, ty, addr } => format!("%v{} = load {}, {}", dst, ty, addr),
        Inst::Store { value, addr } => format!("store {}, {}", value, addr),
        Inst::Bin {
            dst,
            op,
            ty,
            lhs,
            rhs,
        } => format!("%v{} = {} {} {}, {}", dst, op, ty, lhs, rhs),
        Inst::Cmp {
            dst,
            cond,
            lhs,
            rhs,
        } => format!("%v{} = icmp {} {}, {}", dst, cond, lhs, rhs),
        Inst::Gep {
            dst,
            base,
            elem_ty,
            index,
            static_len,
        } => match static_len {
            Some(len) => format!(
                "%v{} = getelementptr [{} x {}], {}, i32 0, {}",
                dst, len, elem_ty, base, index
            ),
            None => format!("%v{} = getelementptr {}, {}, {}", dst, elem_ty, base, index),
        },
        Inst::Call { dst, callee, args } => {
            let mut rendered = String::new();
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    rendered.push_str(", ");
                }
                rendered.push_str(&arg.to_string());
            }
            match dst {
                Some((id, ty)) => format!("%v{} = call {} @{}({})", id, ty, callee, rendered),
                None => format!("call void @{}({})", callee, rendered),
            }
        }
        Inst::Cast { dst, value, to } => format!("%v{} = sext {} to {}", dst, value, to),
    }
}

fn fmt_terminator(term: &Terminator, f: &IrFunction) -> String {
    let label = |id: &BlockId| -> String {
        f.blocks
            .get(*id)
            .map(|b| b.label.clone())
            .unwrap_or_else(|| format!("bb{}", id))
    };
    match term {
        Terminator::Br(target) => format!("br label %{}", label(target)),
        Terminator::CondBr {
            cond,
            then_block,
            else_block,
        } => format!(
            "br {}, label %{}, label %{}",
            cond,
            label(then_block),
            label(else_block)
        ),
        Terminator::Ret(None) => "ret void".to_string(),
        Terminator::Ret(Some(value)) => format!("ret {}", value),
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module '{}'", self.name)?;
        writeln!(f, "target triple = \"{}\"", self.target)?;
        for (i, s) in self.strings.iter().enumerate() {
            writeln!(f, "@str.{} = private constant \"{}\"", i, s.escape_default())?;
        }
        for (i, g) in self.globals.iter().enumerate() {
            if g.len == 1 {
                let init = g.init.first().copied().unwrap_or(0);
                writeln!(f, "@g{} = global {} {}  ; {}", i, g.ty, init, g.name)?;
            } else if g.init.is_empty() {
                writeln!(
                    f,
                    "@g{} = global [{} x {}] zeroinitializer  ; {}",
                    i, g.len, g.ty, g.name
                )?;
            } else {
                let values = g
                    .init
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<String>>()
                    .join(", ");
                writeln!(
                    f,
                    "@g{} = global [{} x {}] [{}]  ; {}",
                    i, g.len, g.ty, values, g.name
                )?;
            }
        }
        for func in &self.functions {
            writeln!(f)?;
            let mut params = String::new();
            for (i, ty) in func.params.iter().enumerate() {
                if i > 0 {
                    params.push_str(", ");
                }
                params.push_str(&ty.to_string());
            }
            if func.is_variadic {
                if !params.is_empty() {
                    params.push_str(", ");
                }
                params.push_str("...");
            }

            if !func.is_definition {
                writeln!(f, "declare {} @{}({})", func.ret, func.name, params)?;
                continue;
            }

            writeln!(f, "define {} @{}({}) {{", func.ret, func.name, params)?;
            for (i, slot) in func.slots.iter().enumerate() {
                if slot.len == 1 {
                    writeln!(f, "  %s{} = alloca {}  ; {}", i, slot.ty, slot.name)?;
                } else {
                    writeln!(
                        f,
                        "  %s{} = alloca {} x {}  ; {}",
                        i, slot.len, slot.ty, slot.name
                    )?;
                }
            }
            for block in &func.blocks {
                writeln!(f, "{}:", block.label)?;
                for inst in &block.instrs {
                    writeln!(f, "  {}", fmt_inst(inst))?;
                }
                if let Some(term) = &block.terminator {
                    writeln!(f, "  {}", fmt_terminator(term, func))?;
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
