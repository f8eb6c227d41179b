use std::collections::HashMap;
use std::fs;

use log::info;

use crate::ast::node::{
    BinaryOp, ExprKind, ExprNode, FnBody, FnNode, InstrKind, InstrNode, LoopKind, LoopNode,
    MatchPattern, RelNode, RelOp, TermKind, TermNode,
};
use crate::ast::Ast;
use crate::cstate::{CompileState, OptLevel};
use crate::diag::Diagnostics;
use crate::error::CompileError;
use crate::fstate::FileState;
use crate::semantic::evaluate_const_expr;
use crate::symbols::FnTable;

use super::ir::{
    Block, BlockId, GlobalVar, Inst, IrBinOp, IrCond, IrFunction, IrType, Module, Operand, Slot,
    SlotId, Terminator,
};
use super::{link, passes, Backend};

/// The reference backend: lowers the AST to the in-memory IR, runs the
/// selected pass pipeline, and serializes the result.
pub struct IrBackend;

impl Backend for IrBackend {
    fn setup(&mut self, cst: &CompileState) {
        if cst.options.verbose {
            info!("Backend ready for target {}", cst.target.triple);
        }
    }

    fn compile(
        &mut self,
        cst: &CompileState,
        fst: &mut FileState,
        program: &Ast<'_>,
        functions: &FnTable<'_>,
    ) {
        let module = lower_module(
            program,
            functions,
            &fst.stem,
            &cst.target.triple,
            &mut fst.diag,
        );
        fst.ir = Some(module);
    }

    fn optimize(&mut self, cst: &CompileState, fst: &mut FileState) {
        let Some(module) = fst.ir.as_mut() else {
            return;
        };
        match cst.options.opt_level {
            OptLevel::O0 => {}
            OptLevel::O1 => passes::fold_constants(module),
            OptLevel::O2 | OptLevel::O3 | OptLevel::Os | OptLevel::Oz => {
                passes::fold_constants(module);
                passes::prune_unreachable_blocks(module);
            }
        }
    }

    fn emit(&mut self, cst: &CompileState, fst: &mut FileState) -> Result<(), CompileError> {
        let Some(module) = fst.ir.as_ref() else {
            return Ok(());
        };

        if cst.options.emit_llvm {
            let mut path = fst.extracted.clone();
            path.set_extension("ll");
            fs::write(&path, module.to_string())
                .map_err(|source| CompileError::Write { path, source })?;
        }

        if cst.options.emit_asm {
            let mut path = fst.extracted.clone();
            path.set_extension("s");
            fs::write(&path, module.to_assembly())
                .map_err(|source| CompileError::Write { path, source })?;
        }

        if let Some(parent) = fst.obj_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| CompileError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        fs::write(&fst.obj_path, module.to_string()).map_err(|source| CompileError::Write {
            path: fst.obj_path.clone(),
            source,
        })?;

        Ok(())
    }

    fn cleanup(&mut self, _cst: &CompileState, fst: &mut FileState) {
        fst.ir = None;
    }

    fn link(&mut self, cst: &CompileState) -> Result<(), CompileError> {
        if cst.options.compile_only {
            return Ok(());
        }
        link::link_objects(&cst.output_filepath, &cst.obj_file_list)
    }
}

/// Fold a global initializer element to a constant. Character literals fold
/// to their code points; anything non-constant is an error.
fn fold_global_init(expr: &ExprNode<'_>, diag: &mut Diagnostics) -> i64 {
    match &expr.kind {
        ExprKind::Term(term) => match term.kind {
            TermKind::Int(value) => value,
            TermKind::Char(c) => c as i64,
            _ => {
                diag.error_at(expr.line, "Global initializer must be a constant expression");
                0
            }
        },
        ExprKind::Binary { .. } => evaluate_const_expr(expr, diag),
    }
}

/// Lower a whole compilation unit into an IR module.
///
/// Top-level variable instructions become module globals in static storage.
/// Every signature known to the semantic analyzer is registered up front so
/// call sites resolve regardless of definition order within the file.
pub fn lower_module(
    program: &Ast<'_>,
    functions: &FnTable<'_>,
    module_name: &str,
    target: &str,
    diag: &mut Diagnostics,
) -> Module {
    let mut module = Module {
        name: module_name.to_string(),
        target: target.to_string(),
        ..Default::default()
    };

    for instr in &program.instrs {
        match &instr.kind {
            InstrKind::Declare(var) => {
                module.globals.push(GlobalVar {
                    name: var.name.to_string(),
                    ty: IrType::from_lang(var.ty),
                    len: 1,
                    init: Vec::new(),
                });
            }
            InstrKind::Initialize { var, expr } => {
                let init = fold_global_init(expr, diag);
                module.globals.push(GlobalVar {
                    name: var.name.to_string(),
                    ty: IrType::from_lang(var.ty),
                    len: 1,
                    init: vec![init],
                });
            }
            InstrKind::DeclareArray { var, size } => {
                let len = evaluate_const_expr(size, diag).max(0) as usize;
                module.globals.push(GlobalVar {
                    name: var.name.to_string(),
                    ty: IrType::from_lang(var.ty),
                    len,
                    init: Vec::new(),
                });
            }
            InstrKind::InitializeArray {
                var,
                size,
                elements,
            } => {
                let len = evaluate_const_expr(size, diag).max(0) as usize;
                let init = elements
                    .iter()
                    .map(|elem| fold_global_init(elem, diag))
                    .collect();
                module.globals.push(GlobalVar {
                    name: var.name.to_string(),
                    ty: IrType::from_lang(var.ty),
                    len,
                    init,
                });
            }
            _ => {}
        }
    }

    for f in functions.iter() {
        module.functions.push(IrFunction {
            name: f.name.clone(),
            params: f.params.iter().map(|p| IrType::from_lang(p.ty)).collect(),
            ret: f
                .return_types
                .first()
                .copied()
                .map(IrType::from_lang)
                .unwrap_or(IrType::Void),
            is_variadic: f.is_variadic,
            is_definition: false,
            slots: Vec::new(),
            blocks: Vec::new(),
            value_count: 0,
        });
    }

    for instr in &program.instrs {
        match &instr.kind {
            InstrKind::Fn(fn_node) => {
                if let FnBody::Defined(body) = fn_node.body {
                    let lowered = FnLowering::new(&mut module, fn_node, diag).lower(body);
                    match module
                        .functions
                        .iter()
                        .position(|f| f.name == lowered.name)
                    {
                        Some(idx) => module.functions[idx] = lowered,
                        None => module.functions.push(lowered),
                    }
                }
            }
            InstrKind::Declare(_)
            | InstrKind::Initialize { .. }
            | InstrKind::DeclareArray { .. }
            | InstrKind::InitializeArray { .. } => {}
            _ => {
                diag.error_at(instr.line, "Instruction outside function");
            }
        }
    }

    module
}

/// A resolved variable reference: the address of its allocation plus the
/// allocation's shape.
#[derive(Clone, Copy)]
struct VarRef {
    addr: Operand,
    ty: IrType,
    len: usize,
    is_static_array: bool,
}

/// Per-function emission frame.
///
/// Holds the function under construction, the name-to-slot map, the
/// label-to-block map for goto resolution, and the innermost loop's header
/// and exit, saved and restored around each nested loop.
struct FnLowering<'m, 'x> {
    module: &'m mut Module,
    fun: IrFunction,
    current: BlockId,
    slots: HashMap<String, SlotId>,
    label_blocks: HashMap<String, BlockId>,
    loop_header: Option<BlockId>,
    loop_exit: Option<BlockId>,
    next_value: usize,
    diag: &'x mut Diagnostics,
}

impl<'m, 'x> FnLowering<'m, 'x> {
    fn new(module: &'m mut Module, fn_node: &FnNode<'_>, diag: &'x mut Diagnostics) -> Self {
        let params: Vec<IrType> = fn_node
            .params
            .iter()
            .map(|p| IrType::from_lang(p.ty))
            .collect();
        let ret = fn_node
            .return_types
            .first()
            .copied()
            .map(IrType::from_lang)
            .unwrap_or(IrType::Void);

        let mut lowering = Self {
            module,
            fun: IrFunction {
                name: fn_node.name.to_string(),
                params,
                ret,
                is_variadic: fn_node.is_variadic,
                is_definition: true,
                slots: Vec::new(),
                blocks: vec![Block {
                    label: "entry".to_string(),
                    instrs: Vec::new(),
                    terminator: None,
                }],
                value_count: 0,
            },
            current: 0,
            slots: HashMap::new(),
            label_blocks: HashMap::new(),
            loop_header: None,
            loop_exit: None,
            // Incoming parameter values occupy %v0..%vN-1
            next_value: fn_node.params.len(),
            diag,
        };

        // A slot per parameter, storing the incoming value
        for (i, param) in fn_node.params.iter().enumerate() {
            let ty = IrType::from_lang(param.ty);
            let slot = lowering.add_slot(param.name, ty, 1, false);
            lowering.push(Inst::Store {
                value: Operand::Value(i, ty),
                addr: Operand::Slot(slot),
            });
        }

        lowering
    }

    fn lower(mut self, body: &[InstrNode<'_>]) -> IrFunction {
        self.lower_block(body);

        // An unterminated final path returns the return type's null value
        if !self.terminated() {
            if self.fun.ret == IrType::Void {
                self.terminate(Terminator::Ret(None));
            } else {
                self.terminate(Terminator::Ret(Some(Operand::Const(0, self.fun.ret))));
            }
        }

        self.fun.value_count = self.next_value;
        self.fun
    }

    // ========== Frame helpers ==========

    fn new_value(&mut self) -> usize {
        let id = self.next_value;
        self.next_value += 1;
        id
    }

    fn new_block(&mut self, prefix: &str) -> BlockId {
        let label = format!("{}.{}", prefix, self.fun.blocks.len());
        self.fun.blocks.push(Block {
            label,
            instrs: Vec::new(),
            terminator: None,
        });
        self.fun.blocks.len() - 1
    }

    fn push(&mut self, inst: Inst) {
        self.fun.blocks[self.current].instrs.push(inst);
    }

    fn terminated(&self) -> bool {
        self.fun.blocks[self.current].terminator.is_some()
    }

    /// Attach a terminator unless the current block already has one.
    fn terminate(&mut self, term: Terminator) {
        let block = &mut self.fun.blocks[self.current];
        if block.terminator.is_none() {
            block.terminator = Some(term);
        }
    }

    fn set_current(&mut self, block: BlockId) {
        self.current = block;
    }

    fn add_slot(&mut self, name: &str, ty: IrType, len: usize, is_static_array: bool) -> SlotId {
        let id = self.fun.slots.len();
        self.fun.slots.push(Slot {
            name: name.to_string(),
            ty,
            len,
            is_static_array,
        });
        self.slots.insert(name.to_string(), id);
        id
    }

    /// Resolve a name against the per-function symbol map, falling back to
    /// the module's globals.
    fn resolve_var(&self, name: &str) -> Option<VarRef> {
        if let Some(&slot) = self.slots.get(name) {
            let s = &self.fun.slots[slot];
            return Some(VarRef {
                addr: Operand::Slot(slot),
                ty: s.ty,
                len: s.len,
                is_static_array: s.is_static_array,
            });
        }
        self.module.global(name).map(|idx| {
            let g = &self.module.globals[idx];
            VarRef {
                addr: Operand::Global(idx),
                ty: g.ty,
                len: g.len,
                // Global arrays live in fixed storage and take the
                // two-index access form
                is_static_array: g.len > 1,
            }
        })
    }

    /// The first reference to a label, from either a goto or the label
    /// itself, allocates its block; the second attaches or jumps to it.
    fn label_block(&mut self, label: &str) -> BlockId {
        if let Some(&block) = self.label_blocks.get(label) {
            return block;
        }
        let block = self.fun.blocks.len();
        self.fun.blocks.push(Block {
            label: label.to_string(),
            instrs: Vec::new(),
            terminator: None,
        });
        self.label_blocks.insert(label.to_string(), block);
        block
    }

    // ========== Lowering ==========

    /// Lower a sequence of instructions. Instructions after a terminator
    /// are dead and skipped, except labels, which open a fresh block.
    fn lower_block(&mut self, instrs: &[InstrNode<'_>]) {
        for instr in instrs {
            if self.terminated() && !matches!(instr.kind, InstrKind::Label(_)) {
                continue;
            }
            self.lower_instr(instr);
        }
    }

    fn lower_instr(&mut self, instr: &InstrNode<'_>) {
        match &instr.kind {
            InstrKind::Declare(var) => {
                let ty = IrType::from_lang(var.ty);
                self.add_slot(var.name, ty, 1, false);
            }

            InstrKind::Initialize { var, expr } => {
                let ty = IrType::from_lang(var.ty);
                let slot = self.add_slot(var.name, ty, 1, false);
                if let Some(value) = self.lower_expr(expr) {
                    self.push(Inst::Store {
                        value,
                        addr: Operand::Slot(slot),
                    });
                }
            }

            InstrKind::DeclareArray { var, size } => {
                let len = evaluate_const_expr(size, self.diag).max(0) as usize;
                let ty = IrType::from_lang(var.ty);
                // Constant-sized declaration gets the static array form
                self.add_slot(var.name, ty, len, true);
            }

            InstrKind::InitializeArray {
                var,
                size,
                elements,
            } => {
                let len = evaluate_const_expr(size, self.diag).max(0) as usize;
                let ty = IrType::from_lang(var.ty);
                // Initialized arrays allocate as a dynamically sized run of
                // elements and take the one-index pointer access form
                let slot = self.add_slot(var.name, ty, len, false);
                for (i, elem) in elements.iter().enumerate() {
                    let Some(value) = self.lower_expr(elem) else {
                        continue;
                    };
                    let addr = self.new_value();
                    self.push(Inst::Gep {
                        dst: addr,
                        base: Operand::Slot(slot),
                        elem_ty: ty,
                        index: Operand::Const(i as i64, IrType::I32),
                        static_len: None,
                    });
                    self.push(Inst::Store {
                        value,
                        addr: Operand::Value(addr, IrType::Ptr),
                    });
                }
            }

            InstrKind::Assign { target, expr } => {
                let Some(var) = self.resolve_var(target.name) else {
                    self.diag.error_at(
                        instr.line,
                        format!("Unknown variable '{}' in assignment", target.name),
                    );
                    return;
                };
                if let Some(value) = self.lower_expr(expr) {
                    self.push(Inst::Store {
                        value,
                        addr: var.addr,
                    });
                }
            }

            InstrKind::AssignToSubscript { array, index, expr } => {
                let Some(var) = self.resolve_var(array.name) else {
                    self.diag
                        .error_at(instr.line, format!("Unknown array '{}'", array.name));
                    return;
                };
                let Some(index_val) = self.lower_expr(index) else {
                    return;
                };
                let index_val = self.index_to_address_width(index_val);
                let static_len = if var.is_static_array {
                    Some(var.len)
                } else {
                    None
                };
                let addr = self.new_value();
                self.push(Inst::Gep {
                    dst: addr,
                    base: var.addr,
                    elem_ty: var.ty,
                    index: index_val,
                    static_len,
                });
                if let Some(value) = self.lower_expr(expr) {
                    self.push(Inst::Store {
                        value,
                        addr: Operand::Value(addr, IrType::Ptr),
                    });
                }
            }

            InstrKind::If { rel, then, else_ } => {
                let cond = self
                    .lower_rel(rel)
                    .unwrap_or(Operand::Const(0, IrType::I1));
                let then_block = self.new_block("if.then");
                let merge_block = self.new_block("if.end");
                let else_block = match else_ {
                    Some(_) => self.new_block("if.else"),
                    None => merge_block,
                };
                self.terminate(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                });

                self.set_current(then_block);
                self.lower_block(then.instrs());
                self.terminate(Terminator::Br(merge_block));

                if let Some(else_body) = else_ {
                    self.set_current(else_block);
                    self.lower_block(else_body.instrs());
                    self.terminate(Terminator::Br(merge_block));
                }

                self.set_current(merge_block);
            }

            InstrKind::Match { expr, cases } => self.lower_match(expr, cases),

            InstrKind::Goto(label) => {
                let target = self.label_block(label);
                self.terminate(Terminator::Br(target));
            }

            InstrKind::Label(label) => {
                let block = self.label_block(label);
                self.terminate(Terminator::Br(block));
                self.set_current(block);
            }

            InstrKind::Loop(loop_node) => self.lower_loop(loop_node),

            InstrKind::Break => match self.loop_exit {
                Some(exit) => self.terminate(Terminator::Br(exit)),
                None => self
                    .diag
                    .error_at(instr.line, "Break statement outside loop"),
            },

            InstrKind::Continue => match self.loop_header {
                Some(header) => self.terminate(Terminator::Br(header)),
                None => self
                    .diag
                    .error_at(instr.line, "Continue statement outside loop"),
            },

            InstrKind::Fn(_) => {
                self.diag
                    .error_at(instr.line, "Nested function definitions are not supported");
            }

            InstrKind::Return(values) => match values.first() {
                None => self.terminate(Terminator::Ret(None)),
                Some(value) => match self.lower_expr(value) {
                    Some(value) => self.terminate(Terminator::Ret(Some(value))),
                    None => self.terminate(Terminator::Ret(None)),
                },
            },

            InstrKind::Call { name, args } => {
                self.lower_call(name, args, instr.line);
            }
        }
    }

    fn lower_match(&mut self, expr: &ExprNode<'_>, cases: &[crate::ast::node::MatchCase<'_>]) {
        let Some(subject) = self.lower_expr(expr) else {
            return;
        };
        let merge = self.new_block("match.end");

        for case in cases {
            let body_block = self.new_block("match.body");
            let next_block = self.new_block("match.next");

            match &case.pattern {
                MatchPattern::Values(values) => {
                    if values.is_empty() {
                        self.terminate(Terminator::Br(next_block));
                    }
                    for (i, value) in values.iter().enumerate() {
                        let lowered = self
                            .lower_expr(value)
                            .unwrap_or(Operand::Const(0, IrType::I32));
                        let cond = self.new_value();
                        self.push(Inst::Cmp {
                            dst: cond,
                            cond: IrCond::Eq,
                            lhs: subject,
                            rhs: lowered,
                        });
                        let is_last = i + 1 == values.len();
                        let else_target = if is_last {
                            next_block
                        } else {
                            self.new_block("match.test")
                        };
                        self.terminate(Terminator::CondBr {
                            cond: Operand::Value(cond, IrType::I1),
                            then_block: body_block,
                            else_block: else_target,
                        });
                        if !is_last {
                            self.set_current(else_target);
                        }
                    }
                }
                MatchPattern::Range { start, end } => {
                    let start_val = self
                        .lower_expr(start)
                        .unwrap_or(Operand::Const(0, IrType::I32));
                    let low = self.new_value();
                    self.push(Inst::Cmp {
                        dst: low,
                        cond: IrCond::Sge,
                        lhs: subject,
                        rhs: start_val,
                    });
                    let hi_block = self.new_block("match.range");
                    self.terminate(Terminator::CondBr {
                        cond: Operand::Value(low, IrType::I1),
                        then_block: hi_block,
                        else_block: next_block,
                    });

                    self.set_current(hi_block);
                    let end_val = self
                        .lower_expr(end)
                        .unwrap_or(Operand::Const(0, IrType::I32));
                    let high = self.new_value();
                    self.push(Inst::Cmp {
                        dst: high,
                        cond: IrCond::Sle,
                        lhs: subject,
                        rhs: end_val,
                    });
                    self.terminate(Terminator::CondBr {
                        cond: Operand::Value(high, IrType::I1),
                        then_block: body_block,
                        else_block: next_block,
                    });
                }
                MatchPattern::Default => {
                    self.terminate(Terminator::Br(body_block));
                }
            }

            self.set_current(body_block);
            self.lower_block(case.body.instrs());
            self.terminate(Terminator::Br(merge));

            self.set_current(next_block);
        }

        self.terminate(Terminator::Br(merge));
        self.set_current(merge);
    }

    fn lower_loop(&mut self, loop_node: &LoopNode<'_>) {
        let saved_header = self.loop_header;
        let saved_exit = self.loop_exit;

        match &loop_node.kind {
            LoopKind::For {
                iterator,
                start,
                end,
            } => {
                let slot = match self.slots.get(*iterator).copied() {
                    Some(slot) => slot,
                    None => self.add_slot(iterator, IrType::I32, 1, false),
                };
                let start_val = self
                    .lower_expr(start)
                    .unwrap_or(Operand::Const(0, IrType::I32));
                self.push(Inst::Store {
                    value: start_val,
                    addr: Operand::Slot(slot),
                });

                let header = self.new_block("for.header");
                let body_block = self.new_block("for.body");
                let inc_block = self.new_block("for.inc");
                let exit = self.new_block("for.exit");

                self.terminate(Terminator::Br(header));
                self.set_current(header);
                let it = self.new_value();
                self.push(Inst::Load {
                    dst: it,
                    ty: IrType::I32,
                    addr: Operand::Slot(slot),
                });
                let end_val = self
                    .lower_expr(end)
                    .unwrap_or(Operand::Const(0, IrType::I32));
                let cond = self.new_value();
                self.push(Inst::Cmp {
                    dst: cond,
                    cond: IrCond::Slt,
                    lhs: Operand::Value(it, IrType::I32),
                    rhs: end_val,
                });
                self.terminate(Terminator::CondBr {
                    cond: Operand::Value(cond, IrType::I1),
                    then_block: body_block,
                    else_block: exit,
                });

                // continue re-enters at the increment, not the test
                self.loop_header = Some(inc_block);
                self.loop_exit = Some(exit);

                self.set_current(body_block);
                self.lower_block(loop_node.body);
                self.terminate(Terminator::Br(inc_block));

                self.set_current(inc_block);
                let it2 = self.new_value();
                self.push(Inst::Load {
                    dst: it2,
                    ty: IrType::I32,
                    addr: Operand::Slot(slot),
                });
                let next = self.new_value();
                self.push(Inst::Bin {
                    dst: next,
                    op: IrBinOp::Add,
                    ty: IrType::I32,
                    lhs: Operand::Value(it2, IrType::I32),
                    rhs: Operand::Const(1, IrType::I32),
                });
                self.push(Inst::Store {
                    value: Operand::Value(next, IrType::I32),
                    addr: Operand::Slot(slot),
                });
                self.terminate(Terminator::Br(header));

                self.set_current(exit);
            }

            _ => {
                let header = self.new_block("loop.header");
                let body_block = self.new_block("loop.body");
                let exit = self.new_block("loop.exit");

                self.loop_header = Some(header);
                self.loop_exit = Some(exit);

                self.terminate(Terminator::Br(header));
                self.set_current(header);
                match &loop_node.kind {
                    LoopKind::While(rel) => {
                        let cond = self
                            .lower_rel(rel)
                            .unwrap_or(Operand::Const(0, IrType::I1));
                        self.terminate(Terminator::CondBr {
                            cond,
                            then_block: body_block,
                            else_block: exit,
                        });
                    }
                    _ => self.terminate(Terminator::Br(body_block)),
                }

                self.set_current(body_block);
                self.lower_block(loop_node.body);

                match &loop_node.kind {
                    LoopKind::DoWhile(rel) => {
                        if !self.terminated() {
                            let cond = self
                                .lower_rel(rel)
                                .unwrap_or(Operand::Const(0, IrType::I1));
                            self.terminate(Terminator::CondBr {
                                cond,
                                then_block: header,
                                else_block: exit,
                            });
                        }
                    }
                    _ => self.terminate(Terminator::Br(header)),
                }

                self.set_current(exit);
            }
        }

        self.loop_header = saved_header;
        self.loop_exit = saved_exit;
    }

    /// Arguments are lowered left to right; an unknown callee is a
    /// diagnostic and the call is skipped, but lowering continues.
    fn lower_call(&mut self, name: &str, args: &[ExprNode<'_>], line: usize) -> Option<Operand> {
        let mut lowered = Vec::with_capacity(args.len());
        for arg in args {
            lowered.push(self.lower_expr(arg)?);
        }

        let ret = match self.module.function(name) {
            Some(f) => f.ret,
            None => {
                self.diag
                    .error_at(line, format!("Unknown function '{}'", name));
                return None;
            }
        };

        if ret == IrType::Void {
            self.push(Inst::Call {
                dst: None,
                callee: name.to_string(),
                args: lowered,
            });
            None
        } else {
            let dst = self.new_value();
            self.push(Inst::Call {
                dst: Some((dst, ret)),
                callee: name.to_string(),
                args: lowered,
            });
            Some(Operand::Value(dst, ret))
        }
    }

    fn lower_term(&mut self, term: &TermNode<'_>) -> Option<Operand> {
        match &term.kind {
            TermKind::Int(v) => Some(Operand::Const(*v, IrType::I32)),
            TermKind::Char(c) => Some(Operand::Const(*c as i64, IrType::I8)),
            TermKind::Str(s) => {
                let idx = self.module.intern_string(s);
                Some(Operand::Str(idx))
            }
            TermKind::Identifier(name) => {
                let Some(var) = self.resolve_var(name) else {
                    self.diag
                        .error_at(term.line, format!("Unknown variable '{}'", name));
                    return None;
                };
                let dst = self.new_value();
                self.push(Inst::Load {
                    dst,
                    ty: var.ty,
                    addr: var.addr,
                });
                Some(Operand::Value(dst, var.ty))
            }
            TermKind::Deref(name) => {
                let Some(var) = self.resolve_var(name) else {
                    self.diag
                        .error_at(term.line, format!("Unknown pointer variable '{}'", name));
                    return None;
                };
                let ptr = self.new_value();
                self.push(Inst::Load {
                    dst: ptr,
                    ty: IrType::Ptr,
                    addr: var.addr,
                });
                let dst = self.new_value();
                self.push(Inst::Load {
                    dst,
                    ty: IrType::I8,
                    addr: Operand::Value(ptr, IrType::Ptr),
                });
                Some(Operand::Value(dst, IrType::I8))
            }
            TermKind::AddressOf(name) => {
                let Some(var) = self.resolve_var(name) else {
                    self.diag
                        .error_at(term.line, format!("Unknown variable '{}'", name));
                    return None;
                };
                Some(var.addr)
            }
            TermKind::ArrayAccess { array, index } => {
                let Some(var) = self.resolve_var(array) else {
                    self.diag
                        .error_at(term.line, format!("Unknown array '{}'", array));
                    return None;
                };
                let index_val = self.lower_expr(index)?;
                let index_val = self.index_to_address_width(index_val);
                let static_len = if var.is_static_array {
                    Some(var.len)
                } else {
                    None
                };
                let addr = self.new_value();
                self.push(Inst::Gep {
                    dst: addr,
                    base: var.addr,
                    elem_ty: var.ty,
                    index: index_val,
                    static_len,
                });
                let dst = self.new_value();
                self.push(Inst::Load {
                    dst,
                    ty: var.ty,
                    addr: Operand::Value(addr, IrType::Ptr),
                });
                Some(Operand::Value(dst, var.ty))
            }
            TermKind::ArrayLiteral(_) => {
                self.diag
                    .error_at(term.line, "Array literal only valid in initialization");
                None
            }
            TermKind::Call { name, args } => self.lower_call(name, args, term.line),
        }
    }

    fn lower_expr(&mut self, expr: &ExprNode<'_>) -> Option<Operand> {
        match &expr.kind {
            ExprKind::Term(term) => self.lower_term(term),
            ExprKind::Binary { op, left, right } => {
                let lhs = self.lower_expr(left)?;
                let rhs = self.lower_expr(right)?;
                let op = match op {
                    BinaryOp::Add => IrBinOp::Add,
                    BinaryOp::Subtract => IrBinOp::Sub,
                    BinaryOp::Multiply => IrBinOp::Mul,
                    BinaryOp::Divide => IrBinOp::Sdiv,
                    BinaryOp::Modulo => IrBinOp::Srem,
                };
                let ty = lhs.ty();
                let dst = self.new_value();
                self.push(Inst::Bin {
                    dst,
                    op,
                    ty,
                    lhs,
                    rhs,
                });
                Some(Operand::Value(dst, ty))
            }
        }
    }

    fn lower_rel(&mut self, rel: &RelNode<'_>) -> Option<Operand> {
        let lhs = self.lower_term(&rel.lhs)?;
        let rhs = self.lower_term(&rel.rhs)?;
        let cond = match rel.op {
            RelOp::IsEqual => IrCond::Eq,
            RelOp::NotEqual => IrCond::Ne,
            RelOp::LessThan => IrCond::Slt,
            RelOp::LessThanOrEqual => IrCond::Sle,
            RelOp::GreaterThan => IrCond::Sgt,
            RelOp::GreaterThanOrEqual => IrCond::Sge,
        };
        let dst = self.new_value();
        self.push(Inst::Cmp {
            dst,
            cond,
            lhs,
            rhs,
        });
        Some(Operand::Value(dst, IrType::I1))
    }

    /// Array indices must be the target's address width.
    fn index_to_address_width(&mut self, index: Operand) -> Operand {
        if index.ty() == IrType::I32 {
            return index;
        }
        let dst = self.new_value();
        self.push(Inst::Cast {
            dst,
            value: index,
            to: IrType::I32,
        });
        Operand::Value(dst, IrType::I32)
    }
}
