use std::collections::HashMap;

use super::ir::{Inst, IrBinOp, IrCond, IrType, Module, Operand, Terminator, ValueId};

fn subst_operand(op: &mut Operand, known: &HashMap<ValueId, (i64, IrType)>) {
    if let Operand::Value(id, _) = op {
        if let Some(&(value, ty)) = known.get(id) {
            *op = Operand::Const(value, ty);
        }
    }
}

fn eval_bin(op: IrBinOp, lhs: i64, rhs: i64) -> Option<i64> {
    match op {
        IrBinOp::Add => Some(lhs.wrapping_add(rhs)),
        IrBinOp::Sub => Some(lhs.wrapping_sub(rhs)),
        IrBinOp::Mul => Some(lhs.wrapping_mul(rhs)),
        // Division by zero is left in place for the target to trap on
        IrBinOp::Sdiv => (rhs != 0).then(|| lhs.wrapping_div(rhs)),
        IrBinOp::Srem => (rhs != 0).then(|| lhs.wrapping_rem(rhs)),
    }
}

fn eval_cond(cond: IrCond, lhs: i64, rhs: i64) -> bool {
    match cond {
        IrCond::Eq => lhs == rhs,
        IrCond::Ne => lhs != rhs,
        IrCond::Slt => lhs < rhs,
        IrCond::Sle => lhs <= rhs,
        IrCond::Sgt => lhs > rhs,
        IrCond::Sge => lhs >= rhs,
    }
}

/// Fold constant arithmetic and comparisons, propagating results through
/// operand uses. A conditional branch on a folded constant becomes an
/// unconditional one.
pub fn fold_constants(module: &mut Module) {
    for f in module.functions.iter_mut() {
        if !f.is_definition {
            continue;
        }
        let mut known: HashMap<ValueId, (i64, IrType)> = HashMap::new();

        for block in f.blocks.iter_mut() {
            block.instrs.retain_mut(|inst| {
                match inst {
                    Inst::Load { addr, .. } => {
                        subst_operand(addr, &known);
                        true
                    }
                    Inst::Store { value, addr } => {
                        subst_operand(value, &known);
                        subst_operand(addr, &known);
                        true
                    }
                    Inst::Bin {
                        dst,
                        op,
                        ty,
                        lhs,
                        rhs,
                    } => {
                        subst_operand(lhs, &known);
                        subst_operand(rhs, &known);
                        if let (Operand::Const(l, _), Operand::Const(r, _)) = (&*lhs, &*rhs) {
                            if let Some(value) = eval_bin(*op, *l, *r) {
                                known.insert(*dst, (value, *ty));
                                return false;
                            }
                        }
                        true
                    }
                    Inst::Cmp {
                        dst,
                        cond,
                        lhs,
                        rhs,
                    } => {
                        subst_operand(lhs, &known);
                        subst_operand(rhs, &known);
                        if let (Operand::Const(l, _), Operand::Const(r, _)) = (&*lhs, &*rhs) {
                            let value = eval_cond(*cond, *l, *r) as i64;
                            known.insert(*dst, (value, IrType::I1));
                            return false;
                        }
                        true
                    }
                    Inst::Gep { index, .. } => {
                        subst_operand(index, &known);
                        true
                    }
                    Inst::Call { args, .. } => {
                        for arg in args.iter_mut() {
                            subst_operand(arg, &known);
                        }
                        true
                    }
                    Inst::Cast { dst, value, to } => {
                        subst_operand(value, &known);
                        if let Operand::Const(v, _) = value {
                            known.insert(*dst, (*v, *to));
                            return false;
                        }
                        true
                    }
                }
            });

            let new_term = match &mut block.terminator {
                Some(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                }) => {
                    subst_operand(cond, &known);
                    if let Operand::Const(value, _) = cond {
                        let target = if *value != 0 { *then_block } else { *else_block };
                        Some(Terminator::Br(target))
                    } else {
                        None
                    }
                }
                Some(Terminator::Ret(Some(value))) => {
                    subst_operand(value, &known);
                    None
                }
                _ => None,
            };
            if let Some(term) = new_term {
                block.terminator = Some(term);
            }
        }
    }
}

/// Remove blocks unreachable from the entry and remap branch targets.
pub fn prune_unreachable_blocks(module: &mut Module) {
    for f in module.functions.iter_mut() {
        if !f.is_definition || f.blocks.is_empty() {
            continue;
        }

        let mut reachable = vec![false; f.blocks.len()];
        let mut stack = vec![0usize];
        while let Some(b) = stack.pop() {
            if reachable[b] {
                continue;
            }
            reachable[b] = true;
            match &f.blocks[b].terminator {
                Some(Terminator::Br(target)) => stack.push(*target),
                Some(Terminator::CondBr {
                    then_block,
                    else_block,
                    ..
                }) => {
                    stack.push(*then_block);
                    stack.push(*else_block);
                }
                _ => {}
            }
        }

        if reachable.iter().all(|&r| r) {
            continue;
        }

        let mut remap = vec![usize::MAX; f.blocks.len()];
        let mut kept = Vec::with_capacity(f.blocks.len());
        for (i, block) in f.blocks.drain(..).enumerate() {
            if reachable[i] {
                remap[i] = kept.len();
                kept.push(block);
            }
        }
        for block in kept.iter_mut() {
            match &mut block.terminator {
                Some(Terminator::Br(target)) => *target = remap[*target],
                Some(Terminator::CondBr {
                    then_block,
                    else_block,
                    ..
                }) => {
                    *then_block = remap[*then_block];
                    *else_block = remap[*else_block];
                }
                _ => {}
            }
        }
        f.blocks = kept;
    }
}
