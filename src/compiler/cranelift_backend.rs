// Cranelift Backend: JIT compilation using Cranelift
//
// Lowers a cell kernel spec to native code. The generated function walks
// cells `start..end`, branches once per cell on the mask and on the presence
// of A and B, evaluates the operator and writes the output presence byte and
// value. Built-in operators are emitted inline; user operators are called
// through the trampoline passed in the kernel arguments. Each kernel owns its
// JIT module; the module's memory is freed when the last handle to the kernel
// is dropped.

use crate::compiler::backend::{CompiledKernel, KernelPtr, KernelSource};
use crate::compiler::encode::{CellKernelSpec, CellKind, MaskMode};
use crate::core::binary_op::BinaryOpcode;
use crate::core::error::{GraphBlasError, Result};
use crate::types::TypeCode;
use cranelift::codegen::ir::{Function, SigRef};
use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A finalized JIT module holding the code of one kernel
struct NativeModule(Option<JITModule>);

// SAFETY: the module is never used again after finalization, only dropped
unsafe impl Send for NativeModule {}
unsafe impl Sync for NativeModule {}

impl Drop for NativeModule {
    fn drop(&mut self) {
        if let Some(module) = self.0.take() {
            // SAFETY: the only pointer into this module is held by the
            // KernelPtr owning it, which is being dropped
            unsafe { module.free_memory() };
        }
    }
}

/// Cranelift JIT kernel source
#[derive(Debug, Default, Clone, Copy)]
pub struct CraneliftSource;

impl CraneliftSource {
    pub fn new() -> Self {
        Self
    }

    fn compile(&self, spec: &CellKernelSpec) -> Result<KernelPtr> {
        let builder = JITBuilder::new(cranelift_module::default_libcall_names())
            .map_err(|e| jit_error("isa", e))?;
        let mut module = JITModule::new(builder);
        let ptr = module.target_config().pointer_type();

        let mut ctx = module.make_context();
        // (args, start, end) -> count
        for _ in 0..3 {
            ctx.func.signature.params.push(AbiParam::new(ptr));
        }
        ctx.func.signature.returns.push(AbiParam::new(ptr));

        // user operator trampoline: (ctx, x, y, z)
        let mut op_sig = module.make_signature();
        for _ in 0..4 {
            op_sig.params.push(AbiParam::new(ptr));
        }

        let mut func_ctx = FunctionBuilderContext::new();
        lower_cells(spec, &mut ctx.func, &mut func_ctx, ptr, op_sig)?;
        log::trace!("cranelift IR for {:06x}:\n{}", spec.code(), ctx.func.display());

        let name = format!("rsk_cells_{:06x}", spec.code());
        let id = module
            .declare_function(&name, Linkage::Export, &ctx.func.signature)
            .map_err(|e| jit_error("declare", e))?;
        module
            .define_function(id, &mut ctx)
            .map_err(|e| jit_error("define", e))?;
        module.clear_context(&mut ctx);
        module
            .finalize_definitions()
            .map_err(|e| jit_error("finalize", e))?;
        let code_ptr = module.get_finalized_function(id);
        log::debug!("native kernel {} at {:p}", name, code_ptr);
        Ok(KernelPtr::new(code_ptr, Arc::new(NativeModule(Some(module)))))
    }
}

impl KernelSource for CraneliftSource {
    fn name(&self) -> &str {
        "cranelift"
    }

    fn build(&self, spec: &CellKernelSpec) -> Result<CompiledKernel> {
        if let Some(op) = spec.opcode {
            if !op_supported(op, spec.type_code) {
                return Err(GraphBlasError::NotImplemented);
            }
        }
        // internal cranelift-jit failures panic; surface them as build errors
        match panic::catch_unwind(AssertUnwindSafe(|| self.compile(spec))) {
            Ok(built) => built.map(CompiledKernel::Native),
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(jit_error("panic", msg))
            }
        }
    }
}

fn jit_error(stage: &str, e: impl std::fmt::Display) -> GraphBlasError {
    GraphBlasError::JitError(format!("cranelift {}: {}", stage, e))
}

fn value_type(t: TypeCode) -> Type {
    match t {
        TypeCode::Bool | TypeCode::Int8 | TypeCode::Uint8 => types::I8,
        TypeCode::Int16 | TypeCode::Uint16 => types::I16,
        TypeCode::Int32 | TypeCode::Uint32 => types::I32,
        TypeCode::Int64 | TypeCode::Uint64 => types::I64,
        TypeCode::Fp32 => types::F32,
        TypeCode::Fp64 => types::F64,
    }
}

/// Built-in operators with an inline lowering that matches the scalar semantics
fn op_supported(op: BinaryOpcode, t: TypeCode) -> bool {
    use BinaryOpcode::*;
    match op {
        First | Second | Any | Pair => true,
        IsEq | IsNe | IsGt | IsLt | IsGe | IsLe => true,
        _ if t == TypeCode::Bool => true,
        // float min/max ignore NaN, integer division saturates
        Plus | Minus | Times => true,
        Div => t.is_float(),
        Min | Max | LOr | LAnd | LXor => !t.is_float(),
    }
}

fn one(b: &mut FunctionBuilder, t: TypeCode) -> Value {
    match t {
        TypeCode::Fp32 => b.ins().f32const(1.0),
        TypeCode::Fp64 => b.ins().f64const(1.0),
        _ => b.ins().iconst(value_type(t), 1),
    }
}

fn emit_op(b: &mut FunctionBuilder, op: BinaryOpcode, t: TypeCode, x: Value, y: Value) -> Result<Value> {
    use BinaryOpcode::*;
    let ty = value_type(t);
    let v = match op {
        First => x,
        Second | Any => y,
        Pair => one(b, t),
        IsEq | IsNe | IsGt | IsLt | IsGe | IsLe => {
            let holds = compare(b, op, t, x, y);
            let (on, off) = match t {
                TypeCode::Fp32 => (b.ins().f32const(1.0), b.ins().f32const(0.0)),
                TypeCode::Fp64 => (b.ins().f64const(1.0), b.ins().f64const(0.0)),
                _ => (b.ins().iconst(ty, 1), b.ins().iconst(ty, 0)),
            };
            b.ins().select(holds, on, off)
        }
        _ if t == TypeCode::Bool => match op {
            Plus | Max | LOr => b.ins().bor(x, y),
            Times | Min | LAnd => b.ins().band(x, y),
            Minus | LXor => b.ins().bxor(x, y),
            _ => x,
        },
        _ if t.is_float() => match op {
            Plus => b.ins().fadd(x, y),
            Minus => b.ins().fsub(x, y),
            Times => b.ins().fmul(x, y),
            Div => b.ins().fdiv(x, y),
            _ => return Err(GraphBlasError::NotImplemented),
        },
        Plus => b.ins().iadd(x, y),
        Minus => b.ins().isub(x, y),
        Times => b.ins().imul(x, y),
        Min | Max => {
            let cc = match (op == Min, t.is_signed()) {
                (true, true) => IntCC::SignedLessThan,
                (true, false) => IntCC::UnsignedLessThan,
                (false, true) => IntCC::SignedGreaterThan,
                (false, false) => IntCC::UnsignedGreaterThan,
            };
            let pick_x = b.ins().icmp(cc, x, y);
            b.ins().select(pick_x, x, y)
        }
        LOr | LAnd | LXor => {
            let xn = b.ins().icmp_imm(IntCC::NotEqual, x, 0);
            let yn = b.ins().icmp_imm(IntCC::NotEqual, y, 0);
            let r = match op {
                LOr => b.ins().bor(xn, yn),
                LAnd => b.ins().band(xn, yn),
                _ => b.ins().bxor(xn, yn),
            };
            if ty == types::I8 {
                r
            } else {
                b.ins().uextend(ty, r)
            }
        }
        Div => return Err(GraphBlasError::NotImplemented),
    };
    Ok(v)
}

/// Comparison `x op y` as an i8 truth value; float comparisons are ordered
/// except `IsNe`, which holds for NaN operands
fn compare(b: &mut FunctionBuilder, op: BinaryOpcode, t: TypeCode, x: Value, y: Value) -> Value {
    use BinaryOpcode::*;
    if t.is_float() {
        let cc = match op {
            IsEq => FloatCC::Equal,
            IsNe => FloatCC::NotEqual,
            IsGt => FloatCC::GreaterThan,
            IsLt => FloatCC::LessThan,
            IsGe => FloatCC::GreaterThanOrEqual,
            _ => FloatCC::LessThanOrEqual,
        };
        return b.ins().fcmp(cc, x, y);
    }
    let signed = t.is_signed();
    let cc = match op {
        IsEq => IntCC::Equal,
        IsNe => IntCC::NotEqual,
        IsGt if signed => IntCC::SignedGreaterThan,
        IsGt => IntCC::UnsignedGreaterThan,
        IsLt if signed => IntCC::SignedLessThan,
        IsLt => IntCC::UnsignedLessThan,
        IsGe if signed => IntCC::SignedGreaterThanOrEqual,
        IsGe => IntCC::UnsignedGreaterThanOrEqual,
        _ if signed => IntCC::SignedLessThanOrEqual,
        _ => IntCC::UnsignedLessThanOrEqual,
    };
    b.ins().icmp(cc, x, y)
}

/// Pointers loaded from `KernelArgs`, in field order
#[derive(Clone, Copy)]
struct Fields {
    ab: Value,
    ax: Value,
    bb: Value,
    bx: Value,
    mb: Value,
    cb: Value,
    cx: Value,
    alpha: Value,
    beta: Value,
    op_ctx: Value,
    op_call: Value,
}

struct Lowering<'s> {
    spec: &'s CellKernelSpec,
    ty: Type,
    size: i64,
    f: Fields,
    op_sig: SigRef,
}

impl<'s> Lowering<'s> {
    fn cell_addr(&self, b: &mut FunctionBuilder, base: Value, p: Value, iso: bool) -> Value {
        if iso {
            base
        } else {
            let offset = b.ins().imul_imm(p, self.size);
            b.ins().iadd(base, offset)
        }
    }

    /// Jump to `yes` if the operand is present at `p`
    fn branch_present(&self, b: &mut FunctionBuilder, full: bool, bits: Value, p: Value, yes: Block, no: Block) {
        if full {
            b.ins().jump(yes, &[]);
        } else {
            let addr = b.ins().iadd(bits, p);
            let byte = b.ins().load(types::I8, MemFlags::trusted(), addr, 0);
            b.ins().brif(byte, yes, &[], no, &[]);
        }
    }

    /// *z = op(*x, *y)
    fn combine(&self, b: &mut FunctionBuilder, x_addr: Value, y_addr: Value, z_addr: Value) -> Result<()> {
        match self.spec.opcode {
            Some(op) => {
                let x = b.ins().load(self.ty, MemFlags::trusted(), x_addr, 0);
                let y = b.ins().load(self.ty, MemFlags::trusted(), y_addr, 0);
                let z = emit_op(b, op, self.spec.type_code, x, y)?;
                b.ins().store(MemFlags::trusted(), z, z_addr, 0);
            }
            None => {
                b.ins().call_indirect(
                    self.op_sig,
                    self.f.op_call,
                    &[self.f.op_ctx, x_addr, y_addr, z_addr],
                );
            }
        }
        Ok(())
    }

    fn copy(&self, b: &mut FunctionBuilder, from: Value, to: Value) {
        let v = b.ins().load(self.ty, MemFlags::trusted(), from, 0);
        b.ins().store(MemFlags::trusted(), v, to, 0);
    }

    /// Set the output presence byte and continue with the updated count
    fn finish(&self, b: &mut FunctionBuilder, p: Value, count: Value, present: bool, next: Block) {
        let addr = b.ins().iadd(self.f.cb, p);
        let flag = b.ins().iconst(types::I8, present as i64);
        b.ins().store(MemFlags::trusted(), flag, addr, 0);
        let count = if present {
            b.ins().iadd_imm(count, 1)
        } else {
            count
        };
        b.ins().jump(next, &[count]);
    }
}

fn lower_cells(
    spec: &CellKernelSpec,
    func: &mut Function,
    func_ctx: &mut FunctionBuilderContext,
    ptr: Type,
    op_sig: Signature,
) -> Result<()> {
    let mut b = FunctionBuilder::new(func, func_ctx);
    let op_sig = b.import_signature(op_sig);

    let entry = b.create_block();
    let header = b.create_block();
    let body = b.create_block();
    let in_mask = b.create_block();
    let out_mask = b.create_block();
    let a_yes = b.create_block();
    let a_no = b.create_block();
    let both = b.create_block();
    let only_a = b.create_block();
    let only_b = b.create_block();
    let neither = b.create_block();
    let keep_a = b.create_block();
    let drop_a = b.create_block();
    let next = b.create_block();
    let exit = b.create_block();

    b.append_block_params_for_function_params(entry);
    b.switch_to_block(entry);
    let args = b.block_params(entry)[0];
    let start = b.block_params(entry)[1];
    let end = b.block_params(entry)[2];
    let width = ptr.bytes() as i32;
    let mut field = |k: i32| b.ins().load(ptr, MemFlags::trusted(), args, k * width);
    let f = Fields {
        ab: field(0),
        ax: field(1),
        bb: field(2),
        bx: field(3),
        mb: field(4),
        cb: field(5),
        cx: field(6),
        alpha: field(7),
        beta: field(8),
        op_ctx: field(9),
        op_call: field(10),
    };
    let zero = b.ins().iconst(ptr, 0);
    b.ins().jump(header, &[start, zero]);

    let lw = Lowering {
        spec,
        ty: value_type(spec.type_code),
        size: spec.type_code.size() as i64,
        f,
        op_sig,
    };

    // header(p, count): loop while p < end
    let p = b.append_block_param(header, ptr);
    let count = b.append_block_param(header, ptr);
    let total = b.append_block_param(exit, ptr);
    let count_next = b.append_block_param(next, ptr);
    b.switch_to_block(header);
    let more = b.ins().icmp(IntCC::UnsignedLessThan, p, end);
    b.ins().brif(more, body, &[], exit, &[count]);

    b.switch_to_block(body);
    match spec.mask {
        MaskMode::None => {
            b.ins().jump(in_mask, &[]);
        }
        mode => {
            let addr = b.ins().iadd(f.mb, p);
            let byte = b.ins().load(types::I8, MemFlags::trusted(), addr, 0);
            let cc = if mode == MaskMode::Mask {
                IntCC::NotEqual
            } else {
                IntCC::Equal
            };
            let m = b.ins().icmp_imm(cc, byte, 0);
            b.ins().brif(m, in_mask, &[], out_mask, &[]);
        }
    }

    b.switch_to_block(in_mask);
    lw.branch_present(&mut b, spec.a_full, f.ab, p, a_yes, a_no);
    b.switch_to_block(a_yes);
    lw.branch_present(&mut b, spec.b_full, f.bb, p, both, only_a);
    b.switch_to_block(a_no);
    lw.branch_present(&mut b, spec.b_full, f.bb, p, only_b, neither);

    // both present
    b.switch_to_block(both);
    let a_addr = lw.cell_addr(&mut b, f.ax, p, spec.a_iso);
    let b_addr = lw.cell_addr(&mut b, f.bx, p, spec.b_iso);
    let z_addr = lw.cell_addr(&mut b, f.cx, p, false);
    match spec.kind {
        CellKind::Second => lw.copy(&mut b, b_addr, z_addr),
        _ => lw.combine(&mut b, a_addr, b_addr, z_addr)?,
    }
    lw.finish(&mut b, p, count, true, next);

    // only A present
    b.switch_to_block(only_a);
    let a_addr = lw.cell_addr(&mut b, f.ax, p, spec.a_iso);
    let z_addr = lw.cell_addr(&mut b, f.cx, p, false);
    match spec.kind {
        CellKind::Add => {
            lw.copy(&mut b, a_addr, z_addr);
            lw.finish(&mut b, p, count, true, next);
        }
        CellKind::Union => {
            lw.combine(&mut b, a_addr, f.beta, z_addr)?;
            lw.finish(&mut b, p, count, true, next);
        }
        CellKind::Mult | CellKind::Second => lw.finish(&mut b, p, count, false, next),
    }

    // only B present
    b.switch_to_block(only_b);
    let b_addr = lw.cell_addr(&mut b, f.bx, p, spec.b_iso);
    let z_addr = lw.cell_addr(&mut b, f.cx, p, false);
    match spec.kind {
        CellKind::Add | CellKind::Second => {
            lw.copy(&mut b, b_addr, z_addr);
            lw.finish(&mut b, p, count, true, next);
        }
        CellKind::Union => {
            lw.combine(&mut b, f.alpha, b_addr, z_addr)?;
            lw.finish(&mut b, p, count, true, next);
        }
        CellKind::Mult => lw.finish(&mut b, p, count, false, next),
    }

    b.switch_to_block(neither);
    lw.finish(&mut b, p, count, false, next);

    if spec.mask != MaskMode::None {
        b.switch_to_block(out_mask);
        if spec.clear_masked_out {
            lw.finish(&mut b, p, count, false, next);
        } else {
            lw.branch_present(&mut b, spec.a_full, f.ab, p, keep_a, drop_a);
            b.switch_to_block(keep_a);
            let a_addr = lw.cell_addr(&mut b, f.ax, p, spec.a_iso);
            let z_addr = lw.cell_addr(&mut b, f.cx, p, false);
            lw.copy(&mut b, a_addr, z_addr);
            lw.finish(&mut b, p, count, true, next);
            b.switch_to_block(drop_a);
            lw.finish(&mut b, p, count, false, next);
        }
    }

    b.switch_to_block(next);
    let p_next = b.ins().iadd_imm(p, 1);
    b.ins().jump(header, &[p_next, count_next]);

    b.switch_to_block(exit);
    b.ins().return_(&[total]);

    b.seal_all_blocks();
    b.finalize();
    Ok(())
}
