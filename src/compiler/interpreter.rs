// Interpreted kernels: run a cell kernel spec without generating code
//
// Same ABI and results as native kernels; the operator is evaluated through
// the built-in opcode or the user operator trampoline.

use crate::compiler::backend::{CompiledKernel, KernelArgs, KernelSource, UserOpCall};
use crate::compiler::encode::{CellKernelSpec, MaskMode};
use crate::core::error::Result;
use crate::ops::cells::resolve_cell;
use crate::types::{GraphBLASType, TypeCode};
use std::ptr;

/// Kernel source that never generates code
#[derive(Debug, Default, Clone, Copy)]
pub struct InterpretedSource;

impl InterpretedSource {
    pub fn new() -> Self {
        Self
    }
}

impl KernelSource for InterpretedSource {
    fn name(&self) -> &str {
        "interpreter"
    }

    fn build(&self, spec: &CellKernelSpec) -> Result<CompiledKernel> {
        log::debug!("interpreting cell kernel {:06x}", spec.code());
        Ok(CompiledKernel::Interpreted(*spec))
    }
}

/// Run an interpreted kernel over cells `start..end`
///
/// # Safety
/// Same contract as [`CompiledKernel::run`].
pub(crate) unsafe fn run_cells(spec: &CellKernelSpec, args: &KernelArgs, start: usize, end: usize) -> usize {
    match spec.type_code {
        TypeCode::Bool => run_typed::<bool>(spec, args, start, end),
        TypeCode::Int8 => run_typed::<i8>(spec, args, start, end),
        TypeCode::Int16 => run_typed::<i16>(spec, args, start, end),
        TypeCode::Int32 => run_typed::<i32>(spec, args, start, end),
        TypeCode::Int64 => run_typed::<i64>(spec, args, start, end),
        TypeCode::Uint8 => run_typed::<u8>(spec, args, start, end),
        TypeCode::Uint16 => run_typed::<u16>(spec, args, start, end),
        TypeCode::Uint32 => run_typed::<u32>(spec, args, start, end),
        TypeCode::Uint64 => run_typed::<u64>(spec, args, start, end),
        TypeCode::Fp32 => run_typed::<f32>(spec, args, start, end),
        TypeCode::Fp64 => run_typed::<f64>(spec, args, start, end),
    }
}

unsafe fn read_operand<T: GraphBLASType>(
    b: *const u8,
    x: *const u8,
    full: bool,
    iso: bool,
    p: usize,
) -> Option<T> {
    let present = full || *b.add(p) != 0;
    present.then(|| ptr::read((x as *const T).add(if iso { 0 } else { p })))
}

unsafe fn run_typed<T: GraphBLASType>(
    spec: &CellKernelSpec,
    args: &KernelArgs,
    start: usize,
    end: usize,
) -> usize {
    let user_call = if spec.opcode.is_none() {
        Some(std::mem::transmute::<*const u8, UserOpCall>(args.op_call))
    } else {
        None
    };
    let op = |x: T, y: T| -> T {
        match (spec.opcode, user_call) {
            (Some(code), _) => code.apply(x, y),
            (None, Some(call)) => {
                let mut z = T::default();
                call(
                    args.op_ctx,
                    &x as *const T as *const u8,
                    &y as *const T as *const u8,
                    &mut z as *mut T as *mut u8,
                );
                z
            }
            (None, None) => unreachable!("user kernels carry a trampoline"),
        }
    };
    let alpha = (!args.alpha.is_null()).then(|| ptr::read(args.alpha as *const T));
    let beta = (!args.beta.is_null()).then(|| ptr::read(args.beta as *const T));

    let mut count = 0;
    for p in start..end {
        let m = match spec.mask {
            MaskMode::None => true,
            MaskMode::Mask => *args.mb.add(p) != 0,
            MaskMode::Complement => *args.mb.add(p) == 0,
        };
        let a = read_operand::<T>(args.ab, args.ax, spec.a_full, spec.a_iso, p);
        let b = read_operand::<T>(args.bb, args.bx, spec.b_full, spec.b_iso, p);
        let z = resolve_cell(
            spec.kind,
            spec.clear_masked_out,
            m,
            a,
            b,
            alpha.unwrap_or_default(),
            beta.unwrap_or_default(),
            &op,
        );
        match z {
            Some(value) => {
                *args.cb.add(p) = 1;
                ptr::write((args.cx as *mut T).add(p), value);
                count += 1;
            }
            None => *args.cb.add(p) = 0,
        }
    }
    count
}
