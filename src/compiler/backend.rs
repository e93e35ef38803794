// Compiler Backend Abstraction
//
// A kernel source turns an encoded cell kernel into something callable:
// native code (Cranelift) or an interpreted plan. Every kernel shares one
// C ABI so the cache can hold either kind behind the same handle.

use crate::compiler::encode::CellKernelSpec;
use crate::compiler::interpreter;
use crate::core::error::Result;
use crate::types::GraphBLASType;
use std::any::Any;
use std::sync::Arc;

/// Arguments of a cell kernel
///
/// Every pointer addresses the first cell of its array. `ab`/`bb` are null
/// for full operands, `mb` is null without a mask; iso operands hold a
/// single value. `cb`/`cx` may alias `ab`/`ax` when C is updated in place.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KernelArgs {
    pub ab: *const u8,
    pub ax: *const u8,
    pub bb: *const u8,
    pub bx: *const u8,
    pub mb: *const u8,
    pub cb: *mut u8,
    pub cx: *mut u8,
    pub alpha: *const u8,
    pub beta: *const u8,
    /// User operator function pointer, passed back to `op_call`
    pub op_ctx: *const u8,
    /// `extern "C" fn(op_ctx, x, y, z)` evaluating the user operator
    pub op_call: *const u8,
}

// SAFETY: the arrays behind the pointers outlive the call, and concurrent
// calls are given disjoint cell ranges of the output
unsafe impl Send for KernelArgs {}
unsafe impl Sync for KernelArgs {}

/// Native cell kernel: processes cells `start..end`, returns how many are present
pub type CellKernelFn = unsafe extern "C" fn(*const KernelArgs, usize, usize) -> usize;

/// Signature of the user operator trampoline
pub type UserOpCall = extern "C" fn(*const u8, *const u8, *const u8, *mut u8);

/// Evaluate a user operator `fn(T, T) -> T` stored in `ctx` on `*x`, `*y` into `*z`
pub(crate) extern "C" fn call_user_op<T: GraphBLASType>(
    ctx: *const u8,
    x: *const u8,
    y: *const u8,
    z: *mut u8,
) {
    // SAFETY: `ctx` was produced from a `fn(T, T) -> T` of the same T and the
    // value pointers address valid T values
    unsafe {
        let f: fn(T, T) -> T = std::mem::transmute::<*const u8, fn(T, T) -> T>(ctx);
        let result = f(std::ptr::read(x as *const T), std::ptr::read(y as *const T));
        std::ptr::write(z as *mut T, result);
    }
}

/// Entry point of a native kernel together with the code memory behind it
///
/// The memory is released when the last clone is dropped, so a kernel
/// removed from the cache stays valid for callers still holding it.
#[derive(Clone)]
pub struct KernelPtr {
    ptr: *const u8,
    _owner: Arc<dyn Any + Send + Sync>,
}

// SAFETY: JIT-compiled functions are stateless and safe to call from any thread
unsafe impl Send for KernelPtr {}
unsafe impl Sync for KernelPtr {}

impl KernelPtr {
    pub(crate) fn new(ptr: *const u8, owner: Arc<dyn Any + Send + Sync>) -> Self {
        Self { ptr, _owner: owner }
    }
}

impl std::fmt::Debug for KernelPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KernelPtr({:p})", self.ptr)
    }
}

/// A kernel ready to run
#[derive(Debug, Clone)]
pub enum CompiledKernel {
    Native(KernelPtr),
    Interpreted(CellKernelSpec),
}

impl CompiledKernel {
    /// Run the kernel over cells `start..end`
    ///
    /// # Safety
    /// `args` must describe arrays valid for every cell in `start..end` and
    /// match the spec the kernel was built for.
    pub unsafe fn run(&self, args: &KernelArgs, start: usize, end: usize) -> usize {
        match self {
            CompiledKernel::Native(ptr) => {
                let f: CellKernelFn = std::mem::transmute::<*const u8, CellKernelFn>(ptr.ptr);
                f(args as *const KernelArgs, start, end)
            }
            CompiledKernel::Interpreted(spec) => interpreter::run_cells(spec, args, start, end),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, CompiledKernel::Native(_))
    }
}

/// Something that can produce kernels
///
/// Returns `Err(NotImplemented)` for combinations it does not support; that
/// is never treated as a failure.
pub trait KernelSource: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, spec: &CellKernelSpec) -> Result<CompiledKernel>;
}
