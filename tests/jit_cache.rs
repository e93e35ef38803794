// JIT Kernel Cache Tests
//
// Kernels are found in memory, reloaded from disk, rebuilt when operator
// definitions change, and every failure falls back to the factory kernels
// with identical results

use sparse_algebra::compiler::backend::{CompiledKernel, KernelSource};
use sparse_algebra::compiler::disk::version_dir;
use sparse_algebra::compiler::{CellKernelSpec, CraneliftSource, InterpretedSource, KernelCache};
use sparse_algebra::{ewise_add, BinaryOp, Context, GraphBlasError, JitConfig, JitControl, Matrix, Result};
use std::path::Path;
use std::sync::Arc;

fn inputs() -> (Matrix<i32>, Matrix<i32>) {
    let a = Matrix::from_dense(3, 3, (1..=9).collect()).unwrap();
    let mut b = Matrix::from_dense(3, 3, vec![100; 9]).unwrap();
    b.remove_element(1, 1).unwrap();
    (a, b)
}

fn add_with(ctx: &Context, op: &BinaryOp<i32>) -> Vec<i32> {
    let (a, b) = inputs();
    let mut c = Matrix::new(3, 3).unwrap();
    ewise_add(&mut c, None, None, op, &a, &b, None, ctx).unwrap();
    c.extract_tuples().unwrap().2
}

fn manifests(root: &Path) -> usize {
    std::fs::read_dir(version_dir(root))
        .map(|dir| {
            dir.filter_map(|e| e.ok())
                .filter(|e| e.path().extension().map_or(false, |x| x == "kmod"))
                .count()
        })
        .unwrap_or(0)
}

fn context(cache: &Arc<KernelCache>, source: Arc<dyn KernelSource>, control: JitControl) -> Context {
    Context::new()
        .with_kernel_cache(Arc::clone(cache))
        .with_kernel_source(source)
        .with_jit_control(control)
}

#[test]
fn test_kernel_persists_across_caches() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let plus = BinaryOp::plus();

    let first = Arc::new(KernelCache::new(Some(root.clone())));
    let ctx = context(&first, Arc::new(CraneliftSource::new()), JitControl::On);
    let expected = add_with(&ctx, &plus);
    assert_eq!(expected[4], 5);
    assert_eq!(expected[0], 101);
    let stats = first.stats();
    assert_eq!(stats.builds, 1);
    assert_eq!(manifests(&root), 1);

    // same kernel again: memory hit
    add_with(&ctx, &plus);
    assert_eq!(first.stats().hits, 1);
    assert_eq!(first.stats().builds, 1);

    // a fresh process-wide cache over the same root loads from disk
    let second = Arc::new(KernelCache::new(Some(root.clone())));
    let ctx = context(&second, Arc::new(CraneliftSource::new()), JitControl::Load);
    assert_eq!(add_with(&ctx, &plus), expected);
    let stats = second.stats();
    assert_eq!(stats.disk_loads, 1);
    assert_eq!(stats.builds, 0);
}

#[test]
fn test_changed_definition_is_not_reused() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let v1 = BinaryOp::user("combine", "z = x + y", |x: i32, y: i32| x + y).unwrap();
    let v2 = BinaryOp::user("combine", "z = x - y", |x: i32, y: i32| x - y).unwrap();

    let cache = Arc::new(KernelCache::new(Some(root.clone())));
    let ctx = context(&cache, Arc::new(InterpretedSource::new()), JitControl::On);
    add_with(&ctx, &v1);

    // load only: the manifest on disk belongs to the other definition
    let fresh = Arc::new(KernelCache::new(Some(root)));
    let ctx = context(&fresh, Arc::new(InterpretedSource::new()), JitControl::Load);
    let got = add_with(&ctx, &v2);
    assert_eq!(got[0], 1 - 100);
    assert_eq!(got[4], 5);
    let stats = fresh.stats();
    assert_eq!(stats.definition_mismatches, 1);
    assert_eq!(stats.disk_loads, 0);
    assert!(fresh.is_empty());
}

#[test]
fn test_every_control_level_gives_the_same_result() {
    let plus = BinaryOp::plus();
    let cache = Arc::new(KernelCache::in_memory());
    let reference = add_with(&context(&cache, Arc::new(InterpretedSource::new()), JitControl::Off), &plus);
    for control in [JitControl::Pause, JitControl::Run, JitControl::Load, JitControl::On] {
        let ctx = context(&cache, Arc::new(CraneliftSource::new()), control);
        assert_eq!(add_with(&ctx, &plus), reference, "{:?}", control);
    }
    // only `on` may build
    assert_eq!(cache.stats().builds, 1);
}

struct Broken;

impl KernelSource for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn build(&self, _spec: &CellKernelSpec) -> Result<CompiledKernel> {
        Err(GraphBlasError::JitError("no compiler".to_string()))
    }
}

#[test]
fn test_build_failure_falls_back_or_reports() {
    let plus = BinaryOp::plus();
    let cache = Arc::new(KernelCache::in_memory());
    let reference = add_with(&context(&cache, Arc::new(Broken), JitControl::Off), &plus);

    let soft = context(&cache, Arc::new(Broken), JitControl::On);
    assert_eq!(add_with(&soft, &plus), reference);
    assert_eq!(cache.stats().failures, 1);

    let hard = Context::new()
        .with_kernel_cache(Arc::clone(&cache))
        .with_kernel_source(Arc::new(Broken))
        .with_jit(JitConfig {
            control: JitControl::On,
            fail_soft: false,
        });
    let (a, b) = inputs();
    let mut c = Matrix::new(3, 3).unwrap();
    let err = ewise_add(&mut c, None, None, &plus, &a, &b, None, &hard).unwrap_err();
    assert!(matches!(err, GraphBlasError::JitError(_)));
    // C untouched
    assert_eq!(c.nvals().unwrap(), 0);
}
