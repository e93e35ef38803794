// Assignment Tests
//
// Masked assign and subassign over index ranges, strides and lists

use sparse_algebra::compiler::KernelCache;
use sparse_algebra::{
    assign, assign_scalar, col_subassign, row_subassign, sparsity_control, subassign, BinaryOp, Context,
    Descriptor, GraphBlasError, IndexList, JitControl, Matrix, Sparsity,
};
use std::sync::Arc;

fn ctx() -> Context {
    Context::new()
        .with_kernel_cache(Arc::new(KernelCache::in_memory()))
        .with_jit_control(JitControl::On)
}

/// Dense reference: cell (i, j) of an nrows x ncols matrix
fn cells(m: &mut Matrix<i32>) -> Vec<Option<i32>> {
    let (nrows, ncols) = m.shape();
    let mut out = Vec::with_capacity(nrows * ncols);
    for j in 0..ncols {
        for i in 0..nrows {
            out.push(m.extract_element(i, j).unwrap());
        }
    }
    out
}

fn sample(control: u8) -> Matrix<i32> {
    // 6x6 with a few entries in every column
    let rows = [0, 2, 1, 4, 5, 0, 3, 2, 5, 1];
    let cols = [0, 0, 1, 1, 2, 3, 3, 4, 4, 5];
    let vals = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
    let mut m = Matrix::from_tuples(6, 6, &rows, &cols, &vals, None).unwrap();
    m.set_sparsity_control(control).unwrap();
    m
}

#[test]
fn test_stride_assign_agrees_across_layouts() {
    let rows = IndexList::Stride { start: 0, end: 6, step: 2 };
    let cols = IndexList::List(vec![4, 1]);
    let a = Matrix::from_tuples(3, 2, &[0, 2, 1], &[0, 0, 1], &[100, 200, 300], None).unwrap();
    let plus = BinaryOp::plus();

    let mut reference: Option<Vec<Option<i32>>> = None;
    for control in [
        sparsity_control::HYPERSPARSE,
        sparsity_control::SPARSE,
        sparsity_control::BITMAP,
    ] {
        let mut c = sample(control);
        assign(&mut c, None, Some(&plus), &a, &rows, &cols, None, &ctx()).unwrap();
        let got = cells(&mut c);
        match &reference {
            None => reference = Some(got),
            Some(expected) => assert_eq!(&got, expected, "control {}", control),
        }
    }
    let got = reference.unwrap();
    // A(0,0) -> C(0,4): new entry; A(2,0) -> C(4,4): new; A(1,1) -> C(2,1): new
    assert_eq!(got[4 * 6], Some(100));
    assert_eq!(got[4 * 6 + 4], Some(200));
    assert_eq!(got[6 + 2], Some(300));
    // C(2,4) = 8 is in the region but A(1,0) is empty: accumulate keeps it
    assert_eq!(got[4 * 6 + 2], Some(8));
}

#[test]
fn test_assign_without_accum_deletes_region_entries() {
    for control in [sparsity_control::SPARSE, sparsity_control::BITMAP] {
        let mut c = sample(control);
        let a = Matrix::<i32>::new(2, 2).unwrap();
        let region = IndexList::Range { start: 0, end: 2 };
        assign(&mut c, None, None, &a, &region, &region, None, &ctx()).unwrap();
        // (0,0) and (1,1) were in the region
        assert_eq!(c.extract_element(0, 0).unwrap(), None);
        assert_eq!(c.extract_element(1, 1).unwrap(), None);
        assert_eq!(c.extract_element(2, 0).unwrap(), Some(2));
        assert_eq!(c.nvals().unwrap(), 8);
    }
}

#[test]
fn test_sparse_assign_leaves_zombies_and_pending() {
    let mut c = sample(sparsity_control::SPARSE);
    let a = Matrix::from_tuples(1, 2, &[0, 0], &[0, 1], &[-1, -2], None).unwrap();
    let rows = IndexList::List(vec![3]);
    let cols = IndexList::List(vec![3, 5]);
    // C(3,3) = 7 updated in place, C(3,5) inserted
    assign(&mut c, None, None, &a, &rows, &cols, None, &ctx()).unwrap();
    assert_eq!(c.npending(), 1);
    assert_eq!(c.nzombies(), 0);

    let empty = Matrix::<i32>::new(1, 2).unwrap();
    let cols = IndexList::List(vec![0, 3]);
    assign(&mut c, None, None, &empty, &IndexList::List(vec![0]), &cols, None, &ctx()).unwrap();
    assert!(c.nzombies() > 0);

    assert_eq!(c.extract_element(3, 3).unwrap(), Some(-1));
    assert_eq!(c.extract_element(3, 5).unwrap(), Some(-2));
    assert_eq!(c.extract_element(0, 0).unwrap(), None);
    assert_eq!(c.extract_element(0, 3).unwrap(), None);
    assert_eq!(c.nvals().unwrap(), 9);
    assert!(!c.has_pending_work());
}

#[test]
fn test_whole_matrix_dense_update_moves_to_bitmap() {
    let mut c = sample(sparsity_control::SPARSE | sparsity_control::BITMAP);
    let plus = BinaryOp::plus();
    assign_scalar(&mut c, None, Some(&plus), 1, &IndexList::All, &IndexList::All, None, &ctx()).unwrap();
    // every cell present now
    assert_eq!(c.nvals().unwrap(), 36);
    assert_eq!(c.extract_element(0, 0).unwrap(), Some(2));
    assert_eq!(c.extract_element(5, 5).unwrap(), Some(1));
    assert_eq!(c.sparsity(), Sparsity::Bitmap);
}

#[test]
fn test_complemented_mask_subassign() {
    for control in [sparsity_control::SPARSE, sparsity_control::BITMAP] {
        let mut c = sample(control);
        let a = Matrix::from_dense(2, 2, vec![50, 60, 70, 80]).unwrap();
        // mask over the region: only (0,0) set, complemented
        let mask = Matrix::from_tuples(2, 2, &[0], &[0], &[1u8], None).unwrap();
        let desc = Descriptor::with_mask_complement();
        let rows = IndexList::List(vec![4, 5]);
        let cols = IndexList::Range { start: 1, end: 3 };
        subassign(&mut c, Some(&mask), None, &a, &rows, &cols, Some(&desc), &ctx()).unwrap();
        // C(4,1) keeps 4; C(5,1) = 60, C(4,2) = 70, C(5,2) = 80
        assert_eq!(c.extract_element(4, 1).unwrap(), Some(4));
        assert_eq!(c.extract_element(5, 1).unwrap(), Some(60));
        assert_eq!(c.extract_element(4, 2).unwrap(), Some(70));
        assert_eq!(c.extract_element(5, 2).unwrap(), Some(80));
    }
}

#[test]
fn test_row_and_column_subassign() {
    let mut c = sample(sparsity_control::SPARSE);
    let u = Matrix::from_dense(3, 1, vec![7, 8, 9]).unwrap();
    col_subassign(&mut c, None, None, &u, &IndexList::Range { start: 3, end: 6 }, 0, None, &ctx()).unwrap();
    assert_eq!(c.extract_element(3, 0).unwrap(), Some(7));
    assert_eq!(c.extract_element(5, 0).unwrap(), Some(9));
    assert_eq!(c.extract_element(2, 0).unwrap(), Some(2));

    let v = Matrix::from_dense(1, 2, vec![-5, -6]).unwrap();
    row_subassign(&mut c, None, None, &v, 1, &IndexList::List(vec![5, 0]), None, &ctx()).unwrap();
    assert_eq!(c.extract_element(1, 5).unwrap(), Some(-5));
    assert_eq!(c.extract_element(1, 0).unwrap(), Some(-6));

    let err = row_subassign(&mut c, None, None, &v, 6, &IndexList::All, None, &ctx()).unwrap_err();
    assert_eq!(err, GraphBlasError::IndexOutOfBounds);
}

#[test]
fn test_bad_index_lists() {
    let mut c = sample(sparsity_control::SPARSE);
    let a = Matrix::<i32>::new(2, 1).unwrap();
    let dup = IndexList::List(vec![1, 1]);
    let err = assign(&mut c, None, None, &a, &dup, &IndexList::List(vec![0]), None, &ctx()).unwrap_err();
    assert_eq!(err, GraphBlasError::InvalidIndex);
    let out = IndexList::Range { start: 5, end: 7 };
    let err = assign(&mut c, None, None, &a, &out, &IndexList::List(vec![0]), None, &ctx()).unwrap_err();
    assert_eq!(err, GraphBlasError::IndexOutOfBounds);
    // nothing changed
    assert_eq!(c.nvals().unwrap(), 10);

    // a step wider than the range selects its start only
    let wide = IndexList::Stride { start: 1, end: 4, step: usize::MAX };
    assign_scalar(&mut c, None, None, 42, &wide, &IndexList::List(vec![2]), None, &ctx()).unwrap();
    assert_eq!(c.extract_element(1, 2).unwrap(), Some(42));
    assert_eq!(c.extract_element(4, 2).unwrap(), None);
    assert_eq!(c.nvals().unwrap(), 11);
}
