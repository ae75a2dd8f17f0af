//! Contraction planning for the library (gemm) path.
//!
//! The planner reduces `C = beta*C + alpha*sum op(A)*op(B)` to a single column-major
//! `gemm` call. The work is deciding, per operand, whether its memory can be
//! aliased as a matrix in one of the gemm-compatible axis orders or must be
//! permuted into a fresh buffer (reusing the `add` kernel), and whether the
//! destination can receive the product directly or through a scratch matrix.
//! Mis-classifying a permutation as an alias silently corrupts results, so
//! every branch here is unit-tested on small synthetic inputs.

use crate::element_op::Conjugation;
use crate::gemm::MatOp;
use crate::view::{StridedArray, StridedView, StridedViewMut};
use crate::{ops, Result, Scalar};

/// Backend selector for [`crate::contract`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContractMethod {
    /// Use the library gemm path when the element type supports it.
    #[default]
    Auto,
    /// Always use the native recursive kernel.
    ForceNative,
    /// Always use the library gemm path.
    ForceLibraryGemm,
}

/// Whether `(dims, strides)` describes a contiguous column-major block.
///
/// Axes of extent <= 1 never affect addressability and are skipped.
pub(crate) fn is_col_major(dims: &[usize], strides: &[isize]) -> bool {
    let mut expected = 1isize;
    for (&dim, &stride) in dims.iter().zip(strides.iter()) {
        if dim <= 1 {
            continue;
        }
        if stride != expected {
            return false;
        }
        expected *= dim as isize;
    }
    true
}

pub(crate) fn gather_dims(dims: &[usize], axes: &[usize]) -> Vec<usize> {
    axes.iter().map(|&k| dims[k]).collect()
}

pub(crate) fn gather_strides(strides: &[isize], axes: &[usize]) -> Vec<isize> {
    axes.iter().map(|&k| strides[k]).collect()
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// A gemm-ready operand: either an alias of the caller's memory or an owned
/// permuted copy.
struct MatOperand<T> {
    ptr: *const T,
    op: MatOp,
    ld: usize,
    _buf: Option<StridedArray<T>>,
}

impl<T> MatOperand<T> {
    #[cfg(test)]
    fn is_alias(&self) -> bool {
        self._buf.is_none()
    }
}

/// Classify one operand against the gemm-compatible layouts.
///
/// For the left operand, `op(A)` must be `olen x clen`: the `NoTrans` store
/// is `[open; contracted]` column-major, the `Trans`/`ConjTrans` store is
/// `[contracted; open]`. The right operand mirrors this so `op(B)` comes out
/// `clen x olen`.
///
/// A conjugated operand can only be aliased in the transposed store (gemm's
/// `'C'` applies conjugation there); in every other case the permute-copy
/// materializes the conjugation and downgrades to `NoTrans`.
fn prepare_operand<T: Scalar>(
    view: &StridedView<'_, T>,
    conj: Conjugation,
    open: &[usize],
    contracted: &[usize],
    olen: usize,
    clen: usize,
    side: Side,
) -> Result<MatOperand<T>> {
    let oc: Vec<usize> = open.iter().chain(contracted.iter()).copied().collect();
    let co: Vec<usize> = contracted.iter().chain(open.iter()).copied().collect();

    // Stored-matrix axis order and row count for the NoTrans and Trans cases.
    let (n_order, n_rows, t_order, t_rows) = match side {
        Side::Left => (&oc, olen, &co, clen),
        Side::Right => (&co, clen, &oc, olen),
    };

    let dims_n = gather_dims(view.dims(), n_order);
    let strides_n = gather_strides(view.strides(), n_order);
    let dims_t = gather_dims(view.dims(), t_order);
    let strides_t = gather_strides(view.strides(), t_order);

    if conj.is_conjugated() {
        if is_col_major(&dims_t, &strides_t) {
            return Ok(MatOperand {
                ptr: view.ptr(),
                op: MatOp::ConjTrans,
                ld: t_rows.max(1),
                _buf: None,
            });
        }
    } else {
        if is_col_major(&dims_n, &strides_n) {
            return Ok(MatOperand {
                ptr: view.ptr(),
                op: MatOp::NoTrans,
                ld: n_rows.max(1),
                _buf: None,
            });
        }
        if is_col_major(&dims_t, &strides_t) {
            return Ok(MatOperand {
                ptr: view.ptr(),
                op: MatOp::Trans,
                ld: t_rows.max(1),
                _buf: None,
            });
        }
    }

    // Permute (and conjugate, if tagged) into a fresh column-major buffer in
    // the NoTrans axis order, reusing the add kernel.
    let mut buf = StridedArray::filled(&dims_n, T::zero());
    ops::add(
        T::one(),
        &view.strip_conj(),
        conj,
        T::zero(),
        &mut buf.view_mut(),
        n_order,
    )?;
    let ptr = buf.view().ptr();
    Ok(MatOperand {
        ptr,
        op: MatOp::NoTrans,
        ld: n_rows.max(1),
        _buf: Some(buf),
    })
}

/// Library-path contraction. Validation has already run; `alpha` is nonzero
/// and the destination is nonempty.
#[allow(clippy::too_many_arguments)]
pub(crate) fn contract_gemm<T: Scalar>(
    alpha: T,
    a: &StridedView<'_, T>,
    conj_a: Conjugation,
    b: &StridedView<'_, T>,
    conj_b: Conjugation,
    beta: T,
    c: &mut StridedViewMut<'_, T>,
    oind_a: &[usize],
    cind_a: &[usize],
    oind_b: &[usize],
    cind_b: &[usize],
    ind_c_in_oab: &[usize],
) -> Result<()> {
    let olen_a: usize = gather_dims(a.dims(), oind_a).iter().product();
    let olen_b: usize = gather_dims(b.dims(), oind_b).iter().product();
    let clen: usize = gather_dims(a.dims(), cind_a).iter().product();

    let a_op = prepare_operand(a, conj_a, oind_a, cind_a, olen_a, clen, Side::Left)?;
    let b_op = prepare_operand(b, conj_b, oind_b, cind_b, olen_b, clen, Side::Right)?;

    let (m, n, k) = (olen_a, olen_b, clen);

    // Direct path: C already is the `[open_A; open_B]` column-major matrix.
    let identity = ind_c_in_oab.iter().enumerate().all(|(i, &p)| i == p);
    if identity && is_col_major(c.dims(), c.strides()) {
        unsafe {
            T::gemm(
                a_op.op,
                b_op.op,
                m,
                n,
                k,
                alpha,
                a_op.ptr,
                a_op.ld,
                b_op.ptr,
                b_op.ld,
                beta,
                c.as_mut_ptr(),
                m.max(1),
            );
        }
        return Ok(());
    }

    // Scratch path: gemm with factors (1, 0) into a fresh matrix, then fold
    // into C with the user's alpha, beta and output permutation via the add kernel.
    let mut open_dims = gather_dims(a.dims(), oind_a);
    open_dims.extend(gather_dims(b.dims(), oind_b));
    let mut scratch = StridedArray::filled(&open_dims, T::zero());
    unsafe {
        T::gemm(
            a_op.op,
            b_op.op,
            m,
            n,
            k,
            T::one(),
            a_op.ptr,
            a_op.ld,
            b_op.ptr,
            b_op.ld,
            T::zero(),
            scratch.data_mut().as_mut_ptr(),
            m.max(1),
        );
    }
    ops::add(
        alpha,
        &scratch.view(),
        Conjugation::Normal,
        beta,
        c,
        ind_c_in_oab,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_is_col_major() {
        assert!(is_col_major(&[2, 3], &[1, 2]));
        assert!(!is_col_major(&[2, 3], &[3, 1]));
        assert!(is_col_major(&[], &[]));
        // Unit axes are ignored wherever they sit.
        assert!(is_col_major(&[2, 1, 3], &[1, 77, 2]));
        // Gaps break contiguity.
        assert!(!is_col_major(&[2, 3], &[1, 4]));
    }

    #[test]
    fn test_prepare_alias_notrans() {
        // A column-major 2x3 with open=[0], contracted=[1] is already the
        // NoTrans store for the left side.
        let a = StridedArray::<f64>::filled(&[2, 3], 1.0);
        let op = prepare_operand(&a.view(), Conjugation::Normal, &[0], &[1], 2, 3, Side::Left)
            .unwrap();
        assert!(op.is_alias());
        assert_eq!(op.op, MatOp::NoTrans);
        assert_eq!(op.ld, 2);
    }

    #[test]
    fn test_prepare_alias_trans() {
        // Same memory read with open and contracted swapped matches the
        // transposed store.
        let a = StridedArray::<f64>::filled(&[2, 3], 1.0);
        let op = prepare_operand(&a.view(), Conjugation::Normal, &[1], &[0], 3, 2, Side::Left)
            .unwrap();
        assert!(op.is_alias());
        assert_eq!(op.op, MatOp::Trans);
        assert_eq!(op.ld, 2);
    }

    #[test]
    fn test_prepare_alias_conjtrans() {
        let a = StridedArray::<Complex64>::filled(&[2, 3], Complex64::new(1.0, 1.0));
        let op = prepare_operand(
            &a.view(),
            Conjugation::Conjugated,
            &[1],
            &[0],
            3,
            2,
            Side::Left,
        )
        .unwrap();
        assert!(op.is_alias());
        assert_eq!(op.op, MatOp::ConjTrans);
        assert_eq!(op.ld, 2);
    }

    #[test]
    fn test_prepare_copy_when_strided() {
        // Row-major 2x3x4 with open=[0,1], contracted=[2]: neither grouped
        // order is column-major, so a copy is required.
        let a = StridedArray::<f64>::from_fn_row_major(&[2, 3, 4], |idx| {
            (idx[0] * 12 + idx[1] * 4 + idx[2]) as f64
        });
        let op = prepare_operand(
            &a.view(),
            Conjugation::Normal,
            &[0, 1],
            &[2],
            6,
            4,
            Side::Left,
        )
        .unwrap();
        assert!(!op.is_alias());
        assert_eq!(op.op, MatOp::NoTrans);
        assert_eq!(op.ld, 6);
        // The copy is the [open; contracted] column-major store.
        let buf = op._buf.as_ref().unwrap();
        assert_eq!(buf.dims(), &[2, 3, 4]);
        assert_eq!(buf.get(&[1, 2, 3]), (12 + 8 + 3) as f64);
    }

    #[test]
    fn test_prepare_copy_materializes_conj() {
        // Conjugated operand in the NoTrans layout: the alias test fails
        // (only the transposed store can carry 'C'), so the copy must hold
        // conjugated values and report NoTrans.
        let a = StridedArray::<Complex64>::from_fn_col_major(&[2, 2], |idx| {
            Complex64::new(idx[0] as f64, idx[1] as f64 + 1.0)
        });
        let op = prepare_operand(
            &a.view(),
            Conjugation::Conjugated,
            &[0],
            &[1],
            2,
            2,
            Side::Left,
        )
        .unwrap();
        assert!(!op.is_alias());
        assert_eq!(op.op, MatOp::NoTrans);
        let buf = op._buf.as_ref().unwrap();
        assert_eq!(buf.get(&[1, 1]), Complex64::new(1.0, -2.0));
    }

    #[test]
    fn test_prepare_right_side_layouts() {
        // Right operand: NoTrans store is [contracted; open].
        let b = StridedArray::<f64>::filled(&[3, 2], 1.0); // col-major
        let op = prepare_operand(&b.view(), Conjugation::Normal, &[1], &[0], 2, 3, Side::Right)
            .unwrap();
        assert!(op.is_alias());
        assert_eq!(op.op, MatOp::NoTrans);
        assert_eq!(op.ld, 3);

        // Swapped roles: memory matches [open; contracted] -> Trans.
        let op = prepare_operand(&b.view(), Conjugation::Normal, &[0], &[1], 3, 2, Side::Right)
            .unwrap();
        assert!(op.is_alias());
        assert_eq!(op.op, MatOp::Trans);
        assert_eq!(op.ld, 3);
    }
}
