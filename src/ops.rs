//! Public entry points: `add`, `trace`, `contract`.
//!
//! Each entry validates the index maps and shapes before any write, folds
//! the operand conjugation tags, normalizes alpha/beta into [`Scale`] tags, and
//! dispatches once into a monomorphized kernel instantiation. A kernel is
//! never partially executed on bad input.

use crate::contract::{self as planner, ContractMethod};
use crate::element_op::{Conjugation, ElementConj};
use crate::kernel;
use crate::scale::Scale;
use crate::view::{invert_perm, StridedView, StridedViewMut};
use crate::{Error, Result, Scalar, ScalarBase};

// ============================================================================
// Validation helpers
// ============================================================================

/// Check that the given index lists jointly form a partition of `0..rank`.
fn check_partition(op: &'static str, rank: usize, lists: &[&[usize]]) -> Result<()> {
    let mut seen = vec![false; rank];
    let mut count = 0usize;
    for list in lists {
        for &axis in *list {
            if axis >= rank || seen[axis] {
                return Err(Error::shape_mismatch(
                    op,
                    format!("index lists {:?} do not partition 0..{}", lists, rank),
                ));
            }
            seen[axis] = true;
            count += 1;
        }
    }
    if count != rank {
        return Err(Error::shape_mismatch(
            op,
            format!("index lists {:?} do not partition 0..{}", lists, rank),
        ));
    }
    Ok(())
}

fn check_output_extents(
    op: &'static str,
    c_dims: &[usize],
    src_dims: &[usize],
    map: &[usize],
) -> Result<()> {
    for (i, &p) in map.iter().enumerate() {
        if c_dims[i] != src_dims[p] {
            return Err(Error::shape_mismatch(
                op,
                format!(
                    "destination axis {} has extent {} but maps to source axis {} of extent {}",
                    i, c_dims[i], p, src_dims[p]
                ),
            ));
        }
    }
    Ok(())
}

/// Fold the explicit flag with the view's own tag; real element types never
/// conjugate.
fn effective_conj<T: ElementConj>(flag: Conjugation, view_tag: Conjugation) -> Conjugation {
    if T::CONJ_IS_NOOP {
        Conjugation::Normal
    } else {
        flag.compose(view_tag)
    }
}

/// alpha = 0 paths: the destination is scaled (or zeroed) without any source
/// load. beta = 1 is a full no-op.
fn scale_destination<T: ScalarBase>(beta: Scale<T>, c: &mut StridedViewMut<'_, T>) {
    let dims = c.dims().to_vec();
    let sc = c.strides().to_vec();
    let cp = c.as_mut_ptr();
    match beta {
        Scale::One => {}
        Scale::Zero => unsafe {
            kernel::map_into(&dims, &sc, &sc, cp as *const T, cp, &|_, _| T::zero());
        },
        Scale::Val(b) => unsafe {
            kernel::map_into(&dims, &sc, &sc, cp as *const T, cp, &move |x, _| b * x);
        },
    }
}

// ============================================================================
// add
// ============================================================================

/// Permuted addition: `C <- beta*C + alpha*op(permute(A, ind_c_in_a))`.
///
/// `ind_c_in_a[i]` names the axis of `A` that supplies destination axis `i`;
/// it must be a permutation of `0..ndim(A)` and the mapped extents must
/// match. `conj_a` composes with any conjugation tag already on the view.
pub fn add<T: ScalarBase>(
    alpha: T,
    a: &StridedView<'_, T>,
    conj_a: Conjugation,
    beta: T,
    c: &mut StridedViewMut<'_, T>,
    ind_c_in_a: &[usize],
) -> Result<()> {
    let rank = a.ndim();
    if c.ndim() != rank || ind_c_in_a.len() != rank {
        return Err(Error::shape_mismatch(
            "add",
            format!(
                "source rank {}, destination rank {}, index map length {}",
                rank,
                c.ndim(),
                ind_c_in_a.len()
            ),
        ));
    }
    check_partition("add", rank, &[ind_c_in_a])?;
    check_output_extents("add", c.dims(), a.dims(), ind_c_in_a)?;

    let conj = effective_conj::<T>(conj_a, a.conjugation());
    let alpha = Scale::new(alpha);
    let beta = Scale::new(beta);

    if c.is_empty() {
        return Ok(());
    }
    if alpha.is_zero() {
        scale_destination(beta, c);
        return Ok(());
    }

    let sa: Vec<isize> = ind_c_in_a.iter().map(|&p| a.strides()[p]).collect();
    let dims = c.dims().to_vec();
    let sc = c.strides().to_vec();
    let ap = a.ptr();
    let cp = c.as_mut_ptr();

    match conj {
        Conjugation::Normal => map_dispatch(alpha, beta, &dims, &sc, &sa, ap, cp, |x| x),
        Conjugation::Conjugated => {
            map_dispatch(alpha, beta, &dims, &sc, &sa, ap, cp, |x: T| x.conj())
        }
    }
    Ok(())
}

/// Emit one monomorphized map kernel per (alpha, beta) tag combination. alpha = 0 never
/// reaches this point.
#[allow(clippy::too_many_arguments)]
fn map_dispatch<T: ScalarBase, G: Fn(T) -> T + Copy>(
    alpha: Scale<T>,
    beta: Scale<T>,
    dims: &[usize],
    sc: &[isize],
    sa: &[isize],
    ap: *const T,
    cp: *mut T,
    g: G,
) {
    unsafe {
        match (alpha, beta) {
            (Scale::One, Scale::Zero) => {
                kernel::map_into(dims, sc, sa, ap, cp, &move |x, _| g(x))
            }
            (Scale::One, Scale::One) => {
                kernel::map_into(dims, sc, sa, ap, cp, &move |x, c| c + g(x))
            }
            (Scale::One, Scale::Val(b)) => {
                kernel::map_into(dims, sc, sa, ap, cp, &move |x, c| b * c + g(x))
            }
            (Scale::Val(al), Scale::Zero) => {
                kernel::map_into(dims, sc, sa, ap, cp, &move |x, _| al * g(x))
            }
            (Scale::Val(al), Scale::One) => {
                kernel::map_into(dims, sc, sa, ap, cp, &move |x, c| c + al * g(x))
            }
            (Scale::Val(al), Scale::Val(b)) => {
                kernel::map_into(dims, sc, sa, ap, cp, &move |x, c| b * c + al * g(x))
            }
            (Scale::Zero, _) => unreachable!("alpha == 0 is handled before dispatch"),
        }
    }
}

// ============================================================================
// trace
// ============================================================================

/// Partial trace: `C <- beta*C + alpha*sum_d op(A[..., d, d, ...])` over the axis
/// pairs `(cind_a1[i], cind_a2[i])`.
///
/// `ind_c_in_a`, `cind_a1` and `cind_a2` must jointly partition `0..ndim(A)`
/// with `ndim(A) = ndim(C) + 2*K`, and each paired extent must agree.
#[allow(clippy::too_many_arguments)]
pub fn trace<T: ScalarBase>(
    alpha: T,
    a: &StridedView<'_, T>,
    conj_a: Conjugation,
    beta: T,
    c: &mut StridedViewMut<'_, T>,
    ind_c_in_a: &[usize],
    cind_a1: &[usize],
    cind_a2: &[usize],
) -> Result<()> {
    let rank = a.ndim();
    let k = cind_a1.len();
    if cind_a2.len() != k {
        return Err(Error::shape_mismatch(
            "trace",
            format!("{} first-axis entries vs {} second-axis entries", k, cind_a2.len()),
        ));
    }
    if c.ndim() != ind_c_in_a.len() || rank != c.ndim() + 2 * k {
        return Err(Error::shape_mismatch(
            "trace",
            format!(
                "source rank {} with destination rank {} and {} traced pairs",
                rank,
                c.ndim(),
                k
            ),
        ));
    }
    check_partition("trace", rank, &[ind_c_in_a, cind_a1, cind_a2])?;
    for i in 0..k {
        let (d1, d2) = (a.dims()[cind_a1[i]], a.dims()[cind_a2[i]]);
        if d1 != d2 {
            return Err(Error::shape_mismatch(
                "trace",
                format!(
                    "traced axes {} and {} have extents {} and {}",
                    cind_a1[i], cind_a2[i], d1, d2
                ),
            ));
        }
    }
    check_output_extents("trace", c.dims(), a.dims(), ind_c_in_a)?;

    let conj = effective_conj::<T>(conj_a, a.conjugation());
    let alpha = Scale::new(alpha);
    let beta = Scale::new(beta);

    if c.is_empty() {
        return Ok(());
    }
    if alpha.is_zero() {
        scale_destination(beta, c);
        return Ok(());
    }

    let sa_out: Vec<isize> = ind_c_in_a.iter().map(|&p| a.strides()[p]).collect();
    let tr_dims: Vec<usize> = cind_a1.iter().map(|&p| a.dims()[p]).collect();
    // Diagonal stride trick: stepping both paired axes at once is one fused
    // axis with the summed stride.
    let sa_tr: Vec<isize> = cind_a1
        .iter()
        .zip(cind_a2.iter())
        .map(|(&p, &q)| a.strides()[p] + a.strides()[q])
        .collect();

    let out_dims = c.dims().to_vec();
    let sc = c.strides().to_vec();
    let ap = a.ptr();
    let cp = c.as_mut_ptr();

    unsafe {
        match conj {
            Conjugation::Normal => kernel::trace_into(
                &out_dims, &sc, &sa_out, &tr_dims, &sa_tr, ap, cp, alpha, beta, &|x| x,
            ),
            Conjugation::Conjugated => kernel::trace_into(
                &out_dims,
                &sc,
                &sa_out,
                &tr_dims,
                &sa_tr,
                ap,
                cp,
                alpha,
                beta,
                &|x: T| x.conj(),
            ),
        }
    }
    Ok(())
}

// ============================================================================
// contract
// ============================================================================

/// Pairwise contraction: `C <- beta*C + alpha*sum op(A)*op(B)` over the paired
/// contracted axes.
///
/// `oind_a`/`cind_a` must partition `0..ndim(A)` and `oind_b`/`cind_b` must
/// partition `0..ndim(B)`; paired contracted extents must agree.
/// `ind_c_in_oab[i]` names the position, inside the concatenation
/// `[oind_a; oind_b]` of open axes, that supplies destination axis `i`.
#[allow(clippy::too_many_arguments)]
pub fn contract<T: Scalar>(
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
    method: ContractMethod,
) -> Result<()> {
    check_partition("contract", a.ndim(), &[oind_a, cind_a])?;
    check_partition("contract", b.ndim(), &[oind_b, cind_b])?;
    if cind_a.len() != cind_b.len() {
        return Err(Error::shape_mismatch(
            "contract",
            format!(
                "{} contracted axes in A vs {} in B",
                cind_a.len(),
                cind_b.len()
            ),
        ));
    }
    for (&pa, &pb) in cind_a.iter().zip(cind_b.iter()) {
        if a.dims()[pa] != b.dims()[pb] {
            return Err(Error::shape_mismatch(
                "contract",
                format!(
                    "contracted axis {} of A has extent {} but axis {} of B has extent {}",
                    pa,
                    a.dims()[pa],
                    pb,
                    b.dims()[pb]
                ),
            ));
        }
    }
    let n_open = oind_a.len() + oind_b.len();
    if c.ndim() != n_open || ind_c_in_oab.len() != n_open {
        return Err(Error::shape_mismatch(
            "contract",
            format!(
                "{} open axes with destination rank {} and output map length {}",
                n_open,
                c.ndim(),
                ind_c_in_oab.len()
            ),
        ));
    }
    check_partition("contract", n_open, &[ind_c_in_oab])?;
    let mut open_dims: Vec<usize> = oind_a.iter().map(|&p| a.dims()[p]).collect();
    open_dims.extend(oind_b.iter().map(|&p| b.dims()[p]));
    check_output_extents("contract", c.dims(), &open_dims, ind_c_in_oab)?;

    let conj_a = effective_conj::<T>(conj_a, a.conjugation());
    let conj_b = effective_conj::<T>(conj_b, b.conjugation());
    let alpha_tag = Scale::new(alpha);
    let beta_tag = Scale::new(beta);

    if c.is_empty() {
        return Ok(());
    }
    if alpha_tag.is_zero() {
        scale_destination(beta_tag, c);
        return Ok(());
    }

    match method {
        ContractMethod::Auto | ContractMethod::ForceLibraryGemm => planner::contract_gemm(
            alpha, a, conj_a, b, conj_b, beta, c, oind_a, cind_a, oind_b, cind_b, ind_c_in_oab,
        ),
        ContractMethod::ForceNative => {
            contract_native(
                alpha_tag, a, conj_a, b, conj_b, beta_tag, c, oind_a, cind_a, oind_b, cind_b,
                ind_c_in_oab,
            );
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn contract_native<T: ScalarBase>(
    alpha: Scale<T>,
    a: &StridedView<'_, T>,
    conj_a: Conjugation,
    b: &StridedView<'_, T>,
    conj_b: Conjugation,
    beta: Scale<T>,
    c: &mut StridedViewMut<'_, T>,
    oind_a: &[usize],
    cind_a: &[usize],
    oind_b: &[usize],
    cind_b: &[usize],
    ind_c_in_oab: &[usize],
) {
    let oa_dims: Vec<usize> = oind_a.iter().map(|&p| a.dims()[p]).collect();
    let a_oa: Vec<isize> = oind_a.iter().map(|&p| a.strides()[p]).collect();
    let ob_dims: Vec<usize> = oind_b.iter().map(|&p| b.dims()[p]).collect();
    let b_ob: Vec<isize> = oind_b.iter().map(|&p| b.strides()[p]).collect();
    let con_dims: Vec<usize> = cind_a.iter().map(|&p| a.dims()[p]).collect();
    let a_con: Vec<isize> = cind_a.iter().map(|&p| a.strides()[p]).collect();
    let b_con: Vec<isize> = cind_b.iter().map(|&p| b.strides()[p]).collect();

    // Fold the output permutation into the destination strides: open axis j
    // lives at destination position inv[j].
    let inv = invert_perm(ind_c_in_oab);
    let c_open: Vec<isize> = inv.iter().map(|&i| c.strides()[i]).collect();
    let (c_oa, c_ob) = c_open.split_at(oind_a.len());

    let ap = a.ptr();
    let bp = b.ptr();
    let cp = c.as_mut_ptr();

    macro_rules! run {
        ($fa:expr, $fb:expr) => {
            unsafe {
                kernel::contract_into(
                    &oa_dims, &a_oa, c_oa, &ob_dims, &b_ob, c_ob, &con_dims, &a_con, &b_con, ap,
                    bp, cp, alpha, beta, &$fa, &$fb,
                )
            }
        };
    }
    match (conj_a.is_conjugated(), conj_b.is_conjugated()) {
        (false, false) => run!(|x: T| x, |x: T| x),
        (false, true) => run!(|x: T| x, |x: T| x.conj()),
        (true, false) => run!(|x: T| x.conj(), |x: T| x),
        (true, true) => run!(|x: T| x.conj(), |x: T| x.conj()),
    }
}
