//! Recursive divide-and-conquer iteration engine.
//!
//! All three kernels share the same traversal scheme: axes are reordered by
//! [`crate::order`], then the axis with the largest `extent x min_stride`
//! product is split in halves until the remaining work fits a base block,
//! which runs as a nested loop with the innermost axis at position 0. The
//! recursion never materializes intermediate copies; it only shifts element
//! offsets.
//!
//! Three specializations:
//! - map (backs `add`): one source, one destination;
//! - trace: one source with extra diagonal axes accumulated per output cell;
//! - contract: two sources with open and contracted axis groups.
//!
//! The element bodies arrive as closures monomorphized by the scalar
//! dispatcher in [`crate::ops`], so tag handling never reaches a hot loop.

use crate::order::{self, split_axis};
use crate::scale::Scale;
use crate::ScalarBase;

/// Base-case threshold in scalar operations. Blocks below this run as plain
/// nested loops; above it the largest-span axis is split.
pub(crate) const BASE_WORK: usize = 2048;

// ============================================================================
// Map kernel (add)
// ============================================================================

struct Map2<'k, T, F> {
    a: *const T,
    c: *mut T,
    sa: &'k [isize],
    sc: &'k [isize],
    min_strides: &'k [usize],
    f: &'k F,
}

impl<T: Copy, F: Fn(T, T) -> T> Map2<'_, T, F> {
    unsafe fn rec(&self, dims: &mut [usize], off_a: isize, off_c: isize) {
        let total: usize = dims.iter().product();
        if total <= BASE_WORK {
            return self.block(dims, off_a, off_c);
        }
        let k = match split_axis(dims, self.min_strides) {
            Some(k) => k,
            None => return self.block(dims, off_a, off_c),
        };
        let d = dims[k];
        let d1 = d / 2;
        dims[k] = d1;
        self.rec(dims, off_a, off_c);
        dims[k] = d - d1;
        self.rec(
            dims,
            off_a + d1 as isize * self.sa[k],
            off_c + d1 as isize * self.sc[k],
        );
        dims[k] = d;
    }

    unsafe fn block(&self, dims: &[usize], off_a: isize, off_c: isize) {
        match dims.len() {
            0 => {
                let cell = self.c.offset(off_c);
                *cell = (self.f)(*self.a.offset(off_a), *cell);
            }
            1 => {
                let (sa0, sc0) = (self.sa[0], self.sc[0]);
                let mut oa = off_a;
                let mut oc = off_c;
                for _ in 0..dims[0] {
                    let cell = self.c.offset(oc);
                    *cell = (self.f)(*self.a.offset(oa), *cell);
                    oa += sa0;
                    oc += sc0;
                }
            }
            n => {
                let l = n - 1;
                let mut oa = off_a;
                let mut oc = off_c;
                for _ in 0..dims[l] {
                    self.block(&dims[..l], oa, oc);
                    oa += self.sa[l];
                    oc += self.sc[l];
                }
            }
        }
    }
}

/// `C[i...] = f(A[i...], C[i...])` over a common index space.
///
/// `a_strides` must already be permuted into the destination's axis order.
///
/// # Safety
///
/// Both pointers must address valid memory for every index within `dims`
/// under the given strides, and the destination must not alias the source
/// unless strides are identical (the self-update case).
pub(crate) unsafe fn map_into<T: Copy, F: Fn(T, T) -> T>(
    dims: &[usize],
    c_strides: &[isize],
    a_strides: &[isize],
    a: *const T,
    c: *mut T,
    f: &F,
) {
    if dims.iter().any(|&d| d == 0) {
        return;
    }
    let ord = order::optimize(dims, &[c_strides, a_strides], 0);
    let kernel = Map2 {
        a,
        c,
        sa: &ord.strides[1],
        sc: &ord.strides[0],
        min_strides: &ord.min_strides,
        f,
    };
    let mut dims = ord.dims;
    kernel.rec(&mut dims, 0, 0);
}

// ============================================================================
// Trace kernel
// ============================================================================

struct Trace<'k, T, F> {
    a: *const T,
    c: *mut T,
    sa_out: &'k [isize],
    sc_out: &'k [isize],
    min_strides: &'k [usize],
    tr_dims: &'k [usize],
    sa_tr: &'k [isize],
    tr_work: usize,
    alpha: Scale<T>,
    beta: Scale<T>,
    f: &'k F,
}

impl<T: ScalarBase, F: Fn(T) -> T> Trace<'_, T, F> {
    unsafe fn rec(&self, out_dims: &mut [usize], off_a: isize, off_c: isize) {
        let total = out_dims.iter().product::<usize>() * self.tr_work;
        if total <= BASE_WORK {
            return self.block(out_dims, off_a, off_c);
        }
        let k = match split_axis(out_dims, self.min_strides) {
            Some(k) => k,
            None => return self.block(out_dims, off_a, off_c),
        };
        let d = out_dims[k];
        let d1 = d / 2;
        out_dims[k] = d1;
        self.rec(out_dims, off_a, off_c);
        out_dims[k] = d - d1;
        self.rec(
            out_dims,
            off_a + d1 as isize * self.sa_out[k],
            off_c + d1 as isize * self.sc_out[k],
        );
        out_dims[k] = d;
    }

    unsafe fn block(&self, out_dims: &[usize], off_a: isize, off_c: isize) {
        match out_dims.len() {
            0 => {
                let acc = self.diag_sum(self.tr_dims, off_a);
                self.beta.fold_into(self.c.offset(off_c), self.alpha.apply(acc));
            }
            1 => {
                let (sa0, sc0) = (self.sa_out[0], self.sc_out[0]);
                let mut oa = off_a;
                let mut oc = off_c;
                for _ in 0..out_dims[0] {
                    let acc = self.diag_sum(self.tr_dims, oa);
                    self.beta.fold_into(self.c.offset(oc), self.alpha.apply(acc));
                    oa += sa0;
                    oc += sc0;
                }
            }
            n => {
                let l = n - 1;
                let mut oa = off_a;
                let mut oc = off_c;
                for _ in 0..out_dims[l] {
                    self.block(&out_dims[..l], oa, oc);
                    oa += self.sa_out[l];
                    oc += self.sc_out[l];
                }
            }
        }
    }

    /// Sum `f(A[...])` over the diagonal axes anchored at `off_a`.
    unsafe fn diag_sum(&self, tr_dims: &[usize], off_a: isize) -> T {
        match tr_dims.len() {
            0 => (self.f)(*self.a.offset(off_a)),
            1 => {
                let s0 = self.sa_tr[0];
                let mut acc = T::zero();
                let mut oa = off_a;
                for _ in 0..tr_dims[0] {
                    acc = acc + (self.f)(*self.a.offset(oa));
                    oa += s0;
                }
                acc
            }
            n => {
                let l = n - 1;
                let mut acc = T::zero();
                let mut oa = off_a;
                for _ in 0..tr_dims[l] {
                    acc = acc + self.diag_sum(&tr_dims[..l], oa);
                    oa += self.sa_tr[l];
                }
                acc
            }
        }
    }
}

/// `C[i...] = beta*C[i...] + alpha*sum_d f(A[i..., d, d])` with the diagonal axis
/// pairs already fused into `tr_dims`/`a_tr_strides` (each pair contributes
/// the sum of its two strides).
///
/// # Safety
///
/// Pointers must be valid for all addressed offsets; no aliasing between
/// `a` and `c`.
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn trace_into<T: ScalarBase, F: Fn(T) -> T>(
    out_dims: &[usize],
    c_strides: &[isize],
    a_out_strides: &[isize],
    tr_dims: &[usize],
    a_tr_strides: &[isize],
    a: *const T,
    c: *mut T,
    alpha: Scale<T>,
    beta: Scale<T>,
    f: &F,
) {
    if out_dims.iter().any(|&d| d == 0) {
        return;
    }
    let out_ord = order::optimize(out_dims, &[c_strides, a_out_strides], 0);
    let tr_ord = order::optimize(tr_dims, &[a_tr_strides], 0);
    let tr_work: usize = tr_ord.dims.iter().product::<usize>().max(1);

    let kernel = Trace {
        a,
        c,
        sa_out: &out_ord.strides[1],
        sc_out: &out_ord.strides[0],
        min_strides: &out_ord.min_strides,
        tr_dims: &tr_ord.dims,
        sa_tr: &tr_ord.strides[0],
        tr_work,
        alpha,
        beta,
        f,
    };
    let mut out_dims = out_ord.dims.clone();
    kernel.rec(&mut out_dims, 0, 0);
}

// ============================================================================
// Native contract kernel
// ============================================================================

#[derive(Clone, Copy, PartialEq)]
enum Group {
    OpenA,
    OpenB,
    Contracted,
}

struct Contract2<'k, T, FA, FB> {
    a: *const T,
    b: *const T,
    c: *mut T,
    sa_oa: &'k [isize],
    sc_oa: &'k [isize],
    sb_ob: &'k [isize],
    sc_ob: &'k [isize],
    sa_con: &'k [isize],
    sb_con: &'k [isize],
    min_oa: &'k [usize],
    min_ob: &'k [usize],
    min_con: &'k [usize],
    alpha: Scale<T>,
    fa: &'k FA,
    fb: &'k FB,
}

impl<T: ScalarBase, FA: Fn(T) -> T, FB: Fn(T) -> T> Contract2<'_, T, FA, FB> {
    #[allow(clippy::too_many_arguments)]
    unsafe fn rec(
        &self,
        oa_dims: &mut [usize],
        ob_dims: &mut [usize],
        con_dims: &mut [usize],
        off_a: isize,
        off_b: isize,
        off_c: isize,
        beta: Scale<T>,
    ) {
        let work = oa_dims.iter().product::<usize>()
            * ob_dims.iter().product::<usize>()
            * con_dims.iter().product::<usize>();
        if work <= BASE_WORK {
            return self.block(oa_dims, ob_dims, con_dims, off_a, off_b, off_c, beta);
        }

        // Best split over all three groups.
        let mut choice: Option<(Group, usize, usize)> = None;
        for (group, dims, mins) in [
            (Group::OpenA, &*oa_dims, self.min_oa),
            (Group::OpenB, &*ob_dims, self.min_ob),
            (Group::Contracted, &*con_dims, self.min_con),
        ] {
            if let Some(k) = split_axis(dims, mins) {
                let cost = dims[k].saturating_mul(mins[k].max(1));
                if choice.map_or(true, |(_, _, best)| cost > best) {
                    choice = Some((group, k, cost));
                }
            }
        }
        let (group, k, _) = match choice {
            Some(c) => c,
            None => return self.block(oa_dims, ob_dims, con_dims, off_a, off_b, off_c, beta),
        };

        match group {
            Group::OpenA => {
                let d = oa_dims[k];
                let d1 = d / 2;
                oa_dims[k] = d1;
                self.rec(oa_dims, ob_dims, con_dims, off_a, off_b, off_c, beta);
                oa_dims[k] = d - d1;
                self.rec(
                    oa_dims,
                    ob_dims,
                    con_dims,
                    off_a + d1 as isize * self.sa_oa[k],
                    off_b,
                    off_c + d1 as isize * self.sc_oa[k],
                    beta,
                );
                oa_dims[k] = d;
            }
            Group::OpenB => {
                let d = ob_dims[k];
                let d1 = d / 2;
                ob_dims[k] = d1;
                self.rec(oa_dims, ob_dims, con_dims, off_a, off_b, off_c, beta);
                ob_dims[k] = d - d1;
                self.rec(
                    oa_dims,
                    ob_dims,
                    con_dims,
                    off_a,
                    off_b + d1 as isize * self.sb_ob[k],
                    off_c + d1 as isize * self.sc_ob[k],
                    beta,
                );
                ob_dims[k] = d;
            }
            Group::Contracted => {
                // Partial sums: the second half accumulates onto the first,
                // so it always runs with beta = 1.
                let d = con_dims[k];
                let d1 = d / 2;
                con_dims[k] = d1;
                self.rec(oa_dims, ob_dims, con_dims, off_a, off_b, off_c, beta);
                con_dims[k] = d - d1;
                self.rec(
                    oa_dims,
                    ob_dims,
                    con_dims,
                    off_a + d1 as isize * self.sa_con[k],
                    off_b + d1 as isize * self.sb_con[k],
                    off_c,
                    Scale::One,
                );
                con_dims[k] = d;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    unsafe fn block(
        &self,
        oa_dims: &[usize],
        ob_dims: &[usize],
        con_dims: &[usize],
        off_a: isize,
        off_b: isize,
        off_c: isize,
        beta: Scale<T>,
    ) {
        match oa_dims.len() {
            0 => self.loop_b(ob_dims, con_dims, off_a, off_b, off_c, beta),
            n => {
                let l = n - 1;
                let mut oa = off_a;
                let mut oc = off_c;
                for _ in 0..oa_dims[l] {
                    self.block(&oa_dims[..l], ob_dims, con_dims, oa, off_b, oc, beta);
                    oa += self.sa_oa[l];
                    oc += self.sc_oa[l];
                }
            }
        }
    }

    unsafe fn loop_b(
        &self,
        ob_dims: &[usize],
        con_dims: &[usize],
        off_a: isize,
        off_b: isize,
        off_c: isize,
        beta: Scale<T>,
    ) {
        match ob_dims.len() {
            0 => {
                let acc = self.con_sum(con_dims, off_a, off_b);
                beta.fold_into(self.c.offset(off_c), self.alpha.apply(acc));
            }
            n => {
                let l = n - 1;
                let mut ob = off_b;
                let mut oc = off_c;
                for _ in 0..ob_dims[l] {
                    self.loop_b(&ob_dims[..l], con_dims, off_a, ob, oc, beta);
                    ob += self.sb_ob[l];
                    oc += self.sc_ob[l];
                }
            }
        }
    }

    /// Sum `fa(A)*fb(B)` over the contracted axes anchored at the offsets.
    unsafe fn con_sum(&self, con_dims: &[usize], off_a: isize, off_b: isize) -> T {
        match con_dims.len() {
            0 => (self.fa)(*self.a.offset(off_a)) * (self.fb)(*self.b.offset(off_b)),
            1 => {
                let (sa0, sb0) = (self.sa_con[0], self.sb_con[0]);
                let mut acc = T::zero();
                let mut oa = off_a;
                let mut ob = off_b;
                for _ in 0..con_dims[0] {
                    acc = acc + (self.fa)(*self.a.offset(oa)) * (self.fb)(*self.b.offset(ob));
                    oa += sa0;
                    ob += sb0;
                }
                acc
            }
            n => {
                let l = n - 1;
                let mut acc = T::zero();
                let mut oa = off_a;
                let mut ob = off_b;
                for _ in 0..con_dims[l] {
                    acc = acc + self.con_sum(&con_dims[..l], oa, ob);
                    oa += self.sa_con[l];
                    ob += self.sb_con[l];
                }
                acc
            }
        }
    }
}

/// Native pairwise contraction over grouped axes:
/// `C[oa, ob] = beta*C + alpha*sum_con fa(A[oa, con])*fb(B[ob, con])`.
///
/// The destination strides arrive split into the open-A and open-B groups;
/// the output permutation has already been folded into them.
///
/// # Safety
///
/// Pointers must be valid for every addressed offset; the destination must
/// not alias either source.
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn contract_into<T: ScalarBase, FA: Fn(T) -> T, FB: Fn(T) -> T>(
    oa_dims: &[usize],
    a_oa_strides: &[isize],
    c_oa_strides: &[isize],
    ob_dims: &[usize],
    b_ob_strides: &[isize],
    c_ob_strides: &[isize],
    con_dims: &[usize],
    a_con_strides: &[isize],
    b_con_strides: &[isize],
    a: *const T,
    b: *const T,
    c: *mut T,
    alpha: Scale<T>,
    beta: Scale<T>,
    fa: &FA,
    fb: &FB,
) {
    if oa_dims.iter().chain(ob_dims.iter()).any(|&d| d == 0) {
        return;
    }
    let oa_ord = order::optimize(oa_dims, &[c_oa_strides, a_oa_strides], 0);
    let ob_ord = order::optimize(ob_dims, &[c_ob_strides, b_ob_strides], 0);
    let con_ord = order::optimize(con_dims, &[a_con_strides, b_con_strides], 0);

    let kernel = Contract2 {
        a,
        b,
        c,
        sa_oa: &oa_ord.strides[1],
        sc_oa: &oa_ord.strides[0],
        sb_ob: &ob_ord.strides[1],
        sc_ob: &ob_ord.strides[0],
        sa_con: &con_ord.strides[0],
        sb_con: &con_ord.strides[1],
        min_oa: &oa_ord.min_strides,
        min_ob: &ob_ord.min_strides,
        min_con: &con_ord.min_strides,
        alpha,
        fa,
        fb,
    };
    let mut oa_dims = oa_ord.dims.clone();
    let mut ob_dims = ob_ord.dims.clone();
    let mut con_dims = con_ord.dims.clone();
    kernel.rec(&mut oa_dims, &mut ob_dims, &mut con_dims, 0, 0, 0, beta);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_copy_transposed() {
        // 3x2 row-major source read transposed into a 2x3 row-major dest.
        let a: Vec<f64> = (0..6).map(|x| x as f64).collect();
        let mut c = vec![0.0f64; 6];
        // dest dims [2,3]; A permuted strides: dest axis 0 <- src axis 1.
        unsafe {
            map_into(&[2, 3], &[3, 1], &[1, 2], a.as_ptr(), c.as_mut_ptr(), &|x, _| x);
        }
        // A (3x2 row-major): [[0,1],[2,3],[4,5]]; C = A^T = [[0,2,4],[1,3,5]]
        assert_eq!(c, vec![0.0, 2.0, 4.0, 1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_map_recursion_matches_direct() {
        // Large enough to force several recursive splits.
        let n = 97usize;
        let m = 53usize;
        let a: Vec<f64> = (0..n * m).map(|x| (x % 1013) as f64).collect();
        let mut c = vec![0.0f64; n * m];
        // Transposed read: dest row-major (n x m), source column-major-ish.
        unsafe {
            map_into(
                &[n, m],
                &[m as isize, 1],
                &[1, n as isize],
                a.as_ptr(),
                c.as_mut_ptr(),
                &|x, _| 2.0 * x,
            );
        }
        for i in 0..n {
            for j in 0..m {
                assert_eq!(c[i * m + j], 2.0 * a[j * n + i]);
            }
        }
    }

    #[test]
    fn test_trace_diagonal_sum() {
        // A is 3x3 row-major; trace axes fused: stride 3+1 = 4.
        let a: Vec<f64> = (0..9).map(|x| x as f64).collect();
        let mut c = vec![0.0f64];
        unsafe {
            trace_into(
                &[],
                &[],
                &[],
                &[3],
                &[4],
                a.as_ptr(),
                c.as_mut_ptr(),
                Scale::One,
                Scale::Zero,
                &|x| x,
            );
        }
        assert_eq!(c[0], 0.0 + 4.0 + 8.0);
    }

    #[test]
    fn test_trace_beta_accumulates() {
        let a: Vec<f64> = vec![1.0, 0.0, 0.0, 1.0];
        let mut c = vec![10.0f64];
        unsafe {
            trace_into(
                &[],
                &[],
                &[],
                &[2],
                &[3],
                a.as_ptr(),
                c.as_mut_ptr(),
                Scale::Val(2.0),
                Scale::Val(3.0),
                &|x| x,
            );
        }
        // 3*10 + 2*(1+1)
        assert_eq!(c[0], 34.0);
    }

    #[test]
    fn test_contract_matmul_small() {
        // C(2x2) = A(2x3)*B(3x2), all row-major.
        let a: Vec<f64> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b: Vec<f64> = vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let mut c = vec![0.0f64; 4];
        unsafe {
            contract_into(
                &[2],
                &[3],
                &[2],
                &[2],
                &[1],
                &[1],
                &[3],
                &[1],
                &[2],
                a.as_ptr(),
                b.as_ptr(),
                c.as_mut_ptr(),
                Scale::One,
                Scale::Zero,
                &|x| x,
                &|x| x,
            );
        }
        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_contract_split_contracted_axis() {
        // Long contracted axis forces the beta→1 split path; beta = 2 on entry.
        let k = 10_000usize;
        let a: Vec<f64> = vec![1.0; k];
        let b: Vec<f64> = vec![2.0; k];
        let mut c = vec![5.0f64];
        unsafe {
            contract_into(
                &[],
                &[],
                &[],
                &[],
                &[],
                &[],
                &[k],
                &[1],
                &[1],
                a.as_ptr(),
                b.as_ptr(),
                c.as_mut_ptr(),
                Scale::One,
                Scale::Val(2.0),
                &|x| x,
                &|x| x,
            );
        }
        // 2*5 + sum(1*2) = 10 + 20000
        assert_eq!(c[0], 20010.0);
    }

    #[test]
    fn test_contract_zero_length_sum() {
        // clen = 0: the destination still receives beta*C.
        let a: Vec<f64> = vec![];
        let b: Vec<f64> = vec![];
        let mut c = vec![3.0f64, 4.0];
        unsafe {
            contract_into(
                &[2],
                &[0],
                &[1],
                &[],
                &[],
                &[],
                &[0],
                &[1],
                &[1],
                a.as_ptr(),
                b.as_ptr(),
                c.as_mut_ptr(),
                Scale::One,
                Scale::Val(2.0),
                &|x| x,
                &|x| x,
            );
        }
        assert_eq!(c, vec![6.0, 8.0]);
    }
}
