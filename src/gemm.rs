//! Matrix-multiply backend for the contraction library path.
//!
//! The planner reduces every library-path contraction to one column-major
//! `gemm` call per destination. With the `blas` feature the call lands in
//! CBLAS (`cblas_{s,d,c,z}gemm`); without it, a reference implementation with
//! identical semantics runs instead, so the library path is always available.

use crate::element_op::ElementConj;
use crate::ScalarBase;

/// Transpose flag of a stored operand, mirroring the BLAS convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatOp {
    /// Operand stored as the logical matrix.
    NoTrans,
    /// Operand stored transposed.
    Trans,
    /// Operand stored transposed; elements conjugated on read.
    ConjTrans,
}

#[cfg(feature = "blas")]
impl MatOp {
    fn to_cblas(self) -> cblas_sys::CBLAS_TRANSPOSE {
        match self {
            MatOp::NoTrans => cblas_sys::CBLAS_TRANSPOSE::CblasNoTrans,
            MatOp::Trans => cblas_sys::CBLAS_TRANSPOSE::CblasTrans,
            MatOp::ConjTrans => cblas_sys::CBLAS_TRANSPOSE::CblasConjTrans,
        }
    }
}

/// Element types with a matrix-multiply routine.
///
/// Computes `C = alpha*op(A)*op(B) + beta*C` where `op(A)` is `mxk`, `op(B)` is
/// `kxn`, and `C` is `mxn` column-major with leading dimension `ldc`.
pub trait Gemm: Sized + Copy {
    /// # Safety
    ///
    /// `a`, `b`, `c` must point to matrices of sufficient extent for the
    /// given dimensions and leading dimensions; `c` must not alias `a` or
    /// `b`.
    #[allow(clippy::too_many_arguments)]
    unsafe fn gemm(
        op_a: MatOp,
        op_b: MatOp,
        m: usize,
        n: usize,
        k: usize,
        alpha: Self,
        a: *const Self,
        lda: usize,
        b: *const Self,
        ldb: usize,
        beta: Self,
        c: *mut Self,
        ldc: usize,
    );
}

/// Reference column-major gemm, also used as the no-`blas` backend.
///
/// Reads of `C` are skipped when `beta` is zero so an uninitialized
/// destination never feeds the accumulator.
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn gemm_fallback<T: ScalarBase>(
    op_a: MatOp,
    op_b: MatOp,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: *const T,
    lda: usize,
    b: *const T,
    ldb: usize,
    beta: T,
    c: *mut T,
    ldc: usize,
) {
    let beta_is_zero = beta.is_zero();
    for j in 0..n {
        for i in 0..m {
            let mut sum = T::zero();
            for p in 0..k {
                let a_val = match op_a {
                    MatOp::NoTrans => *a.add(i + p * lda),
                    MatOp::Trans => *a.add(p + i * lda),
                    MatOp::ConjTrans => ElementConj::conj(*a.add(p + i * lda)),
                };
                let b_val = match op_b {
                    MatOp::NoTrans => *b.add(p + j * ldb),
                    MatOp::Trans => *b.add(j + p * ldb),
                    MatOp::ConjTrans => ElementConj::conj(*b.add(j + p * ldb)),
                };
                sum = sum + a_val * b_val;
            }
            let c_ptr = c.add(i + j * ldc);
            *c_ptr = if beta_is_zero {
                alpha * sum
            } else {
                alpha * sum + beta * *c_ptr
            };
        }
    }
}

macro_rules! impl_gemm {
    ($t:ty, $cblas:ident, real) => {
        impl Gemm for $t {
            unsafe fn gemm(
                op_a: MatOp,
                op_b: MatOp,
                m: usize,
                n: usize,
                k: usize,
                alpha: $t,
                a: *const $t,
                lda: usize,
                b: *const $t,
                ldb: usize,
                beta: $t,
                c: *mut $t,
                ldc: usize,
            ) {
                #[cfg(feature = "blas")]
                {
                    cblas_sys::$cblas(
                        cblas_sys::CBLAS_LAYOUT::CblasColMajor,
                        op_a.to_cblas(),
                        op_b.to_cblas(),
                        m as i32,
                        n as i32,
                        k as i32,
                        alpha,
                        a,
                        lda as i32,
                        b,
                        ldb as i32,
                        beta,
                        c,
                        ldc as i32,
                    );
                }
                #[cfg(not(feature = "blas"))]
                gemm_fallback(op_a, op_b, m, n, k, alpha, a, lda, b, ldb, beta, c, ldc);
            }
        }
    };
    ($t:ty, $cblas:ident, complex) => {
        impl Gemm for $t {
            unsafe fn gemm(
                op_a: MatOp,
                op_b: MatOp,
                m: usize,
                n: usize,
                k: usize,
                alpha: $t,
                a: *const $t,
                lda: usize,
                b: *const $t,
                ldb: usize,
                beta: $t,
                c: *mut $t,
                ldc: usize,
            ) {
                #[cfg(feature = "blas")]
                {
                    cblas_sys::$cblas(
                        cblas_sys::CBLAS_LAYOUT::CblasColMajor,
                        op_a.to_cblas(),
                        op_b.to_cblas(),
                        m as i32,
                        n as i32,
                        k as i32,
                        (&alpha) as *const _ as *const _,
                        a as *const _ as *const _,
                        lda as i32,
                        b as *const _ as *const _,
                        ldb as i32,
                        (&beta) as *const _ as *const _,
                        c as *mut _ as *mut _,
                        ldc as i32,
                    );
                }
                #[cfg(not(feature = "blas"))]
                gemm_fallback(op_a, op_b, m, n, k, alpha, a, lda, b, ldb, beta, c, ldc);
            }
        }
    };
}

impl_gemm!(f32, cblas_sgemm, real);
impl_gemm!(f64, cblas_dgemm, real);
impl_gemm!(num_complex::Complex32, cblas_cgemm, complex);
impl_gemm!(num_complex::Complex64, cblas_zgemm, complex);

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_fallback_notrans() {
        // Col-major A (2x3), B (3x2): C = A*B.
        let a = [1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0]; // [[1,2,3],[4,5,6]]
        let b = [7.0f64, 9.0, 11.0, 8.0, 10.0, 12.0]; // [[7,8],[9,10],[11,12]]
        let mut c = [0.0f64; 4];
        unsafe {
            gemm_fallback(
                MatOp::NoTrans,
                MatOp::NoTrans,
                2,
                2,
                3,
                1.0,
                a.as_ptr(),
                2,
                b.as_ptr(),
                3,
                0.0,
                c.as_mut_ptr(),
                2,
            );
        }
        // Col-major C: [[58,64],[139,154]] -> [58, 139, 64, 154]
        assert_eq!(c, [58.0, 139.0, 64.0, 154.0]);
    }

    #[test]
    fn test_fallback_trans_matches_notrans() {
        // A stored row-major is the transposed col-major store.
        let a_col = [1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0];
        let a_row = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [1.0f64, 0.0, 2.0, 0.0, 1.0, 1.0];
        let mut c1 = [0.0f64; 4];
        let mut c2 = [0.0f64; 4];
        unsafe {
            gemm_fallback(
                MatOp::NoTrans,
                MatOp::NoTrans,
                2,
                2,
                3,
                1.0,
                a_col.as_ptr(),
                2,
                b.as_ptr(),
                3,
                0.0,
                c1.as_mut_ptr(),
                2,
            );
            gemm_fallback(
                MatOp::Trans,
                MatOp::NoTrans,
                2,
                2,
                3,
                1.0,
                a_row.as_ptr(),
                3,
                b.as_ptr(),
                3,
                0.0,
                c2.as_mut_ptr(),
                2,
            );
        }
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_fallback_conjtrans() {
        // 1x1 result: conj(a)*b summed over k = 2.
        let a = [Complex64::new(1.0, 2.0), Complex64::new(3.0, -1.0)];
        let b = [Complex64::new(1.0, 0.0), Complex64::new(0.0, 1.0)];
        let mut c = [Complex64::new(0.0, 0.0)];
        unsafe {
            gemm_fallback(
                MatOp::ConjTrans,
                MatOp::NoTrans,
                1,
                1,
                2,
                Complex64::new(1.0, 0.0),
                a.as_ptr(),
                2,
                b.as_ptr(),
                2,
                Complex64::new(0.0, 0.0),
                c.as_mut_ptr(),
                1,
            );
        }
        // conj(1+2i)*1 + conj(3-i)*i = (1-2i) + (3+i)*i = 1-2i + 3i-1 = i
        assert_eq!(c[0], Complex64::new(0.0, 1.0));
    }

    #[test]
    fn test_fallback_beta_zero_ignores_garbage() {
        let a = [f64::NAN];
        let b = [1.0f64];
        let mut c = [f64::NAN];
        unsafe {
            gemm_fallback(
                MatOp::NoTrans,
                MatOp::NoTrans,
                1,
                1,
                0,
                1.0,
                a.as_ptr(),
                1,
                b.as_ptr(),
                1,
                0.0,
                c.as_mut_ptr(),
                1,
            );
        }
        assert_eq!(c[0], 0.0);
    }

    #[test]
    fn test_gemm_trait_dispatch() {
        let a = [2.0f64];
        let b = [3.0f64];
        let mut c = [1.0f64];
        unsafe {
            f64::gemm(
                MatOp::NoTrans,
                MatOp::NoTrans,
                1,
                1,
                1,
                1.0,
                a.as_ptr(),
                1,
                b.as_ptr(),
                1,
                1.0,
                c.as_mut_ptr(),
                1,
            );
        }
        assert_eq!(c[0], 7.0);
    }
}
