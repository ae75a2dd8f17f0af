//! Strided tensor kernels: permuted addition, partial trace, and pairwise
//! contraction.
//!
//! This crate provides the three primitives needed to implement arbitrary
//! Einstein-summation-style expressions on dense floating-point tensors with
//! arbitrary stride layouts:
//!
//! - [`add`]: `C <- beta*C + alpha*op(permute(A))`
//! - [`trace`]: `C <- beta*C + alpha*partial_trace(op(A))` over matched axis pairs
//! - [`contract`]: `C <- beta*C + alpha*sum op(A)*op(B)` over paired contracted axes
//!
//! `op(*)` is identity or element-wise complex conjugation, selected per
//! operand by a [`Conjugation`] tag.
//!
//! # Design
//!
//! All three kernels run on a recursive divide-and-conquer traversal: axes
//! are reordered so the destination streams through memory, then the axis
//! spanning the largest memory footprint is split in halves until a block
//! fits cache, which executes as a tight nested loop. alpha/beta are classified
//! into `{0, 1, general}` tags once per call, so the inner loops never
//! multiply by one or add zero.
//!
//! [`contract`] additionally dispatches to a column-major `gemm` (CBLAS with
//! the `blas` feature, a built-in reference implementation otherwise),
//! aliasing operands as matrices when their memory already matches a
//! gemm-compatible layout and permuting them otherwise.
//!
//! # Example
//!
//! ```
//! use strided_ops::{add, Conjugation, StridedArray};
//!
//! // C = A^T via a permuted add.
//! let a = StridedArray::<f64>::from_fn_row_major(&[2, 2], |idx| (idx[0] * 2 + idx[1]) as f64);
//! let mut c = StridedArray::<f64>::filled(&[2, 2], 0.0);
//! add(1.0, &a.view(), Conjugation::Normal, 0.0, &mut c.view_mut(), &[1, 0]).unwrap();
//! assert_eq!(c.get(&[0, 1]), 2.0);
//! ```
//!
//! # Concurrency
//!
//! Kernels are single-threaded and keep no cross-call state; callers may
//! invoke them from multiple threads concurrently as long as destination
//! tensors are disjoint. Scratch buffers are owned by the call frame and
//! released on every exit path.

mod contract;
mod element_op;
mod gemm;
mod kernel;
mod ops;
mod order;
mod scale;
mod view;

// ============================================================================
// Element types and tags
// ============================================================================
pub use element_op::{Conjugation, ElementConj};
pub use scale::Scale;

// ============================================================================
// Views and containers
// ============================================================================
pub use view::{
    col_major_strides, invert_perm, row_major_strides, StridedArray, StridedView, StridedViewMut,
};

// ============================================================================
// Kernels
// ============================================================================
pub use contract::ContractMethod;
pub use gemm::{Gemm, MatOp};
pub use ops::{add, contract, trace};

// ============================================================================
// Scalar bounds
// ============================================================================

/// Element types usable with the `add` and `trace` kernels.
pub trait ScalarBase:
    Copy
    + ElementConj
    + Send
    + Sync
    + std::ops::Mul<Output = Self>
    + std::ops::Add<Output = Self>
    + num_traits::Zero
    + num_traits::One
    + PartialEq
{
}

impl<T> ScalarBase for T where
    T: Copy
        + ElementConj
        + Send
        + Sync
        + std::ops::Mul<Output = T>
        + std::ops::Add<Output = T>
        + num_traits::Zero
        + num_traits::One
        + PartialEq
{
}

/// Element types usable with [`contract`]: the real and complex floating
/// kinds the matrix-multiply backend supports.
pub trait Scalar: ScalarBase + Gemm {}

impl<T> Scalar for T where T: ScalarBase + Gemm {}

// ============================================================================
// Error types
// ============================================================================

/// Errors raised by the kernels and view constructors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Dimension mismatch, malformed index map, or contracted-extent
    /// disagreement. Raised by the public entry points before any write.
    #[error("{op}: shape mismatch, {detail}")]
    ShapeMismatch {
        /// The operation that rejected its arguments.
        op: &'static str,
        /// The offending sizes.
        detail: String,
    },

    /// A view would address memory outside its buffer.
    #[error("strided view exceeds the bounds of its buffer")]
    OutOfBounds,
}

impl Error {
    pub(crate) fn shape_mismatch(op: &'static str, detail: impl Into<String>) -> Self {
        Error::ShapeMismatch {
            op,
            detail: detail.into(),
        }
    }
}

/// Result type for strided tensor operations.
pub type Result<T> = std::result::Result<T, Error>;
