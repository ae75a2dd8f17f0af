//! Dynamic-rank strided view and array types.
//!
//! - [`StridedView`]: non-owning read-only descriptor (base pointer, dims,
//!   element strides, conjugation tag). Never reshapes or copies.
//! - [`StridedViewMut`]: mutable counterpart for kernel destinations.
//! - [`StridedArray`]: owned strided buffer, used for scratch storage inside
//!   the contraction planner and as the concrete container in tests.
//!
//! Views are constructed at the start of each public kernel call and
//! discarded at return; they borrow their data for that duration.

use std::sync::Arc;

use crate::element_op::{Conjugation, ElementConj};
use crate::{Error, Result};

// ============================================================================
// Layout helpers
// ============================================================================

/// Compute column-major strides (first index varies fastest).
pub fn col_major_strides(dims: &[usize]) -> Vec<isize> {
    let rank = dims.len();
    if rank == 0 {
        return vec![];
    }
    let mut strides = vec![1isize; rank];
    for i in 1..rank {
        strides[i] = strides[i - 1] * dims[i - 1] as isize;
    }
    strides
}

/// Compute row-major strides (last index varies fastest).
pub fn row_major_strides(dims: &[usize]) -> Vec<isize> {
    let rank = dims.len();
    if rank == 0 {
        return vec![];
    }
    let mut strides = vec![1isize; rank];
    for i in (0..rank - 1).rev() {
        strides[i] = strides[i + 1] * dims[i + 1] as isize;
    }
    strides
}

/// Invert a permutation: the result sends each value of `perm` back to the
/// position it came from.
///
/// Sorting the positions by the value they map to is exactly the inverse
/// permutation read off in order.
pub fn invert_perm(perm: &[usize]) -> Vec<usize> {
    let mut positions: Vec<usize> = (0..perm.len()).collect();
    positions.sort_unstable_by_key(|&i| perm[i]);
    positions
}

/// Validate that every addressable offset stays within `[0, len)`.
///
/// The extreme offsets are reached by taking each axis to its far end in the
/// direction of its stride sign, so one accumulation pass over the axes
/// yields the lowest and highest address the view can produce. Arithmetic is
/// widened to `i128` with saturation; a saturated span cannot pass the final
/// range check, so overflow degenerates to rejection.
fn validate_bounds(len: usize, dims: &[usize], strides: &[isize], offset: isize) -> Result<()> {
    if dims.len() != strides.len() {
        return Err(Error::shape_mismatch(
            "view",
            format!("{} dims vs {} strides", dims.len(), strides.len()),
        ));
    }
    // Empty array: nothing is ever addressed.
    if dims.contains(&0) {
        return Ok(());
    }
    let (lowest, highest) = dims.iter().zip(strides.iter()).fold(
        (offset as i128, offset as i128),
        |(lowest, highest), (&dim, &stride)| {
            let reach = (dim as i128 - 1).saturating_mul(stride as i128);
            if reach < 0 {
                (lowest.saturating_add(reach), highest)
            } else {
                (lowest, highest.saturating_add(reach))
            }
        },
    );
    if lowest < 0 || highest >= len as i128 {
        return Err(Error::OutOfBounds);
    }
    Ok(())
}

fn validate_perm(perm: &[usize], rank: usize) -> Result<()> {
    if perm.len() != rank {
        return Err(Error::shape_mismatch(
            "permute",
            format!("permutation of length {} for rank {}", perm.len(), rank),
        ));
    }
    let mut seen = vec![false; rank];
    for &p in perm {
        if p >= rank || seen[p] {
            return Err(Error::shape_mismatch(
                "permute",
                format!("invalid permutation {:?} for rank {}", perm, rank),
            ));
        }
        seen[p] = true;
    }
    Ok(())
}

// ============================================================================
// StridedView
// ============================================================================

/// Dynamic-rank immutable strided view with a per-operand conjugation tag.
///
/// Owns nothing; borrowed for the duration of one kernel call. Permutation
/// and conjugation are zero-copy metadata transformations.
pub struct StridedView<'a, T> {
    ptr: *const T,
    data: &'a [T],
    dims: Arc<[usize]>,
    strides: Arc<[isize]>,
    offset: isize,
    conj: Conjugation,
}

unsafe impl<T: Send> Send for StridedView<'_, T> {}
unsafe impl<T: Sync> Sync for StridedView<'_, T> {}

impl<T> Clone for StridedView<'_, T> {
    fn clone(&self) -> Self {
        Self {
            ptr: self.ptr,
            data: self.data,
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            offset: self.offset,
            conj: self.conj,
        }
    }
}

impl<T> std::fmt::Debug for StridedView<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StridedView")
            .field("dims", &self.dims)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("conj", &self.conj)
            .finish()
    }
}

impl<'a, T> StridedView<'a, T> {
    /// Create a new view over a borrowed slice.
    pub fn new(data: &'a [T], dims: &[usize], strides: &[isize], offset: isize) -> Result<Self> {
        validate_bounds(data.len(), dims, strides, offset)?;
        let ptr = unsafe { data.as_ptr().offset(offset) };
        Ok(Self {
            ptr,
            data,
            dims: Arc::from(dims),
            strides: Arc::from(strides),
            offset,
            conj: Conjugation::Normal,
        })
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn offset(&self) -> isize {
        self.offset
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }

    #[inline]
    pub fn data(&self) -> &'a [T] {
        self.data
    }

    /// Raw const pointer to the element at the view's base offset.
    #[inline]
    pub fn ptr(&self) -> *const T {
        self.ptr
    }

    /// The conjugation tag carried by this view.
    #[inline]
    pub fn conjugation(&self) -> Conjugation {
        self.conj
    }

    /// Toggle the conjugation tag (zero-copy).
    pub fn conj(&self) -> StridedView<'a, T> {
        let mut out = self.clone();
        out.conj = out.conj.compose(Conjugation::Conjugated);
        out
    }

    /// Copy of this view with the conjugation tag cleared.
    pub(crate) fn strip_conj(&self) -> StridedView<'a, T> {
        let mut out = self.clone();
        out.conj = Conjugation::Normal;
        out
    }

    /// Permute dimensions (zero-copy). `perm[i]` names the source axis that
    /// becomes axis `i` of the result.
    pub fn permute(&self, perm: &[usize]) -> Result<StridedView<'a, T>> {
        validate_perm(perm, self.dims.len())?;
        let new_dims: Vec<usize> = perm.iter().map(|&p| self.dims[p]).collect();
        let new_strides: Vec<isize> = perm.iter().map(|&p| self.strides[p]).collect();
        Ok(StridedView {
            ptr: self.ptr,
            data: self.data,
            dims: Arc::from(new_dims),
            strides: Arc::from(new_strides),
            offset: self.offset,
            conj: self.conj,
        })
    }
}

impl<T: ElementConj> StridedView<'_, T> {
    /// Read one element, applying the view's conjugation tag.
    pub fn get(&self, indices: &[usize]) -> T {
        assert_eq!(indices.len(), self.dims.len(), "wrong number of indices");
        let mut idx = 0isize;
        for (i, &index) in indices.iter().enumerate() {
            assert!(
                index < self.dims[i],
                "index {} out of bounds for dim {}",
                index,
                self.dims[i]
            );
            idx += index as isize * self.strides[i];
        }
        self.conj.apply(unsafe { *self.ptr.offset(idx) })
    }
}

// ============================================================================
// StridedViewMut
// ============================================================================

/// Dynamic-rank mutable strided view.
///
/// Carries no conjugation tag: element operations are applied on the read
/// side only.
pub struct StridedViewMut<'a, T> {
    ptr: *mut T,
    data: &'a mut [T],
    dims: Arc<[usize]>,
    strides: Arc<[isize]>,
    offset: isize,
}

unsafe impl<T: Send> Send for StridedViewMut<'_, T> {}

impl<T> std::fmt::Debug for StridedViewMut<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StridedViewMut")
            .field("dims", &self.dims)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<'a, T> StridedViewMut<'a, T> {
    /// Create a new mutable view over a borrowed slice.
    pub fn new(
        data: &'a mut [T],
        dims: &[usize],
        strides: &[isize],
        offset: isize,
    ) -> Result<Self> {
        validate_bounds(data.len(), dims, strides, offset)?;
        let ptr = unsafe { data.as_mut_ptr().offset(offset) };
        Ok(Self {
            ptr,
            data,
            dims: Arc::from(dims),
            strides: Arc::from(strides),
            offset,
        })
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }

    /// Raw mutable pointer to the element at the view's base offset.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr
    }

    /// Permute dimensions, consuming the view to preserve uniqueness.
    pub fn permute(self, perm: &[usize]) -> Result<StridedViewMut<'a, T>> {
        validate_perm(perm, self.dims.len())?;
        let new_dims: Vec<usize> = perm.iter().map(|&p| self.dims[p]).collect();
        let new_strides: Vec<isize> = perm.iter().map(|&p| self.strides[p]).collect();
        Ok(StridedViewMut {
            ptr: self.ptr,
            data: self.data,
            dims: Arc::from(new_dims),
            strides: Arc::from(new_strides),
            offset: self.offset,
        })
    }

    /// Reborrow as an immutable view.
    pub fn as_view(&self) -> StridedView<'_, T> {
        StridedView {
            ptr: self.ptr as *const T,
            data: unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.data.len()) },
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            offset: self.offset,
            conj: Conjugation::Normal,
        }
    }
}

impl<T: Copy> StridedViewMut<'_, T> {
    pub fn get(&self, indices: &[usize]) -> T {
        assert_eq!(indices.len(), self.dims.len());
        let mut idx = 0isize;
        for (i, &index) in indices.iter().enumerate() {
            assert!(index < self.dims[i]);
            idx += index as isize * self.strides[i];
        }
        unsafe { *self.ptr.offset(idx) }
    }

    pub fn set(&mut self, indices: &[usize], value: T) {
        assert_eq!(indices.len(), self.dims.len());
        let mut idx = 0isize;
        for (i, &index) in indices.iter().enumerate() {
            assert!(index < self.dims[i]);
            idx += index as isize * self.strides[i];
        }
        unsafe {
            *self.ptr.offset(idx) = value;
        }
    }
}

// ============================================================================
// StridedArray
// ============================================================================

/// Owned strided multidimensional array.
///
/// Rank-0 arrays hold a single element at offset 0; `get(&[])` reads it.
pub struct StridedArray<T> {
    data: Vec<T>,
    dims: Arc<[usize]>,
    strides: Arc<[isize]>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for StridedArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StridedArray")
            .field("dims", &self.dims)
            .field("strides", &self.strides)
            .finish()
    }
}

impl<T: Clone> Clone for StridedArray<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            dims: self.dims.clone(),
            strides: self.strides.clone(),
        }
    }
}

impl<T: Copy> StridedArray<T> {
    /// Column-major array filled with `value`.
    pub fn filled(dims: &[usize], value: T) -> Self {
        let total: usize = dims.iter().product();
        Self {
            data: vec![value; total],
            dims: Arc::from(dims),
            strides: Arc::from(col_major_strides(dims)),
        }
    }

    /// Column-major array with values produced by a function of the index.
    pub fn from_fn_col_major(dims: &[usize], mut f: impl FnMut(&[usize]) -> T) -> Self {
        let total: usize = dims.iter().product();
        let rank = dims.len();
        let mut data = Vec::with_capacity(total);
        let mut idx = vec![0usize; rank];
        for _ in 0..total {
            data.push(f(&idx));
            for d in 0..rank {
                idx[d] += 1;
                if idx[d] < dims[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
        Self {
            data,
            dims: Arc::from(dims),
            strides: Arc::from(col_major_strides(dims)),
        }
    }

    /// Row-major array with values produced by a function of the index.
    pub fn from_fn_row_major(dims: &[usize], mut f: impl FnMut(&[usize]) -> T) -> Self {
        let total: usize = dims.iter().product();
        let rank = dims.len();
        let mut data = Vec::with_capacity(total);
        let mut idx = vec![0usize; rank];
        for _ in 0..total {
            data.push(f(&idx));
            for d in (0..rank).rev() {
                idx[d] += 1;
                if idx[d] < dims[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
        Self {
            data,
            dims: Arc::from(dims),
            strides: Arc::from(row_major_strides(dims)),
        }
    }
}

impl<T> StridedArray<T> {
    /// Create from raw parts. `data.len()` must cover every addressable
    /// offset (rank-0 arrays need one element).
    pub fn from_parts(data: Vec<T>, dims: &[usize], strides: &[isize]) -> Result<Self> {
        if data.is_empty() && dims.iter().all(|&d| d != 0) {
            return Err(Error::OutOfBounds);
        }
        validate_bounds(data.len().max(1), dims, strides, 0)?;
        Ok(Self {
            data,
            dims: Arc::from(dims),
            strides: Arc::from(strides),
        })
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Immutable view over this array.
    pub fn view(&self) -> StridedView<'_, T> {
        StridedView {
            ptr: self.data.as_ptr(),
            data: &self.data,
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            offset: 0,
            conj: Conjugation::Normal,
        }
    }

    /// Mutable view over this array.
    pub fn view_mut(&mut self) -> StridedViewMut<'_, T> {
        StridedViewMut {
            ptr: self.data.as_mut_ptr(),
            data: &mut self.data,
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            offset: 0,
        }
    }
}

impl<T: ElementConj> StridedArray<T> {
    pub fn get(&self, indices: &[usize]) -> T {
        self.view().get(indices)
    }

    pub fn set(&mut self, indices: &[usize], value: T) {
        self.view_mut().set(indices, value);
    }
}

// ============================================================================
// Tests
// ============================================================================
