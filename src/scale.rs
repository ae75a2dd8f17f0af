//! Three-way coefficient tags for the alpha/beta scalar dispatcher.
//!
//! Public entry points normalize their alpha and beta arguments into [`Scale`] once,
//! and every kernel body is instantiated for a concrete tag combination. The
//! contract that matters on the hot path: an inner loop never multiplies by a
//! literal one or adds a literal zero.

use crate::ScalarBase;

/// A multiplicative coefficient, classified as `0`, `1`, or a general value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale<T> {
    /// The coefficient is exactly zero; the scaled operand is never read.
    Zero,
    /// The coefficient is exactly one; scaling is skipped entirely.
    One,
    /// A general coefficient.
    Val(T),
}

impl<T: ScalarBase> Scale<T> {
    /// Classify a runtime scalar.
    #[inline]
    pub fn new(value: T) -> Self {
        if value.is_zero() {
            Scale::Zero
        } else if value == T::one() {
            Scale::One
        } else {
            Scale::Val(value)
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        matches!(self, Scale::Zero)
    }

    #[inline]
    pub fn is_one(&self) -> bool {
        matches!(self, Scale::One)
    }

    /// Materialize the coefficient as a plain scalar.
    #[inline]
    pub fn value(self) -> T {
        match self {
            Scale::Zero => T::zero(),
            Scale::One => T::one(),
            Scale::Val(v) => v,
        }
    }

    /// Compute `self * x` without a multiply for the `Zero`/`One` tags.
    #[inline(always)]
    pub fn apply(self, x: T) -> T {
        match self {
            Scale::Zero => T::zero(),
            Scale::One => x,
            Scale::Val(v) => v * x,
        }
    }

    /// Store `self * *c + contrib` to `c`, skipping the load when `self` is
    /// zero (the destination may hold values the caller never initialized).
    ///
    /// # Safety
    ///
    /// `c` must be valid for writes, and for reads unless `self` is `Zero`.
    #[inline(always)]
    pub(crate) unsafe fn fold_into(self, c: *mut T, contrib: T) {
        match self {
            Scale::Zero => *c = contrib,
            Scale::One => *c = *c + contrib,
            Scale::Val(b) => *c = b * *c + contrib,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_classification() {
        assert_eq!(Scale::new(0.0f64), Scale::Zero);
        assert_eq!(Scale::new(1.0f64), Scale::One);
        assert_eq!(Scale::new(2.5f64), Scale::Val(2.5));
        assert_eq!(Scale::new(Complex64::new(1.0, 0.0)), Scale::One);
        assert_eq!(
            Scale::new(Complex64::new(0.0, 1.0)),
            Scale::Val(Complex64::new(0.0, 1.0))
        );
    }

    #[test]
    fn test_apply() {
        assert_eq!(Scale::Zero.apply(7.0f64), 0.0);
        assert_eq!(Scale::One.apply(7.0f64), 7.0);
        assert_eq!(Scale::Val(2.0).apply(7.0f64), 14.0);
    }

    #[test]
    fn test_value_roundtrip() {
        assert_eq!(Scale::new(0.0f64).value(), 0.0);
        assert_eq!(Scale::new(1.0f64).value(), 1.0);
        assert_eq!(Scale::new(-3.0f64).value(), -3.0);
    }

    #[test]
    fn test_fold_into() {
        let mut c = 10.0f64;
        unsafe {
            Scale::Val(2.0).fold_into(&mut c, 3.0);
        }
        assert_eq!(c, 23.0);
        unsafe {
            Scale::Zero.fold_into(&mut c, 5.0);
        }
        assert_eq!(c, 5.0);
        unsafe {
            Scale::One.fold_into(&mut c, 1.0);
        }
        assert_eq!(c, 6.0);
    }
}
