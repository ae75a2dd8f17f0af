//! Axis reordering for the recursive kernels.
//!
//! A pure function from `(dims, stride tuples...)` to the same tuples with
//! axes reordered for locality, plus the per-axis minimum stride magnitudes
//! that steer the divide-and-conquer splitter.
//!
//! Policy: the axis with the smallest destination stride becomes innermost
//! (position 0), so writes stream through memory; ties are broken by the
//! remaining operands' strides in order. The splitter later picks the axis
//! with the largest `extent x min_stride` product, since subdividing it
//! shrinks the touched footprint the most.

/// Reordered iteration geometry for one axis group.
#[derive(Debug, Clone)]
pub(crate) struct AxisOrder {
    /// Extents in iteration order (position 0 is innermost). Axes of extent 1
    /// are dropped; axes of extent 0 are kept so emptiness stays observable.
    pub dims: Vec<usize>,
    /// One stride tuple per operand, in the same operand order as the input.
    pub strides: Vec<Vec<isize>>,
    /// Per-axis minimum of `|stride|` over all operands.
    pub min_strides: Vec<usize>,
}

/// Reorder `dims` and the given stride tuples.
///
/// `dest` is the index of the destination operand inside `strides_list`; its
/// strides dominate the sort key.
pub(crate) fn optimize(dims: &[usize], strides_list: &[&[isize]], dest: usize) -> AxisOrder {
    debug_assert!(strides_list.iter().all(|s| s.len() == dims.len()));

    let mut axes: Vec<usize> = (0..dims.len()).filter(|&k| dims[k] != 1).collect();

    // Sort key per axis: destination stride first, then the other operands.
    let key = |k: usize| -> Vec<usize> {
        let mut key = Vec::with_capacity(strides_list.len());
        key.push(strides_list[dest][k].unsigned_abs());
        for (i, strides) in strides_list.iter().enumerate() {
            if i != dest {
                key.push(strides[k].unsigned_abs());
            }
        }
        key
    };
    axes.sort_by(|&a, &b| key(a).cmp(&key(b)));

    let dims_out: Vec<usize> = axes.iter().map(|&k| dims[k]).collect();
    let strides_out: Vec<Vec<isize>> = strides_list
        .iter()
        .map(|strides| axes.iter().map(|&k| strides[k]).collect())
        .collect();
    let min_strides: Vec<usize> = axes
        .iter()
        .map(|&k| {
            strides_list
                .iter()
                .map(|s| s[k].unsigned_abs())
                .min()
                .unwrap_or(0)
        })
        .collect();

    AxisOrder {
        dims: dims_out,
        strides: strides_out,
        min_strides,
    }
}

/// Pick the axis whose subdivision shrinks the working set the most:
/// the one maximizing `dims[k] * min_strides[k]` among splittable axes.
pub(crate) fn split_axis(dims: &[usize], min_strides: &[usize]) -> Option<usize> {
    let mut best = None;
    let mut best_cost = 0usize;
    for (k, (&d, &m)) in dims.iter().zip(min_strides.iter()).enumerate() {
        if d > 1 {
            let cost = d.saturating_mul(m.max(1));
            if cost > best_cost {
                best = Some(k);
                best_cost = cost;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimize_dest_row_major() {
        // Destination row-major: last axis has the smallest stride, so it
        // must end up innermost (position 0).
        let dims = [4usize, 5];
        let sc = [5isize, 1];
        let sa = [1isize, 4];
        let ord = optimize(&dims, &[&sc, &sa], 0);
        assert_eq!(ord.dims, vec![5, 4]);
        assert_eq!(ord.strides[0], vec![1, 5]);
        assert_eq!(ord.strides[1], vec![4, 1]);
        assert_eq!(ord.min_strides, vec![1, 1]);
    }

    #[test]
    fn test_optimize_tie_broken_by_source() {
        // Destination strides tie (broadcast-like zero strides); the source
        // decides the order.
        let dims = [3usize, 4];
        let sc = [0isize, 0];
        let sa = [4isize, 1];
        let ord = optimize(&dims, &[&sc, &sa], 0);
        assert_eq!(ord.strides[1], vec![1, 4]);
    }

    #[test]
    fn test_optimize_drops_unit_axes() {
        let dims = [4usize, 1, 5];
        let sc = [1isize, 99, 4];
        let sa = [1isize, 99, 4];
        let ord = optimize(&dims, &[&sc, &sa], 0);
        assert_eq!(ord.dims, vec![4, 5]);
    }

    #[test]
    fn test_optimize_keeps_zero_extent() {
        let dims = [4usize, 0];
        let sc = [1isize, 4];
        let ord = optimize(&dims, &[&sc], 0);
        assert!(ord.dims.contains(&0));
    }

    #[test]
    fn test_optimize_rank0() {
        let ord = optimize(&[], &[&[], &[]], 0);
        assert!(ord.dims.is_empty());
        assert_eq!(ord.strides.len(), 2);
    }

    #[test]
    fn test_optimize_negative_strides() {
        let dims = [4usize, 5];
        let sc = [-1isize, -4];
        let ord = optimize(&dims, &[&sc], 0);
        // |-1| < |-4|: axis 0 stays innermost.
        assert_eq!(ord.strides[0], vec![-1, -4]);
    }

    #[test]
    fn test_split_axis_prefers_large_span() {
        // Axis 1 spans 5*10 = 50 elements, axis 0 only 8.
        let dims = [8usize, 5];
        let mins = [1usize, 10];
        assert_eq!(split_axis(&dims, &mins), Some(1));
    }

    #[test]
    fn test_split_axis_ignores_unsplittable() {
        let dims = [1usize, 6];
        let mins = [100usize, 1];
        assert_eq!(split_axis(&dims, &mins), Some(1));
        assert_eq!(split_axis(&[1, 1], &[1, 1]), None);
    }
}
