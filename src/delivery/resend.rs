//! Subdivision of failed operations for the bounded resend pass.
//!
//! Chunks that failed delivery are not resent in their original shape:
//! the combined failed operations are re-split into at most
//! `max_failed_chunks` roughly equal groups, each delivered once. There is
//! no recursive subdivision; a group that fails again stays failed, and
//! the run-level failed-chunk budget decides whether the run aborts.

use crate::diff::ChangeOp;

/// Split the failed operations into at most `max_groups` roughly equal
/// groups, preserving key order.
pub fn subdivide(ops: Vec<ChangeOp>, max_groups: usize) -> Vec<Vec<ChangeOp>> {
    if ops.is_empty() || max_groups == 0 {
        return Vec::new();
    }

    let group_size = ops.len().div_ceil(max_groups);
    let mut groups = Vec::with_capacity(max_groups);
    let mut rest = ops;

    while !rest.is_empty() {
        let tail = rest.split_off(group_size.min(rest.len()));
        groups.push(rest);
        rest = tail;
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DeleteRef;

    fn ops(n: usize) -> Vec<ChangeOp> {
        (0..n)
            .map(|i| ChangeOp::Delete(DeleteRef { key: format!("k{i:03}") }))
            .collect()
    }

    fn sizes(groups: &[Vec<ChangeOp>]) -> Vec<usize> {
        groups.iter().map(Vec::len).collect()
    }

    #[test]
    fn test_splits_into_roughly_equal_groups() {
        assert_eq!(sizes(&subdivide(ops(9), 3)), vec![3, 3, 3]);
        assert_eq!(sizes(&subdivide(ops(10), 3)), vec![4, 4, 2]);
        assert_eq!(sizes(&subdivide(ops(7), 3)), vec![3, 3, 1]);
    }

    #[test]
    fn test_never_exceeds_max_groups() {
        for n in 1..50 {
            assert!(subdivide(ops(n), 3).len() <= 3, "n = {n}");
        }
    }

    #[test]
    fn test_fewer_ops_than_groups() {
        assert_eq!(sizes(&subdivide(ops(2), 3)), vec![1, 1]);
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        assert!(subdivide(ops(0), 3).is_empty());
    }

    #[test]
    fn test_order_is_preserved() {
        let groups = subdivide(ops(10), 3);
        let keys: Vec<&str> = groups
            .iter()
            .flat_map(|g| g.iter().map(ChangeOp::key))
            .collect();
        let expected: Vec<String> = (0..10).map(|i| format!("k{i:03}")).collect();
        assert_eq!(keys, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
