//! Testcase partitioning for split dispatch

use std::ops::RangeInclusive;

/// Split `1..=n` into `k` contiguous chunks whose lengths differ by at most
/// one. The first `n % k` chunks carry the extra element. Chunks may be
/// empty when `k > n`; the dispatcher skips those.
pub fn chunks(n: u32, k: usize) -> Vec<RangeInclusive<u32>> {
    assert!(k >= 1, "cannot partition across zero workers");

    let k = k as u32;
    let (d, r) = (n / k, n % k);

    let mut out = Vec::with_capacity(k as usize);
    let mut start = 1u32;
    for i in 0..k {
        let len = if i < r { d + 1 } else { d };
        // An empty chunk is encoded as an empty range.
        if len == 0 {
            out.push(1..=0);
            continue;
        }
        out.push(start..=start + len - 1);
        start += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten(chunks: &[RangeInclusive<u32>]) -> Vec<u32> {
        chunks.iter().cloned().flatten().collect()
    }

    #[test]
    fn concatenation_covers_the_range_in_order() {
        for n in 0..=25u32 {
            for k in 1..=8usize {
                let parts = chunks(n, k);
                assert_eq!(parts.len(), k);
                assert_eq!(flatten(&parts), (1..=n).collect::<Vec<_>>(), "n={n} k={k}");
            }
        }
    }

    #[test]
    fn lengths_differ_by_at_most_one() {
        for n in 1..=25u32 {
            for k in 1..=8usize {
                let lens: Vec<usize> = chunks(n, k)
                    .iter()
                    .map(|c| c.clone().count())
                    .collect();
                let max = lens.iter().max().unwrap();
                let min = lens.iter().min().unwrap();
                assert!(max - min <= 1, "n={n} k={k} lens={lens:?}");
            }
        }
    }

    #[test]
    fn four_over_two_splits_evenly() {
        let parts = chunks(4, 2);
        assert_eq!(parts, vec![1..=2, 3..=4]);
    }

    #[test]
    fn leading_chunks_take_the_remainder() {
        let parts = chunks(5, 3);
        assert_eq!(parts, vec![1..=2, 3..=4, 5..=5]);
    }

    #[test]
    fn more_workers_than_testcases_yields_empty_tails() {
        let parts = chunks(2, 4);
        assert_eq!(parts[0], 1..=1);
        assert_eq!(parts[1], 2..=2);
        assert!(parts[2].is_empty());
        assert!(parts[3].is_empty());
    }
}
