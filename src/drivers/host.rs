//! Host execution strategies.
//!
//! A [`HostSweep`] applies a kernel body across an index domain. Kernel bodies are written once,
//! as functions of the index; the sweep decides how the domain is traversed. The parallel sweeps
//! rely on the [`rayon`][1] crate and are fully joined before returning.
//!
//! [1]: https://crates.io/crates/rayon

use crate::consts::SIMD_LANES;

use rayon::prelude::*;

use std::ops::Range;

/// Host strategy for sweeping an index domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostSweep {
    /// Plain sequential loop.
    Loop,
    /// Sequential traversal in fixed-width lane chunks, laid out for auto-vectorization.
    Lanes,
    /// One contiguous block of the domain per worker thread.
    StaticThreads,
    /// Rayon's adaptive work-stealing parallel iterators.
    WorkStealing,
}

/// Length of the per-thread blocks of [`HostSweep::StaticThreads`].
fn static_block(extent: usize) -> usize {
    let threads = rayon::current_num_threads().max(1);
    extent.div_ceil(threads).max(1)
}

fn block_range(block: usize, block_len: usize, extent: usize) -> Range<usize> {
    let start = block * block_len;
    start..(start + block_len).min(extent)
}

impl HostSweep {
    /// Calls `f(i, &mut out[i])` for every `i` in `0..out.len()`.
    #[allow(clippy::needless_range_loop)]
    pub fn for_each<T, F>(self, out: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        match self {
            Self::Loop => {
                for i in 0..out.len() {
                    f(i, &mut out[i]);
                }
            }
            Self::Lanes => {
                let mut chunks = out.chunks_exact_mut(SIMD_LANES);
                let mut base = 0;
                for chunk in &mut chunks {
                    for (lane, v) in chunk.iter_mut().enumerate() {
                        f(base + lane, v);
                    }
                    base += SIMD_LANES;
                }
                for (lane, v) in chunks.into_remainder().iter_mut().enumerate() {
                    f(base + lane, v);
                }
            }
            Self::StaticThreads => {
                let block = static_block(out.len());
                out.par_chunks_mut(block)
                    .enumerate()
                    .for_each(|(b, chunk)| {
                        let start = b * block;
                        chunk
                            .iter_mut()
                            .enumerate()
                            .for_each(|(l, v)| f(start + l, v));
                    });
            }
            Self::WorkStealing => {
                out.par_iter_mut().enumerate().for_each(|(i, v)| f(i, v));
            }
        }
    }

    /// Calls `f(r, row)` for every row `r` of `out` viewed as rows of `row_len` elements (the
    /// last row may be shorter).
    pub fn for_each_row<T, F>(self, out: &mut [T], row_len: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        assert!(row_len > 0, "row length must be positive");
        match self {
            Self::Loop | Self::Lanes => {
                out.chunks_mut(row_len)
                    .enumerate()
                    .for_each(|(r, row)| f(r, row));
            }
            Self::StaticThreads => {
                let rows = out.len().div_ceil(row_len);
                let rows_per_block = static_block(rows);
                out.par_chunks_mut(rows_per_block * row_len)
                    .enumerate()
                    .for_each(|(b, block)| {
                        block
                            .chunks_mut(row_len)
                            .enumerate()
                            .for_each(|(r, row)| f(b * rows_per_block + r, row));
                    });
            }
            Self::WorkStealing => {
                out.par_chunks_mut(row_len)
                    .enumerate()
                    .for_each(|(r, row)| f(r, row));
            }
        }
    }

    /// Folds `map(i)` for every `i` in `0..extent` with `combine`, starting from `identity`.
    ///
    /// `identity` must be a neutral element of `combine` and `combine` must be associative and
    /// commutative: the parallel and lane sweeps use it once per partial result. Floating-point
    /// sums only agree with the sequential loop up to reassociation.
    pub fn reduce<A, M, C>(self, extent: usize, identity: A, map: M, combine: C) -> A
    where
        A: Copy + Send + Sync,
        M: Fn(usize) -> A + Sync + Send,
        C: Fn(A, A) -> A + Sync + Send,
    {
        match self {
            Self::Loop => (0..extent).fold(identity, |acc, i| combine(acc, map(i))),
            Self::Lanes => {
                let mut lanes = [identity; SIMD_LANES];
                let full = extent - extent % SIMD_LANES;
                for base in (0..full).step_by(SIMD_LANES) {
                    for (lane, acc) in lanes.iter_mut().enumerate() {
                        *acc = combine(*acc, map(base + lane));
                    }
                }
                for i in full..extent {
                    lanes[0] = combine(lanes[0], map(i));
                }
                lanes.into_iter().fold(identity, &combine)
            }
            Self::StaticThreads => {
                let block = static_block(extent);
                let blocks = extent.div_ceil(block);
                (0..blocks)
                    .into_par_iter()
                    .map(|b| {
                        block_range(b, block, extent).fold(identity, |acc, i| combine(acc, map(i)))
                    })
                    .reduce(|| identity, &combine)
            }
            Self::WorkStealing => (0..extent)
                .into_par_iter()
                .fold(|| identity, |acc, i| combine(acc, map(i)))
                .reduce(|| identity, &combine),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [HostSweep; 4] = [
        HostSweep::Loop,
        HostSweep::Lanes,
        HostSweep::StaticThreads,
        HostSweep::WorkStealing,
    ];

    #[test]
    fn for_each_visits_every_index_once() {
        for sweep in ALL {
            for len in [0, 1, SIMD_LANES - 1, SIMD_LANES, 1000] {
                let mut out = vec![0_usize; len];
                sweep.for_each(&mut out, |i, v| *v += i + 1);
                assert!(
                    out.iter().enumerate().all(|(i, &v)| v == i + 1),
                    "{sweep:?} len={len}"
                );
            }
        }
    }

    #[test]
    fn for_each_row_passes_row_numbers() {
        for sweep in ALL {
            let mut out = vec![0_usize; 7 * 5 + 3];
            sweep.for_each_row(&mut out, 5, |r, row| row.iter_mut().for_each(|v| *v = r));
            for (i, &v) in out.iter().enumerate() {
                assert_eq!(v, i / 5, "{sweep:?} i={i}");
            }
        }
    }

    #[test]
    fn integer_reductions_agree_exactly() {
        let data: Vec<i64> = (0..10_007).map(|i| (i * 7919) % 201 - 100).collect();
        let expected = (
            data.iter().sum::<i64>(),
            *data.iter().min().unwrap(),
            *data.iter().max().unwrap(),
        );
        for sweep in ALL {
            let got = sweep.reduce(
                data.len(),
                (0_i64, i64::MAX, i64::MIN),
                |i| (data[i], data[i], data[i]),
                |a, b| (a.0 + b.0, a.1.min(b.1), a.2.max(b.2)),
            );
            assert_eq!(got, expected, "{sweep:?}");
        }
    }

    #[test]
    fn empty_reduction_yields_identity() {
        for sweep in ALL {
            assert_eq!(sweep.reduce(0, 0.0, |_| 1.0, |a, b| a + b), 0.0);
        }
    }

    #[test]
    fn float_reductions_agree_within_tolerance() {
        let term = |i: usize| 1.0 / (i as f64 + 1.0);
        let reference = HostSweep::Loop.reduce(100_000, 0.0, term, |a, b| a + b);
        for sweep in ALL {
            let got = sweep.reduce(100_000, 0.0, term, |a, b| a + b);
            assert!(((got - reference) / reference).abs() < 1e-12, "{sweep:?}");
        }
    }
}
