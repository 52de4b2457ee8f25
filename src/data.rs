//! Array buffer utility.
//!
//! Allocation, deterministic initialization and checksumming of the flat numeric buffers owned by
//! the kernels. Every [`Buffer`] is counted while alive so that tests can check that a kernel
//! releases in `tear_down` everything it allocated in `set_up`.

use crate::{
    consts::{CHECKSUM_MODULUS, CHECKSUM_SCALE, INT_DATA_SEED},
    error::{Result, SuiteError},
    variant::VariantId,
};

use num::ToPrimitive;
use rand::prelude::*;
use tracing::trace;

use std::{
    cell::Cell,
    ops::{Deref, DerefMut},
};

thread_local! {
    static LIVE_BUFFERS: Cell<usize> = const { Cell::new(0) };
}

/// Number of buffers allocated on the current thread and not yet released.
pub fn live_buffers() -> usize {
    LIVE_BUFFERS.with(Cell::get)
}

/// Owned, fixed-length numeric buffer.
#[derive(Debug, PartialEq)]
pub struct Buffer<T> {
    data: Vec<T>,
}

impl<T> Deref for Buffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for Buffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Drop for Buffer<T> {
    fn drop(&mut self) {
        LIVE_BUFFERS.with(|c| c.set(c.get().saturating_sub(1)));
    }
}

/// Allocates a zero-filled buffer of `len` elements.
pub fn allocate<T: Copy + Default>(len: usize) -> Result<Buffer<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| SuiteError::Allocation { len })?;
    data.resize(len, T::default());

    LIVE_BUFFERS.with(|c| c.set(c.get() + 1));
    Ok(Buffer { data })
}

/// Releases a buffer. Ownership makes a second release or a later use impossible.
pub fn release<T>(buffer: Buffer<T>) {
    drop(buffer)
}

/// Weighted checksum of the first `len` elements of `buf`:
/// `Σ buf[i] * ((i % CHECKSUM_MODULUS) + 1) * CHECKSUM_SCALE`, summed in index order.
pub fn checksum<T: ToPrimitive + Copy>(buf: &[T], len: usize) -> f64 {
    buf.iter()
        .take(len)
        .enumerate()
        .map(|(i, v)| {
            let weight = (i % CHECKSUM_MODULUS + 1) as f64;
            v.to_f64().unwrap_or(f64::NAN) * weight * CHECKSUM_SCALE
        })
        .fold(0.0, |acc, term| acc + term)
}

/// Relative difference between a checksum and its reference.
pub fn relative_diff(value: f64, reference: f64) -> f64 {
    if value == reference {
        return 0.0;
    }
    let scale = reference.abs().max(f64::MIN_POSITIVE);
    (value - reference).abs() / scale
}

/// Deterministic data initializer.
///
/// Values only depend on the order of the initialization calls since the last [`reset`], never on
/// the variant: device variants stage the same host data. Kernels reset it before every set-up so
/// all variants of a kernel see identical inputs.
///
/// [`reset`]: DataInit::reset
#[derive(Clone, Debug)]
pub struct DataInit {
    count: usize,
    seed: u64,
}

impl Default for DataInit {
    fn default() -> Self {
        Self::new(INT_DATA_SEED)
    }
}

impl DataInit {
    pub fn new(seed: u64) -> Self {
        Self { count: 0, seed }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Number of initialization calls since the last reset.
    pub fn count(&self) -> usize {
        self.count
    }

    fn next_factor(&mut self) -> f64 {
        let factor = if self.count % 2 == 1 { 0.1 } else { 0.2 };
        self.count += 1;
        factor
    }

    /// Allocates a real buffer filled by [`DataInit::fill_reals`].
    pub fn reals(&mut self, len: usize, variant: VariantId) -> Result<Buffer<f64>> {
        let mut buf = allocate(len)?;
        self.fill_reals(&mut buf, variant);
        Ok(buf)
    }

    /// `buf[i] = f * (i + 1.1) / (i + 1.12345)`, `f` alternating between 0.2 and 0.1.
    pub fn fill_reals(&mut self, buf: &mut [f64], variant: VariantId) {
        let factor = self.next_factor();
        trace!(len = buf.len(), factor, %variant, "init reals");
        for (i, v) in buf.iter_mut().enumerate() {
            let x = i as f64;
            *v = factor * (x + 1.1) / (x + 1.12345);
        }
    }

    /// Next scalar of the sequence, using the real-buffer formula at the call index.
    pub fn scalar(&mut self, variant: VariantId) -> f64 {
        let x = self.count as f64;
        let value = self.next_factor() * (x + 1.1) / (x + 1.12345);
        trace!(value, %variant, "init scalar");
        value
    }

    /// Allocates an integer buffer of `-1`/`1` values from a seeded generator, with one `-58`
    /// and one `19` planted at generated positions.
    pub fn ints(&mut self, len: usize, variant: VariantId) -> Result<Buffer<i32>> {
        let mut buf = allocate(len)?;
        let mut rng = rand::rngs::SmallRng::seed_from_u64(self.seed);
        self.count += 1;
        trace!(len, seed = self.seed, %variant, "init ints");

        for v in buf.iter_mut() {
            *v = if rng.gen::<f64>() < 0.5 { -1 } else { 1 };
        }
        if len > 0 {
            let lo = rng.gen_range(0..len);
            buf[lo] = -58;
            let mut hi = rng.gen_range(0..len);
            if hi == lo && len > 1 {
                hi = (lo + 1) % len;
            }
            buf[hi] = 19;
        }
        Ok(buf)
    }
}

/// Offset/stride view over a flat buffer.
///
/// Used to alias several logical arrays onto one allocation; built once per kernel set-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StridedView {
    offset: usize,
    stride: usize,
}

impl StridedView {
    pub const fn new(offset: usize, stride: usize) -> Self {
        Self { offset, stride }
    }

    /// Flat position of logical element `i`.
    #[inline(always)]
    pub fn index(&self, i: usize) -> usize {
        self.offset + i * self.stride
    }

    #[inline(always)]
    pub fn at<T: Copy>(&self, base: &[T], i: usize) -> T {
        base[self.index(i)]
    }
}
