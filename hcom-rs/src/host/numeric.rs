//! Pure numeric kernels over sample slices.
//!
//! These back the default [`LogDataStore`](super::LogDataStore) operations.
//! Length mismatches are reported as `Err(message)`; every other input is
//! total (empty slices give empty results).

use std::f64::consts::{PI, SQRT_2};

/// Message used whenever two series must share a length.
pub const LENGTH_MISMATCH: &str = "The vectors do not have the same length!";

fn same_len(a: &[f64], b: &[f64]) -> Result<(), String> {
    if a.len() == b.len() {
        Ok(())
    } else {
        Err(LENGTH_MISMATCH.to_owned())
    }
}

// ── Element-wise arithmetic ──────────────────────────────────────────────────

pub fn zip_with(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Result<Vec<f64>, String> {
    same_len(a, b)?;
    Ok(a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect())
}

pub fn map(a: &[f64], f: impl Fn(f64) -> f64) -> Vec<f64> {
    a.iter().map(|&x| f(x)).collect()
}

/// Element-wise combination over the shorter of the two lengths.
pub fn zip_shortest(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}

// ── Calculus ──────────────────────────────────────────────────────────────────

/// Forward difference `dy/dx`; the last sample repeats the one before it.
pub fn diff(y: &[f64], x: &[f64]) -> Result<Vec<f64>, String> {
    same_len(y, x)?;
    let n = y.len();
    let mut out = y.to_vec();
    for i in 0..n.saturating_sub(1) {
        out[i] = (y[i + 1] - y[i]) / (x[i + 1] - x[i]);
    }
    if n > 1 {
        out[n - 1] = out[n - 2];
    }
    Ok(out)
}

/// Cumulative trapezoidal integral, starting at zero.
pub fn integrate(y: &[f64], x: &[f64]) -> Result<Vec<f64>, String> {
    same_len(y, x)?;
    let mut out = Vec::with_capacity(y.len());
    if y.is_empty() {
        return Ok(out);
    }
    out.push(0.0);
    for i in 1..y.len() {
        let prev = out[i - 1];
        out.push(prev + 0.5 * (x[i] - x[i - 1]) * (y[i - 1] + y[i]));
    }
    Ok(out)
}

/// First-order low-pass filter with break frequency `w` (rad/s), bilinear form.
pub fn lowpass1(y: &[f64], t: &[f64], w: f64) -> Result<Vec<f64>, String> {
    same_len(y, t)?;
    let mut out = y.to_vec();
    if y.is_empty() {
        return Ok(out);
    }
    let al = 2.0 / (2.0 * PI * w);
    let mut current = y[0];
    for i in 1..y.len() {
        let step = t[i] - t[i - 1];
        let alf = al / step;
        let g = 1.0 + alf;
        let a1 = (1.0 - alf) / g;
        let b1 = 1.0 / g;
        let previous = current;
        current = y[i];
        out[i] = -a1 * out[i - 1] + b1 * (current + previous);
    }
    Ok(out)
}

// ── Frequency analysis ────────────────────────────────────────────────────────

/// Single-sided spectrum of `y` sampled at `t`.
///
/// Returns `(frequency [rad/s], magnitude)`.  The input is resampled to the
/// largest power of two not exceeding its length; DC is skipped and the
/// Nyquist bin included.  `power` selects a power spectrum, otherwise RMS.
pub fn spectrum(y: &[f64], t: &[f64], power: bool) -> Result<(Vec<f64>, Vec<f64>), String> {
    same_len(y, t)?;
    if y.len() < 2 {
        return Err("Too few samples for a frequency spectrum.".to_owned());
    }
    let offset = t[0];
    let time: Vec<f64> = t.iter().map(|v| v - offset).collect();

    let n = 1usize << (usize::BITS - 1 - y.len().leading_zeros());
    let (data, time) = if n != y.len() {
        (resample(y, n), resample(&time, n))
    } else {
        (y.to_vec(), time)
    };

    let mut re = data;
    let mut im = vec![0.0; n];
    fft_in_place(&mut re, &mut im);

    let maxt = time[n - 1];
    let fs = n as f64 / maxt;
    let mut freq = Vec::with_capacity(n / 2);
    let mut mag = Vec::with_capacity(n / 2);
    for i in 1..=n / 2 {
        let sq = re[i] * re[i] + im[i] * im[i];
        mag.push(if power {
            sq / (n as f64 * fs)
        } else {
            SQRT_2 * sq.sqrt() / n as f64
        });
        freq.push(2.0 * PI * (i as f64 / maxt));
    }
    Ok((freq, mag))
}

/// Linear resampling to `n` evenly spaced index positions.
pub fn resample(v: &[f64], n: usize) -> Vec<f64> {
    if v.is_empty() || n == 0 {
        return Vec::new();
    }
    if n == 1 || v.len() == 1 {
        return vec![v[0]; n];
    }
    let scale = (v.len() - 1) as f64 / (n - 1) as f64;
    (0..n)
        .map(|i| {
            let pos = i as f64 * scale;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(v.len() - 1);
            let frac = pos - lo as f64;
            v[lo] + (v[hi] - v[lo]) * frac
        })
        .collect()
}

/// Iterative radix-2 Cooley-Tukey transform.  `re.len()` must be a power of two.
fn fft_in_place(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }
    let mut len = 2;
    while len <= n {
        let ang = -2.0 * PI / len as f64;
        for start in (0..n).step_by(len) {
            for k in 0..len / 2 {
                let (s, c) = (ang * k as f64).sin_cos();
                let a = start + k;
                let b = a + len / 2;
                let tr = re[b] * c - im[b] * s;
                let ti = re[b] * s + im[b] * c;
                re[b] = re[a] - tr;
                im[b] = im[a] - ti;
                re[a] += tr;
                im[a] += ti;
            }
        }
        len <<= 1;
    }
}

// ── Comparison ────────────────────────────────────────────────────────────────

/// Relative fuzzy equality.  When either side is zero the difference must be
/// below `eps * f64::EPSILON`.
pub fn fuzzy_equal(x: f64, y: f64, eps: f64) -> bool {
    if x == y {
        return true;
    }
    let diff = (x - y).abs();
    if x == 0.0 || y == 0.0 || diff < eps * f64::EPSILON {
        diff < eps * f64::EPSILON
    } else {
        diff / (x.abs() + y.abs()) < eps
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

pub fn greater_than(a: &[f64], threshold: f64) -> Vec<f64> {
    map(a, |x| flag(x > threshold))
}

pub fn less_than(a: &[f64], threshold: f64) -> Vec<f64> {
    map(a, |x| flag(x < threshold))
}

pub fn equal_to(a: &[f64], value: f64, eps: f64) -> Vec<f64> {
    map(a, |x| flag(fuzzy_equal(x, value, eps)))
}

pub fn greater_than_each(a: &[f64], b: &[f64]) -> Result<Vec<f64>, String> {
    zip_with(a, b, |x, y| flag(x > y))
}

pub fn less_than_each(a: &[f64], b: &[f64]) -> Result<Vec<f64>, String> {
    zip_with(a, b, |x, y| flag(x < y))
}

pub fn equal_each(a: &[f64], b: &[f64], eps: f64) -> Result<Vec<f64>, String> {
    zip_with(a, b, |x, y| flag(fuzzy_equal(x, y, eps)))
}

/// True when both series have the same length and every pair is fuzzy-equal.
pub fn compare(a: &[f64], b: &[f64], eps: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| fuzzy_equal(x, y, eps))
}

// ── Generators ────────────────────────────────────────────────────────────────

pub fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![min; n];
    }
    let step = (max - min) / (n - 1) as f64;
    (0..n).map(|i| min + i as f64 * step).collect()
}

pub fn logspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    linspace(min, max, n).into_iter().map(|e| 10f64.powf(e)).collect()
}
