//! CPU reference transforms for the conformance harness.
//!
//! Plain radix-2 implementations, unnormalized in both directions so they
//! match the GPU convention (forward e^-i, inverse e^+i, scaling only when
//! a plan asks for it). Accuracy beats speed here; sizes stay small enough
//! that O(N log N) with a scalar butterfly is fine.

/// Interleaved complex value: `[re, im]`.
pub type Complex = [f32; 2];

fn cmul(a: Complex, b: Complex) -> Complex {
    [a[0] * b[0] - a[1] * b[1], a[0] * b[1] + a[1] * b[0]]
}

fn cadd(a: Complex, b: Complex) -> Complex {
    [a[0] + b[0], a[1] + b[1]]
}

fn csub(a: Complex, b: Complex) -> Complex {
    [a[0] - b[0], a[1] - b[1]]
}

/// In-place 1-D transform of a power-of-two-length slice.
pub fn fft_1d(data: &mut [Complex], inverse: bool) {
    let n = data.len();
    assert!(n.is_power_of_two(), "reference FFT needs a power-of-two length");
    if n < 2 {
        return;
    }

    // Bit-reversal permutation.
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = (i as u32).reverse_bits() >> (32 - bits);
        let j = j as usize;
        if j > i {
            data.swap(i, j);
        }
    }

    let sign = if inverse { 1.0f64 } else { -1.0 };
    let mut len = 2;
    while len <= n {
        let angle = sign * 2.0 * std::f64::consts::PI / len as f64;
        for start in (0..n).step_by(len) {
            for k in 0..len / 2 {
                let w = [
                    (angle * k as f64).cos() as f32,
                    (angle * k as f64).sin() as f32,
                ];
                let a = data[start + k];
                let b = cmul(data[start + k + len / 2], w);
                data[start + k] = cadd(a, b);
                data[start + k + len / 2] = csub(a, b);
            }
        }
        len *= 2;
    }
}

/// In-place row-major 2-D transform.
pub fn fft_2d(data: &mut [Complex], nx: usize, ny: usize, inverse: bool) {
    assert_eq!(data.len(), nx * ny);
    for row in data.chunks_exact_mut(nx) {
        fft_1d(row, inverse);
    }
    if ny > 1 {
        let mut column = vec![[0.0f32; 2]; ny];
        for x in 0..nx {
            for y in 0..ny {
                column[y] = data[y * nx + x];
            }
            fft_1d(&mut column, inverse);
            for y in 0..ny {
                data[y * nx + x] = column[y];
            }
        }
    }
}

/// Forward real transform: `nx * ny` reals to `(nx/2 + 1) * ny` complex.
pub fn r2c_2d(reals: &[f32], nx: usize, ny: usize) -> Vec<Complex> {
    assert_eq!(reals.len(), nx * ny);
    let mut full: Vec<Complex> = reals.iter().map(|&r| [r, 0.0]).collect();
    fft_2d(&mut full, nx, ny, false);
    let half = nx / 2 + 1;
    let mut out = vec![[0.0f32; 2]; half * ny];
    for y in 0..ny {
        out[y * half..(y + 1) * half].copy_from_slice(&full[y * nx..y * nx + half]);
    }
    out
}

/// Inverse real transform of a half spectrum, unnormalized like the other
/// directions (scale by `1/(nx*ny)` to invert a forward transform).
pub fn c2r_2d(half_spectrum: &[Complex], nx: usize, ny: usize) -> Vec<f32> {
    let half = nx / 2 + 1;
    assert_eq!(half_spectrum.len(), half * ny);
    let mut full = vec![[0.0f32; 2]; nx * ny];
    for y in 0..ny {
        for x in 0..nx {
            full[y * nx + x] = if x < half {
                half_spectrum[y * half + x]
            } else {
                // Hermitian mirror: X[nx-x, ny-y] conjugated.
                let sx = nx - x;
                let sy = (ny - y) % ny;
                let v = half_spectrum[sy * half + sx];
                [v[0], -v[1]]
            };
        }
    }
    fft_2d(&mut full, nx, ny, true);
    full.iter().map(|c| c[0]).collect()
}

/// Signal-to-noise ratio of `actual` against `reference`, in decibels.
pub fn snr_db(reference: &[f32], actual: &[f32]) -> f64 {
    assert_eq!(reference.len(), actual.len());
    let mut signal = 0.0f64;
    let mut noise = 0.0f64;
    for (&r, &a) in reference.iter().zip(actual) {
        signal += f64::from(r) * f64::from(r);
        noise += f64::from(a - r) * f64::from(a - r);
    }
    if noise == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (signal / noise).log10()
}

/// Largest absolute element difference.
pub fn max_error(reference: &[f32], actual: &[f32]) -> f32 {
    reference
        .iter()
        .zip(actual)
        .map(|(&r, &a)| (a - r).abs())
        .fold(0.0, f32::max)
}
