//! Core data model: transform descriptors, tuning options and the dense
//! per-pass parameter fingerprint used as the program-cache key.

use std::hash::{Hash, Hasher};

/// Transform direction.
///
/// `InverseConvolve` is an inverse transform with a pointwise
/// pre-multiplication by a sibling buffer fused into the first pass.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward = 0,
    InverseConvolve = 1,
    Inverse = 2,
}

impl Direction {
    /// Sign of the twiddle exponent for this direction.
    pub fn sign(self) -> f32 {
        match self {
            Direction::Forward => -1.0,
            Direction::Inverse | Direction::InverseConvolve => 1.0,
        }
    }

    pub fn is_inverse(self) -> bool {
        !matches!(self, Direction::Forward)
    }

    fn from_raw(raw: u32) -> Direction {
        match raw {
            0 => Direction::Forward,
            1 => Direction::InverseConvolve,
            2 => Direction::Inverse,
            _ => unreachable!("invalid direction discriminant {raw}"),
        }
    }
}

/// Transform type.
///
/// `ComplexToComplexDual` packs two independent complex signals into one
/// four-component element. `RealToComplex` / `ComplexToReal` exploit
/// Hermitian symmetry and add a resolve pass at the real/complex boundary.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    ComplexToComplex = 0,
    ComplexToComplexDual = 1,
    ComplexToReal = 2,
    RealToComplex = 3,
}

impl Kind {
    /// Number of float components per element on the complex side.
    pub fn components(self) -> u32 {
        match self {
            Kind::ComplexToComplexDual => 4,
            _ => 2,
        }
    }

    pub fn is_real(self) -> bool {
        matches!(self, Kind::ComplexToReal | Kind::RealToComplex)
    }
}

/// Surface kind for a pass input or output. Intermediates are always `Ssbo`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Target {
    Ssbo = 0,
    /// Two-component (or four-component for dual) sampled/storage image.
    Image = 1,
    /// Single-component image, used on the real side of R2C/C2R.
    ImageReal = 2,
}

impl Target {
    fn from_raw(raw: u32) -> Target {
        match raw {
            0 => Target::Ssbo,
            1 => Target::Image,
            2 => Target::ImageReal,
            _ => unreachable!("invalid target discriminant {raw}"),
        }
    }
}

/// Iteration orientation and data packing for one pass.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    Horizontal = 0,
    HorizontalDual = 1,
    Vertical = 2,
    VerticalDual = 3,
    ResolveRealToComplex = 4,
    ResolveComplexToReal = 5,
}

impl Mode {
    pub fn is_dual(self) -> bool {
        matches!(self, Mode::HorizontalDual | Mode::VerticalDual)
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Mode::Vertical | Mode::VerticalDual)
    }

    pub fn is_resolve(self) -> bool {
        matches!(self, Mode::ResolveRealToComplex | Mode::ResolveComplexToReal)
    }

    fn from_raw(raw: u32) -> Mode {
        match raw {
            0 => Mode::Horizontal,
            1 => Mode::HorizontalDual,
            2 => Mode::Vertical,
            3 => Mode::VerticalDual,
            4 => Mode::ResolveRealToComplex,
            5 => Mode::ResolveComplexToReal,
            _ => unreachable!("invalid mode discriminant {raw}"),
        }
    }
}

/// Performance-tuning knobs for one pass. These are what wisdom learns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Performance {
    pub workgroup_size_x: u32,
    pub workgroup_size_y: u32,
    /// Float components loaded per thread per round: 2, 4 or 8.
    pub vector_size: u32,
    pub shared_banked: bool,
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            workgroup_size_x: 4,
            workgroup_size_y: 1,
            vector_size: 2,
            shared_banked: false,
        }
    }
}

/// Numeric-precision profile for a whole plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Precision {
    /// Carry out butterflies in fp16.
    pub fp16: bool,
    pub input_fp16: bool,
    pub output_fp16: bool,
    /// Scale inverse transforms by 1/(Nx*Ny).
    pub normalize: bool,
}

/// All user-tunable options for a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FftOptions {
    pub performance: Performance,
    pub precision: Precision,
}

/// Memory-barrier requirements after a pass executes.
///
/// wgpu realizes these through usage-scope tracking at compute-pass
/// boundaries; the mask is recorded so the pass list fully describes the
/// ordering the plan needs, independent of how the backend enforces it.
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BarrierMask: u32 {
        const STORAGE_BUFFER = 1 << 0;
        const TEXTURE_FETCH = 1 << 1;
        const ALL = !0;
    }
}

/// Dense fingerprint of one shader specialization.
///
/// Every field is a `u32` so the record has a fixed layout with no padding;
/// equality and hashing are byte-wise over the whole record, which makes it
/// a stable content address for the program cache.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Parameters {
    pub workgroup_size_x: u32,
    pub workgroup_size_y: u32,
    pub workgroup_size_z: u32,
    pub radix: u32,
    pub vector_size: u32,
    direction: u32,
    mode: u32,
    input_target: u32,
    output_target: u32,
    /// First Stockham pass of its axis (p == 1).
    pub p1: u32,
    /// Stride between successive reads is a power of two greater than one.
    pub pow2_stride: u32,
    pub shared_banked: u32,
    pub fft_fp16: u32,
    pub input_fp16: u32,
    pub output_fp16: u32,
    pub fft_normalize: u32,
}

impl Parameters {
    /// Builds a fully-zeroed record and then assigns every field, so that
    /// semantically equal records are always byte-equal.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        performance: Performance,
        precision: Precision,
        radix: u32,
        direction: Direction,
        mode: Mode,
        input_target: Target,
        output_target: Target,
        p1: bool,
        pow2_stride: bool,
    ) -> Parameters {
        let mut params: Parameters = bytemuck::Zeroable::zeroed();
        params.workgroup_size_x = performance.workgroup_size_x;
        params.workgroup_size_y = performance.workgroup_size_y;
        params.workgroup_size_z = 1;
        params.radix = radix;
        params.vector_size = performance.vector_size;
        params.direction = direction as u32;
        params.mode = mode as u32;
        params.input_target = input_target as u32;
        params.output_target = output_target as u32;
        params.p1 = p1 as u32;
        params.pow2_stride = pow2_stride as u32;
        params.shared_banked = performance.shared_banked as u32;
        params.fft_fp16 = precision.fp16 as u32;
        params.input_fp16 = precision.input_fp16 as u32;
        params.output_fp16 = precision.output_fp16 as u32;
        params.fft_normalize = precision.normalize as u32;
        params
    }

    pub fn direction(&self) -> Direction {
        Direction::from_raw(self.direction)
    }

    pub fn mode(&self) -> Mode {
        Mode::from_raw(self.mode)
    }

    pub fn input_target(&self) -> Target {
        Target::from_raw(self.input_target)
    }

    pub fn output_target(&self) -> Target {
        Target::from_raw(self.output_target)
    }

    /// Complex lanes carried per element: 2 for dual modes, 1 otherwise.
    pub fn lanes(&self) -> u32 {
        if self.mode().is_dual() {
            2
        } else {
            1
        }
    }

    /// Complex elements (per lane) each invocation loads per butterfly leg.
    pub fn complexes_per_thread(&self) -> u32 {
        (self.vector_size / 2).max(1)
    }

    /// Whether this pass binds the convolution multiplier buffer: the fused
    /// pointwise multiply only happens on the first pass of an
    /// inverse-convolve plan.
    pub fn aux_input(&self) -> bool {
        self.direction() == Direction::InverseConvolve && self.p1 != 0
    }
}

impl PartialEq for Parameters {
    fn eq(&self, other: &Parameters) -> bool {
        bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
    }
}

impl Eq for Parameters {}

impl Hash for Parameters {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(bytemuck::bytes_of(self));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn sample(radix: u32) -> Parameters {
        Parameters::new(
            Performance::default(),
            Precision::default(),
            radix,
            Direction::Forward,
            Mode::Horizontal,
            Target::Ssbo,
            Target::Ssbo,
            true,
            false,
        )
    }

    fn hash_of(p: &Parameters) -> u64 {
        let mut h = DefaultHasher::new();
        p.hash(&mut h);
        h.finish()
    }

    #[test]
    fn record_is_dense() {
        // 16 u32 fields, no padding anywhere.
        assert_eq!(std::mem::size_of::<Parameters>(), 16 * 4);
    }

    #[test]
    fn equal_records_hash_identically() {
        let a = sample(4);
        let b = sample(4);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn field_change_breaks_equality() {
        let a = sample(4);
        let mut b = sample(4);
        b.pow2_stride = 1;
        assert_ne!(a, b);
    }

    #[test]
    fn typed_accessors_round_trip() {
        let p = Parameters::new(
            Performance::default(),
            Precision::default(),
            8,
            Direction::InverseConvolve,
            Mode::VerticalDual,
            Target::Image,
            Target::Ssbo,
            false,
            true,
        );
        assert_eq!(p.direction(), Direction::InverseConvolve);
        assert_eq!(p.mode(), Mode::VerticalDual);
        assert_eq!(p.input_target(), Target::Image);
        assert_eq!(p.output_target(), Target::Ssbo);
        assert_eq!(p.lanes(), 2);
    }

    #[test]
    fn direction_signs() {
        assert_eq!(Direction::Forward.sign(), -1.0);
        assert_eq!(Direction::Inverse.sign(), 1.0);
        assert_eq!(Direction::InverseConvolve.sign(), 1.0);
    }
}
