//! Estimated-cost model for candidate pass configurations.
//!
//! The model is a heuristic stand-in for measurement: wisdom overrides it
//! with real timings whenever those exist. Two properties are load-bearing
//! for the planner and must survive any re-weighting:
//!
//! * per-pass cost never increases when the radix grows, so decompositions
//!   with larger radices (fewer passes, less memory traffic) win;
//! * per-pass cost never increases when the vector width grows, up to the
//!   component width of the surface the pass touches.

use crate::types::Performance;

/// Fixed dispatch + full global-memory round trip charged to every pass.
const PASS_OVERHEAD: f64 = 12.0;

/// Butterfly/twiddle work, amortized better by larger radices.
const BUTTERFLY_WEIGHT: f64 = 6.0;

/// Loads issued per thread shrink as the vector width grows.
const VECTOR_WEIGHT: f64 = 2.0;

/// Crossing a power-of-two stride without banked shared indexing serializes
/// bank access on most hardware.
const STRIDE_PENALTY: f64 = 0.75;
const BANKED_STRIDE_PENALTY: f64 = 0.25;

/// Radix-16/64 passes stage through workgroup shared memory.
const SHARED_EXCHANGE: f64 = 0.5;
const SHARED_EXCHANGE_BANKED: f64 = 0.25;

/// Threads-per-group sweet spot most drivers schedule well.
const PREFERRED_WORKGROUP: f64 = 64.0;
const GEOMETRY_WEIGHT: f64 = 0.2;

/// Cost of a single pass with the given configuration.
///
/// `surface_components` is the component count of the widest surface the
/// pass touches (2 for scalar complex, 4 for dual); it caps how much a
/// wider vector load can help.
pub fn pass_cost(
    radix: u32,
    performance: &Performance,
    surface_components: u32,
    pow2_stride: bool,
) -> f64 {
    debug_assert!(radix.is_power_of_two());

    let mut cost = PASS_OVERHEAD + BUTTERFLY_WEIGHT / f64::from(radix).log2();

    if radix > 8 {
        cost += if performance.shared_banked {
            SHARED_EXCHANGE_BANKED
        } else {
            SHARED_EXCHANGE
        };
    }

    let effective_vector = performance.vector_size.min(surface_components.max(2));
    cost += VECTOR_WEIGHT * 2.0 / f64::from(effective_vector);

    if pow2_stride {
        cost += if performance.shared_banked {
            BANKED_STRIDE_PENALTY
        } else {
            STRIDE_PENALTY
        };
    }

    let threads = f64::from(performance.workgroup_size_x * performance.workgroup_size_y);
    cost += GEOMETRY_WEIGHT * (threads.log2() - PREFERRED_WORKGROUP.log2()).abs();

    cost
}

#[cfg(test)]
mod tests {
    use super::*;

    const RADICES: [u32; 5] = [2, 4, 8, 16, 64];

    #[test]
    fn cost_non_increasing_in_radix() {
        for banked in [false, true] {
            let perf = Performance {
                shared_banked: banked,
                ..Performance::default()
            };
            for stride in [false, true] {
                let costs: Vec<f64> = RADICES
                    .iter()
                    .map(|&r| pass_cost(r, &perf, 2, stride))
                    .collect();
                for pair in costs.windows(2) {
                    assert!(
                        pair[1] <= pair[0],
                        "cost increased with radix: {costs:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn cost_non_increasing_in_vector_width_below_ceiling() {
        for components in [2u32, 4] {
            let mut last = f64::INFINITY;
            for vector in [2u32, 4, 8] {
                let perf = Performance {
                    vector_size: vector,
                    ..Performance::default()
                };
                let c = pass_cost(8, &perf, components, false);
                assert!(c <= last, "vector {vector} raised cost on {components}-component surface");
                last = c;
            }
        }
    }

    #[test]
    fn vector_gain_capped_by_surface_width() {
        let narrow = Performance {
            vector_size: 4,
            ..Performance::default()
        };
        let wide = Performance {
            vector_size: 8,
            ..Performance::default()
        };
        // On a two-component surface, widening past the ceiling buys nothing.
        assert_eq!(pass_cost(8, &narrow, 2, false), pass_cost(8, &wide, 2, false));
    }

    #[test]
    fn banked_helps_pow2_strides() {
        let flat = Performance::default();
        let banked = Performance {
            shared_banked: true,
            ..Performance::default()
        };
        assert!(pass_cost(4, &banked, 2, true) < pass_cost(4, &flat, 2, true));
    }
}
