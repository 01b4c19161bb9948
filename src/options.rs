//! Enumeration of legal performance options for one pass context.

use crate::cost;
use crate::types::Performance;

pub const RADICES: [u32; 5] = [2, 4, 8, 16, 64];

const AXIS_WORKGROUPS: [u32; 8] = [1, 2, 4, 8, 16, 32, 64, 128];
const TRANSVERSE_WORKGROUPS: [u32; 4] = [1, 2, 4, 8];
const VECTOR_SIZES: [u32; 3] = [2, 4, 8];

/// Sub-radix used by the two-stage shared-memory kernels.
pub fn shared_sub_radix(radix: u32) -> Option<u32> {
    match radix {
        16 => Some(4),
        64 => Some(8),
        _ => None,
    }
}

/// The pass context an enumeration runs in: axis length, orientation,
/// surface width and precision, plus the platform limits captured at
/// context creation.
#[derive(Debug, Clone, Copy)]
pub struct OptionSpace {
    /// Transform length along the pass axis, in complex elements.
    pub length: u32,
    /// Vertical passes stride through memory; the axis maps to the
    /// workgroup y dimension.
    pub vertical: bool,
    /// Component count of the widest surface the pass touches.
    pub surface_components: u32,
    /// Core butterflies run in fp16.
    pub fp16_core: bool,
    pub max_invocations: u32,
    pub max_shared_bytes: u32,
}

/// One legal (radix, performance) tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub radix: u32,
    pub performance: Performance,
}

impl OptionSpace {
    /// Lazy, restartable enumeration of every legal candidate, in a fixed
    /// deterministic order.
    pub fn candidates(&self) -> OptionEnumerator {
        OptionEnumerator {
            space: *self,
            cursor: 0,
        }
    }

    /// Whether a concrete performance tuple is legal here. Accepts any
    /// power-of-two geometry, not just the sizes the enumerator sweeps.
    pub fn allows(&self, radix: u32, perf: &Performance) -> bool {
        let (axis_wg, transverse_wg) = if self.vertical {
            (perf.workgroup_size_y, perf.workgroup_size_x)
        } else {
            (perf.workgroup_size_x, perf.workgroup_size_y)
        };
        axis_wg.is_power_of_two()
            && transverse_wg.is_power_of_two()
            && self.is_legal(radix, axis_wg, transverse_wg, perf.vector_size, perf.shared_banked)
    }

    /// Cheapest legal candidate for a fixed radix under the cost model.
    /// Deterministic: ties keep the earliest enumerated candidate.
    ///
    /// The space carries no pass position, so candidates are scored
    /// stride-neutral; the stride penalty depends on p, not the tuple.
    pub fn best_for_radix(&self, radix: u32) -> Option<Candidate> {
        let mut best: Option<(f64, Candidate)> = None;
        for candidate in self.candidates() {
            if candidate.radix != radix {
                continue;
            }
            let c = cost::pass_cost(
                radix,
                &candidate.performance,
                self.surface_components,
                false,
            );
            if best.as_ref().is_none_or(|(bc, _)| c < *bc) {
                best = Some((c, candidate));
            }
        }
        best.map(|(_, c)| c)
    }

    fn candidate_at(&self, cursor: usize) -> Probe {
        // Dense index into (radix, axis_wg, transverse_wg, vector, banked).
        let idx_banked = cursor % 2;
        let rest = cursor / 2;
        let idx_vector = rest % VECTOR_SIZES.len();
        let rest = rest / VECTOR_SIZES.len();
        let idx_transverse = rest % TRANSVERSE_WORKGROUPS.len();
        let rest = rest / TRANSVERSE_WORKGROUPS.len();
        let idx_axis = rest % AXIS_WORKGROUPS.len();
        let idx_radix = rest / AXIS_WORKGROUPS.len();
        if idx_radix >= RADICES.len() {
            return Probe::Exhausted;
        }

        let radix = RADICES[idx_radix];
        let axis_wg = AXIS_WORKGROUPS[idx_axis];
        let transverse_wg = TRANSVERSE_WORKGROUPS[idx_transverse];
        let vector = VECTOR_SIZES[idx_vector];
        let banked = idx_banked == 1;

        if !self.is_legal(radix, axis_wg, transverse_wg, vector, banked) {
            return Probe::Illegal;
        }

        let (wg_x, wg_y) = if self.vertical {
            (transverse_wg, axis_wg)
        } else {
            (axis_wg, transverse_wg)
        };

        Probe::Legal(Candidate {
            radix,
            performance: Performance {
                workgroup_size_x: wg_x,
                workgroup_size_y: wg_y,
                vector_size: vector,
                shared_banked: banked,
            },
        })
    }

    fn is_legal(&self, radix: u32, axis_wg: u32, transverse_wg: u32, vector: u32, banked: bool) -> bool {
        if radix > self.length || self.length % radix != 0 {
            return false;
        }
        // Vector width 4 needs a four-component surface; width 8 needs the
        // fp16 core path.
        if vector == 4 && self.surface_components < 4 {
            return false;
        }
        if vector == 8 && !self.fp16_core {
            return false;
        }
        if axis_wg * transverse_wg > self.max_invocations {
            return false;
        }
        // Banked shared indexing only exists on the shared-memory kernels.
        if banked && radix <= 8 {
            return false;
        }

        let cpt = vector / 2;
        let butterflies = self.length / radix;
        if butterflies % cpt != 0 {
            return false;
        }

        match shared_sub_radix(radix) {
            None => {
                // Register kernel: workgroups tile the axis exactly.
                (butterflies / cpt) % axis_wg == 0
            }
            Some(sub) => {
                // Two-stage kernel: one butterfly spans `sub` cooperating
                // threads, which must land in the same workgroup, and the
                // staging array must fit in shared memory.
                if axis_wg % sub != 0 {
                    return false;
                }
                let threads_axis = sub * (butterflies / cpt);
                if threads_axis % axis_wg != 0 {
                    return false;
                }
                let row = if banked { sub + 1 } else { sub };
                let element_bytes = if self.surface_components >= 4 { 16 } else { 8 };
                let shared_bytes =
                    (axis_wg / sub) * cpt * sub * row * element_bytes * transverse_wg;
                shared_bytes <= self.max_shared_bytes
            }
        }
    }
}

enum Probe {
    Exhausted,
    Illegal,
    Legal(Candidate),
}

/// Iterator over legal candidates. `restart` rewinds to the beginning so a
/// caller can re-walk the same sequence between benchmark runs.
pub struct OptionEnumerator {
    space: OptionSpace,
    cursor: usize,
}

impl OptionEnumerator {
    pub fn restart(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for OptionEnumerator {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        loop {
            match self.space.candidate_at(self.cursor) {
                Probe::Exhausted => return None,
                Probe::Illegal => self.cursor += 1,
                Probe::Legal(candidate) => {
                    self.cursor += 1;
                    return Some(candidate);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(length: u32) -> OptionSpace {
        OptionSpace {
            length,
            vertical: false,
            surface_components: 2,
            fp16_core: false,
            max_invocations: 256,
            max_shared_bytes: 16384,
        }
    }

    #[test]
    fn all_candidates_divide_the_axis() {
        for candidate in space(256).candidates() {
            assert_eq!(256 % candidate.radix, 0);
            let cpt = candidate.performance.vector_size / 2;
            let butterflies = 256 / candidate.radix;
            assert_eq!(butterflies % cpt, 0);
        }
    }

    #[test]
    fn vector_four_needs_wide_surface() {
        assert!(space(64)
            .candidates()
            .all(|c| c.performance.vector_size != 4));

        let dual = OptionSpace {
            surface_components: 4,
            ..space(64)
        };
        assert!(dual.candidates().any(|c| c.performance.vector_size == 4));
    }

    #[test]
    fn vector_eight_needs_fp16_core() {
        assert!(space(256)
            .candidates()
            .all(|c| c.performance.vector_size != 8));

        let fp16 = OptionSpace {
            fp16_core: true,
            ..space(256)
        };
        assert!(fp16.candidates().any(|c| c.performance.vector_size == 8));
    }

    #[test]
    fn workgroup_respects_invocation_limit() {
        let tight = OptionSpace {
            max_invocations: 8,
            ..space(1024)
        };
        for candidate in tight.candidates() {
            assert!(
                candidate.performance.workgroup_size_x * candidate.performance.workgroup_size_y
                    <= 8
            );
        }
    }

    #[test]
    fn shared_radices_keep_butterflies_in_one_workgroup() {
        for candidate in space(1024).candidates() {
            if let Some(sub) = shared_sub_radix(candidate.radix) {
                assert_eq!(candidate.performance.workgroup_size_x % sub, 0);
            } else {
                assert!(!candidate.performance.shared_banked);
            }
        }
    }

    #[test]
    fn vertical_maps_axis_to_workgroup_y() {
        let vertical = OptionSpace {
            vertical: true,
            ..space(1024)
        };
        // The axis workgroup sweep covers sizes the transverse sweep does
        // not, so a vertical enumeration must show them on y.
        assert!(vertical
            .candidates()
            .any(|c| c.performance.workgroup_size_y > 8));
    }

    #[test]
    fn enumerator_is_restartable() {
        let mut e = space(128).candidates();
        let first: Vec<Candidate> = e.by_ref().collect();
        e.restart();
        let second: Vec<Candidate> = e.collect();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn tiny_axis_still_has_candidates() {
        assert!(space(2).candidates().any(|c| c.radix == 2));
    }
}
