/// Small deterministic generator used for timer jitter.
///
/// Seeded by the caller so that simulations are reproducible.
#[derive(Debug, Clone)]
pub struct Rand {
    state: u64,
}

impl Rand {
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn rand_u32(&mut self) -> u32 {
        // sPCG32 from https://www.pcg-random.org/paper.html
        const M: u64 = 0xbb2efcec3c39611d;
        const A: u64 = 0x7590ef39;

        let s = self.state.wrapping_mul(M).wrapping_add(A);
        self.state = s;

        let shift = 29 - (s >> 61);
        (s >> shift) as u32
    }

    pub fn rand_u16(&mut self) -> u16 {
        (self.rand_u32() >> 16) as u16
    }

    /// A value in `[low, high)`. Returns `low` for an empty range.
    pub fn rand_range(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        low + (self.rand_u32() as u64) % (high - low)
    }
}
