//! Xorshift generator used to randomise timer slices.
//!
//! Each processor owns its generator so a seed reproduces a schedule.

#[derive(Debug, Clone)]
pub struct XorShift {
    x: [usize; 2]
}

impl XorShift {
    pub fn new(seed: usize) -> Self {
        // the state must never be all zero
        Self {
            x: [seed ^ 0x9E37_79B9_7F4A_7C15, seed.rotate_left(17) | 1]
        }
    }

    pub fn next_usize(&mut self) -> usize {
        let mut t = self.x[0];
        let s = self.x[1];
        self.x[0] = s;
        t ^= t << 23;
        t ^= t >> 18;
        t ^= s ^ (s >> 5);
        self.x[1] = t;
        t.wrapping_add(s)
    }

    /// Uniform-ish value in `1..=bound`.
    pub fn next_in(&mut self, bound: usize) -> usize {
        1 + self.next_usize() % bound.max(1)
    }
}
