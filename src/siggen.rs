//! Signature generator
//!
//! Lazily enumerates every sketch at an exact Hamming distance `errs` from a
//! base sketch: a Gosper-style walk over the `C(dim, errs)` position subsets,
//! crossed with all non-zero symbol offsets in `[1, sigma)` per chosen
//! position. Zero offsets are excluded since they would lower the realized
//! error count.

use crate::types::MAX_DIM;

/// Ceiling on the summed enumeration count of a single query.
///
/// Past this point the enumeration is slower than a plain linear scan, so
/// queries are aborted instead.
pub const SIG_LIMIT: u64 = 100_000_000;

/// Reusable enumerator state; `set` rebinds it to a new base and error count.
#[derive(Debug)]
pub struct SigGenerator {
    base: [u8; MAX_DIM],
    sig: [u8; MAX_DIM],
    dim: usize,
    mask: u8,
    errs: usize,

    // Combination walk over the position-subset bit string.
    bitstr: u64,
    bit: i32,
    power: [i64; MAX_DIM + 1],

    // Offset counters for the currently selected positions.
    gen_ints: bool,
    combs: [usize; MAX_DIM],
    chars: [u8; MAX_DIM],
    cntrs: [u8; MAX_DIM],
}

impl Default for SigGenerator {
    fn default() -> Self {
        Self {
            base: [0; MAX_DIM],
            sig: [0; MAX_DIM],
            dim: 0,
            mask: 0,
            errs: 0,
            bitstr: 0,
            bit: 0,
            power: [0; MAX_DIM + 1],
            gen_ints: false,
            combs: [0; MAX_DIM],
            chars: [0; MAX_DIM],
            cntrs: [0; MAX_DIM],
        }
    }
}

impl SigGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebind to `base[..dim]` and exact error count `errs`.
    pub fn set(&mut self, base: &[u8], dim: usize, bits: usize, errs: usize) {
        debug_assert!(dim <= MAX_DIM && errs <= dim);

        self.base[..dim].copy_from_slice(&base[..dim]);
        self.dim = dim;
        self.mask = ((1usize << bits) - 1) as u8;
        self.errs = errs;

        for i in 0..errs {
            self.power[i] = i as i64;
        }
        self.power[errs] = dim as i64 + 1;
        self.bit = errs as i32 - 1;
        self.bitstr = 0;
        self.gen_ints = false;
    }

    #[inline]
    pub fn has_next(&self) -> bool {
        self.gen_ints || self.bit != self.errs as i32
    }

    /// Emit the next signature; call only while `has_next()`.
    pub fn next(&mut self) -> &[u8] {
        debug_assert!(self.has_next());

        if self.gen_ints {
            return self.next_ints();
        }

        // Advance the combination bit string (Gosper walk).
        while self.bit != -1 {
            let b = self.bit as usize;
            if self.power[b] == self.bit as i64 {
                self.bitstr ^= 1u64 << self.power[b];
            } else {
                self.bitstr ^= 3u64 << (self.power[b] - 1);
            }
            self.power[b] += 1;
            self.bit -= 1;
        }

        let tmpstr = self.bitstr;
        loop {
            self.bit += 1;
            if self.bit >= self.errs as i32 {
                break;
            }
            let b = self.bit as usize;
            if self.power[b] != self.power[b + 1] - 1 {
                break;
            }
            debug_assert!(self.power[b] > 0);
            self.bitstr ^= 1u64 << (self.power[b] - 1);
            self.power[b] = self.bit as i64;
        }

        self.gen_ints = true;

        // Decode the chosen positions and reset their offset counters.
        let mut r = 0;
        let mut i = 0;
        while r < self.errs {
            if (tmpstr >> i) & 1 == 1 {
                self.combs[r] = i;
                self.chars[r] = self.base[i];
                self.cntrs[r] = 1;
                r += 1;
            }
            i += 1;
        }

        self.next_ints()
    }

    fn next_ints(&mut self) -> &[u8] {
        self.sig[..self.dim].copy_from_slice(&self.base[..self.dim]);
        for r in 0..self.errs {
            self.sig[self.combs[r]] = self.chars[r].wrapping_add(self.cntrs[r]) & self.mask;
        }

        // Odometer step over the non-zero offsets.
        let mut r = 0;
        while r < self.errs {
            if self.cntrs[r] < self.mask {
                self.cntrs[r] += 1;
                break;
            }
            self.cntrs[r] = 1;
            r += 1;
        }
        if r == self.errs {
            self.gen_ints = false;
        }

        &self.sig[..self.dim]
    }
}

/// Expected number of signatures for budgets `0..=max_errs`, saturated at
/// [`SIG_LIMIT`]: `sum_e C(dim, e) * (sigma - 1)^e`.
pub fn expected_signatures(bits: usize, dim: usize, max_errs: usize) -> u64 {
    let sigma_m1 = (1u128 << bits) - 1;
    let mut total: u128 = 0;
    for e in 0..=max_errs.min(dim) {
        let mut term: u128 = 1;
        for i in 0..e {
            term = match term.checked_mul((dim - i) as u128) {
                Some(t) => t / (i as u128 + 1),
                None => return SIG_LIMIT,
            };
            term = match term.checked_mul(sigma_m1) {
                Some(t) => t,
                None => return SIG_LIMIT,
            };
            if term >= SIG_LIMIT as u128 {
                return SIG_LIMIT;
            }
        }
        total += term;
        if total >= SIG_LIMIT as u128 {
            return SIG_LIMIT;
        }
    }
    total as u64
}
