//! Vertical bitcode module
//!
//! Transposes a sketch of `dim` symbols of `bits` bits into `bits` words
//! where word `j` holds bit `j` of every symbol. Hamming distance over the
//! vertical form needs `bits` XORs, cumulative ORs, and a popcount, with an
//! early exit once the running count exceeds the budget.

/// Transpose `dim` symbols into `bits` vertical words.
///
/// Bit `i` of `out[j]` is bit `j` of `code[i]`.
pub fn to_vertical(code: &[u8], bits: usize, dim: usize, out: &mut [u64]) {
    debug_assert!(code.len() >= dim && out.len() >= bits);
    for (j, slot) in out.iter_mut().take(bits).enumerate() {
        let mut vc = 0u64;
        for (i, &c) in code.iter().take(dim).enumerate() {
            vc |= (((c >> j) & 1) as u64) << i;
        }
        *slot = vc;
    }
}

/// Symbol-wise Hamming distance with early exit.
///
/// Stops counting once the distance exceeds `max_errs`; the returned value is
/// then `max_errs + 1` rather than the true distance.
#[inline]
pub fn hamdist(lhs: &[u8], rhs: &[u8], dim: usize, max_errs: usize) -> usize {
    let mut errs = 0;
    for i in 0..dim {
        if lhs[i] != rhs[i] {
            errs += 1;
            if errs > max_errs {
                break;
            }
        }
    }
    errs
}

/// Hamming distance between two vertical codes of `lhs.len()` words.
///
/// The cumulative OR of the per-plane XORs marks every position that differs
/// in at least one bit plane; its popcount is the symbol-wise distance so
/// far. Early-exits as soon as the count exceeds `max_errs`.
#[inline]
pub fn hamdist_vertical(lhs: &[u64], rhs: &[u64], max_errs: usize) -> usize {
    debug_assert_eq!(lhs.len(), rhs.len());
    let mut errs = 0;
    let mut cumdiff = 0u64;
    for (&l, &r) in lhs.iter().zip(rhs.iter()) {
        cumdiff |= l ^ r;
        errs = cumdiff.count_ones() as usize;
        if errs > max_errs {
            return errs;
        }
    }
    errs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_sketch(rng: &mut StdRng, dim: usize, sigma: u16) -> Vec<u8> {
        (0..dim).map(|_| rng.gen_range(0..sigma) as u8).collect()
    }

    #[test]
    fn test_transpose_known_values() {
        // Symbols 0b01, 0b10, 0b11 -> plane 0 = 0b101, plane 1 = 0b110.
        let code = [1u8, 2, 3];
        let mut out = [0u64; 2];
        to_vertical(&code, 2, 3, &mut out);
        assert_eq!(out[0], 0b101);
        assert_eq!(out[1], 0b110);
    }

    #[test]
    fn test_vertical_agrees_with_direct() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let dim = rng.gen_range(1..=64);
            let bits = rng.gen_range(1..=8);
            let sigma = 1u16 << bits;
            let a = random_sketch(&mut rng, dim, sigma);
            let b = random_sketch(&mut rng, dim, sigma);

            let mut va = [0u64; 8];
            let mut vb = [0u64; 8];
            to_vertical(&a, bits, dim, &mut va);
            to_vertical(&b, bits, dim, &mut vb);

            let direct = hamdist(&a, &b, dim, dim);
            let vertical = hamdist_vertical(&va[..bits], &vb[..bits], dim);
            assert_eq!(direct, vertical, "dim={dim} bits={bits}");
        }
    }

    #[test]
    fn test_early_exit_only_overshoots_on_excess() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..200 {
            let dim = rng.gen_range(1..=64);
            let bits = rng.gen_range(1..=8);
            let a = random_sketch(&mut rng, dim, 1u16 << bits);
            let b = random_sketch(&mut rng, dim, 1u16 << bits);
            let truth = hamdist(&a, &b, dim, dim);

            let mut va = [0u64; 8];
            let mut vb = [0u64; 8];
            to_vertical(&a, bits, dim, &mut va);
            to_vertical(&b, bits, dim, &mut vb);

            for budget in 0..=dim {
                let d = hamdist_vertical(&va[..bits], &vb[..bits], budget);
                if truth <= budget {
                    assert_eq!(d, truth);
                } else {
                    assert!(d > budget);
                }
            }
        }
    }

    #[test]
    fn test_identical_codes() {
        let a = [3u8; 64];
        let mut va = [0u64; 8];
        to_vertical(&a, 2, 64, &mut va);
        assert_eq!(hamdist_vertical(&va[..2], &va[..2], 0), 0);
        assert_eq!(hamdist(&a, &a, 64, 0), 0);
    }
}
