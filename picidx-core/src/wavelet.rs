//! Fixed-point Daubechies-4 wavelet transform over a 4x4 block of Luv
//! samples, grounded in `original_source/images/image-sig.c`'s inline
//! transform (the `DAUB_0..DAUB_3` constants and the row-then-column
//! filtering loop).

const DAUB_0: i32 = 31651; // (1 + sqrt 3) / (4 * sqrt 2)
const DAUB_1: i32 = 54822; // (3 + sqrt 3) / (4 * sqrt 2)
const DAUB_2: i32 = 14689; // (3 - sqrt 3) / (4 * sqrt 2)
const DAUB_3: i32 = -8481; // (1 - sqrt 3) / (4 * sqrt 2)

/// LH, HL, HH sub-band energies (one channel of a 4x4 block).
pub struct Bands {
    pub lh: u8,
    pub hl: u8,
    pub hh: u8,
}

/// Applies the Daubechies-4 wavelet transform to a single 4x4 channel plane
/// (row-major, 16 values) and returns the clamped energies of the three
/// detail sub-bands. The LL band is never needed by the signature and is
/// not computed for the column pass, matching the original's early `i < 2`
/// skip.
pub fn transform_block(t: &[i32; 16]) -> Bands {
    let mut s = [0i32; 16];
    for i in (0..16).step_by(4) {
        s[i] = (DAUB_0 * t[i + 2] + DAUB_1 * t[i + 3] + DAUB_2 * t[i] + DAUB_3 * t[i + 1]) / 0x10000;
        s[i + 1] = (DAUB_0 * t[i] + DAUB_1 * t[i + 1] + DAUB_2 * t[i + 2] + DAUB_3 * t[i + 3]) / 0x10000;
        s[i + 2] = (DAUB_3 * t[i + 2] - DAUB_2 * t[i + 3] + DAUB_1 * t[i] - DAUB_0 * t[i + 1]) / 0x10000;
        s[i + 3] = (DAUB_3 * t[i] - DAUB_2 * t[i + 1] + DAUB_1 * t[i + 2] - DAUB_0 * t[i + 3]) / 0x10000;
    }

    let mut u = [0i32; 16];
    for i in 0..2 {
        u[i + 8] = (DAUB_3 * s[i + 8] - DAUB_2 * s[i + 12] + DAUB_1 * s[i] - DAUB_0 * s[i + 4]) / 0x1000;
        u[i + 12] = (DAUB_3 * s[i] - DAUB_2 * s[i + 4] + DAUB_1 * s[i + 8] - DAUB_0 * s[i + 12]) / 0x1000;
    }
    for i in 2..4 {
        u[i] = (DAUB_0 * s[i + 8] + DAUB_1 * s[i + 12] + DAUB_2 * s[i] + DAUB_3 * s[i + 4]) / 0x1000;
        u[i + 4] = (DAUB_0 * s[i] + DAUB_1 * s[i + 4] + DAUB_2 * s[i + 8] + DAUB_3 * s[i + 12]) / 0x1000;
        u[i + 8] = (DAUB_3 * s[i + 8] - DAUB_2 * s[i + 12] + DAUB_1 * s[i] - DAUB_0 * s[i + 4]) / 0x1000;
        u[i + 12] = (DAUB_3 * s[i] - DAUB_2 * s[i + 4] + DAUB_1 * s[i + 8] - DAUB_0 * s[i + 12]) / 0x1000;
    }

    let energy = |a: i32, b: i32, c: i32, d: i32| -> u8 {
        let sq = (a as i64 * a as i64 + b as i64 * b as i64 + c as i64 * c as i64 + d as i64 * d as i64) as f64;
        (sq.sqrt() as i64 / 16).clamp(0, 255) as u8
    };
    Bands {
        lh: energy(u[8], u[9], u[12], u[13]),
        hl: energy(u[2], u[3], u[6], u[7]),
        hh: energy(u[10], u[11], u[14], u[15]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_block_has_zero_energy() {
        let t = [100i32; 16];
        let bands = transform_block(&t);
        assert_eq!(bands.lh, 0);
        assert_eq!(bands.hl, 0);
        assert_eq!(bands.hh, 0);
    }

    #[test]
    fn checkerboard_block_has_nonzero_energy() {
        let mut t = [0i32; 16];
        for (i, v) in t.iter_mut().enumerate() {
            *v = if (i / 4 + i % 4) % 2 == 0 { 0 } else { 255 };
        }
        let bands = transform_block(&t);
        assert!(bands.lh > 0 || bands.hl > 0 || bands.hh > 0);
    }
}
