//! Time quantization helpers
//!
//! All fingerprint times are snapped to a fixed quantum before
//! hashing so that ingest and query land on the same grid.

/// Quantize `t` to multiples of `precision`, then snap to 5 decimal
/// places to shed floating-point residue from the division.
pub fn quantize(t: f64, precision: f64) -> f64 {
    let q = (t / precision).round() * precision;
    round_to(q, 5)
}

/// Round to `digits` decimal places
pub fn round_to(t: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    (t * scale).round() / scale
}

/// Round a reported time/confidence to 2 decimal places
pub fn round2(t: f64) -> f64 {
    round_to(t, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_snaps_to_grid() {
        assert_eq!(quantize(0.337, 0.05), 0.35);
        assert_eq!(quantize(0.324, 0.05), 0.3);
        assert_eq!(quantize(0.0, 0.05), 0.0);
    }

    #[test]
    fn test_quantize_has_no_fp_residue() {
        // 0.30000000000000004-style residue must not survive
        let q = quantize(0.3, 0.05);
        assert_eq!(format!("{:.5}", q), "0.30000");
        let q = quantize(2.496, 0.05);
        assert_eq!(q, 2.5);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(87.526), 87.53);
        assert_eq!(round2(100.0), 100.0);
    }

    #[test]
    fn test_quantized_difference_stays_on_grid() {
        let a = quantize(12.345, 0.05);
        let b = quantize(4.687, 0.05);
        let d = round_to(a - b, 5);
        // difference of grid points is a grid point
        assert_eq!((d / 0.05).round() * 0.05, d);
    }
}
