//! Numeric helpers for turning DPX traces into CSV rows.

/// Level reported for non-positive (or NaN) power, where the logarithm is undefined.
pub const FLOOR_DBM: f64 = -300.0;

/// Convert linear power in watts to dBm.
pub fn watts_to_dbm(watts: f64) -> f64 {
    if watts > 0.0 {
        10.0 * (watts * 1000.0).log10()
    } else {
        FLOOR_DBM
    }
}

/// Convert dBm to linear power in watts.
pub fn dbm_to_watts(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0) / 1000.0
}

/// Linearly resample `src` to `len` points.
///
/// Target index `i` maps to `i * (N-1) / (M-1)` in source index space. An empty source (or a
/// zero target length) yields an empty vector.
pub fn resample(src: &[f32], len: usize) -> Vec<f32> {
    let n = src.len();
    if n == 0 || len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![src[0]];
    }
    if n == len {
        return src.to_vec();
    }

    let step = (n - 1) as f64 / (len - 1) as f64;
    (0..len)
        .map(|i| {
            let pos = i as f64 * step;
            let lo = (pos.floor() as usize).min(n - 1);
            let hi = (lo + 1).min(n - 1);
            let frac = (pos - lo as f64) as f32;
            src[lo] + (src[hi] - src[lo]) * frac
        })
        .collect()
}

/// Center frequencies of `len` equally spaced bins covering `span` around `center`.
pub fn frequency_axis(center: f64, span: f64, len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![center],
        _ => {
            let start = center - span / 2.0;
            let step = span / (len - 1) as f64;
            (0..len).map(|i| start + i as f64 * step).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_milliwatt() {
        assert!(watts_to_dbm(0.001).abs() < 1e-9);
        assert!((watts_to_dbm(1.0) - 30.0).abs() < 1e-9);
        assert!((watts_to_dbm(1e-6) + 30.0).abs() < 1e-9);
    }

    #[test]
    fn non_positive_is_clamped() {
        assert_eq!(watts_to_dbm(0.0), -300.0);
        assert_eq!(watts_to_dbm(-1.0), -300.0);
        assert_eq!(watts_to_dbm(f64::NAN), -300.0);
    }

    #[test]
    fn dbm_monotonic() {
        let levels: Vec<f64> = [1e-15, 1e-12, 1e-9, 1e-3, 1.0, 10.0]
            .iter()
            .map(|w| watts_to_dbm(*w))
            .collect();
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn dbm_watts_inverse() {
        for dbm in [-100.0, -30.0, 0.0, 20.0] {
            assert!((watts_to_dbm(dbm_to_watts(dbm)) - dbm).abs() < 1e-9);
        }
    }

    #[test]
    fn resample_length() {
        let src: Vec<f32> = (0..801).map(|i| i as f32).collect();
        for len in [1, 2, 100, 801, 1000, 4001] {
            assert_eq!(resample(&src, len).len(), len);
        }
    }

    #[test]
    fn resample_identity() {
        let src = [3.0, -1.0, 7.5, 2.0];
        assert_eq!(resample(&src, 4), src.to_vec());
    }

    #[test]
    fn resample_single() {
        assert_eq!(resample(&[4.0, 5.0, 6.0], 1), vec![4.0]);
        assert_eq!(resample(&[2.0], 3), vec![2.0, 2.0, 2.0]);
        assert!(resample(&[], 3).is_empty());
        assert!(resample(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn resample_endpoints_and_bracketing() {
        let src = [0.0f32, 10.0, -4.0, 6.0, 6.0, 1.0];
        let out = resample(&src, 17);
        assert_eq!(out[0], src[0]);
        assert!((out[16] - src[5]).abs() < 1e-6);

        let step = (src.len() - 1) as f64 / 16.0;
        for (i, v) in out.iter().enumerate() {
            let pos = i as f64 * step;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(src.len() - 1);
            let (a, b) = (src[lo].min(src[hi]), src[lo].max(src[hi]));
            assert!(*v >= a - 1e-6 && *v <= b + 1e-6, "{v} not in [{a}, {b}]");
        }
    }

    #[test]
    fn resample_linear_ramp() {
        let out = resample(&[0.0, 1.0], 5);
        assert_eq!(out, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn frequency_axis_bins() {
        let f = frequency_axis(1e9, 40e6, 5);
        assert_eq!(f, vec![980e6, 990e6, 1e9, 1010e6, 1020e6]);
        assert_eq!(frequency_axis(1e9, 40e6, 1), vec![1e9]);
        assert!(frequency_axis(1e9, 40e6, 0).is_empty());
    }
}
