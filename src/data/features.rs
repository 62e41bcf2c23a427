//! Signal helpers shared by the dataset loaders.

use num_traits::Float;
use std::ops::Range;

/// Pitch angle (radians) of an acceleration vector dominated by gravity.
pub fn pitch<F: Float>(x: F, y: F, z: F) -> F {
    (-x).atan2((y * y + z * z).sqrt())
}

/// Roll angle (radians) of an acceleration vector dominated by gravity.
pub fn roll<F: Float>(_x: F, y: F, z: F) -> F {
    y.atan2(z)
}

/// Which orientation angles to derive from an acceleration triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Orientation {
    pub add_pitch: bool,
    pub add_roll: bool,
}

impl Orientation {
    /// `Add pitch: ..` and `Add roll: ..` report lines.
    pub fn notes(&self) -> Vec<String> {
        vec![
            format!("Add pitch: {}", self.add_pitch),
            format!("Add roll: {}", self.add_roll),
        ]
    }

    pub fn n_extra(&self) -> usize {
        self.add_pitch as usize + self.add_roll as usize
    }

    /// Appends the enabled angles of `acc = [x, y, z]` to `out`.
    pub fn extend(&self, acc: [f32; 3], out: &mut Vec<f32>) {
        let [x, y, z] = acc;
        if self.add_pitch {
            out.push(pitch(x, y, z));
        }
        if self.add_roll {
            out.push(roll(x, y, z));
        }
    }
}

/// First-order low-pass filter, used to separate the gravity component of an
/// acceleration signal from the body motion.
pub fn low_pass(signal: &[f32], cutoff_hz: f32, sample_rate_hz: f32) -> Vec<f32> {
    let dt = 1. / sample_rate_hz;
    let rc = 1. / (2. * std::f32::consts::PI * cutoff_hz);
    let alpha = dt / (rc + dt);

    let mut filtered = Vec::with_capacity(signal.len());
    let mut state = match signal.first() {
        Some(first) => *first,
        None => return filtered,
    };
    for &value in signal {
        state += alpha * (value - state);
        filtered.push(state);
    }
    filtered
}

/// Start..end ranges of the windows of `n_samples` taken every `step` samples
/// out of `len` samples. Incomplete trailing windows are skipped.
pub fn sliding_windows(
    len: usize,
    n_samples: usize,
    step: usize,
) -> impl Iterator<Item = Range<usize>> {
    assert!(n_samples > 0 && step > 0, "window size and step must be positive");
    (0..)
        .map(move |i| i * step)
        .take_while(move |start| start + n_samples <= len)
        .map(move |start| start..start + n_samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_device_has_no_pitch_nor_roll() {
        assert!(pitch(0f32, 0., 1.).abs() < 1e-6);
        assert!(roll(0f32, 0., 1.).abs() < 1e-6);
    }

    #[test]
    fn tilted_device_angles() {
        let quarter = std::f64::consts::FRAC_PI_2;
        // gravity along -x: nose up
        assert!((pitch(-1f64, 0., 0.) - quarter).abs() < 1e-9);
        // gravity along +y: rolled to the side
        assert!((roll(0f64, 1., 0.) - quarter).abs() < 1e-9);
    }

    #[test]
    fn orientation_appends_enabled_angles_only() {
        let mut out = vec![];
        Orientation {
            add_pitch: false,
            add_roll: true,
        }
        .extend([0., 1., 0.], &mut out);
        assert_eq!(1, out.len());
    }

    #[test]
    fn low_pass_keeps_constants_and_damps_alternation() {
        let constant = low_pass(&[0.98; 50], 0.3, 50.);
        assert!(constant.iter().all(|v| (v - 0.98).abs() < 1e-6));

        let alternating: Vec<f32> = (0..200).map(|i| if i % 2 == 0 { 1. } else { -1. }).collect();
        let filtered = low_pass(&alternating, 0.3, 50.);
        assert!(filtered[100..].iter().all(|v| v.abs() < 0.1));
    }

    #[test]
    fn windows_overlap_by_the_step() {
        let windows: Vec<_> = sliding_windows(10, 4, 3).collect();
        assert_eq!(windows, vec![0..4, 3..7, 6..10]);
        assert_eq!(0, sliding_windows(3, 4, 1).count());
    }
}
