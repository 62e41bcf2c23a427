//! Generated sensor-like sequences, for demos and tests that cannot rely on
//! downloaded datasets.
//!
//! Every class draws sinusoids with its own frequency per channel, plus
//! uniform noise and a random phase, so a model can tell classes apart.

use crate::data::dataset::{HarDataset, HarItem, HarShape, HarSplits};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy)]
pub struct SyntheticOptions {
    pub shape: HarShape,
    pub n_train: usize,
    pub n_test: usize,
    /// Amplitude of the uniform noise added to every reading.
    pub noise: f32,
    pub seed: u64,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            shape: HarShape::new(32, 3, 4),
            n_train: 256,
            n_test: 64,
            noise: 0.2,
            seed: 0,
        }
    }
}

pub fn generate(options: &SyntheticOptions) -> HarSplits {
    let HarShape {
        sequence_length,
        n_features,
        n_classes,
        ..
    } = options.shape;
    assert!(n_classes > 0, "at least one class is required");

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut items = |n: usize| -> Vec<HarItem> {
        (0..n)
            .map(|i| {
                // balanced classes
                let label = i % n_classes;
                let phase = rng.random_range(0.0..std::f32::consts::TAU);
                let mut sequence = Vec::with_capacity(sequence_length * n_features);
                for step in 0..sequence_length {
                    for channel in 0..n_features {
                        let cycles = (1 + label + channel) as f32;
                        let t = step as f32 / sequence_length as f32;
                        let value = (std::f32::consts::TAU * cycles * t + phase).sin();
                        let noise = rng.random_range(-1f32..=1.) * options.noise;
                        sequence.push(value + noise);
                    }
                }
                HarItem::new(sequence, label)
            })
            .collect()
    };

    let train = items(options.n_train);
    let test = HarDataset::new(items(options.n_test), sequence_length, n_features);
    HarSplits {
        name: "synthetic".into(),
        train: HarDataset::new(train, sequence_length, n_features),
        valid: test.clone(),
        test,
        shape: HarShape::new(sequence_length, n_features, n_classes),
        notes: vec![format!("Noise: {}", options.noise)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::Dataset;

    #[test]
    fn generates_balanced_reproducible_splits() {
        let options = SyntheticOptions {
            n_train: 40,
            n_test: 8,
            ..Default::default()
        };
        let splits = generate(&options);
        assert_eq!(40, splits.train.len());
        assert_eq!(8, splits.test.len());
        assert_eq!(vec![10; 4], splits.train.class_counts(4));

        let again = generate(&options);
        assert_eq!(splits.train.get(3), again.train.get(3));
    }

    #[test]
    fn readings_stay_bounded() {
        let splits = generate(&SyntheticOptions::default());
        let item = splits.train.get(0).unwrap();
        assert_eq!(32 * 3, item.sequence.len());
        assert!(item.sequence.iter().all(|v| v.abs() <= 1.2 + 1e-6));
    }
}
