//! UCI "Human Activity Recognition Using Smartphones" dataset, version 1.
//!
//! 30 subjects, 6 activities, 50Hz smartphone accelerometer and gyroscope
//! readings already cut into windows of 128 samples with 50% overlap.
//!
//! Expected layout (the `UCI HAR Dataset` directory may be the root itself):
//!
//! ```text
//! <root>/UCI HAR Dataset/{train,test}/y_{split}.txt
//! <root>/UCI HAR Dataset/{train,test}/Inertial Signals/{signal}_{split}.txt
//! ```

use crate::data::dataset::{HarDataset, HarItem, HarShape, HarSplits};
use crate::data::features::Orientation;
use crate::data::text::read_table;
use anyhow::{Result, bail, ensure};
use std::path::{Path, PathBuf};

pub const DIR_NAME: &str = "UCI HAR Dataset";
pub const SEQUENCE_LENGTH: usize = 128;
pub const N_CLASSES: usize = 6;

/// Inertial signals, in channel order.
pub const SIGNALS: [&str; 9] = [
    "body_acc_x",
    "body_acc_y",
    "body_acc_z",
    "body_gyro_x",
    "body_gyro_y",
    "body_gyro_z",
    "total_acc_x",
    "total_acc_y",
    "total_acc_z",
];

/// Channel index of `total_acc_x`; y and z follow.
const TOTAL_ACC: usize = 6;

pub const ACTIVITIES: [&str; N_CLASSES] = [
    "walking",
    "walking_upstairs",
    "walking_downstairs",
    "sitting",
    "standing",
    "laying",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct UciHarOptions {
    /// Appends orientation angles derived from the total acceleration.
    pub orientation: Orientation,
}

/// Loads the train and test splits. The test split doubles as validation split.
pub fn load(root: &Path, options: &UciHarOptions) -> Result<HarSplits> {
    let dir = dataset_dir(root);
    tracing::info!("loading UCI HAR from {dir:?}");

    let train = load_split(&dir, "train", options)?;
    let test = load_split(&dir, "test", options)?;
    let shape = HarShape::new(SEQUENCE_LENGTH, n_features(options), N_CLASSES);

    Ok(HarSplits {
        name: "UCI HAR v1".into(),
        valid: test.clone(),
        train,
        test,
        shape,
        notes: options.orientation.notes(),
    })
}

pub fn n_features(options: &UciHarOptions) -> usize {
    SIGNALS.len() + options.orientation.n_extra()
}

fn dataset_dir(root: &Path) -> PathBuf {
    let nested = root.join(DIR_NAME);
    if nested.is_dir() {
        nested
    } else {
        root.to_path_buf()
    }
}

fn load_split(dir: &Path, split: &str, options: &UciHarOptions) -> Result<HarDataset> {
    let split_dir = dir.join(split);

    let labels: Vec<Vec<usize>> = read_table(&split_dir.join(format!("y_{split}.txt")))?;
    let labels = labels
        .into_iter()
        .enumerate()
        .map(|(i, row)| match row.as_slice() {
            [label] if (1..=N_CLASSES).contains(label) => Ok(label - 1),
            _ => bail!(
                "{split} label {i}: expected a single value in 1..={N_CLASSES}, got {row:?}"
            ),
        })
        .collect::<Result<Vec<usize>>>()?;

    // [signal][window][step]
    let mut signals = Vec::with_capacity(SIGNALS.len());
    for signal in SIGNALS {
        let path = split_dir
            .join("Inertial Signals")
            .join(format!("{signal}_{split}.txt"));
        let windows: Vec<Vec<f32>> = read_table(&path)?;
        ensure!(
            windows.len() == labels.len(),
            "{path:?} has {} windows but there are {} labels",
            windows.len(),
            labels.len()
        );
        if let Some(window) = windows.first() {
            ensure!(
                window.len() == SEQUENCE_LENGTH,
                "{path:?} has windows of {} samples, expected {SEQUENCE_LENGTH}",
                window.len()
            );
        }
        signals.push(windows);
    }

    let n_features = n_features(options);
    let items = labels
        .into_iter()
        .enumerate()
        .map(|(window, label)| {
            let mut sequence = Vec::with_capacity(SEQUENCE_LENGTH * n_features);
            for step in 0..SEQUENCE_LENGTH {
                sequence.extend(signals.iter().map(|signal| signal[window][step]));
                let acc = [
                    signals[TOTAL_ACC][window][step],
                    signals[TOTAL_ACC + 1][window][step],
                    signals[TOTAL_ACC + 2][window][step],
                ];
                options.orientation.extend(acc, &mut sequence);
            }
            HarItem::new(sequence, label)
        })
        .collect::<Vec<_>>();

    tracing::debug!("{split}: {} windows", items.len());
    Ok(HarDataset::new(items, SEQUENCE_LENGTH, n_features))
}

/// Writes a tiny dataset with the expected layout, for tests.
#[cfg(test)]
pub(crate) fn write_fixture(root: &Path, windows_per_split: usize) -> Result<()> {
    use anyhow::Context;
    use std::fmt::Write;

    for split in ["train", "test"] {
        let split_dir = root.join(DIR_NAME).join(split);
        let signals_dir = split_dir.join("Inertial Signals");
        std::fs::create_dir_all(&signals_dir).context("failed to create the fixture")?;

        let mut labels = String::new();
        for window in 0..windows_per_split {
            writeln!(labels, "{}", window % N_CLASSES + 1)?;
        }
        std::fs::write(split_dir.join(format!("y_{split}.txt")), labels)?;

        for (channel, signal) in SIGNALS.iter().enumerate() {
            let mut table = String::new();
            for window in 0..windows_per_split {
                let row: Vec<String> = (0..SEQUENCE_LENGTH)
                    .map(|step| {
                        // gravity along +z for the total acceleration
                        let value = if channel == TOTAL_ACC + 2 {
                            1.0
                        } else if channel >= TOTAL_ACC {
                            0.0
                        } else {
                            (window * 1000 + step) as f32 * 1e-3
                        };
                        format!("{value:.7e}")
                    })
                    .collect();
                writeln!(table, "  {}", row.join(" "))?;
            }
            std::fs::write(signals_dir.join(format!("{signal}_{split}.txt")), table)?;
        }
    }
    Ok(())
}
