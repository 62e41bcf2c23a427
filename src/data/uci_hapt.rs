//! UCI "Smartphone-Based Recognition of Human Activities and Postural
//! Transitions" dataset (HAPT).
//!
//! Raw 50Hz recordings, one accelerometer and one gyroscope file per
//! experiment, plus a `labels.txt` table of labelled segments. Segments are cut
//! into overlapping windows here.
//!
//! ```text
//! <root>/HAPT Data Set/RawData/acc_expEE_userUU.txt
//! <root>/HAPT Data Set/RawData/gyro_expEE_userUU.txt
//! <root>/HAPT Data Set/RawData/labels.txt   (exp user activity start end)
//! ```

use crate::data::dataset::{HarDataset, HarItem, HarShape, HarSplits};
use crate::data::features::{Orientation, low_pass, sliding_windows};
use crate::data::text::read_table;
use anyhow::{Result, bail, ensure};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DIR_NAME: &str = "HAPT Data Set";
pub const N_CLASSES: usize = 12;
pub const SAMPLE_RATE_HZ: f32 = 50.;
/// Cutoff separating gravity from body acceleration.
pub const GRAVITY_CUTOFF_HZ: f32 = 0.3;

/// Users whose experiments form the test split.
pub const TEST_USERS: [usize; 9] = [2, 4, 9, 10, 12, 13, 18, 20, 24];

pub const ACTIVITIES: [&str; N_CLASSES] = [
    "walking",
    "walking_upstairs",
    "walking_downstairs",
    "sitting",
    "standing",
    "laying",
    "stand_to_sit",
    "sit_to_stand",
    "sit_to_lie",
    "lie_to_sit",
    "stand_to_lie",
    "lie_to_stand",
];

#[derive(Debug, Clone, Copy)]
pub struct UciHaptOptions {
    pub orientation: Orientation,
    /// Appends the low-passed gravity and the residual body acceleration.
    pub add_filter: bool,
    /// Window length, in samples.
    pub n_samples: usize,
    /// Stride between consecutive windows, in samples.
    pub step: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for UciHaptOptions {
    fn default() -> Self {
        Self {
            orientation: Orientation::default(),
            add_filter: false,
            n_samples: 200,
            step: 50,
            shuffle: true,
            seed: 0,
        }
    }
}

impl UciHaptOptions {
    pub fn n_features(&self) -> usize {
        let filter = if self.add_filter { 6 } else { 0 };
        6 + filter + self.orientation.n_extra()
    }
}

/// One row of `labels.txt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    experiment: usize,
    user: usize,
    /// 0-based class.
    label: usize,
    /// 0-based, end exclusive.
    start: usize,
    end: usize,
}

/// Signals of one experiment, sample-major: `[acc xyz, gyro xyz]` per sample.
struct Recording {
    samples: Vec<[f32; 6]>,
    /// Low-passed acceleration, present when filtering.
    gravity: Option<Vec<[f32; 3]>>,
}

pub fn load(root: &Path, options: &UciHaptOptions) -> Result<HarSplits> {
    ensure!(
        options.n_samples > 0 && options.step > 0,
        "window size and step must be positive"
    );
    let raw = raw_dir(root);
    tracing::info!("loading UCI HAPT from {raw:?}");

    let segments = read_segments(&raw.join("labels.txt"))?;
    let mut recordings: BTreeMap<(usize, usize), Recording> = BTreeMap::new();
    let mut train = vec![];
    let mut test = vec![];
    let mut skipped = 0;

    for segment in segments {
        let key = (segment.experiment, segment.user);
        if !recordings.contains_key(&key) {
            let recording = read_recording(&raw, key, options.add_filter)?;
            recordings.insert(key, recording);
        }
        let recording = &recordings[&key];
        ensure!(
            segment.end <= recording.samples.len(),
            "segment {segment:?} ends after the {} samples of its recording",
            recording.samples.len()
        );

        let split = if TEST_USERS.contains(&segment.user) {
            &mut test
        } else {
            &mut train
        };
        let before = split.len();
        let windows = sliding_windows(segment.end - segment.start, options.n_samples, options.step);
        for window in windows {
            let range = segment.start + window.start..segment.start + window.end;
            let sequence = window_features(recording, range, options);
            split.push(HarItem::new(sequence, segment.label));
        }
        if split.len() == before {
            skipped += 1;
        }
    }
    if skipped > 0 {
        tracing::debug!("{skipped} segments are shorter than {} samples", options.n_samples);
    }

    if options.shuffle {
        let mut rng = StdRng::seed_from_u64(options.seed);
        train.shuffle(&mut rng);
        test.shuffle(&mut rng);
    }

    let shape = HarShape::new(options.n_samples, options.n_features(), N_CLASSES);
    let mut notes = options.orientation.notes();
    notes.push(format!("Add filter separated signals: {}", options.add_filter));
    notes.push(format!("Step: {}", options.step));
    notes.push(format!("Shuffle: {}", options.shuffle));
    let test = HarDataset::new(test, shape.sequence_length, shape.n_features);
    Ok(HarSplits {
        name: "UCI HAPT".into(),
        train: HarDataset::new(train, shape.sequence_length, shape.n_features),
        valid: test.clone(),
        test,
        shape,
        notes,
    })
}

fn raw_dir(root: &Path) -> PathBuf {
    [root.join(DIR_NAME).join("RawData"), root.join("RawData")]
        .into_iter()
        .find(|dir| dir.is_dir())
        .unwrap_or_else(|| root.to_path_buf())
}

fn read_segments(path: &Path) -> Result<Vec<Segment>> {
    let rows: Vec<Vec<usize>> = read_table(path)?;
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            let &[experiment, user, activity, start, end] = row.as_slice() else {
                bail!("{path:?} line {}: expected 5 columns, got {}", i + 1, row.len());
            };
            ensure!(
                (1..=N_CLASSES).contains(&activity),
                "{path:?} line {}: activity {activity} is not in 1..={N_CLASSES}",
                i + 1
            );
            ensure!(
                1 <= start && start <= end,
                "{path:?} line {}: invalid segment {start}..={end}",
                i + 1
            );
            Ok(Segment {
                experiment,
                user,
                label: activity - 1,
                start: start - 1,
                end,
            })
        })
        .collect()
}

fn read_triples(path: &Path) -> Result<Vec<[f32; 3]>> {
    let rows: Vec<Vec<f32>> = read_table(path)?;
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row.as_slice() {
            &[x, y, z] => Ok([x, y, z]),
            _ => bail!("{path:?} line {}: expected 3 columns, got {}", i + 1, row.len()),
        })
        .collect()
}

fn read_recording(
    raw: &Path,
    (experiment, user): (usize, usize),
    filter: bool,
) -> Result<Recording> {
    let name = |sensor: &str| raw.join(format!("{sensor}_exp{experiment:02}_user{user:02}.txt"));
    let acc = read_triples(&name("acc"))?;
    let gyro = read_triples(&name("gyro"))?;
    ensure!(
        acc.len() == gyro.len(),
        "experiment {experiment} of user {user}: {} accelerometer but {} gyroscope samples",
        acc.len(),
        gyro.len()
    );

    let gravity = filter.then(|| {
        let axes: Vec<Vec<f32>> = (0..3)
            .map(|axis| {
                let signal: Vec<f32> = acc.iter().map(|sample| sample[axis]).collect();
                low_pass(&signal, GRAVITY_CUTOFF_HZ, SAMPLE_RATE_HZ)
            })
            .collect();
        (0..acc.len())
            .map(|i| [axes[0][i], axes[1][i], axes[2][i]])
            .collect()
    });

    let samples = acc
        .iter()
        .zip(gyro.iter())
        .map(|(a, g)| [a[0], a[1], a[2], g[0], g[1], g[2]])
        .collect();
    Ok(Recording { samples, gravity })
}

fn window_features(
    recording: &Recording,
    range: std::ops::Range<usize>,
    options: &UciHaptOptions,
) -> Vec<f32> {
    let mut sequence = Vec::with_capacity(range.len() * options.n_features());
    for i in range {
        let sample = recording.samples[i];
        let acc = [sample[0], sample[1], sample[2]];
        sequence.extend_from_slice(&sample);
        if let Some(gravity) = &recording.gravity {
            let gravity = gravity[i];
            sequence.extend_from_slice(&gravity);
            sequence.extend((0..3).map(|axis| acc[axis] - gravity[axis]));
        }
        options.orientation.extend(acc, &mut sequence);
    }
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::Dataset;
    use std::fmt::Write;

    /// Two experiments: user 1 (train) and user 2 (test), 300 samples each.
    fn write_fixture(root: &Path) {
        let raw = root.join(DIR_NAME).join("RawData");
        std::fs::create_dir_all(&raw).unwrap();
        for (experiment, user) in [(1, 1), (2, 2)] {
            let mut acc = String::new();
            let mut gyro = String::new();
            for i in 0..300 {
                writeln!(acc, "{} 0.0 1.0", i as f32 * 1e-3).unwrap();
                writeln!(gyro, "0.1 0.2 0.3").unwrap();
            }
            let name = |sensor: &str| format!("{sensor}_exp{experiment:02}_user{user:02}.txt");
            std::fs::write(raw.join(name("acc")), acc).unwrap();
            std::fs::write(raw.join(name("gyro")), gyro).unwrap();
        }
        let labels = "1 1 5 1 250\n1 1 8 251 280\n2 2 12 11 260\n";
        std::fs::write(raw.join("labels.txt"), labels).unwrap();
    }

    fn options() -> UciHaptOptions {
        UciHaptOptions {
            n_samples: 100,
            step: 50,
            shuffle: false,
            ..Default::default()
        }
    }

    #[test]
    fn cuts_segments_into_windows_split_by_user() {
        let root = temp_dir::TempDir::new().unwrap();
        write_fixture(root.path());

        let splits = load(root.path(), &options()).unwrap();
        // 250 samples -> 4 windows; the 30-sample segment is too short
        assert_eq!(4, splits.train.len());
        // 250 samples of user 2 -> 4 windows
        assert_eq!(4, splits.test.len());
        assert_eq!(splits.test.len(), splits.valid.len());
        assert_eq!(6, splits.shape.n_features);
        assert_eq!(12, splits.shape.n_classes);

        let first = splits.train.get(0).unwrap();
        assert_eq!(vec![4], first.labels);
        assert_eq!(100 * 6, first.sequence.len());
        let second = splits.train.get(1).unwrap();
        // starts 50 samples later
        assert!((second.sequence[0] - 0.05).abs() < 1e-6);
        assert_eq!(vec![11], splits.test.get(0).unwrap().labels);
        assert!(splits.summary().contains("Add filter separated signals: false"));
    }

    #[test]
    fn filtered_and_orientation_channels() {
        let root = temp_dir::TempDir::new().unwrap();
        write_fixture(root.path());

        let options = UciHaptOptions {
            add_filter: true,
            orientation: Orientation {
                add_pitch: true,
                add_roll: false,
            },
            ..options()
        };
        let splits = load(root.path(), &options).unwrap();
        assert_eq!(13, splits.shape.n_features);

        let item = splits.train.get(0).unwrap();
        // gravity z and body z of a constant 1.0 signal
        assert!((item.sequence[8] - 1.).abs() < 1e-6);
        assert!(item.sequence[11].abs() < 1e-6);
    }

    #[test]
    fn shuffling_is_deterministic() {
        let root = temp_dir::TempDir::new().unwrap();
        write_fixture(root.path());

        let options = UciHaptOptions {
            step: 10,
            shuffle: true,
            seed: 7,
            ..options()
        };
        let a = load(root.path(), &options).unwrap();
        let b = load(root.path(), &options).unwrap();
        let first = |splits: &HarSplits| splits.train.get(0).unwrap().sequence[0];
        assert_eq!(first(&a), first(&b));
    }

    #[test]
    fn rejects_unknown_activities() {
        let root = temp_dir::TempDir::new().unwrap();
        write_fixture(root.path());
        let labels = root.path().join(DIR_NAME).join("RawData").join("labels.txt");
        std::fs::write(&labels, "1 1 13 1 10\n").unwrap();

        let err = load(root.path(), &options()).unwrap_err();
        assert!(format!("{err:#}").contains("activity 13"), "{err:#}");
    }
}
