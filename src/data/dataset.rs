use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;

/// One labelled window of sensor readings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct HarItem {
    /// Time-major readings.
    ///
    /// # Shape
    /// [sequence_length * n_features]
    pub sequence: Vec<f32>,

    /// Activity class of each sub-window, in between 0 and n_classes - 1.
    /// A single one for plain windows.
    pub labels: Vec<usize>,
}

impl HarItem {
    /// A plain window of a single activity.
    pub fn new(sequence: Vec<f32>, label: usize) -> Self {
        Self {
            sequence,
            labels: vec![label],
        }
    }
}

/// Dimensions shared by every split of a dataset.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarShape {
    pub sequence_length: usize,
    pub n_features: usize,
    pub n_classes: usize,
    /// Labelled sub-windows per sequence.
    pub time_steps: usize,
}

impl HarShape {
    /// Shape of plain windows, one label each.
    pub fn new(sequence_length: usize, n_features: usize, n_classes: usize) -> Self {
        Self {
            sequence_length,
            n_features,
            n_classes,
            time_steps: 1,
        }
    }
}

/// In-memory windows of a single split.
///
/// Cloning shares the underlying items.
#[derive(Debug, Clone)]
pub struct HarDataset {
    items: Arc<Vec<HarItem>>,
    sequence_length: usize,
    n_features: usize,
    time_steps: usize,
}

impl HarDataset {
    pub fn new(items: Vec<HarItem>, sequence_length: usize, n_features: usize) -> Self {
        Self::with_time_steps(items, sequence_length, n_features, 1)
    }

    /// Items made of `time_steps` labelled sub-windows each.
    pub fn with_time_steps(
        items: Vec<HarItem>,
        sequence_length: usize,
        n_features: usize,
        time_steps: usize,
    ) -> Self {
        assert!(
            time_steps > 0 && sequence_length % time_steps == 0,
            "{sequence_length} steps do not split into {time_steps} sub-windows"
        );
        let expected = sequence_length * n_features;
        for (i, item) in items.iter().enumerate() {
            assert_eq!(
                expected,
                item.sequence.len(),
                "item {i} has {} readings, expected {sequence_length} x {n_features}",
                item.sequence.len()
            );
            assert_eq!(
                time_steps,
                item.labels.len(),
                "item {i} has {} labels, expected {time_steps}",
                item.labels.len()
            );
        }
        Self {
            items: Arc::new(items),
            sequence_length,
            n_features,
            time_steps,
        }
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    /// Number of (sub-)windows of each class. Labels outside `0..n_classes`
    /// are not counted.
    pub fn class_counts(&self, n_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; n_classes];
        for &label in self.items.iter().flat_map(|item| item.labels.iter()) {
            if let Some(count) = counts.get_mut(label) {
                *count += 1;
            }
        }
        counts
    }

    /// Joins every `factor` consecutive items into one longer sequence that
    /// keeps a label per sub-window. Trailing items that do not fill a group
    /// are dropped.
    pub fn group_windows(&self, factor: usize) -> HarDataset {
        assert!(factor > 0, "the grouping factor must be positive");
        let items = self
            .items
            .chunks_exact(factor)
            .map(|group| HarItem {
                sequence: group.iter().flat_map(|item| item.sequence.iter().copied()).collect(),
                labels: group.iter().flat_map(|item| item.labels.iter().copied()).collect(),
            })
            .collect();
        HarDataset::with_time_steps(
            items,
            self.sequence_length * factor,
            self.n_features,
            self.time_steps * factor,
        )
    }
}

impl Dataset<HarItem> for HarDataset {
    fn get(&self, index: usize) -> Option<HarItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// The train, test and validation splits of a dataset, with their shape.
#[derive(Debug, Clone)]
pub struct HarSplits {
    pub name: String,
    pub train: HarDataset,
    pub test: HarDataset,
    pub valid: HarDataset,
    pub shape: HarShape,
    /// Loader options worth reporting, e.g. `Add pitch: true`.
    pub notes: Vec<String>,
}

impl HarSplits {
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Dataset: {}\nTraining samples: {}\nTest samples: {}\nValidation samples: {}",
            self.name,
            self.train.len(),
            self.test.len(),
            self.valid.len(),
        );
        let _ = write!(
            summary,
            "\nSequence length: {}\nTime steps: {}\nFeatures: {}\nClasses: {}",
            self.shape.sequence_length / self.shape.time_steps,
            self.shape.time_steps,
            self.shape.n_features,
            self.shape.n_classes,
        );
        for note in self.notes.iter() {
            let _ = write!(summary, "\n{note}");
        }
        summary
    }

    /// Groups every `factor` consecutive windows of each split, see
    /// [HarDataset::group_windows].
    pub fn group_windows(&self, factor: usize) -> HarSplits {
        if factor == 1 {
            return self.clone();
        }
        let grouped = HarSplits {
            name: self.name.clone(),
            train: self.train.group_windows(factor),
            test: self.test.group_windows(factor),
            valid: self.valid.group_windows(factor),
            shape: HarShape {
                sequence_length: self.shape.sequence_length * factor,
                time_steps: self.shape.time_steps * factor,
                ..self.shape
            },
            notes: self.notes.clone(),
        };
        tracing::info!(
            "grouped {} windows into {} train and {} windows into {} test sequences",
            self.train.len(),
            grouped.train.len(),
            self.test.len(),
            grouped.test.len()
        );
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_items_per_class() {
        let item = |label| HarItem::new(vec![0.; 4], label);
        let dataset = HarDataset::new(vec![item(0), item(2), item(2)], 2, 2);
        assert_eq!(vec![1, 0, 2], dataset.class_counts(3));
        assert_eq!(Some(vec![2]), dataset.get(1).map(|item| item.labels));
        assert_eq!(None, dataset.get(3));
    }

    #[test]
    fn class_counts_skip_unknown_labels() {
        let item = |label| HarItem::new(vec![0.; 2], label);
        let dataset = HarDataset::new(vec![item(0), item(5), item(1)], 1, 2);
        assert_eq!(vec![1, 1], dataset.class_counts(2));
    }

    #[test]
    fn groups_consecutive_windows() {
        let item = |i: usize| HarItem::new(vec![i as f32; 4], i % 3);
        let dataset = HarDataset::new((0..7).map(item).collect(), 2, 2);

        let grouped = dataset.group_windows(3);
        assert_eq!(2, grouped.len());
        assert_eq!(6, grouped.sequence_length());
        assert_eq!(3, grouped.time_steps());

        let second = grouped.get(1).unwrap();
        assert_eq!(vec![0, 1, 2], second.labels);
        assert_eq!(3., second.sequence[0]);
        assert_eq!(5., second.sequence[11]);

        let regrouped = grouped.group_windows(2);
        assert_eq!(1, regrouped.len());
        assert_eq!(6, regrouped.time_steps());
        assert_eq!(vec![2, 2, 2], regrouped.class_counts(3));
    }

    #[test]
    fn grouped_splits_report_sub_window_length() {
        let item = |i: usize| HarItem::new(vec![0.; 4], i % 2);
        let dataset = HarDataset::new((0..4).map(item).collect(), 2, 2);
        let splits = HarSplits {
            name: "toy".into(),
            train: dataset.clone(),
            test: dataset.clone(),
            valid: dataset,
            shape: HarShape::new(2, 2, 2),
            notes: vec!["Add pitch: false".into()],
        };

        let grouped = splits.group_windows(2);
        assert_eq!(
            HarShape {
                sequence_length: 4,
                n_features: 2,
                n_classes: 2,
                time_steps: 2,
            },
            grouped.shape
        );
        let summary = grouped.summary();
        assert!(summary.contains("Sequence length: 2\nTime steps: 2"));
        assert!(summary.ends_with("Add pitch: false"));
    }

    #[test]
    #[should_panic(expected = "expected 3 x 2")]
    fn rejects_misshapen_items() {
        HarDataset::new(
            vec![HarItem::new(vec![0.; 5], 0)],
            3,
            2,
        );
    }
}
