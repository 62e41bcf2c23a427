use crate::data::dataset::{HarItem, HarShape};
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

#[derive(Clone, Debug)]
pub struct HarBatcher {
    sequence_length: usize,
    n_features: usize,
    time_steps: usize,
}

impl HarBatcher {
    pub fn new(shape: &HarShape) -> Self {
        Self {
            sequence_length: shape.sequence_length,
            n_features: shape.n_features,
            time_steps: shape.time_steps,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HarBatch<B: Backend> {
    /// # Shape
    /// [batch_size, sequence_length, n_features]
    pub sequences: Tensor<B, 3>,
    /// Sub-window labels, item-major.
    ///
    /// # Shape
    /// [batch_size * time_steps]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, HarItem, HarBatch<B>> for HarBatcher {
    fn batch(&self, items: Vec<HarItem>, device: &B::Device) -> HarBatch<B> {
        let batch_size = items.len();
        let step_len = self.sequence_length * self.n_features;

        let mut readings = Vec::with_capacity(batch_size * step_len);
        let mut labels = Vec::with_capacity(batch_size * self.time_steps);
        for item in items {
            assert_eq!(step_len, item.sequence.len());
            assert_eq!(self.time_steps, item.labels.len());
            readings.extend(item.sequence);
            labels.extend(item.labels.into_iter().map(|label| label as i64));
        }

        let sequences = TensorData::new(
            readings,
            [batch_size, self.sequence_length, self.n_features],
        )
        .convert::<B::FloatElem>();
        let targets =
            TensorData::new(labels, [batch_size * self.time_steps]).convert::<B::IntElem>();

        HarBatch {
            sequences: Tensor::from_data(sequences, device),
            targets: Tensor::from_data(targets, device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn stacks_items_time_major() {
        let shape = HarShape::new(2, 3, 4);
        let items = vec![
            HarItem::new(vec![0., 1., 2., 3., 4., 5.], 3),
            HarItem::new(vec![6., 7., 8., 9., 10., 11.], 1),
        ];
        let batch: HarBatch<B> = HarBatcher::new(&shape).batch(items, &Default::default());

        assert_eq!([2, 2, 3], batch.sequences.dims());
        // second item, second step, first feature
        let value: f32 = batch
            .sequences
            .slice([1..2, 1..2, 0..1])
            .into_scalar()
            .elem();
        assert_eq!(9., value);
        assert_eq!(
            vec![3, 1],
            batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap()
        );
    }

    #[test]
    fn flattens_sub_window_labels() {
        let shape = HarShape {
            sequence_length: 4,
            n_features: 1,
            n_classes: 3,
            time_steps: 2,
        };
        let items = vec![
            HarItem {
                sequence: vec![0.; 4],
                labels: vec![2, 0],
            },
            HarItem {
                sequence: vec![1.; 4],
                labels: vec![1, 1],
            },
        ];
        let batch: HarBatch<B> = HarBatcher::new(&shape).batch(items, &Default::default());

        assert_eq!([2, 4, 1], batch.sequences.dims());
        assert_eq!(
            vec![2, 0, 1, 1],
            batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap()
        );
    }
}
