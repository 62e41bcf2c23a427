use crate::layers::{Lstm, LstmConfig};
use crate::data::HarShape;
use crate::models::{HarClassifier, ModelConfigExt, ShapeConfigExt};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use std::fmt::Write;

/// Bidirectional LSTM classifier.
#[derive(Config, Debug)]
pub struct BlstmConfig {
    pub n_features: usize,
    pub n_classes: usize,
    /// Hidden units per layer, split evenly between both directions.
    #[config(default = 40)]
    pub n_hidden: usize,
    #[config(default = 1)]
    pub n_layers: usize,
    #[config(default = 1.0)]
    pub forget_bias: f64,
    #[config(default = 0.0)]
    pub input_dropout: f64,
}

impl BlstmConfig {
    fn d_direction(&self) -> usize {
        self.n_hidden / 2
    }
}

#[derive(Module, Debug)]
pub struct BlstmLayer<B: Backend> {
    pub forward: Lstm<B>,
    pub backward: Lstm<B>,
}

#[derive(Module, Debug)]
pub struct Blstm<B: Backend> {
    pub input_dropout: Dropout,
    pub layers: Vec<BlstmLayer<B>>,
    /// Input channel: n_hidden.
    /// Output channel: n_classes.
    pub output: Linear<B>,
}

impl ShapeConfigExt for BlstmConfig {
    fn for_shape(shape: &HarShape) -> Self {
        BlstmConfig::new(shape.n_features, shape.n_classes)
    }

    fn accepts(&self, shape: &HarShape) -> bool {
        self.n_features == shape.n_features
            && self.n_classes == shape.n_classes
            && shape.time_steps == 1
    }
}

impl<B: Backend> ModelConfigExt<B> for BlstmConfig {
    type Model = Blstm<B>;

    fn init(&self, device: &B::Device) -> Self::Model {
        assert!(self.n_layers > 0, "at least one layer is required");
        assert!(
            self.n_hidden >= 2 && self.n_hidden % 2 == 0,
            "n_hidden must be even, got {}",
            self.n_hidden
        );
        let d_direction = self.d_direction();

        let mut layers = Vec::with_capacity(self.n_layers);
        for i in 0..self.n_layers {
            let d_input = if i == 0 {
                self.n_features
            } else {
                2 * d_direction
            };
            let lstm = |reverse: bool| {
                LstmConfig::new(d_input, d_direction)
                    .with_forget_bias(self.forget_bias)
                    .with_reverse(reverse)
                    .init(device)
            };
            layers.push(BlstmLayer {
                forward: lstm(false),
                backward: lstm(true),
            });
        }

        Blstm {
            input_dropout: DropoutConfig::new(self.input_dropout).init(),
            layers,
            output: LinearConfig::new(2 * d_direction, self.n_classes).init(device),
        }
    }

    fn model_info(&self) -> String {
        let mut log = String::new();
        let _ = writeln!(log, "Model: BLSTM");
        let _ = writeln!(log, "Input features: {}", self.n_features);
        if self.input_dropout > 0. {
            let _ = writeln!(log, "Input dropout: {:.2}", self.input_dropout);
        }
        for i in 0..self.n_layers {
            let _ = writeln!(
                log,
                "Adding bidirectional LSTM layer {}: 2 x {} units, forget bias {}",
                i + 1,
                self.d_direction(),
                self.forget_bias
            );
        }
        let _ = write!(log, "Adding dense output layer with {} units", self.n_classes);
        log
    }
}

impl<B: Backend> HarClassifier<B> for Blstm<B> {
    fn forward(&self, sequences: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, sequence, _n_features] = sequences.dims();

        let mut x = self.input_dropout.forward(sequences);
        let mut last = None;
        for layer in self.layers.iter() {
            let forward = layer.forward.forward(x.clone());
            let backward = layer.backward.forward(x);
            x = Tensor::cat(vec![forward.clone(), backward.clone()], 2);
            last = Some((forward, backward));
        }
        let Some((forward, backward)) = last else {
            unreachable!("at least one layer is required")
        };

        // the forward direction has read the whole sequence at its last step,
        // the backward direction at its first step
        let forward: Tensor<B, 2> = forward.narrow(1, sequence - 1, 1).squeeze_dim(1);
        let backward: Tensor<B, 2> = backward.narrow(1, 0, 1).squeeze_dim(1);
        let summary = Tensor::cat(vec![forward, backward], 1);

        let output = self.output.forward(summary);
        let [_, n_classes] = self.output.weight.dims();
        debug_assert_eq!([batch, n_classes], output.dims());
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn classifies_each_sequence() {
        let device = Default::default();
        let config = BlstmConfig::new(11, 6).with_n_layers(2);
        let model: Blstm<B> = config.init(&device);
        let x = Tensor::<B, 3>::random([3, 32, 11], Distribution::Default, &device);

        assert_eq!([3, 6], model.forward(x.clone()).dims());

        let proba = model.predict_proba(x);
        let sums = proba.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        for sum in sums {
            assert!((sum - 1.).abs() < 1e-5);
        }
    }

    #[test]
    fn info_lists_every_layer() {
        let info = <BlstmConfig as ModelConfigExt<B>>::model_info(
            &BlstmConfig::new(9, 6).with_n_layers(3),
        );
        assert_eq!(3, info.matches("bidirectional LSTM layer").count());
    }
}
