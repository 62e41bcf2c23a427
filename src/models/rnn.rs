use crate::layers::{CrossChannel, CrossChannelConfig, Lstm, LstmConfig};
use crate::data::HarShape;
use crate::models::{HarClassifier, ModelConfigExt, ShapeConfigExt};
use crate::utils::{Activation, pooled_len};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use std::fmt::Write;

/// Stacked LSTM classifier.
#[derive(Config, Debug)]
pub struct RnnConfig {
    pub sequence_length: usize,
    pub n_features: usize,
    pub n_classes: usize,
    /// Hidden units of each stacked LSTM layer.
    #[config(default = "vec![128, 128, 128]")]
    pub n_hidden: Vec<usize>,
    /// Prepend a cross-channel feature layer.
    #[config(default = true)]
    pub ccf: bool,
    /// Temporal max-pool factor applied before the recurrent layers.
    #[config(default = 2)]
    pub downsample: usize,
    /// Pair every layer with a reversed one.
    #[config(default = false)]
    pub bidirectional: bool,
    #[config(default = false)]
    pub batch_norm: bool,
    /// Nonlinearity of the cross-channel layer.
    #[config(default = "Activation::Rectify")]
    pub activation: Activation,
    /// Dropout before the output layer.
    #[config(default = 0.0)]
    pub dropout: f64,
    #[config(default = 1.0)]
    pub forget_bias: f64,
}

impl RnnConfig {
    fn ccf_config(&self) -> CrossChannelConfig {
        CrossChannelConfig::new(self.n_features)
            .with_batch_norm(self.batch_norm)
            .with_activation(self.activation.clone())
    }

    fn directions(&self) -> usize {
        if self.bidirectional { 2 } else { 1 }
    }
}

#[derive(Module, Debug)]
pub struct RnnLayer<B: Backend> {
    pub forward: Lstm<B>,
    pub backward: Option<Lstm<B>>,
}

#[derive(Module, Debug)]
pub struct Rnn<B: Backend> {
    pub ccf: Option<CrossChannel<B>>,
    pub downsample: Option<MaxPool2d>,
    pub layers: Vec<RnnLayer<B>>,
    pub dropout: Dropout,
    /// Input channel: last n_hidden (times two when bidirectional).
    /// Output channel: n_classes.
    pub output: Linear<B>,
}

impl ShapeConfigExt for RnnConfig {
    fn for_shape(shape: &HarShape) -> Self {
        RnnConfig::new(shape.sequence_length, shape.n_features, shape.n_classes)
    }

    fn accepts(&self, shape: &HarShape) -> bool {
        self.sequence_length == shape.sequence_length
            && self.n_features == shape.n_features
            && self.n_classes == shape.n_classes
            && shape.time_steps == 1
    }
}

impl<B: Backend> ModelConfigExt<B> for RnnConfig {
    type Model = Rnn<B>;

    fn init(&self, device: &B::Device) -> Self::Model {
        assert!(!self.n_hidden.is_empty(), "at least one layer is required");
        assert!(
            pooled_len(self.sequence_length, self.downsample) > 0,
            "downsample factor {} exceeds the sequence length {}",
            self.downsample,
            self.sequence_length
        );

        let (ccf, mut d_input) = if self.ccf {
            let config = self.ccf_config();
            (Some(config.init(device)), config.d_output())
        } else {
            (None, self.n_features)
        };

        let downsample = (self.downsample > 1).then(|| {
            MaxPool2dConfig::new([self.downsample, 1])
                .with_strides([self.downsample, 1])
                .init()
        });

        let mut layers = Vec::with_capacity(self.n_hidden.len());
        for &d_hidden in self.n_hidden.iter() {
            let lstm = |reverse: bool| {
                LstmConfig::new(d_input, d_hidden)
                    .with_forget_bias(self.forget_bias)
                    .with_reverse(reverse)
                    .init(device)
            };
            layers.push(RnnLayer {
                forward: lstm(false),
                backward: self.bidirectional.then(|| lstm(true)),
            });
            d_input = self.directions() * d_hidden;
        }

        Rnn {
            ccf,
            downsample,
            layers,
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(d_input, self.n_classes).init(device),
        }
    }

    fn model_info(&self) -> String {
        let mut log = String::new();
        let _ = writeln!(log, "Model: RNN");
        let _ = writeln!(
            log,
            "Input: {} steps x {} features",
            self.sequence_length, self.n_features
        );
        if self.ccf {
            let _ = writeln!(log, "Adding cross-channel feature layer");
        }
        if self.downsample > 1 {
            let _ = writeln!(
                log,
                "Downsampling by {}: {} steps",
                self.downsample,
                pooled_len(self.sequence_length, self.downsample)
            );
        }
        for d_hidden in self.n_hidden.iter() {
            let kind = if self.bidirectional {
                "bidirectional LSTM"
            } else {
                "LSTM"
            };
            let _ = writeln!(log, "Adding {kind} layer with {d_hidden} units");
        }
        if self.dropout > 0. {
            let _ = writeln!(log, "Adding output dropout with probability {:.2}", self.dropout);
        }
        let _ = writeln!(log, "Transfer function: {}", self.activation.name());
        let _ = write!(log, "Adding dense output layer with {} units", self.n_classes);
        log
    }
}

impl<B: Backend> HarClassifier<B> for Rnn<B> {
    fn forward(&self, sequences: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, _sequence, _n_features] = sequences.dims();

        let mut x = match &self.ccf {
            Some(ccf) => ccf.forward(sequences),
            None => sequences,
        };

        if let Some(pool) = &self.downsample {
            let [batch, sequence, channels] = x.dims();
            let pooled = pool.forward(x.reshape([batch, 1, sequence, channels]));
            let [_, _, pooled_sequence, _] = pooled.dims();
            x = pooled.reshape([batch, pooled_sequence, channels]);
        }

        let [_, sequence, _] = x.dims();
        let mut summary = None;
        for layer in self.layers.iter() {
            let forward = layer.forward.forward(x.clone());
            let (next, last) = match &layer.backward {
                Some(backward) => {
                    let backward = backward.forward(x);
                    let last = Tensor::cat(
                        vec![
                            forward.clone().narrow(1, sequence - 1, 1),
                            backward.clone().narrow(1, 0, 1),
                        ],
                        2,
                    );
                    (Tensor::cat(vec![forward, backward], 2), last)
                }
                None => {
                    let last = forward.clone().narrow(1, sequence - 1, 1);
                    (forward, last)
                }
            };
            x = next;
            summary = Some(last);
        }
        let Some(summary) = summary else {
            unreachable!("at least one layer is required")
        };
        let summary: Tensor<B, 2> = summary.squeeze_dim(1);

        let output = self.output.forward(self.dropout.forward(summary));
        let [_, n_classes] = self.output.weight.dims();
        debug_assert_eq!([batch, n_classes], output.dims());
        output
    }
}
