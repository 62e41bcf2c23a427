use crate::data::HarShape;
use crate::layers::{
    BatchNormalizeConfig, Lstm, LstmConfig, RecurrentConv, RecurrentConvConfig, TiedDropout,
    TiedDropoutConfig,
};
use crate::models::rcnn::ConvBlock;
use crate::models::{HarClassifier, ModelConfigExt, ShapeConfigExt};
use crate::utils::{Activation, pooled_len};
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use std::fmt::Write;

/// Convolutional and recurrent-convolutional front end under stacked LSTMs.
///
/// The input joins `time_steps` consecutive windows into one sequence. Each
/// sub-window is scored from the last LSTM output falling inside it, so the
/// recurrent state carries over from one sub-window to the next.
#[derive(Config, Debug)]
pub struct RclRnnConfig {
    /// Steps of the joined sequence, every sub-window included.
    pub sequence_length: usize,
    pub n_features: usize,
    pub n_classes: usize,
    /// Sub-windows per sequence.
    pub time_steps: usize,
    /// Feature maps of each convolution.
    #[config(default = "vec![64]")]
    pub n_filters: Vec<usize>,
    /// Temporal extent of each convolution, odd.
    #[config(default = "vec![3]")]
    pub filter_sizes: Vec<usize>,
    /// Max-pool factor after each convolution (1 disables it).
    #[config(default = "vec![2]")]
    pub pool_sizes: Vec<usize>,
    /// Tied dropout after each convolution.
    #[config(default = 0.4)]
    pub conv_dropout: f64,
    /// Iteration count of each recurrent convolutional layer.
    #[config(default = "vec![3, 3, 3, 3, 3]")]
    pub rcl: Vec<usize>,
    /// Tied dropout after each recurrent convolutional layer.
    #[config(default = 0.4)]
    pub rcl_dropout: f64,
    /// Hidden units of each stacked LSTM layer.
    #[config(default = "vec![100]")]
    pub n_hidden: Vec<usize>,
    /// Dropout before the output layer.
    #[config(default = 0.5)]
    pub dropout: f64,
    /// Temporal max-pool factor applied before the LSTMs.
    #[config(default = 1)]
    pub downsample: usize,
    #[config(default = false)]
    pub batch_norm: bool,
    #[config(default = "Activation::Rectify")]
    pub activation: Activation,
    #[config(default = 1.0)]
    pub forget_bias: f64,
}

impl RclRnnConfig {
    fn rcl_filter_size(&self) -> usize {
        self.filter_sizes.first().copied().unwrap_or(3)
    }

    /// Sequence length reaching the LSTMs.
    fn recurrent_sequence_length(&self) -> usize {
        let conv_len = self
            .pool_sizes
            .iter()
            .fold(self.sequence_length, |len, &pool| pooled_len(len, pool));
        pooled_len(conv_len, self.downsample)
    }
}

#[derive(Module, Debug)]
pub struct RclBlock<B: Backend> {
    pub rcl: RecurrentConv<B>,
    pub dropout: TiedDropout,
}

#[derive(Module, Debug)]
pub struct RclRnn<B: Backend> {
    pub convs: Vec<ConvBlock<B>>,
    pub rcls: Vec<RclBlock<B>>,
    pub downsample: Option<MaxPool2d>,
    pub lstms: Vec<Lstm<B>>,
    pub dropout: Dropout,
    /// Input channel: last n_hidden.
    /// Output channel: n_classes.
    pub output: Linear<B>,
    pub time_steps: usize,
}

impl ShapeConfigExt for RclRnnConfig {
    fn for_shape(shape: &HarShape) -> Self {
        RclRnnConfig::new(
            shape.sequence_length,
            shape.n_features,
            shape.n_classes,
            shape.time_steps,
        )
    }

    fn accepts(&self, shape: &HarShape) -> bool {
        self.sequence_length == shape.sequence_length
            && self.n_features == shape.n_features
            && self.n_classes == shape.n_classes
            && self.time_steps == shape.time_steps
    }
}

impl<B: Backend> ModelConfigExt<B> for RclRnnConfig {
    type Model = RclRnn<B>;

    fn init(&self, device: &B::Device) -> Self::Model {
        assert!(!self.n_hidden.is_empty(), "at least one LSTM layer is required");
        assert_eq!(
            self.n_filters.len(),
            self.filter_sizes.len(),
            "one filter size per convolution"
        );
        assert_eq!(
            self.n_filters.len(),
            self.pool_sizes.len(),
            "one pool size per convolution"
        );
        let recurrent_len = self.recurrent_sequence_length();
        assert!(
            self.time_steps > 0 && recurrent_len >= self.time_steps,
            "pooling reduces the {} steps to {recurrent_len}, fewer than {} sub-windows",
            self.sequence_length,
            self.time_steps
        );
        assert!(
            recurrent_len % self.time_steps == 0,
            "the {recurrent_len} pooled steps do not split into {} sub-windows",
            self.time_steps
        );

        let norm = |num_features: usize| {
            BatchNormalizeConfig::new(num_features)
                .with_normalize(self.batch_norm)
                .with_activation(self.activation.clone())
        };

        let mut channels = self.n_features;
        let mut convs = Vec::with_capacity(self.n_filters.len());
        for ((&n_filter, &filter_size), &pool_size) in self
            .n_filters
            .iter()
            .zip(self.filter_sizes.iter())
            .zip(self.pool_sizes.iter())
        {
            assert!(
                filter_size % 2 == 1,
                "filter sizes must be odd, got {filter_size}"
            );
            convs.push(ConvBlock {
                conv: Conv2dConfig::new([channels, n_filter], [filter_size, 1])
                    .with_padding(PaddingConfig2d::Explicit((filter_size - 1) / 2, 0))
                    .with_bias(false)
                    .init(device),
                norm: norm(n_filter).init(device),
                pool: (pool_size > 1).then(|| {
                    MaxPool2dConfig::new([pool_size, 1])
                        .with_strides([pool_size, 1])
                        .init()
                }),
                dropout: TiedDropoutConfig::new(self.conv_dropout).init(),
            });
            channels = n_filter;
        }

        let rcls = self
            .rcl
            .iter()
            .map(|&iterations| RclBlock {
                rcl: RecurrentConvConfig::new(channels, iterations)
                    .with_filter_size(self.rcl_filter_size())
                    .with_batch_norm(self.batch_norm)
                    .with_activation(self.activation.clone())
                    .init(device),
                dropout: TiedDropoutConfig::new(self.rcl_dropout).init(),
            })
            .collect();

        let downsample = (self.downsample > 1).then(|| {
            MaxPool2dConfig::new([self.downsample, 1])
                .with_strides([self.downsample, 1])
                .init()
        });

        let mut d_input = channels;
        let mut lstms = Vec::with_capacity(self.n_hidden.len());
        for &d_hidden in self.n_hidden.iter() {
            lstms.push(
                LstmConfig::new(d_input, d_hidden)
                    .with_forget_bias(self.forget_bias)
                    .init(device),
            );
            d_input = d_hidden;
        }

        RclRnn {
            convs,
            rcls,
            downsample,
            lstms,
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(d_input, self.n_classes).init(device),
            time_steps: self.time_steps,
        }
    }

    fn model_info(&self) -> String {
        let mut log = String::new();
        let _ = writeln!(log, "Model: RCL RNN");
        let _ = writeln!(
            log,
            "Input: {} time steps of {} steps x {} features",
            self.time_steps,
            self.sequence_length / self.time_steps.max(1),
            self.n_features
        );
        for ((n_filter, filter_size), pool_size) in self
            .n_filters
            .iter()
            .zip(self.filter_sizes.iter())
            .zip(self.pool_sizes.iter())
        {
            let _ = writeln!(log, "Adding 2D conv layer: {n_filter} x {filter_size}");
            if *pool_size > 1 {
                let _ = writeln!(log, "Adding max pooling layer: {pool_size}");
            }
            let _ = writeln!(log, "Adding dropout layer: {:.2}", self.conv_dropout);
        }
        for t in self.rcl.iter() {
            let _ = writeln!(
                log,
                "Adding recurrent conv layer: t: {t}, filter size: {}",
                self.rcl_filter_size()
            );
            let _ = writeln!(log, "Adding dropout layer: {:.2}", self.rcl_dropout);
        }
        if self.downsample > 1 {
            let _ = writeln!(log, "Downsampling by {}", self.downsample);
        }
        let _ = writeln!(
            log,
            "LSTM input: {} steps, {} per time step",
            self.recurrent_sequence_length(),
            self.recurrent_sequence_length() / self.time_steps.max(1)
        );
        for d_hidden in self.n_hidden.iter() {
            let _ = writeln!(log, "Adding LSTM layer with {d_hidden} units");
        }
        if self.dropout > 0. {
            let _ = writeln!(log, "Adding output dropout with probability {:.2}", self.dropout);
        }
        if self.batch_norm {
            let _ = writeln!(log, "Using batch normalization");
        }
        let _ = writeln!(log, "Transfer function: {}", self.activation.name());
        let _ = write!(
            log,
            "Adding dense output layer with {} units per time step",
            self.n_classes
        );
        log
    }
}

impl<B: Backend> HarClassifier<B> for RclRnn<B> {
    fn forward(&self, sequences: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, sequence, n_features] = sequences.dims();

        // time becomes the height of single-column feature maps
        let mut x: Tensor<B, 4> = sequences
            .swap_dims(1, 2)
            .reshape([batch, n_features, sequence, 1]);
        for conv in self.convs.iter() {
            x = conv.forward(x);
        }
        for block in self.rcls.iter() {
            x = block.dropout.forward(block.rcl.forward(x));
        }
        if let Some(pool) = &self.downsample {
            x = pool.forward(x);
        }

        let [_, channels, sequence, _] = x.dims();
        assert!(
            sequence % self.time_steps == 0,
            "the {sequence} pooled steps do not split into {} sub-windows",
            self.time_steps
        );
        let mut x: Tensor<B, 3> = x.reshape([batch, channels, sequence]).swap_dims(1, 2);
        for lstm in self.lstms.iter() {
            x = lstm.forward(x);
        }
        tracing::trace!(dims = ?x.dims(), "rcl rnn lstm output");

        // last step of every sub-window
        let [_, _, d_hidden] = x.dims();
        let steps = sequence / self.time_steps;
        let n_outputs = batch * self.time_steps;
        let last: Tensor<B, 2> = x
            .reshape([n_outputs, steps, d_hidden])
            .narrow(1, steps - 1, 1)
            .reshape([n_outputs, d_hidden]);

        self.output.forward(self.dropout.forward(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    fn input<B: Backend>(batch: usize, sequence: usize, features: usize) -> Tensor<B, 3> {
        Tensor::random(
            [batch, sequence, features],
            Distribution::Default,
            &Default::default(),
        )
    }

    fn small(sequence_length: usize, time_steps: usize) -> RclRnnConfig {
        RclRnnConfig::new(sequence_length, 6, 5, time_steps)
            .with_n_filters(vec![8])
            .with_rcl(vec![1, 1])
            .with_n_hidden(vec![6])
    }

    #[test]
    fn scores_every_sub_window() {
        let config = small(40, 4);
        assert_eq!(20, config.recurrent_sequence_length());

        let model: RclRnn<B> = config.init(&Default::default());
        assert_eq!(2, model.rcls.len());
        assert_eq!([12, 5], model.forward(input::<B>(3, 40, 6)).dims());
    }

    #[test]
    fn downsampling_and_stacked_lstms() {
        let config = small(48, 3)
            .with_downsample(2)
            .with_n_hidden(vec![6, 4])
            .with_batch_norm(true);
        assert_eq!(12, config.recurrent_sequence_length());

        let model: RclRnn<B> = config.init(&Default::default());
        let [d_input, _] = model.output.weight.dims();
        assert_eq!(4, d_input);
        assert_eq!([6, 5], model.forward(input::<B>(2, 48, 6)).dims());
    }

    #[test]
    #[should_panic(expected = "do not split into 4 sub-windows")]
    fn rejects_uneven_sub_windows() {
        let _model: RclRnn<B> = small(30, 4).init(&Default::default());
    }

    #[test]
    fn accepts_only_grouped_windows_of_its_shape() {
        let grouped = HarShape {
            sequence_length: 40,
            n_features: 6,
            n_classes: 5,
            time_steps: 4,
        };
        let config = RclRnnConfig::for_shape(&grouped);
        assert!(config.accepts(&grouped));
        assert!(!config.accepts(&HarShape::new(40, 6, 5)));
        assert!(<RclRnnConfig as ModelConfigExt<B>>::model_info(&config).contains("4 time steps of 10 steps x 6 features"));
    }

    #[test]
    fn trains_with_autodiff_backend() {
        type AutoB = Autodiff<B>;
        let model: RclRnn<AutoB> = small(20, 2).init(&Default::default());
        let logits = model.forward(input::<AutoB>(2, 20, 6));
        assert_eq!([4, 5], logits.dims());
        let grads = logits.sum().backward();
        assert!(model.output.weight.grad(&grads).is_some());
        assert!(model.convs[0].conv.weight.grad(&grads).is_some());
    }
}
