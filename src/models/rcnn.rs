use crate::layers::{
    BatchNormalize, BatchNormalizeConfig, CrossChannel, CrossChannelConfig, GaussianNoise,
    GaussianNoiseConfig, RecurrentConv, RecurrentConvConfig, TiedDropout, TiedDropoutConfig,
};
use crate::data::HarShape;
use crate::models::{HarClassifier, ModelConfigExt, ShapeConfigExt};
use crate::utils::{Activation, pooled_len};
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use std::fmt::Write;

/// How the time axis is collapsed before the dense head.
#[derive(Module, Default, Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum GlobalPool {
    #[default]
    Mean,
    Max,
}

/// Convolutional and recurrent-convolutional classifier.
///
/// The input may carry `stats` extra rows after the `sequence_length` raw
/// steps; those rows bypass the convolutional stack and join the pooled
/// features right before the dense head.
#[derive(Config, Debug)]
pub struct RcnnConfig {
    pub sequence_length: usize,
    pub n_features: usize,
    pub n_classes: usize,
    /// Feature maps of each convolution.
    #[config(default = "vec![64]")]
    pub n_filters: Vec<usize>,
    /// Temporal extent of each convolution, odd.
    #[config(default = "vec![3]")]
    pub filter_sizes: Vec<usize>,
    /// Max-pool factor after each convolution (1 disables it).
    #[config(default = "vec![2]")]
    pub pool_sizes: Vec<usize>,
    /// Units of the dense hidden layers.
    #[config(default = "vec![]")]
    pub n_hidden: Vec<usize>,
    #[config(default = false)]
    pub ccf: bool,
    /// Iteration count of each recurrent convolutional layer.
    #[config(default = "vec![]")]
    pub rcl: Vec<usize>,
    /// Tied dropout after each convolution.
    #[config(default = 0.0)]
    pub rcl_dropout: f64,
    #[config(default = "Activation::Rectify")]
    pub activation: Activation,
    /// Dropout after each dense hidden layer.
    #[config(default = 0.0)]
    pub dropout: f64,
    #[config(default = false)]
    pub batch_norm: bool,
    /// Number of trailing statistic rows in the input.
    #[config(default = 0)]
    pub stats: usize,
    /// Standard deviation of the gaussian input noise.
    #[config(default = 0.05)]
    pub input_noise: f64,
    #[config(default = "GlobalPool::Mean")]
    pub global_pool: GlobalPool,
}

impl RcnnConfig {
    /// Filter size of the recurrent convolutional layers.
    fn rcl_filter_size(&self) -> usize {
        self.filter_sizes.first().copied().unwrap_or(3)
    }

    fn n_channels(&self) -> usize {
        let input = if self.ccf {
            self.ccf_config().d_output()
        } else {
            self.n_features
        };
        self.n_filters.last().copied().unwrap_or(input)
    }

    /// Sequence length reaching the global pool.
    fn pooled_sequence_length(&self) -> usize {
        let conv_len = self
            .pool_sizes
            .iter()
            .fold(self.sequence_length, |len, &pool| pooled_len(len, pool));
        self.rcl.iter().fold(conv_len, |len, _| pooled_len(len, 2))
    }

    fn ccf_config(&self) -> CrossChannelConfig {
        CrossChannelConfig::new(self.n_features)
            .with_batch_norm(self.batch_norm)
            .with_activation(self.activation.clone())
    }

    fn norm(&self, num_features: usize) -> BatchNormalizeConfig {
        BatchNormalizeConfig::new(num_features)
            .with_normalize(self.batch_norm)
            .with_activation(self.activation.clone())
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNormalize<B>,
    pub pool: Option<MaxPool2d>,
    pub dropout: TiedDropout,
}

impl<B: Backend> ConvBlock<B> {
    /// # Shapes
    ///   - Input [batch, channels_in, sequence, 1]
    ///   - Output [batch, channels_out, sequence / pool, 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(self.conv.forward(x));
        let x = match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        };
        self.dropout.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    pub linear: Linear<B>,
    pub norm: BatchNormalize<B>,
    pub dropout: Dropout,
}

impl<B: Backend> DenseBlock<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.norm.forward(self.linear.forward(x));
        self.dropout.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct Rcnn<B: Backend> {
    pub noise: GaussianNoise,
    pub ccf: Option<CrossChannel<B>>,
    pub convs: Vec<ConvBlock<B>>,
    pub rcls: Vec<RecurrentConv<B>>,
    pub rcl_pool: MaxPool2d,
    pub global_pool: GlobalPool,
    pub hidden: Vec<DenseBlock<B>>,
    pub output: Linear<B>,
    pub sequence_length: usize,
    pub stats: usize,
}

impl ShapeConfigExt for RcnnConfig {
    fn for_shape(shape: &HarShape) -> Self {
        RcnnConfig::new(shape.sequence_length, shape.n_features, shape.n_classes)
            .with_n_hidden(vec![100])
            .with_rcl(vec![3, 3, 3])
            .with_rcl_dropout(0.4)
            .with_dropout(0.5)
    }

    fn accepts(&self, shape: &HarShape) -> bool {
        self.sequence_length + self.stats == shape.sequence_length
            && self.n_features == shape.n_features
            && self.n_classes == shape.n_classes
            && shape.time_steps == 1
    }
}

impl<B: Backend> ModelConfigExt<B> for RcnnConfig {
    type Model = Rcnn<B>;

    fn init(&self, device: &B::Device) -> Self::Model {
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
        assert!(
            self.pooled_sequence_length() > 0,
            "pooling reduces the {} steps to nothing",
            self.sequence_length
        );

        let (ccf, mut channels) = if self.ccf {
            let config = self.ccf_config();
            (Some(config.init(device)), config.d_output())
        } else {
            (None, self.n_features)
        };

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
                norm: self.norm(n_filter).init(device),
                pool: (pool_size > 1).then(|| {
                    MaxPool2dConfig::new([pool_size, 1])
                        .with_strides([pool_size, 1])
                        .init()
                }),
                dropout: TiedDropoutConfig::new(self.rcl_dropout).init(),
            });
            channels = n_filter;
        }
        debug_assert_eq!(channels, self.n_channels());

        let rcls = self
            .rcl
            .iter()
            .map(|&iterations| {
                RecurrentConvConfig::new(channels, iterations)
                    .with_filter_size(self.rcl_filter_size())
                    .with_batch_norm(self.batch_norm)
                    .with_activation(self.activation.clone())
                    .init(device)
            })
            .collect();

        let mut d_input = channels + self.stats * self.n_features;
        let mut hidden = Vec::with_capacity(self.n_hidden.len());
        for &n_hid in self.n_hidden.iter() {
            hidden.push(DenseBlock {
                linear: LinearConfig::new(d_input, n_hid)
                    .with_bias(false)
                    .init(device),
                norm: self.norm(n_hid).init(device),
                dropout: DropoutConfig::new(self.dropout).init(),
            });
            d_input = n_hid;
        }

        Rcnn {
            noise: GaussianNoiseConfig::new()
                .with_sigma(self.input_noise)
                .init(),
            ccf,
            convs,
            rcls,
            rcl_pool: MaxPool2dConfig::new([2, 1]).with_strides([2, 1]).init(),
            global_pool: self.global_pool.clone(),
            hidden,
            output: LinearConfig::new(d_input, self.n_classes).init(device),
            sequence_length: self.sequence_length,
            stats: self.stats,
        }
    }

    fn model_info(&self) -> String {
        let mut log = String::new();
        let _ = writeln!(log, "Model: RCNN");
        let _ = writeln!(
            log,
            "Input: {} steps (+{} statistic rows) x {} features",
            self.sequence_length, self.stats, self.n_features
        );
        let _ = writeln!(log, "Gaussian input noise: {:.2}", self.input_noise);
        if self.ccf {
            let _ = writeln!(log, "Adding cross-channel feature layer");
        }
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
            let _ = writeln!(log, "Adding dropout layer: {:.2}", self.rcl_dropout);
        }
        for t in self.rcl.iter() {
            let _ = writeln!(
                log,
                "Adding recurrent conv layer: t: {t}, filter size: {}",
                self.rcl_filter_size()
            );
            let _ = writeln!(log, "Adding max pool layer: 2");
        }
        let _ = writeln!(
            log,
            "Global {:?} pool over {} steps, {} channels",
            self.global_pool,
            self.pooled_sequence_length(),
            self.n_channels()
        );
        for n_hid in self.n_hidden.iter() {
            let _ = writeln!(log, "Adding dense layer with {n_hid} units");
            if self.dropout > 0. {
                let _ = writeln!(
                    log,
                    "Adding output dropout with probability {:.2}",
                    self.dropout
                );
            }
        }
        if self.batch_norm {
            let _ = writeln!(log, "Using batch normalization");
        }
        let _ = writeln!(log, "Transfer function: {}", self.activation.name());
        let _ = write!(log, "Adding dense output layer with {} units", self.n_classes);
        log
    }
}

impl<B: Backend> HarClassifier<B> for Rcnn<B> {
    fn forward(&self, sequences: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, total, n_features] = sequences.dims();
        assert_eq!(
            self.sequence_length + self.stats,
            total,
            "expected {} steps and {} statistic rows",
            self.sequence_length,
            self.stats
        );

        // separate raw values and statistics
        let (x, stats) = if self.stats > 0 {
            let stats = sequences
                .clone()
                .narrow(1, self.sequence_length, self.stats)
                .reshape([batch, self.stats * n_features]);
            (
                sequences.narrow(1, 0, self.sequence_length),
                Some(stats),
            )
        } else {
            (sequences, None)
        };

        let x = self.noise.forward(x);
        let x = match &self.ccf {
            Some(ccf) => ccf.forward(x),
            None => x,
        };

        // time becomes the height of single-column feature maps
        let [_, sequence, channels] = x.dims();
        let mut x: Tensor<B, 4> = x.swap_dims(1, 2).reshape([batch, channels, sequence, 1]);

        for conv in self.convs.iter() {
            x = conv.forward(x);
        }
        for rcl in self.rcls.iter() {
            x = self.rcl_pool.forward(rcl.forward(x));
        }
        tracing::trace!(dims = ?x.dims(), "rcnn feature maps");

        let [_, channels, _, _] = x.dims();
        let pooled = match self.global_pool {
            GlobalPool::Mean => x.mean_dim(2),
            GlobalPool::Max => x.max_dim(2),
        };
        let mut x: Tensor<B, 2> = pooled.reshape([batch, channels]);

        if let Some(stats) = stats {
            x = Tensor::cat(vec![x, stats], 1);
        }

        for dense in self.hidden.iter() {
            x = dense.forward(x);
        }

        self.output.forward(x)
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

    #[test]
    fn conv_stack_with_recurrent_layers() {
        let config = RcnnConfig::new(64, 9, 6)
            .with_n_filters(vec![16, 16])
            .with_filter_sizes(vec![3, 5])
            .with_pool_sizes(vec![2, 1])
            .with_rcl(vec![2, 2])
            .with_n_hidden(vec![10])
            .with_batch_norm(true);
        assert_eq!(8, config.pooled_sequence_length());

        let model: Rcnn<B> = config.init(&Default::default());
        assert_eq!([3, 6], model.forward(input::<B>(3, 64, 9)).dims());
    }

    #[test]
    fn statistics_rows_join_the_dense_head() {
        let config = RcnnConfig::new(32, 3, 4)
            .with_ccf(true)
            .with_stats(2)
            .with_global_pool(GlobalPool::Max);
        let model: Rcnn<B> = config.init(&Default::default());
        let [d_input, _] = model.output.weight.dims();
        assert_eq!(64 + 2 * 3, d_input);
        assert_eq!([2, 4], model.forward(input::<B>(2, 34, 3)).dims());
    }

    #[test]
    fn trains_with_autodiff_backend() {
        type AutoB = Autodiff<B>;
        let config = RcnnConfig::new(16, 3, 2)
            .with_rcl(vec![1])
            .with_rcl_dropout(0.3)
            .with_n_hidden(vec![8])
            .with_dropout(0.5)
            .with_batch_norm(true);
        let model: Rcnn<AutoB> = config.init(&Default::default());
        let logits = model.forward(input::<AutoB>(4, 16, 3));
        let grads = logits.sum().backward();
        assert!(model.output.weight.grad(&grads).is_some());
    }

    #[test]
    #[should_panic(expected = "statistic rows")]
    fn rejects_inputs_of_the_wrong_length() {
        let model: Rcnn<B> = RcnnConfig::new(16, 3, 2).init(&Default::default());
        let _ = model.forward(input::<B>(1, 17, 3));
    }

    #[test]
    fn default_for_shape_counts_statistic_rows() {
        let shape = HarShape::new(128, 9, 6);
        let config = RcnnConfig::for_shape(&shape);
        assert!(config.accepts(&shape));
        assert!(!config.clone().with_stats(2).accepts(&shape));
        let grouped = HarShape {
            time_steps: 2,
            ..shape
        };
        assert!(!config.accepts(&grouped));
        let mut with_stats = config.with_stats(2);
        with_stats.sequence_length = 126;
        assert!(with_stats.accepts(&shape));
    }
}
