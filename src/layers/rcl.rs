// Recurrent convolutional layer, as in
// "Recurrent Convolutional Neural Network for Object Recognition" (Liang & Hu, CVPR 2015).

use crate::layers::batch_normalize::{BatchNormalize, BatchNormalizeConfig};
use crate::utils::Activation;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;

/// Configuration to create a [RecurrentConv](RecurrentConv) layer using the [init function](RecurrentConvConfig::init).
#[derive(Config, Debug)]
pub struct RecurrentConvConfig {
    /// Number of input (and output) feature maps.
    pub channels: usize,
    /// Number of recurrent iterations.
    pub iterations: usize,
    /// Temporal extent of both convolutions. Must be odd.
    #[config(default = 3)]
    pub filter_size: usize,
    #[config(default = false)]
    pub batch_norm: bool,
    #[config(default = "Activation::Rectify")]
    pub activation: Activation,
}

impl RecurrentConvConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> RecurrentConv<B> {
        assert!(
            self.filter_size % 2 == 1,
            "filter_size must be odd to preserve the sequence length, got {}",
            self.filter_size
        );
        let conv = || {
            Conv2dConfig::new([self.channels, self.channels], [self.filter_size, 1])
                .with_padding(PaddingConfig2d::Explicit((self.filter_size - 1) / 2, 0))
                .with_bias(false)
                .init(device)
        };
        let norms = (0..=self.iterations)
            .map(|_| {
                BatchNormalizeConfig::new(self.channels)
                    .with_normalize(self.batch_norm)
                    .with_activation(self.activation.clone())
                    .init(device)
            })
            .collect();
        RecurrentConv {
            feed_forward: conv(),
            recurrent: conv(),
            norms,
        }
    }
}

/// Recurrent convolutional layer.
///
/// ```ignore
/// u  = feed_forward(x)
/// s₀ = act(norm₀(u))
/// sᵢ = act(normᵢ(u + recurrent(sᵢ₋₁)))   for i in 1..=iterations
/// ```
///
/// The recurrent weights are shared across iterations, the normalizations are
/// not. The output keeps the input shape.
#[derive(Module, Debug)]
pub struct RecurrentConv<B: Backend> {
    pub feed_forward: Conv2d<B>,
    pub recurrent: Conv2d<B>,
    /// One per iteration, plus the initial one.
    pub norms: Vec<BatchNormalize<B>>,
}

impl<B: Backend> RecurrentConv<B> {
    pub fn iterations(&self) -> usize {
        self.norms.len() - 1
    }

    /// # Shapes
    ///   - Input [batch, channels, sequence, 1]
    ///   - Output [batch, channels, sequence, 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let dims = x.dims();

        let feed = self.feed_forward.forward(x);
        debug_assert_eq!(dims, feed.dims());

        let mut norms = self.norms.iter();
        let mut state = match norms.next() {
            Some(norm) => norm.forward(feed.clone()),
            None => unreachable!("at least the initial normalization exists"),
        };
        for norm in norms {
            state = norm.forward(feed.clone() + self.recurrent.forward(state));
        }
        debug_assert_eq!(dims, state.dims());
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn preserves_the_input_shape() {
        let device = Default::default();
        let layer = RecurrentConvConfig::new(16, 3)
            .with_filter_size(5)
            .init::<B>(&device);
        assert_eq!(3, layer.iterations());
        let x = Tensor::<B, 4>::random([2, 16, 32, 1], Distribution::Default, &device);
        assert_eq!([2, 16, 32, 1], layer.forward(x).dims());
    }

    #[test]
    #[should_panic(expected = "filter_size must be odd")]
    fn rejects_even_filters() {
        let device = Default::default();
        let _ = RecurrentConvConfig::new(4, 1)
            .with_filter_size(4)
            .init::<B>(&device);
    }
}
