use crate::layers::batch_normalize::{BatchNormalize, BatchNormalizeConfig};
use crate::utils::Activation;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;

/// Configuration to create a [CrossChannel](CrossChannel) layer using the [init function](CrossChannelConfig::init).
#[derive(Config, Debug)]
pub struct CrossChannelConfig {
    /// Number of sensor channels of the input.
    pub n_features: usize,
    /// Feature maps produced per input channel.
    #[config(default = 4)]
    pub multiplier: usize,
    #[config(default = false)]
    pub batch_norm: bool,
    #[config(default = "Activation::Rectify")]
    pub activation: Activation,
}

impl CrossChannelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CrossChannel<B> {
        let d_output = self.d_output();
        CrossChannel {
            // one filter spans every channel of a single time step
            conv: Conv2dConfig::new([1, d_output], [1, self.n_features])
                .with_bias(false)
                .init(device),
            norm: BatchNormalizeConfig::new(d_output)
                .with_normalize(self.batch_norm)
                .with_activation(self.activation.clone())
                .init(device),
        }
    }

    pub fn d_output(&self) -> usize {
        self.multiplier * self.n_features
    }
}

/// Cross-channel feature layer.
///
/// Mixes all sensor channels of each time step into `multiplier * n_features`
/// new channels, leaving the time axis untouched.
#[derive(Module, Debug)]
pub struct CrossChannel<B: Backend> {
    /// Input channel: 1.
    /// Output channel: multiplier * n_features.
    pub conv: Conv2d<B>,
    pub norm: BatchNormalize<B>,
}

impl<B: Backend> CrossChannel<B> {
    /// # Shapes
    ///   - Input [batch, sequence, n_features]
    ///   - Output [batch, sequence, multiplier * n_features]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, sequence, n_features] = x.dims();
        let [d_output, _, _, _] = self.conv.weight.dims();

        let x = x.reshape([batch, 1, sequence, n_features]);
        let x = self.conv.forward(x);
        debug_assert_eq!([batch, d_output, sequence, 1], x.dims());
        let x = self.norm.forward(x);

        let x: Tensor<B, 3> = x.reshape([batch, d_output, sequence]);
        x.swap_dims(1, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn quadruples_the_channels() {
        let device = Default::default();
        let config = CrossChannelConfig::new(9).with_batch_norm(true);
        let layer = config.init::<B>(&device);
        let x = Tensor::<B, 3>::random([2, 128, 9], Distribution::Default, &device);
        assert_eq!([2, 128, 36], layer.forward(x).dims());
        assert_eq!(36, config.d_output());
    }
}
