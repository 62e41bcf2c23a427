use crate::utils::Activation;
use burn::module::{Param, RunningState};
use burn::nn::Initializer;
use burn::prelude::*;

/// Configuration to create a [BatchNormalize](BatchNormalize) layer using the [init function](BatchNormalizeConfig::init).
#[derive(Config, Debug)]
pub struct BatchNormalizeConfig {
    /// Number of channels (dim 1 of the input).
    pub num_features: usize,
    /// Normalize with batch statistics. Otherwise only a learnable bias is added.
    #[config(default = true)]
    pub normalize: bool,
    /// Applied after normalization.
    #[config(default = "Activation::Rectify")]
    pub activation: Activation,
    #[config(default = 0.1)]
    pub momentum: f64,
    #[config(default = 1e-4)]
    pub epsilon: f64,
}

impl BatchNormalizeConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BatchNormalize<B> {
        let beta = Initializer::Zeros.init([self.num_features], device);
        let (gamma, running_mean, running_var) = if self.normalize {
            (
                Some(Initializer::Ones.init([self.num_features], device)),
                Some(RunningState::new(Tensor::zeros([self.num_features], device))),
                Some(RunningState::new(Tensor::ones([self.num_features], device))),
            )
        } else {
            (None, None, None)
        };
        BatchNormalize {
            gamma,
            beta,
            running_mean,
            running_var,
            activation: self.activation.clone(),
            momentum: self.momentum,
            epsilon: self.epsilon,
        }
    }
}

/// Per-channel batch normalization followed by a nonlinearity.
///
/// `Y = act(γ * (X - mean) / sqrt(var + ε) + β)`
///
/// Statistics are taken over every dimension but the channel one (dim 1).
/// While the backend tracks gradients the batch statistics are used and the
/// running averages updated, otherwise the running averages are used.
///
/// Without normalization this reduces to `Y = act(X + β)`, which stands in for
/// the bias the preceding layer was built without.
#[derive(Module, Debug)]
pub struct BatchNormalize<B: Backend> {
    pub gamma: Option<Param<Tensor<B, 1>>>,
    pub beta: Param<Tensor<B, 1>>,
    pub running_mean: Option<RunningState<Tensor<B, 1>>>,
    pub running_var: Option<RunningState<Tensor<B, 1>>>,
    pub activation: Activation,
    momentum: f64,
    epsilon: f64,
}

impl<B: Backend> BatchNormalize<B> {
    /// # Shapes
    ///
    /// - input: `[batch, channels, ...]`
    /// - output: `[batch, channels, ...]`
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let dims = x.dims();
        let channels = dims[1];
        let [num_features] = self.beta.dims();
        assert_eq!(
            channels, num_features,
            "expected {num_features} channels, got {channels}"
        );

        // [channels] -> [1, channels, 1, ...]
        let mut channel_shape = [1usize; D];
        channel_shape[1] = channels;
        let per_channel = |t: Tensor<B, 1>| t.reshape(channel_shape);

        let x = match (&self.gamma, &self.running_mean, &self.running_var) {
            (Some(gamma), Some(running_mean), Some(running_var)) => {
                let (mean, var) = if B::ad_enabled() {
                    let (mean, var) = self.batch_statistics(x.clone());
                    self.update_running(running_mean, mean.clone());
                    self.update_running(running_var, var.clone());
                    (mean, var)
                } else {
                    (running_mean.value(), running_var.value())
                };
                let normalized =
                    (x - per_channel(mean)) / per_channel(var.add_scalar(self.epsilon).sqrt());
                normalized * per_channel(gamma.val())
            }
            _ => x,
        };

        let x = x + per_channel(self.beta.val());
        self.activation.forward(x)
    }

    /// Mean and (biased) variance of each channel.
    fn batch_statistics<const D: usize>(&self, x: Tensor<B, D>) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let dims = x.dims();
        let channels = dims[1];
        let count = x.shape().num_elements() / channels;

        // [channels, everything else]
        let flat: Tensor<B, 2> = x.swap_dims(0, 1).reshape([channels, count]);
        let mean = flat.clone().mean_dim(1);
        let var = (flat - mean.clone()).powi_scalar(2).mean_dim(1);

        (mean.reshape([channels]), var.reshape([channels]))
    }

    fn update_running(&self, state: &RunningState<Tensor<B, 1>>, batch: Tensor<B, 1>) {
        let running = state.value_sync();
        let updated =
            running.mul_scalar(1. - self.momentum) + batch.detach().mul_scalar(self.momentum);
        state.update(updated.detach());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type B = NdArray<f32>;
    type AutoB = Autodiff<B>;

    #[test]
    fn training_mode_standardizes_each_channel() {
        let device = Default::default();
        let layer = BatchNormalizeConfig::new(3)
            .with_activation(Activation::Identity)
            .init::<AutoB>(&device);
        let x = Tensor::<AutoB, 4>::random([16, 3, 20, 1], Distribution::Normal(5., 2.), &device);

        let out = layer.forward(x);
        let flat: Tensor<AutoB, 2> = out.swap_dims(0, 1).reshape([3, 16 * 20]);
        let means = flat.clone().mean_dim(1).abs().max();
        let var = (flat.clone() - flat.mean_dim(1)).powi_scalar(2).mean_dim(1);

        let means: f32 = means.into_scalar().elem();
        assert!(means < 1e-3, "channel mean {means}");
        for v in var.into_data().to_vec::<f32>().unwrap() {
            assert!((v - 1.).abs() < 1e-2, "channel var {v}");
        }
    }

    #[test]
    fn eval_mode_uses_running_statistics() {
        let device = Default::default();
        let layer = BatchNormalizeConfig::new(2)
            .with_activation(Activation::Identity)
            .with_epsilon(0.)
            .init::<B>(&device);
        // fresh running stats are mean 0, var 1: the layer is the identity
        let x = Tensor::<B, 2>::from_floats([[1., -2.], [3., 4.]], &device);
        let out = layer.forward(x.clone());
        let diff: f32 = (out - x).abs().max().into_scalar().elem();
        assert!(diff < 1e-6, "max diff {diff}");
    }

    #[test]
    fn without_normalization_only_bias_and_activation_apply() {
        let device = Default::default();
        let layer = BatchNormalizeConfig::new(2)
            .with_normalize(false)
            .init::<B>(&device);
        assert!(layer.gamma.is_none());
        let x = Tensor::<B, 2>::from_floats([[1., -2.]], &device);
        let out = layer.forward(x).into_data().to_vec::<f32>().unwrap();
        assert_eq!(out, vec![1., 0.]);
    }
}
