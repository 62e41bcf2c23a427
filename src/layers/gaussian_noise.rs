use burn::prelude::*;
use burn::tensor::Distribution;

/// Configuration to create a [GaussianNoise](GaussianNoise) layer using the [init function](GaussianNoiseConfig::init).
#[derive(Config, Debug)]
pub struct GaussianNoiseConfig {
    /// Standard deviation of the added noise.
    #[config(default = 0.05)]
    pub sigma: f64,
}

impl GaussianNoiseConfig {
    pub fn init(&self) -> GaussianNoise {
        assert!(self.sigma >= 0., "sigma must be non-negative");
        GaussianNoise { sigma: self.sigma }
    }
}

/// Adds `N(0, sigma²)` noise to the input during training.
///
/// The layer is the identity when the backend doesn't track gradients,
/// i.e. after [`AutodiffModule::valid`](burn::module::AutodiffModule::valid).
#[derive(Module, Clone, Debug)]
pub struct GaussianNoise {
    pub sigma: f64,
}

impl GaussianNoise {
    /// # Shapes
    ///
    /// - input: `[..., any]`
    /// - output: `[..., any]`
    pub fn forward<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        if !B::ad_enabled() || self.sigma == 0. {
            return input;
        }
        let noise = Tensor::random(
            input.shape(),
            Distribution::Normal(0., self.sigma),
            &input.device(),
        );
        input + noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn noise_only_applies_while_training() {
        let device = Default::default();

        let x = Tensor::<NdArray<f32>, 2>::ones([8, 16], &device);
        let out = GaussianNoiseConfig::new().init().forward(x.clone());
        out.into_data().assert_eq(&x.into_data(), true);

        let x = Tensor::<Autodiff<NdArray<f32>>, 2>::ones([8, 16], &device);
        let out = GaussianNoiseConfig::new()
            .with_sigma(1.0)
            .init()
            .forward(x.clone());
        let diff: f32 = (out - x).abs().sum().into_scalar().elem();
        assert!(diff > 0.);
    }
}
