use burn::prelude::*;
use burn::tensor::Distribution;

/// Configuration to create a [TiedDropout](TiedDropout) layer using the [init function](TiedDropoutConfig::init).
#[derive(Config, Debug)]
pub struct TiedDropoutConfig {
    /// Probability of zeroing a whole feature map.
    pub prob: f64,
}

impl TiedDropoutConfig {
    pub fn init(&self) -> TiedDropout {
        assert!(
            (0.0..1.0).contains(&self.prob),
            "dropout probability must be in [0, 1), got {}",
            self.prob
        );
        TiedDropout { prob: self.prob }
    }
}

/// Dropout whose mask is drawn once per `(sample, channel)` and shared across
/// the remaining (time and width) axes, so a feature map is either kept whole
/// or dropped whole.
///
/// Kept maps are scaled by `1 / (1 - prob)`. Inactive without autodiff.
#[derive(Module, Clone, Debug)]
pub struct TiedDropout {
    pub prob: f64,
}

impl TiedDropout {
    /// # Shapes
    ///
    /// - input: `[batch, channels, time, width]`
    /// - output: `[batch, channels, time, width]`
    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        if !B::ad_enabled() || self.prob == 0. {
            return input;
        }
        let [batch, channels, _time, _width] = input.dims();
        let keep = 1. - self.prob;
        let mask = Tensor::<B, 4>::random(
            [batch, channels, 1, 1],
            Distribution::Bernoulli(keep),
            &input.device(),
        );
        input * mask / keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type AutoB = Autodiff<NdArray<f32>>;

    #[test]
    fn masks_whole_feature_maps() {
        let device = Default::default();
        let x = Tensor::<AutoB, 4>::ones([4, 32, 10, 1], &device);
        let out = TiedDropoutConfig::new(0.5).init().forward(x);

        // every map is constant along time: either all zeros or all 2.0
        let per_map_max = out.clone().max_dim(2);
        let per_map_min = out.min_dim(2);
        let spread: f32 = (per_map_max - per_map_min).abs().sum().into_scalar().elem();
        assert_eq!(spread, 0.);
    }

    #[test]
    fn identity_without_autodiff() {
        let device = Default::default();
        let x = Tensor::<NdArray<f32>, 4>::ones([2, 3, 5, 1], &device);
        let out = TiedDropoutConfig::new(0.9).init().forward(x.clone());
        out.into_data().assert_eq(&x.into_data(), true);
    }
}
