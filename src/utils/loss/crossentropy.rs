use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::softmax;

/// Configuration to create a [clipped cross-entropy loss](ClippedCrossEntropyLoss) using the [init function](ClippedCrossEntropyLossConfig::init).
#[derive(Config, Debug)]
pub struct ClippedCrossEntropyLossConfig {
    /// Lower bound for the predicted probabilities before taking the log.
    #[config(default = 1e-8)]
    pub epsilon: f64,
}

impl ClippedCrossEntropyLossConfig {
    /// Initialize [clipped cross-entropy loss](ClippedCrossEntropyLoss).
    pub fn init(&self) -> ClippedCrossEntropyLoss {
        assert!(
            self.epsilon > 0. && self.epsilon < 1.,
            "epsilon must be in (0, 1), got {}",
            self.epsilon
        );
        ClippedCrossEntropyLoss {
            epsilon: self.epsilon,
        }
    }
}

/// Categorical cross-entropy computed on softmax probabilities clipped to `[epsilon, 1]`.
///
/// `loss = mean(-log(clip(softmax(logits), epsilon, 1)[target]))`
///
/// The clipping bounds each sample's loss by `-ln(epsilon)`.
#[derive(Module, Clone, Debug)]
pub struct ClippedCrossEntropyLoss {
    pub epsilon: f64,
}

impl Default for ClippedCrossEntropyLoss {
    fn default() -> Self {
        ClippedCrossEntropyLossConfig::new().init()
    }
}

impl ClippedCrossEntropyLoss {
    /// Compute the criterion on the input tensor.
    ///
    /// # Shapes
    ///
    /// - logits: `[batch_size, num_classes]`
    /// - targets: `[batch_size]`
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let [batch_size, _num_classes] = logits.dims();
        assert_eq!([batch_size], targets.dims());

        let probs = softmax(logits, 1).clamp(self.epsilon, 1.0);
        let picked = probs.gather(1, targets.reshape([batch_size, 1]));
        debug_assert_eq!([batch_size, 1], picked.dims());

        picked.log().neg().mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn uniform_prediction_costs_log_num_classes() {
        let device = Default::default();
        let logits = Tensor::<B, 2>::zeros([4, 6], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 5], &device);

        let loss: f32 = ClippedCrossEntropyLoss::default()
            .forward(logits, targets)
            .into_scalar()
            .elem();
        assert!((loss - 6f32.ln()).abs() < 1e-5, "loss {loss}");
    }

    #[test]
    fn clipping_bounds_the_loss() {
        let device = Default::default();
        let logits = Tensor::<B, 2>::from_floats([[20.0, -20.0]], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([1], &device);

        let loss: f32 = ClippedCrossEntropyLossConfig::new()
            .with_epsilon(1e-6)
            .init()
            .forward(logits, targets)
            .into_scalar()
            .elem();
        assert!((loss - 1e-6f32.ln().abs()).abs() < 1e-3, "loss {loss}");
    }
}
