use burn::prelude::*;
use burn::tensor::activation;

/// Element-wise nonlinearity applied after normalization and dense layers.
#[derive(Module, Default, Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Activation {
    /// `max(x, 0)`.
    #[default]
    Rectify,
    /// `max(x, 0.01 * x)`.
    LeakyRectify,
    Tanh,
    Sigmoid,
    /// No nonlinearity.
    Identity,
}

impl Activation {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Rectify => activation::relu(x),
            Activation::LeakyRectify => activation::leaky_relu(x, 0.01),
            Activation::Tanh => activation::tanh(x),
            Activation::Sigmoid => activation::sigmoid(x),
            Activation::Identity => x,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Rectify => "rectify",
            Activation::LeakyRectify => "leaky_rectify",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Identity => "identity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn rectify_and_leaky_rectify_differ_on_negatives() {
        let device = Default::default();
        let x = Tensor::<B, 1>::from_floats([-2.0, 0.0, 3.0], &device);

        let relu = Activation::Rectify.forward(x.clone()).into_data().to_vec::<f32>().unwrap();
        assert_eq!(relu, vec![0.0, 0.0, 3.0]);

        let leaky = Activation::LeakyRectify
            .forward(x)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!((leaky[0] + 0.02).abs() < 1e-6);
        assert_eq!(leaky[2], 3.0);
    }
}
