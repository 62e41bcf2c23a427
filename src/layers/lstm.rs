use crate::utils::Activation;
use burn::module::Param;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

/// Configuration to create a [Lstm](Lstm) layer using the [init function](LstmConfig::init).
#[derive(Config, Debug)]
pub struct LstmConfig {
    /// Size of each input step.
    pub d_input: usize,
    /// Number of hidden units.
    pub d_hidden: usize,
    /// Walk the sequence from its last step to its first.
    #[config(default = false)]
    pub reverse: bool,
    /// Initial value of the forget gate bias.
    #[config(default = 1.0)]
    pub forget_bias: f64,
    /// Nonlinearity of the cell input and of the cell output.
    #[config(default = "Activation::Tanh")]
    pub activation: Activation,
}

impl LstmConfig {
    /// Returns the initialized layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Lstm<B> {
        let d_gates = 4 * self.d_hidden;
        let uniform_init = |d_input: usize| {
            let bound = 1.0 / (d_input as f64).sqrt();
            Initializer::Uniform {
                min: -bound,
                max: bound,
            }
        };

        let input_proj = {
            let weight = uniform_init(self.d_input).init([self.d_input, d_gates], device);
            // gate order: input, forget, cell, output
            let bias: Tensor<B, 1> = Tensor::cat(
                vec![
                    Tensor::zeros([self.d_hidden], device),
                    Tensor::full([self.d_hidden], self.forget_bias, device),
                    Tensor::zeros([2 * self.d_hidden], device),
                ],
                0,
            );
            debug_assert_eq!([d_gates], bias.dims());
            Linear {
                weight,
                bias: Some(Param::from_tensor(bias)),
            }
        };

        Lstm {
            input_proj,
            hidden_proj: LinearConfig::new(self.d_hidden, d_gates)
                .with_bias(false)
                .with_initializer(uniform_init(self.d_hidden))
                .init(device),
            activation: self.activation.clone(),
            reverse: self.reverse,
        }
    }
}

/// Long short-term memory layer.
///
/// ```ignore
/// iₜ = σ(Wᵢxₜ + Uᵢhₜ₋₁ + bᵢ)
/// fₜ = σ(W_f xₜ + U_f hₜ₋₁ + b_f)
/// gₜ = act(W_g xₜ + U_g hₜ₋₁ + b_g)
/// oₜ = σ(Wₒxₜ + Uₒhₜ₋₁ + bₒ)
/// cₜ = fₜ ⊙ cₜ₋₁ + iₜ ⊙ gₜ
/// hₜ = oₜ ⊙ act(cₜ)
/// ```
///
/// A reversed layer consumes the sequence back to front, but its outputs stay
/// aligned with the input positions: the output at step `t` has seen the
/// inputs `t..sequence`.
#[derive(Module, Debug)]
pub struct Lstm<B: Backend> {
    /// Input channel: d_input.
    /// Output channel: 4 * d_hidden.
    pub input_proj: Linear<B>,
    /// Input channel: d_hidden.
    /// Output channel: 4 * d_hidden.
    pub hidden_proj: Linear<B>,
    pub activation: Activation,
    pub reverse: bool,
}

impl<B: Backend> Lstm<B> {
    pub fn d_hidden(&self) -> usize {
        let [_d_hidden, d_gates] = self.hidden_proj.weight.dims();
        d_gates / 4
    }

    /// # Shapes
    ///   - Input [batch, sequence, d_input]
    ///   - Output [batch, sequence, d_hidden]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, sequence, _d_input] = x.dims();
        let d_hidden = self.d_hidden();
        let device = x.device();
        assert!(sequence > 0, "empty sequence");

        // the input contribution of every step at once
        let xs = self.input_proj.forward(x);
        debug_assert_eq!([batch, sequence, 4 * d_hidden], xs.dims());

        let mut h = Tensor::<B, 2>::zeros([batch, d_hidden], &device);
        let mut c = Tensor::<B, 2>::zeros([batch, d_hidden], &device);
        let mut outputs = Vec::with_capacity(sequence);

        let steps: Box<dyn Iterator<Item = usize>> = if self.reverse {
            Box::new((0..sequence).rev())
        } else {
            Box::new(0..sequence)
        };
        for t in steps {
            let x_t: Tensor<B, 2> = xs.clone().narrow(1, t, 1).squeeze_dim(1);
            let gates = x_t + self.hidden_proj.forward(h);
            debug_assert_eq!([batch, 4 * d_hidden], gates.dims());

            let mut gates = gates.chunk(4, 1).into_iter();
            let (Some(i), Some(f), Some(g), Some(o)) =
                (gates.next(), gates.next(), gates.next(), gates.next())
            else {
                unreachable!("4 * d_hidden splits into 4 gates")
            };
            let i = sigmoid(i);
            let f = sigmoid(f);
            let g = self.activation.forward(g);
            let o = sigmoid(o);

            c = f * c + i * g;
            h = o * self.activation.forward(c.clone());
            outputs.push(h.clone());
        }
        if self.reverse {
            outputs.reverse();
        }

        let output = Tensor::stack::<3>(outputs, 1);
        debug_assert_eq!([batch, sequence, d_hidden], output.dims());
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn output_shape_follows_hidden_size() {
        let device = Default::default();
        let lstm = LstmConfig::new(9, 20).init::<B>(&device);
        let x = Tensor::<B, 3>::random([4, 16, 9], Distribution::Default, &device);
        assert_eq!([4, 16, 20], lstm.forward(x).dims());
    }

    #[test]
    fn forget_gate_bias_is_initialized() {
        let device = Default::default();
        let lstm = LstmConfig::new(3, 2).with_forget_bias(1.5).init::<B>(&device);
        let bias = lstm
            .input_proj
            .bias
            .as_ref()
            .unwrap()
            .val()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(bias, vec![0., 0., 1.5, 1.5, 0., 0., 0., 0.]);
    }

    #[test]
    fn reversed_outputs_stay_aligned() {
        let device = Default::default();
        let lstm = LstmConfig::new(2, 3).with_reverse(true).init::<B>(&device);

        // the two inputs only differ at the first step
        let a = Tensor::<B, 3>::random([1, 5, 2], Distribution::Default, &device);
        let b = Tensor::cat(
            vec![
                a.clone().narrow(1, 0, 1) + 1.,
                a.clone().narrow(1, 1, 4),
            ],
            1,
        );

        let out_a = lstm.forward(a);
        let out_b = lstm.forward(b);

        // the last step only saw the last input
        let last_diff: f32 = (out_a.clone().narrow(1, 4, 1) - out_b.clone().narrow(1, 4, 1))
            .abs()
            .max()
            .into_scalar()
            .elem();
        assert_eq!(last_diff, 0.);

        // the first step saw everything
        let first_diff: f32 = (out_a.narrow(1, 0, 1) - out_b.narrow(1, 0, 1))
            .abs()
            .max()
            .into_scalar()
            .elem();
        assert!(first_diff > 0.);
    }
}
