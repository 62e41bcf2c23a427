use crate::data::HarShape;
use crate::utils::loss::ClippedCrossEntropyLoss;
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::train::ClassificationOutput;

pub mod blstm;
pub mod rcl_rnn;
pub mod rcnn;
pub mod rnn;

pub use blstm::{Blstm, BlstmConfig};
pub use rcl_rnn::{RclRnn, RclRnnConfig};
pub use rcnn::{GlobalPool, Rcnn, RcnnConfig};
pub use rnn::{Rnn, RnnConfig};

/// A network mapping sensor sequences to activity class scores.
///
/// Models over grouped windows score each of their `time_steps` sub-windows,
/// item-major; the others score the whole sequence (`time_steps = 1`).
pub trait HarClassifier<B: Backend> {
    /// # Shapes
    ///   - Input [batch, sequence, n_features]
    ///   - Output [batch * time_steps, n_classes] (unnormalized scores)
    fn forward(&self, sequences: Tensor<B, 3>) -> Tensor<B, 2>;

    /// Class probabilities.
    ///
    /// # Shapes
    ///   - Input [batch, sequence, n_features]
    ///   - Output [batch * time_steps, n_classes]
    fn predict_proba(&self, sequences: Tensor<B, 3>) -> Tensor<B, 2> {
        softmax(self.forward(sequences), 1)
    }

    fn forward_classification(
        &self,
        sequences: Tensor<B, 3>,
        targets: Tensor<B, 1, Int>,
        loss: &ClippedCrossEntropyLoss,
    ) -> ClassificationOutput<B> {
        let output = self.forward(sequences);
        let [n_outputs, _n_classes] = output.dims();
        assert_eq!([n_outputs], targets.dims(), "one target per scored (sub-)window");

        let loss = loss.forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

pub trait ModelConfigExt<B: Backend>: Config {
    type Model: Module<B> + HarClassifier<B>;
    fn init(&self, device: &B::Device) -> Self::Model;
    /// Human-readable description of the assembled graph.
    fn model_info(&self) -> String;
}

/// Ties a model configuration to the windows of a dataset.
pub trait ShapeConfigExt: Config {
    /// Default configuration for windows of `shape`.
    fn for_shape(shape: &HarShape) -> Self;
    /// Whether the configured model accepts windows of `shape`.
    fn accepts(&self, shape: &HarShape) -> bool;
}

/// The available architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModelKind {
    /// Bidirectional LSTM.
    Blstm,
    /// Stacked LSTM with optional cross-channel features and downsampling.
    Rnn,
    /// Convolutional and recurrent-convolutional stack.
    Rcnn,
    /// Convolutional and recurrent-convolutional stack under an LSTM, scoring
    /// every sub-window of grouped windows.
    RclRnn,
}

impl ModelKind {
    /// Windows grouped into one sequence when nothing else is asked for.
    pub fn default_time_steps(&self) -> usize {
        match self {
            ModelKind::RclRnn => 5,
            ModelKind::Blstm | ModelKind::Rnn | ModelKind::Rcnn => 1,
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blstm" => Ok(ModelKind::Blstm),
            "rnn" => Ok(ModelKind::Rnn),
            "rcnn" => Ok(ModelKind::Rcnn),
            "rcl-rnn" | "rcl_rnn" | "rclrnn" => Ok(ModelKind::RclRnn),
            other => anyhow::bail!(
                "unknown model {other:?}, expected one of blstm, rnn, rcnn, rcl-rnn"
            ),
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelKind::Blstm => "blstm",
            ModelKind::Rnn => "rnn",
            ModelKind::Rcnn => "rcnn",
            ModelKind::RclRnn => "rcl-rnn",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_kind_parses_case_insensitively() {
        assert_eq!(ModelKind::Rcnn, "RCNN".parse::<ModelKind>().unwrap());
        assert_eq!("blstm", ModelKind::Blstm.to_string());
        assert_eq!(ModelKind::RclRnn, "RCL_RNN".parse::<ModelKind>().unwrap());
        assert_eq!("rcl-rnn", ModelKind::RclRnn.to_string());
        assert_eq!(5, ModelKind::RclRnn.default_time_steps());
        assert!("cnn".parse::<ModelKind>().is_err());
    }
}
