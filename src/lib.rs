//! Human activity recognition networks on burn.
//!
//! Sensor windows from the UCI HAR and HAPT datasets (or generated ones) are
//! classified by a bidirectional LSTM, a stacked LSTM with cross-channel
//! features, or a convolutional network with recurrent convolutional layers,
//! optionally followed by an LSTM that scores several consecutive windows.

pub mod artifacts;
pub mod backend;
pub mod cli;
pub mod data;
pub mod layers;
pub mod models;
pub mod training;
pub mod utils;

pub mod prelude {
    pub use crate::data::{HarBatch, HarBatcher, HarDataset, HarItem, HarShape, HarSplits};
    pub use crate::models::{
        Blstm, BlstmConfig, HarClassifier, ModelConfigExt, ModelKind, RclRnn, RclRnnConfig, Rcnn,
        RcnnConfig, Rnn, RnnConfig, ShapeConfigExt,
    };
    pub use crate::training::{TrainingConfig, evaluate, train};
}
