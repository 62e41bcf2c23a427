pub mod crossentropy;

pub use crossentropy::{ClippedCrossEntropyLoss, ClippedCrossEntropyLossConfig};
