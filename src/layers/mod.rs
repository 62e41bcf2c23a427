pub mod batch_normalize;
pub mod cross_channel;
pub mod gaussian_noise;
pub mod lstm;
pub mod rcl;
pub mod tied_dropout;

pub use batch_normalize::{BatchNormalize, BatchNormalizeConfig};
pub use cross_channel::{CrossChannel, CrossChannelConfig};
pub use gaussian_noise::{GaussianNoise, GaussianNoiseConfig};
pub use lstm::{Lstm, LstmConfig};
pub use rcl::{RecurrentConv, RecurrentConvConfig};
pub use tied_dropout::{TiedDropout, TiedDropoutConfig};
