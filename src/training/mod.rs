pub mod config;
pub mod history;
pub mod optim;
pub mod schedule;
pub mod trainer;

pub use config::{OptimizerConfig, TrainingConfig};
pub use history::{EpochRecord, Evaluation, History};
pub use optim::OptimConfigExt;
pub use schedule::LrSchedule;
pub use trainer::{TrainingOutput, evaluate, train};
