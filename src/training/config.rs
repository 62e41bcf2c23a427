use crate::training::schedule::LrSchedule;
use burn::grad_clipping::GradientClippingConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, RmsPropConfig, SgdConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Update rule and its hyper-parameters, the learning rate excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptimizerConfig {
    RmsProp { rho: f32, epsilon: f32 },
    /// Stochastic gradient descent with Nesterov momentum.
    Nesterov { momentum: f64 },
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::RmsProp {
            rho: 0.95,
            epsilon: 1e-6,
        }
    }
}

impl OptimizerConfig {
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::RmsProp { .. } => "rmsprop",
            OptimizerConfig::Nesterov { .. } => "nesterov",
            OptimizerConfig::Adam { .. } => "adam",
        }
    }

    pub fn rmsprop(
        rho: f32,
        epsilon: f32,
        clipping: Option<GradientClippingConfig>,
    ) -> RmsPropConfig {
        RmsPropConfig::new()
            .with_alpha(rho)
            .with_epsilon(epsilon)
            .with_momentum(0.)
            .with_grad_clipping(clipping)
    }

    pub fn nesterov(momentum: f64, clipping: Option<GradientClippingConfig>) -> SgdConfig {
        SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(momentum)
                    .with_dampening(0.)
                    .with_nesterov(true),
            ))
            .with_gradient_clipping(clipping)
    }

    pub fn adam(
        beta1: f32,
        beta2: f32,
        epsilon: f32,
        clipping: Option<GradientClippingConfig>,
    ) -> AdamConfig {
        AdamConfig::new()
            .with_beta_1(beta1)
            .with_beta_2(beta2)
            .with_epsilon(epsilon)
            .with_grad_clipping(clipping)
    }
}

#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "OptimizerConfig::default()")]
    pub optimizer: OptimizerConfig,
    #[config(default = 1000)]
    pub num_epochs: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 2)]
    pub num_workers: usize,
    #[config(default = 0.002)]
    pub lr: f64,
    #[config(default = "LrSchedule::Step { factor: 0.75, every: 50 }")]
    pub lr_schedule: LrSchedule,
    /// Element-wise bound of the gradients, disabled when `None`.
    #[config(default = "Some(5.0)")]
    pub grad_clip: Option<f32>,
    #[config(default = 0)]
    pub seed: u64,
    /// Evaluate the test and validation splits every this many epochs.
    #[config(default = 1)]
    pub eval_freq: usize,
    /// Log the epoch summary every this many epochs.
    #[config(default = 1)]
    pub output_freq: usize,
    /// Save the model, the optimizer and the history every this many epochs.
    #[config(default = 10)]
    pub save_freq: usize,
}

impl TrainingConfig {
    pub fn grad_clipping(&self) -> Option<GradientClippingConfig> {
        self.grad_clip.map(GradientClippingConfig::Value)
    }

    pub fn lr_at(&self, epoch: usize) -> f64 {
        self.lr_schedule.lr(self.lr, epoch)
    }

    /// Training iterations of one epoch; the remainder is dropped.
    pub fn n_batches(&self, n_items: usize) -> usize {
        n_items / self.batch_size.max(1)
    }

    pub fn info(&self) -> String {
        format!(
            "Optimizer: {}\nUpdate args: {:?}\nLearning rate: {} ({:?})\nBatch size: {}\nEpochs: {}\nGradient clipping: {:?}",
            self.optimizer.name(),
            self.optimizer,
            self.lr,
            self.lr_schedule,
            self.batch_size,
            self.num_epochs,
            self.grad_clip,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_annealed_rmsprop() {
        let config = TrainingConfig::new();
        assert_eq!("rmsprop", config.optimizer.name());
        assert_eq!(0.002, config.lr_at(50));
        assert!((config.lr_at(51) - 0.0015).abs() < 1e-12);
        assert_eq!(7, config.n_batches(7 * 128 + 127));
    }

    #[test]
    fn survives_a_json_round_trip() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("training_config.json");
        let config = TrainingConfig::new()
            .with_optimizer(OptimizerConfig::Nesterov { momentum: 0.9 })
            .with_grad_clip(None);
        config.save(&path).unwrap();

        let loaded = TrainingConfig::load(&path).unwrap();
        assert_eq!(config.optimizer, loaded.optimizer);
        assert_eq!(None, loaded.grad_clip);
        assert_eq!(config.lr_schedule, loaded.lr_schedule);
    }
}
