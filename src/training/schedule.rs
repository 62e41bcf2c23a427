use serde::{Deserialize, Serialize};

/// Learning rate over the epochs of a training run.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Keeps the initial learning rate.
    ///
    /// Example: lr = 0.1:
    /// (epoch 1→0.1, epoch 2→0.1, ...)
    #[default]
    Constant,
    /// Multiplies the learning rate by `factor` after every `every` epochs.
    ///
    /// Example: lr = 0.1, factor = 0.5, every = 2:
    /// (epoch 1→0.1, 2→0.1), (3→0.05, 4→0.05), (5→0.025, ...)
    Step { factor: f64, every: usize },
    /// Refers to a learning rate per epoch, the last one repeating.
    ///
    /// Example: custom = [0.1, 0.01]:
    /// (epoch 1→0.1, 2→0.01, 3→0.01, ...)
    Custom(Vec<f64>),
}

impl LrSchedule {
    /// Learning rate of the 1-based `epoch`.
    pub fn lr(&self, initial_lr: f64, epoch: usize) -> f64 {
        let epoch = epoch.max(1);
        match self {
            LrSchedule::Constant => initial_lr,
            LrSchedule::Step { factor, every } => {
                let decays = (epoch - 1) / (*every).max(1);
                initial_lr * factor.powi(decays as i32)
            }
            LrSchedule::Custom(lrs) => lrs
                .get(epoch - 1)
                .or(lrs.last())
                .copied()
                .unwrap_or(initial_lr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_decay_applies_after_each_period() {
        let schedule = LrSchedule::Step {
            factor: 0.5,
            every: 2,
        };
        let lrs: Vec<f64> = (1..=5).map(|epoch| schedule.lr(0.1, epoch)).collect();
        assert_eq!(vec![0.1, 0.1, 0.05, 0.05, 0.025], lrs);
    }

    #[test]
    fn custom_repeats_its_last_value() {
        let schedule = LrSchedule::Custom(vec![0.1, 0.01]);
        assert_eq!(0.01, schedule.lr(1.0, 7));
        assert_eq!(1.0, LrSchedule::Custom(vec![]).lr(1.0, 1));
        assert_eq!(0.3, LrSchedule::Constant.lr(0.3, 100));
    }
}
