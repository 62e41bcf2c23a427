use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Write;
use std::path::Path;

pub const HISTORY_NAME: &str = "history";

/// Loss and accuracy (in between 0 and 1) over one split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(deserialize_with = "nan_from_null")]
    pub loss: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub accuracy: f64,
}

/// JSON has no NaN, serde_json writes it as `null`.
fn nan_from_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub lr: f64,
    pub train: Evaluation,
    /// Present on evaluation epochs.
    pub test: Option<Evaluation>,
    pub valid: Option<Evaluation>,
    pub seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub records: Vec<EpochRecord>,
    /// Why the run ended before its last epoch, if it did.
    pub stopped_early: Option<String>,
}

impl History {
    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    /// The evaluated record with the best validation accuracy.
    pub fn best_valid(&self) -> Option<&EpochRecord> {
        self.records
            .iter()
            .filter(|record| record.valid.is_some())
            .max_by(|a, b| {
                let accuracy =
                    |record: &EpochRecord| record.valid.map(|v| v.accuracy).unwrap_or(0.);
                accuracy(a).total_cmp(&accuracy(b))
            })
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::from(concat!(
            "epoch,lr,train_loss,train_accuracy,",
            "test_loss,test_accuracy,valid_loss,valid_accuracy,seconds\n",
        ));
        let optional = |evaluation: Option<Evaluation>| match evaluation {
            Some(e) => (e.loss.to_string(), e.accuracy.to_string()),
            None => (String::new(), String::new()),
        };
        for record in self.records.iter() {
            let (test_loss, test_accuracy) = optional(record.test);
            let (valid_loss, valid_accuracy) = optional(record.valid);
            let _ = writeln!(
                csv,
                "{},{},{},{},{test_loss},{test_accuracy},{valid_loss},{valid_accuracy},{:.3}",
                record.epoch, record.lr, record.train.loss, record.train.accuracy, record.seconds,
            );
        }
        csv
    }

    /// Writes `history.json` and `history.csv` into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let json_path = dir.join(HISTORY_NAME).with_extension("json");
        let json = serde_json::to_string_pretty(self).context("failed to serialize the history")?;
        std::fs::write(&json_path, json).with_context(|| format!("failed to write {json_path:?}"))?;

        let csv_path = dir.join(HISTORY_NAME).with_extension("csv");
        std::fs::write(&csv_path, self.to_csv())
            .with_context(|| format!("failed to write {csv_path:?}"))?;
        tracing::debug!("saved the history of {} epochs into {dir:?}", self.len());
        Ok(())
    }

    /// Reads `history.json` from `dir`, if present.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(HISTORY_NAME).with_extension("json");
        if !std::fs::exists(&path).with_context(|| format!("failed to check {path:?}"))? {
            return Ok(None);
        }
        let json =
            std::fs::read_to_string(&path).with_context(|| format!("failed to read {path:?}"))?;
        let history =
            serde_json::from_str(&json).with_context(|| format!("failed to parse {path:?}"))?;
        Ok(Some(history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, valid_accuracy: Option<f64>) -> EpochRecord {
        let evaluation = |accuracy| Evaluation { loss: 1.0, accuracy };
        EpochRecord {
            epoch,
            lr: 0.01,
            train: evaluation(0.5),
            test: valid_accuracy.map(evaluation),
            valid: valid_accuracy.map(evaluation),
            seconds: 1.0,
        }
    }

    #[test]
    fn picks_the_best_validation_epoch() {
        let mut history = History::default();
        history.push(record(1, Some(0.6)));
        history.push(record(2, None));
        history.push(record(3, Some(0.8)));
        history.push(record(4, Some(0.7)));
        assert_eq!(3, history.best_valid().unwrap().epoch);
    }

    #[test]
    fn csv_leaves_unevaluated_columns_empty() {
        let mut history = History::default();
        history.push(record(2, None));
        let csv = history.to_csv();
        let line = csv.lines().nth(1).unwrap();
        assert_eq!("2,0.01,1,0.5,,,,,1.000", line);
    }

    #[test]
    fn saves_json_and_csv() {
        let dir = temp_dir::TempDir::new().unwrap();
        assert_eq!(None, History::load(dir.path()).unwrap());

        let mut history = History::default();
        history.push(record(1, Some(0.5)));
        history.stopped_early = Some("interrupted".into());
        history.save(dir.path()).unwrap();

        assert!(dir.path().join("history.csv").exists());
        assert_eq!(Some(history), History::load(dir.path()).unwrap());
    }

    #[test]
    fn diverged_losses_are_loaded_back_as_nan() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut history = History::default();
        let mut diverged = record(1, None);
        diverged.train.loss = f64::NAN;
        history.push(diverged);
        history.save(dir.path()).unwrap();

        let loaded = History::load(dir.path()).unwrap().unwrap();
        assert!(loaded.records[0].train.loss.is_nan());
    }
}
