use crate::artifacts::{self, MODEL_CONFIG_NAME, TRAINING_CONFIG_NAME};
use crate::data::features::Orientation;
use crate::data::{DatasetKind, HarSplits, SyntheticOptions, UciHaptOptions, UciHarOptions};
use crate::data::{synthetic, uci_hapt, uci_har};
use crate::models::ModelKind;
use anyhow::{Context, Result, bail};
use burn::prelude::*;
use std::path::PathBuf;

pub const HELP: &str = "\
HAR nets

A command-line tool for training and evaluating human activity recognition
networks on wearable sensor windows.
Models, optimizers, configurations and the training history are persisted in an
artifacts directory.

USAGE:
    har-nets [OPTIONS]

When no --training or --evaluate flag is provided, the program exits after handling configuration logic.

BEHAVIOR OVERVIEW
- The program manages two configurations: training config and model config.
- If --training-config or --model-config is given, the corresponding config is loaded from the specified file and saved to the artifacts directory (overwriting any existing file).
- If no explicit config file is provided for a component, the program attempts to load it from the artifacts directory; if absent, a default configuration for the dataset is created and saved.
- The artifacts directory (--artifacts-path) is used to read/write model weights, optimizer state, configurations, the model description and the training history. If not specified, a new temporary directory is created and its path is printed.
- With --remove-artifacts, any existing model, optimizer and history files in the artifacts directory are deleted before training (if --training is active).
- Model and optimizer weights are loaded from the artifacts directory if present, and training resumes after the last recorded epoch.
- If both --training and --evaluate are specified, training executes first, followed by the evaluation of the trained model.
- Ctrl-C stops training after the current batch; the model and history so far are saved.

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -t, --training              Run training (creates or updates model / optimizer)
    -e, --evaluate              Evaluate the model on the test and validation splits
    -r, --remove-artifacts      Delete existing model, optimizer and history files from the artifacts directory before training
                                (has no effect if --training is not used)
        --model <NAME>          blstm, rnn, rcnn or rcl-rnn [default: rnn]
        --dataset <NAME>        uci-har, uci-hapt or synthetic [default: uci-har]
        --data-root <PATH>      Directory holding the extracted dataset [default: data]
        --add-pitch             Append the pitch angle derived from the acceleration
        --add-roll              Append the roll angle derived from the acceleration
        --add-filter            Append gravity and body acceleration (uci-hapt only)
        --time-steps <N>        Join N consecutive windows into one sequence labelled per window
                                (rcl-rnn only) [default: 5 for rcl-rnn, 1 otherwise]
        --epochs <N>            Override the number of epochs of the training config
    -c, --training-config <PATH>
                                Load training configuration from this file (overrides any config in artifacts directory)
    -m, --model-config <PATH>   Load model configuration from this file (overrides any config in artifacts directory)
    -a, --artifacts-path <PATH>
                                Directory where configurations, model weights, and optimizer state are saved and loaded.
                                If the directory does not exist, it will be created.
                                Defaults to a newly created temporary directory (path will be printed).

ENVIRONMENT:
    RUST_LOG                    Log filter [default: har_nets=info]
";

#[derive(Debug)]
pub struct AppArgs {
    pub training: bool,
    pub evaluate: bool,
    pub remove_artifacts: bool,
    pub model: ModelKind,
    pub dataset: DatasetKind,
    pub data_root: PathBuf,
    pub orientation: Orientation,
    pub add_filter: bool,
    pub time_steps: Option<usize>,
    pub epochs: Option<usize>,
    pub training_config: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub artifacts_path: PathBuf,
}

impl AppArgs {
    pub fn parse() -> Result<Self> {
        Self::parse_from(pico_args::Arguments::from_env())
    }

    pub fn parse_from(mut pargs: pico_args::Arguments) -> Result<Self> {
        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        let artifacts_path = pargs.opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?;
        let artifacts_path = match artifacts_path {
            Some(path) => path,
            None => {
                // e.g. /tmp/har-nets-abcd-0
                let name = format!("{}-", std::env!("CARGO_PKG_NAME"));
                let tmp = temp_dir::TempDir::with_prefix(name)
                    .context("failed to create the temporary directory")?
                    .dont_delete_on_drop();
                let path = tmp.path();
                println!("new artifacts directory: {path:?}");
                path.into()
            }
        };

        let args = AppArgs {
            training_config: pargs
                .opt_value_from_os_str(["-c", "--training-config"], parse_path)?,
            model_config: pargs.opt_value_from_os_str(["-m", "--model-config"], parse_path)?,
            artifacts_path,
            model: pargs.opt_value_from_str("--model")?.unwrap_or(ModelKind::Rnn),
            dataset: pargs.opt_value_from_str("--dataset")?.unwrap_or(DatasetKind::UciHar),
            data_root: pargs
                .opt_value_from_os_str("--data-root", parse_path)?
                .unwrap_or_else(|| PathBuf::from("data")),
            time_steps: pargs.opt_value_from_str("--time-steps")?,
            epochs: pargs.opt_value_from_str("--epochs")?,
            // must parse flags after values
            training: pargs.contains(["-t", "--training"]),
            evaluate: pargs.contains(["-e", "--evaluate"]),
            remove_artifacts: pargs.contains(["-r", "--remove-artifacts"]),
            orientation: Orientation {
                add_pitch: pargs.contains("--add-pitch"),
                add_roll: pargs.contains("--add-roll"),
            },
            add_filter: pargs.contains("--add-filter"),
        };

        // It's up to the caller what to do with the remaining arguments.
        let remaining = pargs.finish();
        if !remaining.is_empty() {
            bail!("unused arguments: {remaining:?}");
        }
        if args.add_filter && args.dataset != DatasetKind::UciHapt {
            bail!("--add-filter is only available for the uci-hapt dataset");
        }
        if args.orientation.n_extra() > 0 && args.dataset == DatasetKind::Synthetic {
            bail!("--add-pitch and --add-roll are not available for the synthetic dataset");
        }
        match args.time_steps {
            Some(0) => bail!("--time-steps must be positive"),
            Some(n) if n > 1 && args.model != ModelKind::RclRnn => {
                bail!("--time-steps is only available for the rcl-rnn model")
            }
            _ => {}
        }

        Ok(args)
    }

    pub fn create_artifact_dir(&self) -> Result<()> {
        artifacts::create_artifact_dir(&self.artifacts_path, self.remove_artifacts && self.training)
    }

    /// Windows joined into one sequence.
    pub fn time_steps(&self) -> usize {
        self.time_steps.unwrap_or_else(|| self.model.default_time_steps())
    }

    pub fn load_dataset(&self) -> Result<HarSplits> {
        let splits = match self.dataset {
            DatasetKind::UciHar => uci_har::load(
                &self.data_root,
                &UciHarOptions {
                    orientation: self.orientation,
                },
            )?,
            DatasetKind::UciHapt => uci_hapt::load(
                &self.data_root,
                &UciHaptOptions {
                    orientation: self.orientation,
                    add_filter: self.add_filter,
                    ..Default::default()
                },
            )?,
            DatasetKind::Synthetic => synthetic::generate(&SyntheticOptions::default()),
        };
        Ok(splits.group_windows(self.time_steps()))
    }

    pub fn save_training_config(&self, training_config: &impl Config) -> Result<()> {
        let path = artifacts::config_path(&self.artifacts_path, TRAINING_CONFIG_NAME);
        artifacts::save_config(&path, training_config)
    }

    /// The explicit config file, else the one of the artifacts directory.
    pub fn load_training_config<TrainingConfig: Config>(&self) -> Result<Option<TrainingConfig>> {
        match &self.training_config {
            Some(path) => artifacts::load_config(path)?
                .with_context(|| format!("failed to find the training config file {path:?}"))
                .map(Some),
            None => {
                let path = artifacts::config_path(&self.artifacts_path, TRAINING_CONFIG_NAME);
                artifacts::load_config(&path)
            }
        }
    }

    pub fn save_model_config(&self, model_config: &impl Config) -> Result<()> {
        let path = artifacts::config_path(&self.artifacts_path, MODEL_CONFIG_NAME);
        artifacts::save_config(&path, model_config)
    }

    /// The explicit config file, else the one of the artifacts directory.
    pub fn load_model_config<ModelConfig: Config>(&self) -> Result<Option<ModelConfig>> {
        match &self.model_config {
            Some(path) => artifacts::load_config(path)?
                .with_context(|| format!("failed to find the model config file {path:?}"))
                .map(Some),
            None => {
                let path = artifacts::config_path(&self.artifacts_path, MODEL_CONFIG_NAME);
                artifacts::load_config(&path).with_context(|| {
                    format!(
                        "failed to load the {} config of the artifacts directory",
                        self.model
                    )
                })
            }
        }
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<std::path::PathBuf, &'static str> {
    Ok(s.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::Dataset;
    use std::ffi::OsString;

    fn parse(args: &[&str]) -> Result<AppArgs> {
        let args: Vec<OsString> = args.iter().map(OsString::from).collect();
        AppArgs::parse_from(pico_args::Arguments::from_vec(args))
    }

    #[test]
    fn parses_model_and_dataset_options() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();
        let args = parse(&[
            "--model",
            "rcnn",
            "--dataset",
            "uci-hapt",
            "--add-filter",
            "--add-roll",
            "-t",
            "--epochs",
            "5",
            "-a",
            path,
        ])
        .unwrap();
        assert_eq!(ModelKind::Rcnn, args.model);
        assert_eq!(DatasetKind::UciHapt, args.dataset);
        assert!(args.training && !args.evaluate);
        assert!(args.add_filter && args.orientation.add_roll && !args.orientation.add_pitch);
        assert_eq!(Some(5), args.epochs);
        assert_eq!(dir.path(), args.artifacts_path);
        assert_eq!(1, args.time_steps());
    }

    #[test]
    fn rcl_rnn_groups_windows() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();
        let args = parse(&["--model", "rcl-rnn", "--dataset", "synthetic", "-a", path]).unwrap();
        assert_eq!(5, args.time_steps());

        let splits = args.load_dataset().unwrap();
        // 256 and 64 synthetic windows of 32 steps
        assert_eq!(51, splits.train.len());
        assert_eq!(12, splits.test.len());
        assert_eq!(160, splits.shape.sequence_length);
        assert_eq!(5, splits.shape.time_steps);

        let args = parse(&["--model", "rcl-rnn", "--time-steps", "2", "-a", path]).unwrap();
        assert_eq!(2, args.time_steps());
    }

    #[test]
    fn rejects_leftovers_and_misplaced_filters() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();
        assert!(parse(&["-a", path, "--unknown"]).is_err());
        assert!(parse(&["-a", path, "--add-filter"]).is_err());
        assert!(parse(&["-a", path, "--model", "cnn"]).is_err());
        assert!(parse(&["-a", path, "--dataset", "synthetic", "--add-pitch"]).is_err());
        assert!(parse(&["-a", path, "--dataset", "synthetic", "--add-roll"]).is_err());
        assert!(parse(&["-a", path, "--time-steps", "3"]).is_err());
        assert!(parse(&["-a", path, "--model", "rcl-rnn", "--time-steps", "0"]).is_err());
    }
}
