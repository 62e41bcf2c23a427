use anyhow::{Context, Result, ensure};
use burn::module::AutodiffModule;
use har_nets::artifacts;
use har_nets::backend::{MainAutoBackend, MainBackend, MainDevice};
use har_nets::cli::AppArgs;
use har_nets::data::HarSplits;
use har_nets::models::{
    BlstmConfig, HarClassifier, ModelConfigExt, ModelKind, RclRnnConfig, RcnnConfig, RnnConfig,
    ShapeConfigExt,
};
use har_nets::training::{self, TrainingConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("har_nets=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = AppArgs::parse()?;
    args.create_artifact_dir()?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            if interrupt(&cancel) {
                tracing::warn!("second interrupt received, exiting");
                std::process::exit(130);
            }
            tracing::warn!("interrupt received, stopping after the current batch");
        })
        .context("failed to set the Ctrl-C handler")?;
    }

    let splits = args.load_dataset()?;
    for line in splits.summary().lines() {
        tracing::info!("{line}");
    }

    let mut training_config = args
        .load_training_config::<TrainingConfig>()?
        .unwrap_or_else(TrainingConfig::new);
    if let Some(epochs) = args.epochs {
        training_config.num_epochs = epochs;
    }
    args.save_training_config(&training_config)?;

    match args.model {
        ModelKind::Blstm => launch::<BlstmConfig>(&args, &splits, &training_config, &cancel),
        ModelKind::Rnn => launch::<RnnConfig>(&args, &splits, &training_config, &cancel),
        ModelKind::Rcnn => launch::<RcnnConfig>(&args, &splits, &training_config, &cancel),
        ModelKind::RclRnn => launch::<RclRnnConfig>(&args, &splits, &training_config, &cancel),
    }
}

/// Raises the cancellation flag, returning whether it was already raised.
fn interrupt(cancel: &AtomicBool) -> bool {
    cancel.swap(true, Ordering::Relaxed)
}

fn launch<ModelConfig>(
    args: &AppArgs,
    splits: &HarSplits,
    training_config: &TrainingConfig,
    cancel: &AtomicBool,
) -> Result<()>
where
    ModelConfig: ModelConfigExt<MainAutoBackend> + ShapeConfigExt,
    ModelConfig::Model: AutodiffModule<MainAutoBackend>,
    <ModelConfig::Model as AutodiffModule<MainAutoBackend>>::InnerModule:
        HarClassifier<MainBackend>,
{
    let model_config = args
        .load_model_config::<ModelConfig>()?
        .unwrap_or_else(|| ModelConfig::for_shape(&splits.shape));
    ensure!(
        model_config.accepts(&splits.shape),
        "the {} config does not fit the {} windows \
         ({} steps in {} time steps x {} features, {} classes)",
        args.model,
        splits.name,
        splits.shape.sequence_length,
        splits.shape.time_steps,
        splits.shape.n_features,
        splits.shape.n_classes
    );
    args.save_model_config(&model_config)?;

    let info = format!(
        "{}\n{}\n{}",
        model_config.model_info(),
        splits.summary(),
        training_config.info()
    );
    artifacts::save_model_info(&args.artifacts_path, &info)?;
    for line in model_config.model_info().lines() {
        tracing::info!("{line}");
    }

    let device = MainAutoBackend::main_device();
    let mut model = artifacts::load_or_init_model::<MainAutoBackend, _>(
        &args.artifacts_path,
        &model_config,
        &device,
    )?;

    if args.training {
        let output = training::train(
            model,
            splits,
            training_config,
            Some(&args.artifacts_path),
            cancel,
            &device,
        )?;
        model = output.model;
    }

    if args.evaluate {
        let valid_model = model.valid();
        for (name, dataset) in [("test", &splits.test), ("valid", &splits.valid)] {
            match training::evaluate(&valid_model, dataset, &splits.shape, training_config)? {
                Some(evaluation) => tracing::info!(
                    "{name}: loss {:.4}, accuracy {:.4}",
                    evaluation.loss,
                    evaluation.accuracy
                ),
                None => tracing::warn!("{name}: empty split"),
            }
        }
    }

    if !args.training && !args.evaluate {
        tracing::info!("nothing to run, see --help");
    }
    Ok(())
}
