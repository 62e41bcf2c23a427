//! Files kept in an artifacts directory: configurations, model weights,
//! optimizer state, the model description and the training history.

use crate::backend::{MainBackend, RecorderTy};
use crate::models::ModelConfigExt;
use crate::training::OptimConfigExt;
use crate::training::history::HISTORY_NAME;
use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use burn::record::{FileRecorder, Recorder};
use burn::{optim::Optimizer, prelude::*, tensor::backend::AutodiffBackend};
use std::path::{Path, PathBuf};

pub const TRAINING_CONFIG_NAME: &str = "training_config";
pub const MODEL_CONFIG_NAME: &str = "model_config";
pub const MODEL_INFO_NAME: &str = "model_info";
pub const MODEL_NAME: &str = "model";
pub const OPTIM_NAME: &str = "optim";

/// Creates the directory. With `delete`, the model, optimizer and history
/// files are removed first, so that a new run starts from fresh weights.
pub fn create_artifact_dir(artifact_dir: &Path, delete: bool) -> Result<()> {
    std::fs::create_dir_all(artifact_dir)
        .with_context(|| format!("failed to create {artifact_dir:?}"))?;
    if delete {
        tracing::info!("removing {artifact_dir:?}/{{model,optim,history}}");
        let recorded = [MODEL_NAME, OPTIM_NAME]
            .map(|name| artifact_dir.join(name).with_added_extension(recorder_extension()));
        let history =
            ["json", "csv"].map(|ext| artifact_dir.join(HISTORY_NAME).with_added_extension(ext));
        for path in recorded.into_iter().chain(history) {
            if std::fs::exists(&path).with_context(|| format!("failed to check {path:?}"))? {
                std::fs::remove_file(&path).with_context(|| format!("failed to remove {path:?}"))?;
            }
        }
    }
    Ok(())
}

fn recorder_extension() -> &'static str {
    <RecorderTy as FileRecorder<MainBackend>>::file_extension()
}

pub fn config_path(artifact_dir: &Path, name: &str) -> PathBuf {
    artifact_dir.join(name).with_added_extension("json")
}

pub fn save_config(path: &Path, config: &impl Config) -> Result<()> {
    tracing::debug!("saving config into {path:?}");
    config
        .save(path)
        .with_context(|| format!("failed to save the config into {path:?}"))
}

pub fn load_config<C: Config>(path: &Path) -> Result<Option<C>> {
    let exists = std::fs::exists(path).with_context(|| format!("failed to check {path:?}"))?;
    if exists {
        tracing::debug!("loading config from {path:?}");
        let config =
            C::load(path).with_context(|| format!("failed to load the config from {path:?}"))?;
        Ok(Some(config))
    } else {
        Ok(None)
    }
}

pub fn save_model_info(artifact_dir: &Path, info: &str) -> Result<()> {
    let path = artifact_dir.join(MODEL_INFO_NAME).with_added_extension("txt");
    std::fs::write(&path, info).with_context(|| format!("failed to write {path:?}"))
}

pub fn save_model<B: Backend>(artifact_dir: &Path, model: &impl Module<B>) -> Result<()> {
    let path = artifact_dir.join(MODEL_NAME);
    tracing::debug!("saving model into {path:?}");
    model
        .clone()
        .save_file(path, &RecorderTy::new()) // ext added automatically
        .context("failed to save the model")
}

pub fn load_model<B: Backend, ModelConfig: ModelConfigExt<B>>(
    artifact_dir: &Path,
    model_config: &ModelConfig,
    device: &B::Device,
) -> Result<Option<ModelConfig::Model>> {
    let path = artifact_dir.join(MODEL_NAME);
    let file_ext = <RecorderTy as FileRecorder<B>>::file_extension();
    let path_ext = path.with_added_extension(file_ext);
    let exists =
        std::fs::exists(&path_ext).with_context(|| format!("failed to check {path_ext:?}"))?;
    if !exists {
        return Ok(None);
    }
    tracing::info!("loading model from {path_ext:?}");
    let model = model_config
        .init(device)
        .load_file(path, &RecorderTy::new(), device) // ext added automatically
        .with_context(|| format!("failed to load the model from {path_ext:?}"))?;
    Ok(Some(model))
}

/// Loads the saved model, or initializes a new one.
pub fn load_or_init_model<B: Backend, ModelConfig: ModelConfigExt<B>>(
    artifact_dir: &Path,
    model_config: &ModelConfig,
    device: &B::Device,
) -> Result<ModelConfig::Model> {
    match load_model(artifact_dir, model_config, device)? {
        Some(model) => Ok(model),
        None => {
            tracing::info!("initializing new model");
            Ok(model_config.init(device))
        }
    }
}

pub fn save_optim<AutoB, AutoM, Optim>(artifact_dir: &Path, optim: &Optim) -> Result<()>
where
    AutoB: AutodiffBackend,
    AutoM: AutodiffModule<AutoB>,
    Optim: Optimizer<AutoM, AutoB>,
{
    let path = artifact_dir.join(OPTIM_NAME);
    tracing::debug!("saving optim into {path:?}");
    let record = optim.to_record();
    RecorderTy::new()
        .record(record, path) // ext added automatically
        .context("failed to save the optim")
}

/// Loads the saved optimizer state, or initializes a new optimizer.
pub fn load_or_init_optim<AutoB, AutoM, OptimConfig>(
    artifact_dir: &Path,
    optim_config: &OptimConfig,
    device: &AutoB::Device,
) -> Result<OptimConfig::Adaptor>
where
    AutoB: AutodiffBackend,
    AutoM: AutodiffModule<AutoB>,
    OptimConfig: OptimConfigExt<AutoB, AutoM>,
{
    let optim = optim_config.init();
    let path = artifact_dir.join(OPTIM_NAME);
    let file_ext = <RecorderTy as FileRecorder<AutoB>>::file_extension();
    let path_ext = path.with_added_extension(file_ext);
    let exists =
        std::fs::exists(&path_ext).with_context(|| format!("failed to check {path_ext:?}"))?;
    if !exists {
        tracing::info!("initializing new optim");
        return Ok(optim);
    }
    tracing::info!("loading optim from {path_ext:?}");
    let record = RecorderTy::new()
        .load(path, device) // ext added automatically
        .with_context(|| format!("failed to load the optim from {path_ext:?}"))?;
    Ok(optim.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlstmConfig, HarClassifier};
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn saved_model_is_loaded_back() {
        let dir = temp_dir::TempDir::new().unwrap();
        let device = Default::default();
        let config = BlstmConfig::new(3, 4).with_n_hidden(8);

        assert!(load_model::<B, _>(dir.path(), &config, &device).unwrap().is_none());
        let model = <BlstmConfig as ModelConfigExt<B>>::init(&config, &device);
        save_model::<B>(dir.path(), &model).unwrap();

        let loaded = load_model::<B, _>(dir.path(), &config, &device).unwrap().unwrap();
        let x = Tensor::<B, 3>::random([2, 5, 3], Distribution::Default, &device);
        let diff = (model.forward(x.clone()) - loaded.forward(x))
            .abs()
            .max()
            .into_scalar();
        assert!(diff < 1e-6);

        create_artifact_dir(dir.path(), true).unwrap();
        assert!(load_model::<B, _>(dir.path(), &config, &device).unwrap().is_none());
    }

    #[test]
    fn missing_config_is_none() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = config_path(dir.path(), MODEL_CONFIG_NAME);
        assert!(load_config::<BlstmConfig>(&path).unwrap().is_none());

        save_config(&path, &BlstmConfig::new(9, 6)).unwrap();
        let config = load_config::<BlstmConfig>(&path).unwrap().unwrap();
        assert_eq!(9, config.n_features);
    }
}
