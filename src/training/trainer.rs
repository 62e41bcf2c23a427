use crate::artifacts;
use crate::data::{HarBatch, HarBatcher, HarDataset, HarItem, HarShape, HarSplits};
use crate::models::HarClassifier;
use crate::training::config::{OptimizerConfig, TrainingConfig};
use crate::training::history::{EpochRecord, Evaluation, History};
use crate::training::optim::OptimConfigExt;
use crate::utils::is_nan_or_inf;
use crate::utils::loss::ClippedCrossEntropyLoss;
use anyhow::{Result, ensure};
use burn::data::dataset::Dataset;
use burn::data::dataset::transform::{PartialDataset, ShuffledDataset};
use burn::prelude::*;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder, Progress},
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
    train::metric::{AccuracyMetric, Adaptor, LossMetric, Metric, MetricMetadata, Numeric},
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

type Dataloader<B> = Arc<dyn DataLoader<B, HarBatch<B>> + 'static>;

/// The trained model and what happened to it.
#[derive(Debug)]
pub struct TrainingOutput<M> {
    pub model: M,
    pub history: History,
}

/// Why an epoch ended before its last batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interruption {
    NonFiniteLoss,
    Cancelled,
}

impl Interruption {
    fn reason(&self) -> &'static str {
        match self {
            Interruption::NonFiniteLoss => "non-finite training loss",
            Interruption::Cancelled => "interrupted",
        }
    }
}

/// Trains `model` on the train split of `splits`.
///
/// With an artifacts directory, the optimizer state and the history of a
/// previous run are resumed from it, and the model, optimizer and history are
/// saved every `save_freq` epochs and once training ends.
///
/// Setting `cancel` stops the run after the current batch; the model trained
/// so far is still returned.
pub fn train<AutoB, M>(
    model: M,
    splits: &HarSplits,
    config: &TrainingConfig,
    artifact_dir: Option<&Path>,
    cancel: &AtomicBool,
    device: &AutoB::Device,
) -> Result<TrainingOutput<M>>
where
    AutoB: AutodiffBackend,
    M: AutodiffModule<AutoB> + HarClassifier<AutoB>,
    M::InnerModule: HarClassifier<AutoB::InnerBackend>,
{
    let clipping = config.grad_clipping();
    match &config.optimizer {
        OptimizerConfig::RmsProp { rho, epsilon } => {
            let optim_config = OptimizerConfig::rmsprop(*rho, *epsilon, clipping);
            run(model, &optim_config, splits, config, artifact_dir, cancel, device)
        }
        OptimizerConfig::Nesterov { momentum } => {
            let optim_config = OptimizerConfig::nesterov(*momentum, clipping);
            run(model, &optim_config, splits, config, artifact_dir, cancel, device)
        }
        OptimizerConfig::Adam {
            beta1,
            beta2,
            epsilon,
        } => {
            let optim_config = OptimizerConfig::adam(*beta1, *beta2, *epsilon, clipping);
            run(model, &optim_config, splits, config, artifact_dir, cancel, device)
        }
    }
}

fn run<AutoB, M, OptimConfig>(
    model: M,
    optim_config: &OptimConfig,
    splits: &HarSplits,
    config: &TrainingConfig,
    artifact_dir: Option<&Path>,
    cancel: &AtomicBool,
    device: &AutoB::Device,
) -> Result<TrainingOutput<M>>
where
    AutoB: AutodiffBackend,
    M: AutodiffModule<AutoB> + HarClassifier<AutoB>,
    M::InnerModule: HarClassifier<AutoB::InnerBackend>,
    OptimConfig: OptimConfigExt<AutoB, M>,
{
    ensure!(config.batch_size > 0, "the batch size must be positive");
    let n_batches = config.n_batches(splits.train.len());
    ensure!(
        n_batches > 0,
        "the training split has {} items, fewer than a batch of {}",
        splits.train.len(),
        config.batch_size
    );
    AutoB::seed(device, config.seed);

    let (mut optim, mut history) = match artifact_dir {
        Some(dir) => (
            artifacts::load_or_init_optim::<AutoB, M, _>(dir, optim_config, device)?,
            History::load(dir)?.unwrap_or_default(),
        ),
        None => (optim_config.init(), History::default()),
    };
    history.stopped_early = None;
    let first_epoch = history.last().map(|record| record.epoch + 1).unwrap_or(1);
    if first_epoch > 1 {
        tracing::info!("resuming training at epoch {first_epoch}");
    }

    let loss = ClippedCrossEntropyLoss::default();
    let batcher = HarBatcher::new(&splits.shape);
    let mut metric_meta = MetricMetadata {
        progress: Progress::new(0, n_batches * config.batch_size),
        epoch: first_epoch,
        epoch_total: config.num_epochs,
        iteration: 0,
        lr: Some(config.lr_at(first_epoch)),
    };

    tracing::info!(
        "training on {} batches of {} per epoch, {} items dropped",
        n_batches,
        config.batch_size,
        splits.train.len() - n_batches * config.batch_size
    );
    let mut model = model;
    for epoch in first_epoch..=config.num_epochs {
        let started = Instant::now();
        let lr = config.lr_at(epoch);
        metric_meta.epoch = epoch;
        metric_meta.lr = Some(lr);
        metric_meta.progress = Progress::new(0, n_batches * config.batch_size);

        // reshuffled every epoch, then cut to whole batches
        let shuffled = ShuffledDataset::<_, HarItem>::with_seed(
            splits.train.clone(),
            config.seed.wrapping_add(epoch as u64),
        );
        let dataset = PartialDataset::<_, HarItem>::new(shuffled, 0, n_batches * config.batch_size);
        let dataloader_train: Dataloader<AutoB> = DataLoaderBuilder::new(batcher.clone())
            .batch_size(config.batch_size)
            .num_workers(config.num_workers)
            .build(dataset);

        let (trained, train_eval, interruption) =
            epoch_train(dataloader_train, model, &loss, &mut optim, lr, &mut metric_meta, cancel);
        model = trained;

        let evaluate_now = interruption.is_none()
            && (epoch % config.eval_freq.max(1) == 0 || epoch == config.num_epochs);
        let (test, valid) = if evaluate_now {
            let valid_model = model.valid();
            let test = evaluate(&valid_model, &splits.test, &splits.shape, config)?;
            let valid = evaluate(&valid_model, &splits.valid, &splits.shape, config)?;
            (test, valid)
        } else {
            (None, None)
        };

        let record = EpochRecord {
            epoch,
            lr,
            train: train_eval,
            test,
            valid,
            seconds: started.elapsed().as_secs_f64(),
        };
        if epoch % config.output_freq.max(1) == 0 || interruption.is_some() {
            log_epoch(&record, config.num_epochs);
        }
        history.push(record);

        if let Some(interruption) = interruption {
            tracing::warn!("stopping at epoch {epoch}: {}", interruption.reason());
            history.stopped_early = Some(interruption.reason().to_string());
            break;
        }

        if let Some(dir) = artifact_dir {
            if epoch % config.save_freq.max(1) == 0 && epoch != config.num_epochs {
                save(dir, &model, &optim, &history)?;
            }
        }
    }

    if let Some(dir) = artifact_dir {
        save(dir, &model, &optim, &history)?;
    }
    if let Some(best) = history.best_valid() {
        if let Some(valid) = best.valid {
            tracing::info!(
                "best validation accuracy {:.4} at epoch {}",
                valid.accuracy,
                best.epoch
            );
        }
    }
    tracing::info!("training finished");
    Ok(TrainingOutput { model, history })
}

fn save<AutoB, M, O>(dir: &Path, model: &M, optim: &O, history: &History) -> Result<()>
where
    AutoB: AutodiffBackend,
    M: AutodiffModule<AutoB>,
    O: Optimizer<M, AutoB>,
{
    artifacts::save_model::<AutoB>(dir, model)?;
    artifacts::save_optim::<AutoB, M, O>(dir, optim)?;
    history.save(dir)
}

fn epoch_train<AutoB, M, O>(
    dataloader_train: Dataloader<AutoB>,
    mut training_model: M,
    loss: &ClippedCrossEntropyLoss,
    optim: &mut O,
    lr: f64,
    metric_meta: &mut MetricMetadata,
    cancel: &AtomicBool,
) -> (M, Evaluation, Option<Interruption>)
where
    AutoB: AutodiffBackend,
    M: AutodiffModule<AutoB> + HarClassifier<AutoB>,
    O: Optimizer<M, AutoB>,
{
    let mut loss_metric = LossMetric::<AutoB>::new();
    let mut acc_metric = AccuracyMetric::<AutoB>::new();
    let n_items = dataloader_train.num_items();
    let mut interruption = None;

    for (mut b, batch) in dataloader_train.iter().enumerate() {
        b += 1;
        let [batch_size, _sequence, _n_features] = batch.sequences.dims();

        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;

        let pre_metrics =
            training_model.forward_classification(batch.sequences, batch.targets, loss);
        acc_metric.update(&pre_metrics.adapt(), metric_meta);
        loss_metric.update(&pre_metrics.adapt(), metric_meta);

        let batch_loss = loss_metric.value().current();
        if is_nan_or_inf(batch_loss) {
            interruption = Some(Interruption::NonFiniteLoss);
            break;
        }

        let grads = pre_metrics.loss.backward();
        let grads = GradientsParams::from_grads(grads, &training_model);
        training_model = optim.step(lr, training_model, grads);

        tracing::trace!(
            "epoch {}/{}, batch {b:0>4}, items {}/{}, loss {:.4}, acc {:0>6.2}",
            metric_meta.epoch,
            metric_meta.epoch_total,
            metric_meta.progress.items_processed,
            n_items,
            batch_loss,
            acc_metric.value().current(),
        );

        if cancel.load(Ordering::Relaxed) {
            interruption = Some(Interruption::Cancelled);
            break;
        }
    }

    let evaluation = Evaluation {
        loss: loss_metric.running_value().current(),
        accuracy: acc_metric.running_value().current() / 100.,
    };
    (training_model, evaluation, interruption)
}

/// Mean loss and accuracy of `model` over every item of `dataset`, without
/// gradients. `None` for an empty dataset.
pub fn evaluate<B, M>(
    model: &M,
    dataset: &HarDataset,
    shape: &HarShape,
    config: &TrainingConfig,
) -> Result<Option<Evaluation>>
where
    B: Backend,
    M: HarClassifier<B>,
{
    if dataset.is_empty() {
        return Ok(None);
    }
    ensure!(
        dataset.sequence_length() == shape.sequence_length
            && dataset.n_features() == shape.n_features
            && dataset.time_steps() == shape.time_steps,
        "the dataset holds {} x {} windows of {} time steps, the model expects {} x {} of {}",
        dataset.sequence_length(),
        dataset.n_features(),
        dataset.time_steps(),
        shape.sequence_length,
        shape.n_features,
        shape.time_steps
    );

    let dataloader: Dataloader<B> = DataLoaderBuilder::new(HarBatcher::new(shape))
        .batch_size(config.batch_size.max(1))
        .num_workers(config.num_workers)
        .build(dataset.clone());

    let mut metric_meta = MetricMetadata {
        progress: Progress::new(0, dataset.len()),
        epoch: 1,
        epoch_total: 1,
        iteration: 0,
        lr: None,
    };
    let loss = ClippedCrossEntropyLoss::default();
    let mut loss_metric = LossMetric::<B>::new();
    let mut acc_metric = AccuracyMetric::<B>::new();

    for batch in dataloader.iter() {
        let [batch_size, _sequence, _n_features] = batch.sequences.dims();
        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;

        let pre_metrics = model.forward_classification(batch.sequences, batch.targets, &loss);
        acc_metric.update(&pre_metrics.adapt(), &metric_meta);
        loss_metric.update(&pre_metrics.adapt(), &metric_meta);
    }

    Ok(Some(Evaluation {
        loss: loss_metric.running_value().current(),
        accuracy: acc_metric.running_value().current() / 100.,
    }))
}

fn log_epoch(record: &EpochRecord, num_epochs: usize) {
    tracing::info!(
        "epoch {}/{}, lr {:.6}, train loss {:.4}, train acc {:.4}, {:.1}s",
        record.epoch,
        num_epochs,
        record.lr,
        record.train.loss,
        record.train.accuracy,
        record.seconds,
    );
    if let (Some(test), Some(valid)) = (record.test, record.valid) {
        tracing::info!(
            "epoch {}/{}, test loss {:.4}, test acc {:.4}, valid loss {:.4}, valid acc {:.4}",
            record.epoch,
            num_epochs,
            test.loss,
            test.accuracy,
            valid.loss,
            valid.accuracy,
        );
    }
}
