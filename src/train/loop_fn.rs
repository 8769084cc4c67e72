use std::sync::mpsc;
use std::time::Instant;

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::data::{batches, Batch, Dataset};
use crate::error::{Result, TrainError};
use crate::experiment::{BestState, ExperimentDir, RunMetadata, RunStatus};
use crate::loss::SoftmaxCrossEntropy;
use crate::math::Matrix;
use crate::network::Model;
use crate::optim::{
    build_optimizer, build_scheduler, clip_grad_norm, scheduler::SchedulerSettings, LrScheduler, Optimizer,
};
use crate::persist::{
    checkpoint::{self, Checkpoint},
    export::{self, DatasetInfo, EnvironmentInfo, ExportMetadata, ExportedModel, ModelInfo, TrainingInfo},
    PersistenceWorker,
};
use crate::sink::{confusion_image, MetricsSink, ScalarEvent};
use crate::train::early_stop::{EarlyStopping, StopState};
use crate::train::epoch_record::EpochRecord;
use crate::train::hooks::TrainHooks;
use crate::train::metrics::{predictions, ConfusionMatrix, MetricsAccumulator, PassSummary};
use crate::train::report::FinalReport;
use crate::train::train_config::{TrainConfig, GRAD_CLIP_NORM};

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `model` on `train_set`, validating on `valid_set` after every epoch,
/// and returns once every checkpoint and the final export have been written.
///
/// Per epoch: a shuffled training pass (per-position losses summed, gradients
/// clipped to `GRAD_CLIP_NORM`, one optimizer step per batch), a validation
/// pass, the scheduler step on validation accuracy, early stopping on
/// validation loss, and a checkpoint save when validation accuracy beats the
/// best so far. Saves run on a background worker; the loop never waits on
/// them.
///
/// # Errors
/// Fails on an invalid configuration, a model that does not match the
/// datasets, an empty dataset, a sample that cannot be loaded or has a bad
/// label, or a non-finite loss. Once the run directory exists, such a failure
/// leaves `run.json` with status `failed`. A failed checkpoint write is logged
/// and the run goes on.
pub fn train_loop(
    model: &mut dyn Model,
    train_set: &dyn Dataset,
    valid_set: &dyn Dataset,
    config: &TrainConfig,
    mut hooks: TrainHooks,
) -> Result<FinalReport> {
    config.validate()?;
    check_compatible(model, train_set, "train")?;
    check_compatible(model, valid_set, "valid")?;

    let mut optimizer = build_optimizer(config.optimizer, config.learning_rate, config.weight_decay);
    let mut scheduler = build_scheduler(
        config.scheduler,
        SchedulerSettings {
            base_lr: config.learning_rate,
            min_lr: config.min_lr,
            factor: config.lr_decay_factor,
            patience: config.lr_decay_patience,
            step_size: config.lr_step_size,
            max_epochs: config.max_epochs,
        },
    );

    let experiment = ExperimentDir::allocate(
        &config.experiment_root,
        &config.experiment_name,
        RunMetadata {
            name: String::new(),
            model_id: model.model_id().to_string(),
            created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            config: config.clone(),
            spec: model.spec().clone(),
            num_parameters: model.num_parameters(),
            train_samples: train_set.len(),
            valid_samples: valid_set.len(),
        },
    )?;
    let run_dir = experiment.path.clone();
    let ckpt_dir = checkpoint::checkpoint_dir(&run_dir);

    info!(
        model = model.model_id(),
        parameters = model.num_parameters(),
        train = train_set.len(),
        valid = valid_set.len(),
        optimizer = optimizer.name(),
        scheduler = scheduler.name(),
        lr = config.learning_rate,
        batch_size = config.batch_size,
        max_epochs = config.max_epochs,
        run_dir = %run_dir.display(),
        "training started"
    );

    if let Err(e) = hooks.sink.open_run(&run_dir) {
        warn!(error = %e, "metrics sink could not open run");
    }

    let worker = PersistenceWorker::start();
    let mut progress = RunProgress::default();
    let t_run = Instant::now();

    let outcome = run_epochs(
        model,
        train_set,
        valid_set,
        config,
        &mut hooks,
        optimizer.as_mut(),
        scheduler.as_mut(),
        &experiment,
        &worker,
        &mut progress,
    );
    if let Err(e) = outcome {
        error!(error = %e, epochs = progress.history.len(), "training aborted");
        let snapshot = experiment.snapshot(RunStatus::Failed, progress.best, progress.history);
        let dir = run_dir.clone();
        worker.enqueue("failed run snapshot", move || snapshot.save(&dir));
        worker.shutdown();
        if let Err(flush) = hooks.sink.flush() {
            warn!(error = %flush, "metrics sink flush failed");
        }
        return Err(e);
    }
    let RunProgress { history, best, stopped_at_epoch, interrupted } = progress;

    let training_time = t_run.elapsed();
    let stopped_early = stopped_at_epoch.is_some();
    let status = if stopped_early {
        RunStatus::StoppedEarly
    } else if interrupted {
        RunStatus::Interrupted
    } else {
        RunStatus::Completed
    };
    if interrupted {
        info!(epochs = history.len(), "training interrupted by stop request");
    }

    // ── Finalize: last snapshot, export, drain ─────────────────────────────
    let snapshot = experiment.snapshot(status, best, history.clone());
    let dir = run_dir.clone();
    worker.enqueue("final run snapshot", move || snapshot.save(&dir));

    let metadata = ExportMetadata {
        model: ModelInfo {
            model_id: model.model_id().to_string(),
            num_parameters: model.num_parameters(),
            spec: model.spec().clone(),
        },
        training: TrainingInfo {
            config: config.clone(),
            optimizer: optimizer.name().to_string(),
            scheduler: scheduler.name().to_string(),
            epochs_run: history.len(),
            stopped_early,
            interrupted,
            best_val_accuracy: best.map_or(0.0, |b| b.val_accuracy),
            best_epoch: best.map(|b| b.epoch),
            best_val_loss: best.map(|b| b.val_loss),
            training_time_secs: training_time.as_secs_f64(),
        },
        dataset: DatasetInfo {
            charset: train_set.charset().cloned(),
            num_classes: train_set.num_classes(),
            sequence_length: train_set.sequence_length(),
            image: train_set.image_shape(),
            train_samples: train_set.len(),
            valid_samples: valid_set.len(),
        },
        environment: EnvironmentInfo::current(),
        run_dir: run_dir.clone(),
    };
    let last = history.last();
    let fallback = ExportedModel {
        model_id: model.model_id().to_string(),
        epoch: history.len(),
        accuracy: last.map_or(0.0, |r| r.val_accuracy),
        val_loss: last.map(|r| r.val_loss),
        state: model.state(),
    };
    let (export_tx, export_rx) = mpsc::channel();
    let export_root = config.export_root.clone();
    let dir = ckpt_dir.clone();
    worker.enqueue("final export", move || {
        let paths = export::export_final(&export_root, &dir, fallback, metadata)?;
        let _ = export_tx.send(paths);
        Ok(())
    });

    let persistence = worker.shutdown();
    let export_path = export_rx.try_recv().ok().map(|p| p.model);

    if let Err(e) = hooks.sink.flush() {
        warn!(error = %e, "metrics sink flush failed");
    }

    let checkpoint_path = checkpoint::list_checkpoints(&ckpt_dir)?.pop();
    let report = FinalReport {
        run_dir,
        best_val_accuracy: best.map_or(0.0, |b| b.val_accuracy),
        best_epoch: best.map(|b| b.epoch),
        best_val_loss: best.map(|b| b.val_loss),
        epochs_run: history.len(),
        history,
        stopped_early,
        stopped_at_epoch,
        interrupted,
        training_time,
        checkpoint_path,
        export_path,
        persistence,
    };

    info!(
        epochs = report.epochs_run,
        best_val_acc = report.best_val_accuracy,
        best_epoch = ?report.best_epoch,
        stopped_early,
        secs = training_time.as_secs_f64(),
        failed_tasks = persistence.failed,
        "training finished"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// What the epoch loop leaves behind, kept outside it so an aborted run can
/// still record its history.
#[derive(Default)]
struct RunProgress {
    history: Vec<EpochRecord>,
    best: Option<BestState>,
    stopped_at_epoch: Option<usize>,
    interrupted: bool,
}

#[allow(clippy::too_many_arguments)]
fn run_epochs(
    model: &mut dyn Model,
    train_set: &dyn Dataset,
    valid_set: &dyn Dataset,
    config: &TrainConfig,
    hooks: &mut TrainHooks,
    optimizer: &mut dyn Optimizer,
    scheduler: &mut dyn LrScheduler,
    experiment: &ExperimentDir,
    worker: &PersistenceWorker,
    progress: &mut RunProgress,
) -> Result<()> {
    let run_dir = &experiment.path;
    let ckpt_dir = checkpoint::checkpoint_dir(run_dir);
    let loss_fn = SoftmaxCrossEntropy::new(config.label_smoothing);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut early = EarlyStopping::new(config.early_stop_patience, config.early_stop_delta);

    for epoch in 1..=config.max_epochs {
        if hooks.stop_requested() {
            progress.interrupted = true;
            break;
        }

        let t_epoch = Instant::now();
        let lr = optimizer.learning_rate();

        // ── Train / validate ───────────────────────────────────────────────
        let train = train_epoch(model, train_set, optimizer, &loss_fn, config.batch_size, &mut rng, epoch)?;
        let want_figures = config.figure_interval > 0 && epoch % config.figure_interval == 0;
        let samples = if want_figures { config.sample_predictions } else { 0 };
        let valid = evaluate(model, valid_set, &loss_fn, config.batch_size, epoch, want_figures, samples)?;

        let record = EpochRecord {
            epoch,
            train_loss: train.loss,
            train_accuracy: train.accuracy,
            val_loss: valid.summary.loss,
            val_accuracy: valid.summary.accuracy,
            val_position_accuracy: valid.summary.position_accuracy.clone(),
            learning_rate: lr,
            elapsed_ms: t_epoch.elapsed().as_millis() as u64,
        };

        info!(
            epoch,
            max_epochs = config.max_epochs,
            train_loss = record.train_loss,
            train_acc = record.train_accuracy,
            val_loss = record.val_loss,
            val_acc = record.val_accuracy,
            lr = record.learning_rate,
            elapsed_ms = record.elapsed_ms,
            "epoch finished"
        );

        log_scalars(hooks.sink.as_mut(), &record);
        if want_figures {
            log_figures(hooks.sink.as_mut(), &valid, valid_set, epoch);
        }
        hooks.send_progress(&record);
        progress.history.push(record);

        // ── Scheduler, early stop ──────────────────────────────────────────
        let next_lr = scheduler.step(epoch, valid.summary.accuracy, lr);
        optimizer.set_learning_rate(next_lr);

        let stop = config.early_stopping && early.update(valid.summary.loss) == StopState::Stopped;

        // ── Checkpoint on strict improvement ───────────────────────────────
        if progress.best.map_or(true, |b| valid.summary.accuracy > b.val_accuracy) {
            let new_best = BestState { val_accuracy: valid.summary.accuracy, val_loss: valid.summary.loss, epoch };
            progress.best = Some(new_best);

            let ckpt = Checkpoint {
                model_id: model.model_id().to_string(),
                epoch,
                accuracy: new_best.val_accuracy,
                val_loss: new_best.val_loss,
                saved_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                state: model.state(),
            };
            let dir = ckpt_dir.clone();
            worker.enqueue(format!("checkpoint epoch {}", epoch), move || {
                checkpoint::save_replacing(&dir, &ckpt).map(|_| ())
            });

            let snapshot = experiment.snapshot(RunStatus::Running, progress.best, progress.history.clone());
            let dir = run_dir.clone();
            worker.enqueue(format!("run snapshot epoch {}", epoch), move || snapshot.save(&dir));
        }

        if stop {
            info!(epoch, patience = config.early_stop_patience, "early stopping: validation loss stopped improving");
            progress.stopped_at_epoch = Some(epoch);
            break;
        }
        if hooks.stop_requested() {
            progress.interrupted = true;
            break;
        }
    }
    Ok(())
}

fn check_compatible(model: &dyn Model, dataset: &dyn Dataset, mode: &str) -> Result<()> {
    if dataset.is_empty() {
        return Err(TrainError::EmptyDataset(mode.to_string()));
    }
    let spec = model.spec();
    if spec.input_size != dataset.input_size()
        || spec.sequence_length != dataset.sequence_length()
        || spec.num_classes != dataset.num_classes()
    {
        return Err(TrainError::ModelShape(format!(
            "model expects {} pixels, {} positions, {} classes; {} dataset has {}, {}, {}",
            spec.input_size,
            spec.sequence_length,
            spec.num_classes,
            mode,
            dataset.input_size(),
            dataset.sequence_length(),
            dataset.num_classes()
        )));
    }
    Ok(())
}

/// Rejects a forward pass that does not produce one `[batch, classes]` logit
/// matrix per position.
fn check_logits(logits: &[Matrix], batch: &Batch, dataset: &dyn Dataset) -> Result<()> {
    let (length, classes) = (dataset.sequence_length(), dataset.num_classes());
    if logits.len() != length {
        return Err(TrainError::ModelShape(format!("model returned {} heads, expected {}", logits.len(), length)));
    }
    for (pos, l) in logits.iter().enumerate() {
        if l.rows != batch.len() || l.cols != classes {
            return Err(TrainError::ModelShape(format!(
                "head {} returned {}x{} logits, expected {}x{}",
                pos,
                l.rows,
                l.cols,
                batch.len(),
                classes
            )));
        }
    }
    Ok(())
}

/// Sums the per-position losses of a forward pass.
fn position_losses(
    loss_fn: &SoftmaxCrossEntropy,
    logits: &[Matrix],
    batch: &Batch,
    dataset: &dyn Dataset,
) -> Result<(f64, Vec<Matrix>)> {
    check_logits(logits, batch, dataset)?;
    let mut total = 0.0;
    let mut grads = Vec::with_capacity(logits.len());
    for (pos, l) in logits.iter().enumerate() {
        let (loss, grad) = loss_fn.forward(l, &batch.position_targets(pos));
        total += loss;
        grads.push(grad);
    }
    Ok((total, grads))
}

fn train_epoch(
    model: &mut dyn Model,
    dataset: &dyn Dataset,
    optimizer: &mut dyn Optimizer,
    loss_fn: &SoftmaxCrossEntropy,
    batch_size: usize,
    rng: &mut StdRng,
    epoch: usize,
) -> Result<PassSummary> {
    let mut acc = MetricsAccumulator::new(dataset.sequence_length());
    let iter = batches(dataset, batch_size, Some(rng));
    let total_batches = iter.num_batches();

    for (i, batch) in iter.enumerate() {
        let batch = batch?;
        let logits = model.forward(&batch.images, true);
        let (loss, grads) = position_losses(loss_fn, &logits, &batch, dataset)?;
        if !loss.is_finite() {
            return Err(TrainError::NonFiniteLoss { epoch, batch: i + 1, phase: "train", loss });
        }

        model.zero_grad();
        model.backward(&grads);
        let mut params = model.params_mut();
        let grad_norm = clip_grad_norm(&mut params, GRAD_CLIP_NORM);
        optimizer.step(&mut params);

        acc.add_batch(loss, &predictions(&logits), &batch.labels);
        debug!(epoch, batch = i + 1, of = total_batches, loss, grad_norm, "train batch");
    }
    Ok(acc.summary())
}

struct Evaluation {
    summary: PassSummary,
    /// One per position; collected only on figure epochs.
    confusion: Vec<ConfusionMatrix>,
    /// `(truth, prediction)` for the first `max_samples` samples of the pass.
    samples: Vec<(Vec<usize>, Vec<usize>)>,
}

fn evaluate(
    model: &mut dyn Model,
    dataset: &dyn Dataset,
    loss_fn: &SoftmaxCrossEntropy,
    batch_size: usize,
    epoch: usize,
    detailed: bool,
    max_samples: usize,
) -> Result<Evaluation> {
    let length = dataset.sequence_length();
    let mut acc = MetricsAccumulator::new(length);
    let mut confusion = if detailed {
        vec![ConfusionMatrix::new(dataset.num_classes()); length]
    } else {
        Vec::new()
    };
    let mut samples = Vec::new();

    for (i, batch) in batches::<StdRng>(dataset, batch_size, None).enumerate() {
        let batch = batch?;
        let logits = model.forward(&batch.images, false);
        let (loss, _) = position_losses(loss_fn, &logits, &batch, dataset)?;
        if !loss.is_finite() {
            return Err(TrainError::NonFiniteLoss { epoch, batch: i + 1, phase: "valid", loss });
        }

        let preds = predictions(&logits);
        if detailed {
            for (pred, truth) in preds.iter().zip(&batch.labels) {
                for (pos, cm) in confusion.iter_mut().enumerate() {
                    cm.record(truth[pos], pred[pos]);
                }
                if samples.len() < max_samples {
                    samples.push((truth.clone(), pred.clone()));
                }
            }
        }
        acc.add_batch(loss, &preds, &batch.labels);
    }
    Ok(Evaluation { summary: acc.summary(), confusion, samples })
}

fn emit(sink: &mut dyn MetricsSink, name: String, value: f64, epoch: usize) {
    if let Err(e) = sink.scalar(&ScalarEvent::new(name, value, epoch)) {
        warn!(error = %e, "metrics sink rejected scalar");
    }
}

fn log_scalars(sink: &mut dyn MetricsSink, record: &EpochRecord) {
    let epoch = record.epoch;
    emit(sink, "train/loss".into(), record.train_loss, epoch);
    emit(sink, "train/accuracy".into(), record.train_accuracy, epoch);
    emit(sink, "valid/loss".into(), record.val_loss, epoch);
    emit(sink, "valid/accuracy".into(), record.val_accuracy, epoch);
    for (pos, &value) in record.val_position_accuracy.iter().enumerate() {
        emit(sink, format!("valid/position_{}_accuracy", pos), value, epoch);
    }
    emit(sink, "learning_rate".into(), record.learning_rate, epoch);
}

fn log_figures(sink: &mut dyn MetricsSink, eval: &Evaluation, dataset: &dyn Dataset, epoch: usize) {
    for (pos, cm) in eval.confusion.iter().enumerate() {
        if let Err(e) = sink.figure(&format!("valid/confusion_pos{}", pos), epoch, &confusion_image(cm, 8)) {
            warn!(error = %e, "metrics sink rejected figure");
        }
    }

    if eval.samples.is_empty() {
        return;
    }
    let render = |classes: &[usize]| match dataset.charset() {
        Some(cs) => cs.decode(classes),
        None => classes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(","),
    };
    let lines: Vec<String> = eval
        .samples
        .iter()
        .map(|(truth, pred)| {
            let mark = if truth == pred { "ok" } else { "miss" };
            format!("{} -> {} [{}]", render(truth), render(pred), mark)
        })
        .collect();
    if let Err(e) = sink.text("valid/sample_predictions", epoch, &lines.join("\n")) {
        warn!(error = %e, "metrics sink rejected sample predictions");
    }
}
