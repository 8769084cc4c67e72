use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use captcha_trainer::data::ImageShape;
use captcha_trainer::optim::{OptimizerKind, SchedulerKind};
use captcha_trainer::{
    train_loop, ActivationFunction, Charset, Dataset, ImageDirDataset, ImageDirOptions, JsonlSink, Mode,
    ModelRegistry, ModelSpec, Predictor, SyntheticDataset, SyntheticOptions, TrainConfig, TrainHooks,
};

/// Train and run multi-head captcha recognizers.
#[derive(Parser)]
#[command(name = "captcha-trainer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a model and export the best checkpoint.
    Train(TrainArgs),
    /// Read captcha images with an exported model.
    Predict(PredictArgs),
    /// Print the default training configuration as JSON.
    Config,
}

#[derive(Args)]
struct TrainArgs {
    /// Dataset root containing `train/` and `valid/`.
    #[arg(long, conflicts_with = "synthetic", required_unless_present = "synthetic")]
    data_dir: Option<PathBuf>,
    /// Generate N synthetic training samples (and N/4 validation samples).
    #[arg(long)]
    synthetic: Option<usize>,
    /// Registered model id.
    #[arg(long, default_value = "mlp")]
    model: String,
    /// Trunk layer widths, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "256")]
    hidden: Vec<usize>,
    #[arg(long, default_value = "relu")]
    activation: ActivationFunction,
    /// JSON file with training options; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long, alias = "learning-rate")]
    lr: Option<f64>,
    #[arg(long)]
    weight_decay: Option<f64>,
    #[arg(long)]
    optimizer: Option<OptimizerKind>,
    #[arg(long)]
    scheduler: Option<SchedulerKind>,
    #[arg(long)]
    no_early_stopping: bool,
    #[arg(long)]
    patience: Option<usize>,
    #[arg(long)]
    delta: Option<f64>,
    #[arg(long)]
    label_smoothing: Option<f64>,
    /// Plateau factor, also the step-decay gamma.
    #[arg(long)]
    lr_decay_factor: Option<f64>,
    #[arg(long)]
    lr_decay_patience: Option<usize>,
    #[arg(long)]
    min_lr: Option<f64>,
    #[arg(long)]
    lr_step_size: Option<usize>,
    #[arg(long)]
    figure_interval: Option<usize>,
    /// Sample predictions logged on figure epochs.
    #[arg(long)]
    sample_predictions: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    experiment_root: Option<PathBuf>,
    #[arg(long)]
    export_root: Option<PathBuf>,
    /// Run directory template; see `TrainConfig::experiment_name`.
    #[arg(long)]
    experiment_name: Option<String>,

    /// Cap on samples read per split.
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long, default_value_t = 100)]
    width: u32,
    #[arg(long, default_value_t = 40)]
    height: u32,
    /// Characters per captcha.
    #[arg(long, default_value_t = 4)]
    length: usize,
    #[arg(long)]
    charset: Option<String>,
}

#[derive(Args)]
struct PredictArgs {
    /// Exported `<model>.model.json`.
    #[arg(long)]
    model_file: PathBuf,
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

impl TrainArgs {
    /// File (or default) configuration with command-line overrides applied.
    fn config(&self) -> Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::load_json(path).with_context(|| format!("loading {}", path.display()))?,
            None => TrainConfig::default(),
        };
        if let Some(v) = self.epochs {
            cfg.max_epochs = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.lr {
            cfg.learning_rate = v;
        }
        if let Some(v) = self.weight_decay {
            cfg.weight_decay = v;
        }
        if let Some(v) = self.optimizer {
            cfg.optimizer = v;
        }
        if let Some(v) = self.scheduler {
            cfg.scheduler = v;
        }
        if self.no_early_stopping {
            cfg.early_stopping = false;
        }
        if let Some(v) = self.patience {
            cfg.early_stop_patience = v;
        }
        if let Some(v) = self.delta {
            cfg.early_stop_delta = v;
        }
        if let Some(v) = self.label_smoothing {
            cfg.label_smoothing = v;
        }
        if let Some(v) = self.lr_decay_factor {
            cfg.lr_decay_factor = v;
        }
        if let Some(v) = self.lr_decay_patience {
            cfg.lr_decay_patience = v;
        }
        if let Some(v) = self.min_lr {
            cfg.min_lr = v;
        }
        if let Some(v) = self.lr_step_size {
            cfg.lr_step_size = v;
        }
        if let Some(v) = self.figure_interval {
            cfg.figure_interval = v;
        }
        if let Some(v) = self.sample_predictions {
            cfg.sample_predictions = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if let Some(v) = &self.experiment_root {
            cfg.experiment_root = v.clone();
        }
        if let Some(v) = &self.export_root {
            cfg.export_root = v.clone();
        }
        if let Some(v) = &self.experiment_name {
            cfg.experiment_name = v.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn charset(&self) -> Result<Charset> {
        Ok(match &self.charset {
            Some(s) => Charset::new(s)?,
            None => Charset::default(),
        })
    }

    fn datasets(&self, seed: u64) -> Result<(Box<dyn Dataset>, Box<dyn Dataset>)> {
        let charset = self.charset()?;
        if let Some(n) = self.synthetic {
            let opts = SyntheticOptions { samples: n, sequence_length: self.length, charset, seed, ..Default::default() };
            let valid_opts = SyntheticOptions { samples: (n / 4).max(1), ..opts.clone() };
            let train: Box<dyn Dataset> = Box::new(SyntheticDataset::generate(Mode::Train, opts)?);
            let valid: Box<dyn Dataset> = Box::new(SyntheticDataset::generate(Mode::Valid, valid_opts)?);
            return Ok((train, valid));
        }
        let Some(root) = &self.data_dir else {
            bail!("either --data-dir or --synthetic is required");
        };
        let opts = ImageDirOptions {
            shape: ImageShape { width: self.width, height: self.height },
            sequence_length: self.length,
            charset,
            limit: self.limit,
        };
        let train: Box<dyn Dataset> = Box::new(ImageDirDataset::open(root, Mode::Train, opts.clone())?);
        let valid: Box<dyn Dataset> = Box::new(ImageDirDataset::open(root, Mode::Valid, opts)?);
        Ok((train, valid))
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let config = args.config()?;
    let (train_set, valid_set) = args.datasets(config.seed)?;

    let registry = ModelRegistry::builtin();
    let spec = ModelSpec {
        hidden_layers: args.hidden.clone(),
        activation: args.activation,
        ..ModelSpec::new(train_set.input_size(), train_set.sequence_length(), train_set.num_classes())
    };
    let mut model = registry
        .build(&args.model, &spec)
        .with_context(|| format!("available models: {}", registry.ids().join(", ")))?;

    let hooks = TrainHooks::new().with_sink(JsonlSink::new());
    let report = train_loop(model.as_mut(), train_set.as_ref(), valid_set.as_ref(), &config, hooks)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn predict(args: PredictArgs) -> Result<()> {
    let registry = ModelRegistry::builtin();
    let mut predictor = Predictor::load(&args.model_file, &registry)
        .with_context(|| format!("loading {}", args.model_file.display()))?;
    for path in &args.images {
        let text = predictor.predict_file(path).with_context(|| format!("reading {}", path.display()))?;
        println!("{}\t{}", path.display(), text);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("captcha_trainer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Train(args) => train(args),
        Command::Predict(args) => predict(args),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&TrainConfig::default())?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train_args(argv: &[&str]) -> TrainArgs {
        let mut full = vec!["captcha-trainer", "train", "--synthetic", "8"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Train(args) => args,
            _ => panic!("expected the train subcommand"),
        }
    }

    #[test]
    fn scheduler_flags_override_only_their_fields() {
        let cfg = train_args(&[
            "--lr-decay-factor",
            "0.2",
            "--lr-decay-patience",
            "7",
            "--min-lr",
            "1e-5",
            "--lr-step-size",
            "4",
            "--sample-predictions",
            "100",
            "--experiment-name",
            "{model}_run",
        ])
        .config()
        .unwrap();

        let expected = TrainConfig {
            lr_decay_factor: 0.2,
            lr_decay_patience: 7,
            min_lr: 1e-5,
            lr_step_size: 4,
            sample_predictions: 100,
            experiment_name: "{model}_run".to_string(),
            ..TrainConfig::default()
        };
        assert_eq!(cfg, expected);
    }

    #[test]
    fn no_flags_keep_defaults() {
        assert_eq!(train_args(&[]).config().unwrap(), TrainConfig::default());
    }
}
