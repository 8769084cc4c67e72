use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Learning-rate policy stepped once per epoch, after validation.
pub trait LrScheduler: Send {
    /// `epoch` is the 1-based epoch that just finished; returns the rate to
    /// use for the next epoch.
    fn step(&mut self, epoch: usize, val_accuracy: f64, current_lr: f64) -> f64;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    Plateau,
    Cosine,
    Step,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerKind::Plateau => "plateau",
            SchedulerKind::Cosine => "cosine",
            SchedulerKind::Step => "step",
        };
        f.write_str(s)
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plateau" => Ok(SchedulerKind::Plateau),
            "cosine" => Ok(SchedulerKind::Cosine),
            "step" => Ok(SchedulerKind::Step),
            other => Err(format!("unknown scheduler '{}' (expected plateau, cosine or step)", other)),
        }
    }
}

/// Knobs shared by the scheduler implementations.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub base_lr: f64,
    pub min_lr: f64,
    pub factor: f64,
    pub patience: usize,
    pub step_size: usize,
    pub max_epochs: usize,
}

pub fn build_scheduler(kind: SchedulerKind, settings: SchedulerSettings) -> Box<dyn LrScheduler> {
    match kind {
        SchedulerKind::Plateau => Box::new(ReduceOnPlateau::new(
            settings.factor,
            settings.patience,
            settings.min_lr,
        )),
        SchedulerKind::Cosine => Box::new(CosineAnnealing::new(
            settings.base_lr,
            settings.min_lr,
            settings.max_epochs,
        )),
        SchedulerKind::Step => Box::new(StepDecay::new(
            settings.base_lr,
            settings.factor,
            settings.step_size,
        )),
    }
}

// ---------------------------------------------------------------------------
// ReduceOnPlateau
// ---------------------------------------------------------------------------

/// Multiplies the rate by `factor` once validation accuracy has failed to
/// improve (relative threshold 1e-4) for more than `patience` epochs.
pub struct ReduceOnPlateau {
    pub factor: f64,
    pub patience: usize,
    pub min_lr: f64,
    threshold: f64,
    best: f64,
    bad_epochs: usize,
}

impl ReduceOnPlateau {
    pub fn new(factor: f64, patience: usize, min_lr: f64) -> Self {
        ReduceOnPlateau {
            factor,
            patience,
            min_lr,
            threshold: 1e-4,
            best: f64::NEG_INFINITY,
            bad_epochs: 0,
        }
    }
}

impl LrScheduler for ReduceOnPlateau {
    fn step(&mut self, _epoch: usize, val_accuracy: f64, current_lr: f64) -> f64 {
        if val_accuracy > self.best * (1.0 + self.threshold) {
            self.best = val_accuracy;
            self.bad_epochs = 0;
            return current_lr;
        }

        self.bad_epochs += 1;
        if self.bad_epochs > self.patience {
            self.bad_epochs = 0;
            let reduced = (current_lr * self.factor).max(self.min_lr);
            if reduced < current_lr {
                tracing::info!(from = current_lr, to = reduced, "plateau: reducing learning rate");
            }
            return reduced;
        }
        current_lr
    }

    fn name(&self) -> &'static str {
        "ReduceLROnPlateau"
    }
}

// ---------------------------------------------------------------------------
// CosineAnnealing
// ---------------------------------------------------------------------------

pub struct CosineAnnealing {
    pub base_lr: f64,
    pub min_lr: f64,
    pub t_max: usize,
}

impl CosineAnnealing {
    pub fn new(base_lr: f64, min_lr: f64, t_max: usize) -> Self {
        CosineAnnealing { base_lr, min_lr, t_max: t_max.max(1) }
    }
}

impl LrScheduler for CosineAnnealing {
    fn step(&mut self, epoch: usize, _val_accuracy: f64, _current_lr: f64) -> f64 {
        let progress = epoch.min(self.t_max) as f64 / self.t_max as f64;
        self.min_lr + (self.base_lr - self.min_lr) * (1.0 + (PI * progress).cos()) / 2.0
    }

    fn name(&self) -> &'static str {
        "CosineAnnealingLR"
    }
}

// ---------------------------------------------------------------------------
// StepDecay
// ---------------------------------------------------------------------------

pub struct StepDecay {
    pub base_lr: f64,
    pub gamma: f64,
    pub step_size: usize,
}

impl StepDecay {
    pub fn new(base_lr: f64, gamma: f64, step_size: usize) -> Self {
        StepDecay { base_lr, gamma, step_size: step_size.max(1) }
    }
}

impl LrScheduler for StepDecay {
    fn step(&mut self, epoch: usize, _val_accuracy: f64, _current_lr: f64) -> f64 {
        self.base_lr * self.gamma.powi((epoch / self.step_size) as i32)
    }

    fn name(&self) -> &'static str {
        "StepLR"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plateau_reduces_after_patience_is_exceeded() {
        let mut s = ReduceOnPlateau::new(0.5, 2, 1e-4);
        let mut lr = 0.1;
        lr = s.step(1, 0.50, lr);
        lr = s.step(2, 0.60, lr);
        assert_eq!(lr, 0.1);
        lr = s.step(3, 0.60, lr);
        lr = s.step(4, 0.59, lr);
        assert_eq!(lr, 0.1);
        lr = s.step(5, 0.60, lr);
        assert!((lr - 0.05).abs() < 1e-12);
    }

    #[test]
    fn plateau_respects_floor() {
        let mut s = ReduceOnPlateau::new(0.1, 0, 1e-3);
        let mut lr = 2e-3;
        lr = s.step(1, 0.5, lr);
        lr = s.step(2, 0.5, lr);
        assert_eq!(lr, 1e-3);
    }

    #[test]
    fn cosine_reaches_floor_at_t_max() {
        let mut s = CosineAnnealing::new(1e-2, 1e-4, 10);
        assert!((s.step(5, 0.0, 0.0) - (1e-4 + (1e-2 - 1e-4) / 2.0)).abs() < 1e-12);
        assert!((s.step(10, 0.0, 0.0) - 1e-4).abs() < 1e-12);
        assert!((s.step(12, 0.0, 0.0) - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn step_decay_drops_every_step_size_epochs() {
        let mut s = StepDecay::new(1.0, 0.5, 3);
        assert_eq!(s.step(2, 0.0, 0.0), 1.0);
        assert_eq!(s.step(3, 0.0, 0.0), 0.5);
        assert_eq!(s.step(6, 0.0, 0.0), 0.25);
    }
}
