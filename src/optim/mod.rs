pub mod adam;
pub mod scheduler;
pub mod sgd;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::layers::Param;

pub use adam::Adam;
pub use scheduler::{build_scheduler, LrScheduler, SchedulerKind};
pub use sgd::Sgd;

/// Updates parameters from their accumulated gradients.
///
/// Optimizer state (momentum, moment estimates) is keyed by the position of a
/// parameter in the slice, so callers must pass parameters in a stable order.
pub trait Optimizer: Send {
    fn step(&mut self, params: &mut [&mut Param]);
    fn learning_rate(&self) -> f64;
    fn set_learning_rate(&mut self, lr: f64);
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptimizerKind::Adam => "adam",
            OptimizerKind::AdamW => "adamw",
            OptimizerKind::Sgd => "sgd",
        };
        f.write_str(s)
    }
}

impl FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "adamw" => Ok(OptimizerKind::AdamW),
            "sgd" => Ok(OptimizerKind::Sgd),
            other => Err(format!("unknown optimizer '{}' (expected adam, adamw or sgd)", other)),
        }
    }
}

pub fn build_optimizer(kind: OptimizerKind, learning_rate: f64, weight_decay: f64) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Adam => Box::new(Adam::new(learning_rate, weight_decay)),
        OptimizerKind::AdamW => Box::new(Adam::decoupled(learning_rate, weight_decay)),
        OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate, weight_decay)),
    }
}

/// Rescales all gradients so their global L2 norm is at most `max_norm`.
/// Returns the norm measured before clipping.
pub fn clip_grad_norm(params: &mut [&mut Param], max_norm: f64) -> f64 {
    let total = params.iter().map(|p| p.grad.squared_norm()).sum::<f64>().sqrt();
    if total > max_norm {
        let factor = max_norm / (total + 1e-6);
        for p in params.iter_mut() {
            p.grad.scale(factor);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Matrix;

    #[test]
    fn clipping_caps_global_norm() {
        let mut a = Param::new("a", Matrix::zeros(1, 2));
        let mut b = Param::new("b", Matrix::zeros(1, 1));
        a.grad = Matrix::from_rows(&[vec![3.0, 0.0]]);
        b.grad = Matrix::from_rows(&[vec![4.0]]);

        let norm = clip_grad_norm(&mut [&mut a, &mut b], 2.0);
        assert!((norm - 5.0).abs() < 1e-12);

        let after = (a.grad.squared_norm() + b.grad.squared_norm()).sqrt();
        assert!((after - 2.0).abs() < 1e-5);
    }

    #[test]
    fn small_gradients_are_left_alone() {
        let mut a = Param::new("a", Matrix::zeros(1, 1));
        a.grad = Matrix::from_rows(&[vec![0.5]]);
        clip_grad_norm(&mut [&mut a], 2.0);
        assert_eq!(a.grad.data, vec![0.5]);
    }

    #[test]
    fn kinds_round_trip_through_strings() {
        for kind in [OptimizerKind::Adam, OptimizerKind::AdamW, OptimizerKind::Sgd] {
            assert_eq!(kind.to_string().parse::<OptimizerKind>(), Ok(kind));
        }
    }
}
