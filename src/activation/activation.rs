use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use std::str::FromStr;

use crate::math::Matrix;

/// Element-wise non-linearity applied after a dense layer's affine transform.
///
/// Classification heads use `Identity`: the softmax lives inside the loss so
/// that heads emit raw logits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Identity,
    ReLU,
    LeakyReLU { alpha: f64 },
    Sigmoid,
    Tanh,
    Gelu,
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Identity => x,
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Gelu => {
                let c = (2.0_f64 / PI).sqrt();
                0.5 * x * (1.0 + (c * (x + 0.044715 * x.powi(3))).tanh())
            }
        }
    }

    /// Derivative with respect to the pre-activation `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Identity => 1.0,
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::Gelu => {
                let c = (2.0_f64 / PI).sqrt();
                let inner = c * (x + 0.044715 * x.powi(3));
                let tanh_inner = inner.tanh();
                let sech2 = 1.0 - tanh_inner * tanh_inner;
                let d_inner = c * (1.0 + 3.0 * 0.044715 * x.powi(2));
                0.5 * tanh_inner + 0.5 * x * sech2 * d_inner + 0.5
            }
        }
    }

    pub fn apply(&self, z: &Matrix) -> Matrix {
        if *self == ActivationFunction::Identity {
            return z.clone();
        }
        z.map(|x| self.function(x))
    }

    /// `upstream ⊙ σ'(z)`: pushes a gradient through the activation.
    pub fn backprop(&self, z: &Matrix, upstream: &Matrix) -> Matrix {
        if *self == ActivationFunction::Identity {
            return upstream.clone();
        }
        upstream.hadamard(&z.map(|x| self.derivative(x)))
    }

    /// Whether He initialization suits layers feeding this activation.
    pub fn prefers_he_init(&self) -> bool {
        matches!(
            self,
            ActivationFunction::ReLU | ActivationFunction::LeakyReLU { .. } | ActivationFunction::Gelu
        )
    }
}

impl FromStr for ActivationFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "identity" | "linear" => Ok(ActivationFunction::Identity),
            "relu" => Ok(ActivationFunction::ReLU),
            "leaky_relu" | "leakyrelu" => Ok(ActivationFunction::LeakyReLU { alpha: 0.01 }),
            "sigmoid" => Ok(ActivationFunction::Sigmoid),
            "tanh" => Ok(ActivationFunction::Tanh),
            "gelu" => Ok(ActivationFunction::Gelu),
            other => Err(format!("unknown activation '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivatives_match_finite_differences() {
        let fns = [
            ActivationFunction::Sigmoid,
            ActivationFunction::Tanh,
            ActivationFunction::Gelu,
            ActivationFunction::LeakyReLU { alpha: 0.1 },
        ];
        let h = 1e-6;
        for f in fns {
            for &x in &[-1.3, -0.2, 0.4, 2.1] {
                let numeric = (f.function(x + h) - f.function(x - h)) / (2.0 * h);
                assert!((numeric - f.derivative(x)).abs() < 1e-5, "{:?} at {}", f, x);
            }
        }
    }

    #[test]
    fn parses_cli_names() {
        assert_eq!("ReLU".parse::<ActivationFunction>(), Ok(ActivationFunction::ReLU));
        assert!("softmax".parse::<ActivationFunction>().is_err());
    }
}
