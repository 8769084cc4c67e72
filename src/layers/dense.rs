use rand::Rng;

use crate::{activation::ActivationFunction, layers::param::Param, math::Matrix};

/// Fully connected layer: `a = σ(x·W + b)` over a batch of row vectors.
///
/// Weights are stored `[input_size, size]` so a `[batch, input_size]` input
/// multiplies on the left.
#[derive(Debug, Clone)]
pub struct Dense {
    pub size: usize,
    pub input_size: usize,
    pub weights: Param,
    pub biases: Param,
    pub activator: ActivationFunction,
    // Cached by `forward` in training mode for the backward pass.
    input: Matrix,
    pre_activation: Matrix,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        input_size: usize,
        size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Dense {
        let weights = if activation.prefers_he_init() {
            Matrix::he(input_size, size, rng)
        } else {
            Matrix::xavier(input_size, size, rng)
        };

        Dense {
            size,
            input_size,
            weights: Param::new(format!("{}.weight", name), weights),
            biases: Param::new(format!("{}.bias", name), Matrix::zeros(1, size)),
            activator: activation,
            input: Matrix::default(),
            pre_activation: Matrix::default(),
        }
    }

    /// Forward pass for a `[batch, input_size]` matrix. With `train` set the
    /// input and pre-activation are kept for `backward`.
    pub fn forward(&mut self, input: &Matrix, train: bool) -> Matrix {
        let z = (input * &self.weights.value).add_row(&self.biases.value);
        let a = self.activator.apply(&z);
        if train {
            self.input = input.clone();
            self.pre_activation = z;
        }
        a
    }

    /// Accumulates `∂L/∂W`, `∂L/∂b` from `upstream = ∂L/∂a` and returns
    /// `∂L/∂x` for the previous layer.
    pub fn backward(&mut self, upstream: &Matrix) -> Matrix {
        assert_eq!(
            upstream.rows, self.input.rows,
            "backward called without a matching training forward pass"
        );
        let delta = self.activator.backprop(&self.pre_activation, upstream);

        self.weights.grad += &(&self.input.transpose() * &delta);
        self.biases.grad += &delta.sum_rows();

        &delta * &self.weights.value.transpose()
    }

    pub fn params_mut(&mut self) -> [&mut Param; 2] {
        [&mut self.weights, &mut self.biases]
    }

    pub fn params(&self) -> [&Param; 2] {
        [&self.weights, &self.biases]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn weight_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut layer = Dense::new("t", 3, 2, ActivationFunction::Tanh, &mut rng);
        let x = Matrix::from_rows(&[vec![0.2, -0.4, 0.9], vec![1.0, 0.3, -0.7]]);

        // L = sum(a), so ∂L/∂a is all ones.
        let out = layer.forward(&x, true);
        let ones = out.map(|_| 1.0);
        layer.backward(&ones);
        let analytic = layer.weights.grad.get(1, 0);

        let h = 1e-6;
        let base = layer.weights.value.get(1, 0);
        layer.weights.value.set(1, 0, base + h);
        let plus: f64 = layer.forward(&x, false).data.iter().sum();
        layer.weights.value.set(1, 0, base - h);
        let minus: f64 = layer.forward(&x, false).data.iter().sum();
        let numeric = (plus - minus) / (2.0 * h);

        assert!((numeric - analytic).abs() < 1e-6);
    }

    #[test]
    fn biases_start_at_zero() {
        let layer = Dense::new("h", 4, 3, ActivationFunction::ReLU, &mut StdRng::seed_from_u64(1));
        assert!(layer.biases.value.data.iter().all(|&b| b == 0.0));
        assert_eq!((layer.weights.value.rows, layer.weights.value.cols), (4, 3));
    }
}
