use crate::{layers::Param, math::Matrix, optim::Optimizer};

const MOMENTUM: f64 = 0.9;

/// SGD with heavy-ball momentum and L2 weight decay.
pub struct Sgd {
    pub learning_rate: f64,
    pub weight_decay: f64,
    velocity: Vec<Matrix>,
}

impl Sgd {
    pub fn new(learning_rate: f64, weight_decay: f64) -> Sgd {
        Sgd { learning_rate, weight_decay, velocity: Vec::new() }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Param]) {
        if self.velocity.len() != params.len() {
            self.velocity = params
                .iter()
                .map(|p| Matrix::zeros(p.value.rows, p.value.cols))
                .collect();
        }

        for (p, v) in params.iter_mut().zip(self.velocity.iter_mut()) {
            for ((w, g), vel) in p.value.data.iter_mut().zip(&p.grad.data).zip(v.data.iter_mut()) {
                let grad = g + self.weight_decay * *w;
                *vel = MOMENTUM * *vel + grad;
                *w -= self.learning_rate * *vel;
            }
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn name(&self) -> &'static str {
        "SGD"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_against_gradient() {
        let mut p = Param::new("w", Matrix::from_rows(&[vec![1.0, -1.0]]));
        p.grad = Matrix::from_rows(&[vec![0.5, -0.5]]);
        let mut sgd = Sgd::new(0.1, 0.0);
        sgd.step(&mut [&mut p]);
        assert!((p.value.get(0, 0) - 0.95).abs() < 1e-12);
        assert!((p.value.get(0, 1) + 0.95).abs() < 1e-12);
    }

    #[test]
    fn momentum_accumulates() {
        let mut p = Param::new("w", Matrix::zeros(1, 1));
        let mut sgd = Sgd::new(1.0, 0.0);
        p.grad = Matrix::from_rows(&[vec![1.0]]);
        sgd.step(&mut [&mut p]);
        sgd.step(&mut [&mut p]);
        // -1 then -(0.9 + 1)
        assert!((p.value.get(0, 0) + 2.9).abs() < 1e-12);
    }
}
