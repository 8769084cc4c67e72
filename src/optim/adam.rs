use crate::{layers::Param, math::Matrix, optim::Optimizer};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

/// Adam, in either coupled (L2 added to the gradient) or decoupled
/// (AdamW, decay applied directly to the weights) form.
pub struct Adam {
    pub learning_rate: f64,
    pub weight_decay: f64,
    decoupled: bool,
    step_count: u64,
    m: Vec<Matrix>,
    v: Vec<Matrix>,
}

impl Adam {
    pub fn new(learning_rate: f64, weight_decay: f64) -> Adam {
        Adam {
            learning_rate,
            weight_decay,
            decoupled: false,
            step_count: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// AdamW.
    pub fn decoupled(learning_rate: f64, weight_decay: f64) -> Adam {
        Adam { decoupled: true, ..Adam::new(learning_rate, weight_decay) }
    }

    fn ensure_state(&mut self, params: &[&mut Param]) {
        if self.m.len() == params.len() {
            return;
        }
        self.m = params.iter().map(|p| Matrix::zeros(p.value.rows, p.value.cols)).collect();
        self.v = self.m.clone();
        self.step_count = 0;
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Param]) {
        self.ensure_state(params);
        self.step_count += 1;

        let t = self.step_count as i32;
        let bias1 = 1.0 - BETA1.powi(t);
        let bias2 = 1.0 - BETA2.powi(t);
        let lr = self.learning_rate;
        let wd = self.weight_decay;
        let decoupled = self.decoupled;

        for ((p, m), v) in params.iter_mut().zip(self.m.iter_mut()).zip(self.v.iter_mut()) {
            let Param { value, grad, .. } = &mut **p;
            for (((w, &g), m), v) in value
                .data
                .iter_mut()
                .zip(&grad.data)
                .zip(m.data.iter_mut())
                .zip(v.data.iter_mut())
            {
                let g = if decoupled { g } else { g + wd * *w };
                *m = BETA1 * *m + (1.0 - BETA1) * g;
                *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                if decoupled {
                    *w -= lr * wd * *w;
                }
                *w -= lr * m_hat / (v_hat.sqrt() + EPSILON);
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
        if self.decoupled { "AdamW" } else { "Adam" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_has_magnitude_lr() {
        // Bias correction makes the first update exactly lr·sign(g).
        let mut p = Param::new("w", Matrix::from_rows(&[vec![0.0, 0.0]]));
        p.grad = Matrix::from_rows(&[vec![3.0, -0.01]]);
        let mut adam = Adam::new(0.01, 0.0);
        adam.step(&mut [&mut p]);
        assert!((p.value.get(0, 0) + 0.01).abs() < 1e-6);
        assert!((p.value.get(0, 1) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn decoupled_decay_shrinks_weights_without_gradient() {
        let mut p = Param::new("w", Matrix::from_rows(&[vec![1.0]]));
        let mut adamw = Adam::decoupled(0.1, 0.5);
        adamw.step(&mut [&mut p]);
        assert!((p.value.get(0, 0) - 0.95).abs() < 1e-9);
        assert_eq!(adamw.name(), "AdamW");
    }
}
