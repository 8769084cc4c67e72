use crate::math::Matrix;

/// Softmax cross-entropy over raw logits and integer class targets.
///
/// With label smoothing `ε` the target distribution is
/// `(1 - ε)·onehot(y) + ε / C`. The loss is the batch mean, and the returned
/// gradient is taken with respect to the logits (`(p - q) / batch`), so the
/// softmax Jacobian never has to be applied separately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftmaxCrossEntropy {
    pub label_smoothing: f64,
}

impl SoftmaxCrossEntropy {
    pub fn new(label_smoothing: f64) -> Self {
        SoftmaxCrossEntropy { label_smoothing }
    }

    /// Returns `(mean loss, ∂loss/∂logits)`.
    ///
    /// `targets[r]` must be a valid column index of `logits`; the batcher
    /// checks this before any forward pass.
    pub fn forward(&self, logits: &Matrix, targets: &[usize]) -> (f64, Matrix) {
        assert_eq!(logits.rows, targets.len(), "one target per logit row");
        let batch = logits.rows.max(1) as f64;
        let classes = logits.cols as f64;
        let off_target = self.label_smoothing / classes;
        let on_target = 1.0 - self.label_smoothing + off_target;

        let mut total = 0.0;
        let mut grad = Matrix::zeros(logits.rows, logits.cols);

        for (r, &target) in targets.iter().enumerate() {
            let row = logits.row(r);
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let sum_exp: f64 = row.iter().map(|&z| (z - max).exp()).sum();
            let log_sum = max + sum_exp.ln();

            let grad_row = grad.row_mut(r);
            for (c, &z) in row.iter().enumerate() {
                let q = if c == target { on_target } else { off_target };
                let log_p = z - log_sum;
                total -= q * log_p;
                grad_row[c] = (log_p.exp() - q) / batch;
            }
        }

        (total / batch, grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_logits_give_log_classes() {
        let ce = SoftmaxCrossEntropy::new(0.0);
        let logits = Matrix::zeros(2, 4);
        let (loss, grad) = ce.forward(&logits, &[0, 3]);
        assert!((loss - 4f64.ln()).abs() < 1e-12);
        // (0.25 - 1) / 2 on the target, 0.25 / 2 elsewhere.
        assert!((grad.get(0, 0) + 0.375).abs() < 1e-12);
        assert!((grad.get(0, 1) - 0.125).abs() < 1e-12);
    }

    #[test]
    fn smoothing_raises_loss_of_confident_prediction() {
        let logits = Matrix::from_rows(&[vec![10.0, -10.0, -10.0]]);
        let (sharp, _) = SoftmaxCrossEntropy::new(0.0).forward(&logits, &[0]);
        let (smooth, _) = SoftmaxCrossEntropy::new(0.1).forward(&logits, &[0]);
        assert!(sharp < 1e-6);
        assert!(smooth > sharp);
    }

    #[test]
    fn gradient_rows_sum_to_zero() {
        let logits = Matrix::from_rows(&[vec![0.3, -1.2, 2.0], vec![1.0, 1.0, 0.0]]);
        let (_, grad) = SoftmaxCrossEntropy::new(0.1).forward(&logits, &[2, 1]);
        for r in 0..2 {
            let s: f64 = grad.row(r).iter().sum();
            assert!(s.abs() < 1e-12);
        }
    }

    #[test]
    fn nan_logits_produce_nan_loss() {
        let logits = Matrix::from_rows(&[vec![f64::NAN, 0.0]]);
        let (loss, _) = SoftmaxCrossEntropy::new(0.0).forward(&logits, &[1]);
        assert!(!loss.is_finite());
    }
}
