use serde::{Deserialize, Serialize};

use crate::math::Matrix;

/// Arg-max class per position for every sample of a batch.
///
/// `logits[pos]` is `[batch, classes]`; the result is indexed
/// `[sample][pos]`.
pub fn predictions(logits: &[Matrix]) -> Vec<Vec<usize>> {
    let batch = logits.first().map(|m| m.rows).unwrap_or(0);
    (0..batch)
        .map(|r| logits.iter().map(|m| m.argmax_row(r)).collect())
        .collect()
}

/// Accuracy of one set of predicted sequences against the truth.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceAccuracy {
    /// Fraction of samples where every position matches.
    pub sequence: f64,
    /// Fraction of samples correct at each position.
    pub positions: Vec<f64>,
}

pub fn sequence_accuracy(preds: &[Vec<usize>], labels: &[Vec<usize>]) -> SequenceAccuracy {
    let mut acc = MetricsAccumulator::new(labels.first().map(Vec::len).unwrap_or(0));
    acc.add_batch(0.0, preds, labels);
    let summary = acc.summary();
    SequenceAccuracy { sequence: summary.accuracy, positions: summary.position_accuracy }
}

/// Loss, accuracy and per-position accuracy of one full pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub loss: f64,
    pub accuracy: f64,
    pub position_accuracy: Vec<f64>,
    pub samples: usize,
}

/// Sample-weighted running totals over the batches of a pass.
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    samples: usize,
    loss_sum: f64,
    exact: usize,
    position_correct: Vec<usize>,
}

impl MetricsAccumulator {
    pub fn new(sequence_length: usize) -> MetricsAccumulator {
        MetricsAccumulator { samples: 0, loss_sum: 0.0, exact: 0, position_correct: vec![0; sequence_length] }
    }

    /// `loss` is the batch mean; it is weighted by the batch size.
    pub fn add_batch(&mut self, loss: f64, preds: &[Vec<usize>], labels: &[Vec<usize>]) {
        debug_assert_eq!(preds.len(), labels.len());
        self.samples += labels.len();
        self.loss_sum += loss * labels.len() as f64;
        for (pred, truth) in preds.iter().zip(labels) {
            let mut all = true;
            for (pos, (p, t)) in pred.iter().zip(truth).enumerate() {
                if p == t {
                    self.position_correct[pos] += 1;
                } else {
                    all = false;
                }
            }
            if all {
                self.exact += 1;
            }
        }
    }

    pub fn summary(&self) -> PassSummary {
        if self.samples == 0 {
            return PassSummary {
                loss: 0.0,
                accuracy: 0.0,
                position_accuracy: vec![0.0; self.position_correct.len()],
                samples: 0,
            };
        }
        let n = self.samples as f64;
        PassSummary {
            loss: self.loss_sum / n,
            accuracy: self.exact as f64 / n,
            position_accuracy: self.position_correct.iter().map(|&c| c as f64 / n).collect(),
            samples: self.samples,
        }
    }
}

/// `counts[truth * classes + predicted]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    pub classes: usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(classes: usize) -> ConfusionMatrix {
        ConfusionMatrix { classes, counts: vec![0; classes * classes] }
    }

    pub fn record(&mut self, truth: usize, predicted: usize) {
        if truth < self.classes && predicted < self.classes {
            self.counts[truth * self.classes + predicted] += 1;
        }
    }

    pub fn count(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth * self.classes + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Each row divided by its sum; empty rows stay zero.
    pub fn row_normalized(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.counts.len()];
        for t in 0..self.classes {
            let row = &self.counts[t * self.classes..(t + 1) * self.classes];
            let sum: u64 = row.iter().sum();
            if sum == 0 {
                continue;
            }
            for (p, &c) in row.iter().enumerate() {
                out[t * self.classes + p] = c as f64 / sum as f64;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_wrong_position_fails_the_whole_sequence() {
        let acc = sequence_accuracy(&[vec![0, 1, 2, 4]], &[vec![0, 1, 2, 3]]);
        assert_eq!(acc.sequence, 0.0);
        assert_eq!(acc.positions, vec![1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn averages_are_sample_weighted() {
        let mut acc = MetricsAccumulator::new(1);
        acc.add_batch(1.0, &[vec![0], vec![0], vec![0]], &[vec![0], vec![0], vec![0]]);
        acc.add_batch(4.0, &[vec![1]], &[vec![0]]);
        let s = acc.summary();
        assert_eq!(s.samples, 4);
        assert!((s.loss - 7.0 / 4.0).abs() < 1e-12);
        assert!((s.accuracy - 0.75).abs() < 1e-12);
    }

    #[test]
    fn predictions_transpose_heads_into_sequences() {
        let logits = vec![
            Matrix::from_rows(&[vec![0.1, 0.9], vec![0.8, 0.2]]),
            Matrix::from_rows(&[vec![0.7, 0.3], vec![0.4, 0.6]]),
        ];
        assert_eq!(predictions(&logits), vec![vec![1, 0], vec![0, 1]]);
    }

    #[test]
    fn confusion_rows_normalize() {
        let mut cm = ConfusionMatrix::new(2);
        cm.record(0, 0);
        cm.record(0, 1);
        cm.record(0, 1);
        cm.record(1, 1);
        assert_eq!(cm.total(), 4);
        let norm = cm.row_normalized();
        assert!((norm[1] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(norm[3], 1.0);
    }

    #[test]
    fn empty_pass_reports_zeroes() {
        let s = MetricsAccumulator::new(3).summary();
        assert_eq!(s.accuracy, 0.0);
        assert_eq!(s.position_accuracy.len(), 3);
    }
}
