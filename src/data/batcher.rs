use rand::{seq::SliceRandom, Rng};

use crate::data::Dataset;
use crate::error::{Result, TrainError};
use crate::math::Matrix;

/// A mini-batch: images stacked as `[batch, input_size]` and the matching
/// label sequences.
#[derive(Debug, Clone)]
pub struct Batch {
    pub indices: Vec<usize>,
    pub images: Matrix,
    pub labels: Vec<Vec<usize>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Class targets of every sample at character position `pos`.
    pub fn position_targets(&self, pos: usize) -> Vec<usize> {
        self.labels.iter().map(|label| label[pos]).collect()
    }
}

/// Iterator over the batches of one pass. Yields an error (and should then be
/// abandoned) when a sample fails to load or carries an invalid label.
pub struct Batches<'a> {
    dataset: &'a dyn Dataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

/// Splits `dataset` into batches of `batch_size` (the last one may be short).
/// With `rng` the visiting order is shuffled, otherwise it is sequential.
pub fn batches<'a, R: Rng + ?Sized>(
    dataset: &'a dyn Dataset,
    batch_size: usize,
    rng: Option<&mut R>,
) -> Batches<'a> {
    let mut order: Vec<usize> = (0..dataset.len()).collect();
    if let Some(rng) = rng {
        order.shuffle(rng);
    }
    Batches { dataset, order, batch_size: batch_size.max(1), cursor: 0 }
}

impl<'a> Batches<'a> {
    pub fn num_batches(&self) -> usize {
        (self.order.len() + self.batch_size - 1) / self.batch_size
    }

    fn load(&self, indices: &[usize]) -> Result<Batch> {
        let width = self.dataset.input_size();
        let length = self.dataset.sequence_length();
        let classes = self.dataset.num_classes();

        let mut data = Vec::with_capacity(indices.len() * width);
        let mut labels = Vec::with_capacity(indices.len());
        for &index in indices {
            let sample = self.dataset.get(index)?;
            if sample.image.len() != width {
                return Err(TrainError::ModelShape(format!(
                    "sample {} has {} pixels, expected {}",
                    index,
                    sample.image.len(),
                    width
                )));
            }
            if sample.label.len() != length {
                return Err(TrainError::LabelLength { index, expected: length, found: sample.label.len() });
            }
            if let Some(&class) = sample.label.iter().find(|&&c| c >= classes) {
                return Err(TrainError::LabelOutOfRange { index, class, num_classes: classes });
            }
            data.extend_from_slice(&sample.image);
            labels.push(sample.label);
        }

        Ok(Batch {
            indices: indices.to_vec(),
            images: Matrix::from_vec(indices.len(), width, data),
            labels,
        })
    }
}

impl<'a> Iterator for Batches<'a> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let result = self.load(&self.order[self.cursor..end]);
        self.cursor = end;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sample;
    use rand::{rngs::StdRng, SeedableRng};

    struct Fixed(Vec<Sample>);

    impl Dataset for Fixed {
        fn len(&self) -> usize {
            self.0.len()
        }
        fn get(&self, index: usize) -> Result<Sample> {
            Ok(self.0[index].clone())
        }
        fn sequence_length(&self) -> usize {
            2
        }
        fn num_classes(&self) -> usize {
            3
        }
        fn input_size(&self) -> usize {
            1
        }
    }

    fn sample(v: f64, label: Vec<usize>) -> Sample {
        Sample { image: vec![v], label }
    }

    #[test]
    fn last_batch_may_be_short() {
        let ds = Fixed((0..5).map(|i| sample(i as f64, vec![0, 1])).collect());
        let it = batches::<StdRng>(&ds, 2, None);
        assert_eq!(it.num_batches(), 3);
        let sizes: Vec<usize> = it.map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn shuffling_visits_every_sample_once() {
        let ds = Fixed((0..7).map(|i| sample(i as f64, vec![0, 1])).collect());
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen: Vec<usize> = batches(&ds, 3, Some(&mut rng))
            .flat_map(|b| b.unwrap().indices)
            .collect();
        seen.sort();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn label_length_mismatch_is_reported() {
        let ds = Fixed(vec![sample(0.0, vec![0, 1]), sample(1.0, vec![0])]);
        let err = batches::<StdRng>(&ds, 4, None).next().unwrap().unwrap_err();
        assert!(matches!(err, TrainError::LabelLength { index: 1, expected: 2, found: 1 }));
    }

    #[test]
    fn class_out_of_range_is_reported() {
        let ds = Fixed(vec![sample(0.0, vec![0, 3])]);
        let err = batches::<StdRng>(&ds, 4, None).next().unwrap().unwrap_err();
        assert!(matches!(err, TrainError::LabelOutOfRange { class: 3, .. }));
    }

    #[test]
    fn position_targets_slice_columns() {
        let ds = Fixed(vec![sample(0.0, vec![0, 2]), sample(1.0, vec![1, 0])]);
        let batch = batches::<StdRng>(&ds, 2, None).next().unwrap().unwrap();
        assert_eq!(batch.position_targets(1), vec![2, 0]);
        assert_eq!(batch.images.rows, 2);
    }
}
