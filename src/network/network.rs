use rand::{rngs::StdRng, SeedableRng};

use crate::{
    activation::ActivationFunction,
    layers::{Dense, Param},
    math::Matrix,
    network::{model::Model, spec::ModelSpec},
};

/// Shared dense trunk followed by one classification head per position.
pub struct MultiHeadNetwork {
    model_id: String,
    spec: ModelSpec,
    pub trunk: Vec<Dense>,
    pub heads: Vec<Dense>,
    feature_size: usize,
}

impl MultiHeadNetwork {
    /// Builds the network described by `spec`, seeding initialization with
    /// `spec.init_seed`.
    pub fn new(model_id: impl Into<String>, spec: ModelSpec) -> MultiHeadNetwork {
        let mut rng = StdRng::seed_from_u64(spec.init_seed);

        let mut trunk = Vec::with_capacity(spec.hidden_layers.len());
        let mut width = spec.input_size;
        for (i, &size) in spec.hidden_layers.iter().enumerate() {
            trunk.push(Dense::new(&format!("trunk.{}", i), width, size, spec.activation, &mut rng));
            width = size;
        }

        let heads = (0..spec.sequence_length)
            .map(|i| {
                Dense::new(
                    &format!("head.{}", i),
                    width,
                    spec.num_classes,
                    ActivationFunction::Identity,
                    &mut rng,
                )
            })
            .collect();

        MultiHeadNetwork { model_id: model_id.into(), spec, trunk, heads, feature_size: width }
    }
}

impl Model for MultiHeadNetwork {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn forward(&mut self, images: &Matrix, train: bool) -> Vec<Matrix> {
        let mut features = images.clone();
        for layer in &mut self.trunk {
            features = layer.forward(&features, train);
        }
        self.heads.iter_mut().map(|head| head.forward(&features, train)).collect()
    }

    fn backward(&mut self, logit_grads: &[Matrix]) {
        assert_eq!(logit_grads.len(), self.heads.len(), "one gradient per head");
        let batch = logit_grads.first().map(|g| g.rows).unwrap_or(0);

        // Every head reads the same features, so their input gradients add up.
        let mut grad = Matrix::zeros(batch, self.feature_size);
        for (head, g) in self.heads.iter_mut().zip(logit_grads) {
            grad += &head.backward(g);
        }
        for layer in self.trunk.iter_mut().rev() {
            grad = layer.backward(&grad);
        }
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        self.trunk
            .iter_mut()
            .chain(self.heads.iter_mut())
            .flat_map(|layer| layer.params_mut())
            .collect()
    }

    fn params(&self) -> Vec<&Param> {
        self.trunk
            .iter()
            .chain(self.heads.iter())
            .flat_map(|layer| layer.params())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::SoftmaxCrossEntropy;
    use crate::optim::{build_optimizer, OptimizerKind};

    fn spec() -> ModelSpec {
        ModelSpec::new(6, 3, 4).with_hidden_layers(vec![5])
    }

    #[test]
    fn forward_emits_one_logit_matrix_per_position() {
        let mut net = MultiHeadNetwork::new("mlp", spec());
        let x = Matrix::zeros(2, 6);
        let out = net.forward(&x, false);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|m| m.rows == 2 && m.cols == 4));
    }

    #[test]
    fn parameter_count_includes_trunk_and_heads() {
        let net = MultiHeadNetwork::new("mlp", spec());
        // trunk 6*5+5, heads 3*(5*4+4)
        assert_eq!(net.num_parameters(), 35 + 72);
    }

    #[test]
    fn state_round_trips_into_a_fresh_network() {
        let a = MultiHeadNetwork::new("mlp", spec());
        let mut other_spec = spec();
        other_spec.init_seed = 9;
        let mut b = MultiHeadNetwork::new("mlp", other_spec);
        assert_ne!(a.state().tensors, b.state().tensors);

        b.load_state(&a.state()).unwrap();
        assert_eq!(a.state().tensors, b.state().tensors);
    }

    #[test]
    fn a_few_steps_reduce_the_summed_loss() {
        let mut net = MultiHeadNetwork::new("mlp", spec());
        let mut opt = build_optimizer(OptimizerKind::Adam, 0.05, 0.0);
        let ce = SoftmaxCrossEntropy::new(0.0);
        let x = Matrix::from_rows(&[
            vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0, 1.0, 1.0],
        ]);
        let labels = [[0usize, 1, 2], [3, 2, 1]];

        let mut losses = Vec::new();
        for _ in 0..30 {
            let logits = net.forward(&x, true);
            let mut total = 0.0;
            let mut grads = Vec::new();
            for (pos, l) in logits.iter().enumerate() {
                let targets: Vec<usize> = labels.iter().map(|s| s[pos]).collect();
                let (loss, g) = ce.forward(l, &targets);
                total += loss;
                grads.push(g);
            }
            losses.push(total);
            net.zero_grad();
            net.backward(&grads);
            opt.step(&mut net.params_mut());
        }
        assert!(losses.last().unwrap() < &(losses[0] * 0.5));
    }
}
