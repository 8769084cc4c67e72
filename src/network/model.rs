use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};
use crate::layers::Param;
use crate::math::Matrix;
use crate::network::spec::ModelSpec;

/// The contract the training engine needs from a model.
///
/// `forward` returns one `[batch, num_classes]` logit matrix per character
/// position. After a training-mode forward, `backward` receives the matching
/// logit gradients and accumulates parameter gradients; the optimizer then
/// reads them through `params_mut`.
pub trait Model: Send {
    /// Registry key used to rebuild this model from a checkpoint.
    fn model_id(&self) -> &str;

    fn spec(&self) -> &ModelSpec;

    fn forward(&mut self, images: &Matrix, train: bool) -> Vec<Matrix>;

    fn backward(&mut self, logit_grads: &[Matrix]);

    /// Trainable parameters in a stable order.
    fn params_mut(&mut self) -> Vec<&mut Param>;

    fn params(&self) -> Vec<&Param>;

    fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }

    fn num_parameters(&self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }

    /// Owned snapshot of every parameter, safe to hand to another thread.
    fn state(&self) -> ModelState {
        ModelState {
            model_id: self.model_id().to_string(),
            spec: self.spec().clone(),
            tensors: self
                .params()
                .into_iter()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect(),
        }
    }

    fn load_state(&mut self, state: &ModelState) -> Result<()> {
        if state.model_id != self.model_id() {
            return Err(TrainError::ModelShape(format!(
                "state belongs to '{}', model is '{}'",
                state.model_id,
                self.model_id()
            )));
        }
        for p in self.params_mut() {
            let tensor = state
                .tensors
                .get(&p.name)
                .ok_or_else(|| TrainError::ModelShape(format!("missing tensor '{}'", p.name)))?;
            if tensor.rows != p.value.rows || tensor.cols != p.value.cols {
                return Err(TrainError::ModelShape(format!(
                    "tensor '{}' is {}x{}, expected {}x{}",
                    p.name, tensor.rows, tensor.cols, p.value.rows, p.value.cols
                )));
            }
            p.value = tensor.clone();
        }
        Ok(())
    }
}

/// Serialized parameters of a model plus what is needed to rebuild it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub model_id: String,
    pub spec: ModelSpec,
    pub tensors: BTreeMap<String, Matrix>,
}
