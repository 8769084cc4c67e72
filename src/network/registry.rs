use std::collections::BTreeMap;

use crate::error::{Result, TrainError};
use crate::network::{model::Model, model::ModelState, network::MultiHeadNetwork, spec::ModelSpec};

/// Builds a fresh, randomly initialized model from its spec.
pub type ModelConstructor = fn(&ModelSpec) -> Box<dyn Model>;

/// Explicit table from model identifier to constructor.
///
/// Checkpoints and exports only record the identifier and the `ModelSpec`; loading
/// goes through the registry, so a caller never needs to know the concrete
/// type behind a saved model.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    constructors: BTreeMap<String, ModelConstructor>,
}

impl ModelRegistry {
    pub fn new() -> ModelRegistry {
        ModelRegistry::default()
    }

    /// Registry with the models shipped by this crate: `mlp` and `linear`.
    pub fn builtin() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry.register("mlp", build_mlp);
        registry.register("linear", build_linear);
        registry
    }

    /// Adds or replaces a constructor.
    pub fn register(&mut self, id: &str, constructor: ModelConstructor) {
        self.constructors.insert(id.to_string(), constructor);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn build(&self, id: &str, spec: &ModelSpec) -> Result<Box<dyn Model>> {
        spec.validate()?;
        let constructor = self
            .constructors
            .get(id)
            .ok_or_else(|| TrainError::UnknownModel(id.to_string()))?;
        Ok(constructor(spec))
    }

    /// Rebuilds the model named in `state` and loads its parameters.
    pub fn restore(&self, state: &ModelState) -> Result<Box<dyn Model>> {
        let mut model = self.build(&state.model_id, &state.spec)?;
        model.load_state(state)?;
        Ok(model)
    }
}

fn build_mlp(spec: &ModelSpec) -> Box<dyn Model> {
    Box::new(MultiHeadNetwork::new("mlp", spec.clone()))
}

fn build_linear(spec: &ModelSpec) -> Box<dyn Model> {
    let spec = ModelSpec { hidden_layers: Vec::new(), ..spec.clone() };
    Box::new(MultiHeadNetwork::new("linear", spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_sorted() {
        assert_eq!(ModelRegistry::builtin().ids(), vec!["linear", "mlp"]);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let err = ModelRegistry::builtin()
            .build("resnet", &ModelSpec::new(4, 2, 3))
            .err()
            .unwrap();
        assert!(matches!(err, TrainError::UnknownModel(id) if id == "resnet"));
    }

    #[test]
    fn linear_ignores_hidden_layers() {
        let spec = ModelSpec::new(4, 2, 3).with_hidden_layers(vec![16]);
        let model = ModelRegistry::builtin().build("linear", &spec).unwrap();
        assert!(model.spec().hidden_layers.is_empty());
        assert_eq!(model.num_parameters(), 2 * (4 * 3 + 3));
    }

    #[test]
    fn restore_reproduces_parameters() {
        let registry = ModelRegistry::builtin();
        let spec = ModelSpec::new(4, 2, 3).with_hidden_layers(vec![5]);
        let original = registry.build("mlp", &spec).unwrap();
        let restored = registry.restore(&original.state()).unwrap();
        assert_eq!(restored.model_id(), "mlp");
        assert_eq!(restored.state(), original.state());
    }
}
