use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;
use crate::error::{Result, TrainError};

/// Architecture description of a multi-head captcha model.
///
/// A `ModelSpec` is stored inside every checkpoint and export so the registry
/// can rebuild the exact shapes before loading weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Flattened pixel count of one input image.
    pub input_size: usize,
    /// Widths of the shared trunk layers (input → features).
    #[serde(default)]
    pub hidden_layers: Vec<usize>,
    /// Activation of the trunk layers; heads always emit raw logits.
    #[serde(default = "default_activation")]
    pub activation: ActivationFunction,
    /// Number of character positions, one classification head each.
    pub sequence_length: usize,
    /// Size of the symbol set.
    pub num_classes: usize,
    /// Seed for weight initialization.
    #[serde(default = "default_init_seed")]
    pub init_seed: u64,
}

fn default_activation() -> ActivationFunction {
    ActivationFunction::ReLU
}

fn default_init_seed() -> u64 {
    42
}

impl ModelSpec {
    pub fn new(input_size: usize, sequence_length: usize, num_classes: usize) -> ModelSpec {
        ModelSpec {
            input_size,
            hidden_layers: Vec::new(),
            activation: default_activation(),
            sequence_length,
            num_classes,
            init_seed: default_init_seed(),
        }
    }

    pub fn with_hidden_layers(mut self, hidden_layers: Vec<usize>) -> ModelSpec {
        self.hidden_layers = hidden_layers;
        self
    }

    /// Width of the feature vector the heads read from.
    pub fn feature_size(&self) -> usize {
        self.hidden_layers.last().copied().unwrap_or(self.input_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 || self.sequence_length == 0 || self.num_classes < 2 {
            return Err(TrainError::ModelShape(format!(
                "input_size={}, sequence_length={}, num_classes={} (need >0, >0, >=2)",
                self.input_size, self.sequence_length, self.num_classes
            )));
        }
        if self.hidden_layers.iter().any(|&w| w == 0) {
            return Err(TrainError::ModelShape("hidden layer of width 0".into()));
        }
        Ok(())
    }

    /// Deserializes a `ModelSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<ModelSpec> {
        let file = std::fs::File::open(path).map_err(|e| TrainError::io(path, e))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| TrainError::json(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_size_follows_last_hidden_layer() {
        let spec = ModelSpec::new(100, 4, 62);
        assert_eq!(spec.feature_size(), 100);
        assert_eq!(spec.with_hidden_layers(vec![64, 32]).feature_size(), 32);
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let spec: ModelSpec =
            serde_json::from_str(r#"{"input_size": 8, "sequence_length": 2, "num_classes": 3}"#).unwrap();
        assert_eq!(spec, ModelSpec::new(8, 2, 3));
    }

    #[test]
    fn rejects_degenerate_shapes() {
        assert!(ModelSpec::new(8, 0, 3).validate().is_err());
        assert!(ModelSpec::new(8, 2, 1).validate().is_err());
        assert!(ModelSpec::new(8, 2, 3).with_hidden_layers(vec![0]).validate().is_err());
    }
}
