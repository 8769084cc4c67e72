use std::path::Path;

use image::DynamicImage;

use crate::data::{preprocess, Charset, ImageShape};
use crate::error::{Result, TrainError};
use crate::math::Matrix;
use crate::network::{Model, ModelRegistry};
use crate::persist::export;
use crate::train::metrics::predictions;

/// Prediction-time wrapper around an exported model.
pub struct Predictor {
    model: Box<dyn Model>,
    shape: ImageShape,
    charset: Option<Charset>,
}

impl Predictor {
    /// Loads `<id>.model.json` through `registry` and reads image size and
    /// charset from the sibling `<id>.meta.json`.
    pub fn load(model_path: &Path, registry: &ModelRegistry) -> Result<Predictor> {
        let model = export::load_model(model_path, registry)?;
        let meta = export::load_metadata(model_path)?;
        let shape = meta.dataset.image.ok_or_else(|| {
            TrainError::InvalidConfig(format!("'{}' records no image size", model_path.display()))
        })?;
        Ok(Predictor::from_parts(model, shape, meta.dataset.charset))
    }

    pub fn from_parts(model: Box<dyn Model>, shape: ImageShape, charset: Option<Charset>) -> Predictor {
        Predictor { model, shape, charset }
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Class index per position for one preprocessed image.
    pub fn predict_pixels(&mut self, pixels: &[f64]) -> Result<Vec<usize>> {
        let expected = self.model.spec().input_size;
        if pixels.len() != expected {
            return Err(TrainError::ModelShape(format!(
                "image has {} pixels, model expects {}",
                pixels.len(),
                expected
            )));
        }
        let logits = self.model.forward(&Matrix::from_vec(1, expected, pixels.to_vec()), false);
        Ok(predictions(&logits).into_iter().next().unwrap_or_default())
    }

    pub fn predict_image(&mut self, img: &DynamicImage) -> Result<String> {
        let pixels = preprocess::grayscale_input(img, self.shape);
        let classes = self.predict_pixels(&pixels)?;
        Ok(self.decode(&classes))
    }

    pub fn predict_file(&mut self, path: &Path) -> Result<String> {
        let pixels = preprocess::load_grayscale(path, self.shape)?;
        let classes = self.predict_pixels(&pixels)?;
        Ok(self.decode(&classes))
    }

    fn decode(&self, classes: &[usize]) -> String {
        match &self.charset {
            Some(cs) => cs.decode(classes),
            None => classes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(","),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ModelSpec;
    use image::GrayImage;

    fn predictor() -> Predictor {
        let spec = ModelSpec::new(6, 2, 3);
        let model = ModelRegistry::builtin().build("linear", &spec).unwrap();
        Predictor::from_parts(model, ImageShape { width: 3, height: 2 }, Some(Charset::new("xyz").unwrap()))
    }

    #[test]
    fn decodes_one_symbol_per_position() {
        let mut p = predictor();
        let text = p.predict_image(&DynamicImage::ImageLuma8(GrayImage::new(9, 4))).unwrap();
        assert_eq!(text.chars().count(), 2);
        assert!(text.chars().all(|c| "xyz".contains(c)));
    }

    #[test]
    fn wrong_pixel_count_is_rejected() {
        assert!(predictor().predict_pixels(&[0.0; 5]).is_err());
    }
}
