use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::{Charset, Dataset, ImageShape, Mode, Sample};
use crate::error::{Result, TrainError};

#[derive(Debug, Clone)]
pub struct SyntheticOptions {
    pub samples: usize,
    pub sequence_length: usize,
    pub charset: Charset,
    pub glyph_width: u32,
    pub glyph_height: u32,
    /// Probability that any single pixel is flipped.
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        SyntheticOptions {
            samples: 256,
            sequence_length: 4,
            charset: Charset::default(),
            glyph_width: 5,
            glyph_height: 7,
            noise: 0.05,
            seed: 42,
        }
    }
}

/// Deterministic captcha-like images built from random per-class glyph
/// bitmaps placed side by side, with salt-and-pepper noise.
///
/// Glyph templates depend only on `seed`, so a train and a valid instance
/// built from the same options share their alphabet but not their samples.
pub struct SyntheticDataset {
    samples: Vec<Sample>,
    options: SyntheticOptions,
}

impl SyntheticDataset {
    pub fn generate(mode: Mode, options: SyntheticOptions) -> Result<SyntheticDataset> {
        if options.sequence_length == 0 || options.glyph_width == 0 || options.glyph_height == 0 {
            return Err(TrainError::InvalidConfig("synthetic glyphs and labels must be non-empty".into()));
        }

        let glyph_pixels = (options.glyph_width * options.glyph_height) as usize;
        let mut template_rng = StdRng::seed_from_u64(options.seed);
        let templates: Vec<Vec<bool>> = (0..options.charset.len())
            .map(|_| (0..glyph_pixels).map(|_| template_rng.gen_bool(0.5)).collect())
            .collect();

        let sample_seed = match mode {
            Mode::Train => options.seed.wrapping_add(1),
            Mode::Valid => options.seed.wrapping_add(2),
        };
        let mut rng = StdRng::seed_from_u64(sample_seed);
        let shape = image_shape(&options);
        let samples = (0..options.samples)
            .map(|_| {
                let label: Vec<usize> = (0..options.sequence_length)
                    .map(|_| rng.gen_range(0..options.charset.len()))
                    .collect();
                let image = render(&label, &templates, &options, shape, &mut rng);
                Sample { image, label }
            })
            .collect();

        Ok(SyntheticDataset { samples, options })
    }
}

fn image_shape(options: &SyntheticOptions) -> ImageShape {
    ImageShape {
        width: options.glyph_width * options.sequence_length as u32,
        height: options.glyph_height,
    }
}

fn render(
    label: &[usize],
    templates: &[Vec<bool>],
    options: &SyntheticOptions,
    shape: ImageShape,
    rng: &mut StdRng,
) -> Vec<f64> {
    let gw = options.glyph_width as usize;
    let width = shape.width as usize;
    let mut pixels = vec![0.0; shape.pixels()];
    for (pos, &class) in label.iter().enumerate() {
        for (i, &on) in templates[class].iter().enumerate() {
            let (y, x) = (i / gw, i % gw);
            pixels[y * width + pos * gw + x] = if on { 1.0 } else { 0.0 };
        }
    }
    for p in pixels.iter_mut() {
        if rng.gen_bool(options.noise) {
            *p = 1.0 - *p;
        }
    }
    pixels
}

impl Dataset for SyntheticDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        Ok(self.samples[index].clone())
    }

    fn sequence_length(&self) -> usize {
        self.options.sequence_length
    }

    fn num_classes(&self) -> usize {
        self.options.charset.len()
    }

    fn input_size(&self) -> usize {
        image_shape(&self.options).pixels()
    }

    fn charset(&self) -> Option<&Charset> {
        Some(&self.options.charset)
    }

    fn image_shape(&self) -> Option<ImageShape> {
        Some(image_shape(&self.options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SyntheticOptions {
        SyntheticOptions { samples: 10, charset: Charset::new("0123").unwrap(), ..Default::default() }
    }

    #[test]
    fn generation_is_deterministic() {
        let a = SyntheticDataset::generate(Mode::Train, small()).unwrap();
        let b = SyntheticDataset::generate(Mode::Train, small()).unwrap();
        for i in 0..a.len() {
            assert_eq!(a.get(i).unwrap(), b.get(i).unwrap());
        }
    }

    #[test]
    fn splits_differ() {
        let train = SyntheticDataset::generate(Mode::Train, small()).unwrap();
        let valid = SyntheticDataset::generate(Mode::Valid, small()).unwrap();
        assert_ne!(train.get(0).unwrap(), valid.get(0).unwrap());
    }

    #[test]
    fn shapes_follow_options() {
        let ds = SyntheticDataset::generate(Mode::Train, small()).unwrap();
        let sample = ds.get(3).unwrap();
        assert_eq!(sample.image.len(), ds.input_size());
        assert_eq!(ds.input_size(), 4 * 5 * 7);
        assert_eq!(sample.label.len(), 4);
        assert!(sample.label.iter().all(|&c| c < 4));
    }
}
