use image::{GrayImage, Luma};

use crate::train::metrics::ConfusionMatrix;

/// Renders a row-normalized confusion matrix as a grayscale heat map, one
/// `cell × cell` square per (truth, predicted) pair. Rows are true classes.
pub fn confusion_image(cm: &ConfusionMatrix, cell: u32) -> GrayImage {
    let cell = cell.max(1);
    let side = cm.classes as u32 * cell;
    let norm = cm.row_normalized();
    GrayImage::from_fn(side, side, |x, y| {
        let (t, p) = ((y / cell) as usize, (x / cell) as usize);
        Luma([(norm[t * cm.classes + p] * 255.0).round() as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_light_the_diagonal() {
        let mut cm = ConfusionMatrix::new(3);
        for c in 0..3 {
            cm.record(c, c);
        }
        let img = confusion_image(&cm, 2);
        assert_eq!(img.dimensions(), (6, 6));
        assert_eq!(img.get_pixel(1, 1).0[0], 255);
        assert_eq!(img.get_pixel(3, 0).0[0], 0);
    }
}
