use image::{GrayImage, RgbaImage};
use ow_capture::{BASE_HEIGHT, BASE_WIDTH};

/// One captured screenshot as single-channel luma at 1920x1080.
///
/// Immutable once built; the matcher holds it for the rest of the tick.
#[derive(Debug, Clone)]
pub struct Frame {
    gray: GrayImage,
}

impl Frame {
    /// Convert a capture to luma, rescaling to the reference resolution if needed
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let gray = image::imageops::grayscale(image);
        Self::from_gray(gray)
    }

    pub fn from_gray(gray: GrayImage) -> Self {
        let gray = if gray.dimensions() == (BASE_WIDTH, BASE_HEIGHT) {
            gray
        } else {
            image::imageops::resize(
                &gray,
                BASE_WIDTH,
                BASE_HEIGHT,
                image::imageops::FilterType::Triangle,
            )
        };
        Self { gray }
    }

    pub fn image(&self) -> &GrayImage {
        &self.gray
    }
}
