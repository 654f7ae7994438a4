use image::{RgbaImage, imageops};

use crate::calibration::Region;

/// Crops a screen region out of a full-screen frame.
///
/// The region is clamped to the frame, so a region that extends past the
/// frame yields the overlapping part.
pub fn crop_region(img: &RgbaImage, region: &Region) -> RgbaImage {
    let (w, h) = img.dimensions();
    let x0 = region.left.min(w);
    let y0 = region.top.min(h);
    let rw = region.right.min(w).saturating_sub(x0);
    let rh = region.bottom.min(h).saturating_sub(y0);

    imageops::crop_imm(img, x0, y0, rw, rh).to_image()
}

/// Upscales an image by an integer factor for better OCR on small UI text.
pub fn upscale(img: &RgbaImage, factor: u32) -> RgbaImage {
    if factor <= 1 {
        return img.clone();
    }
    imageops::resize(
        img,
        img.width() * factor,
        img.height() * factor,
        imageops::FilterType::Lanczos3,
    )
}
