//! Image decoding and normalization for ImageNet-style models

use candle_core::{DType, Device, Tensor};
use image::imageops::FilterType;
use snapclass_core::{Error, Result};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decode an encoded image into a `(3, size, size)` normalized f32 tensor
///
/// The image is scaled to cover the square and center-cropped, then each
/// channel is normalized with the ImageNet mean and standard deviation.
pub fn image_to_tensor(bytes: &[u8], size: usize) -> Result<Tensor> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::invalid_image(format!("Failed to decode image: {}", e)))?;

    let side = size as u32;
    let rgb = image
        .resize_to_fill(side, side, FilterType::Triangle)
        .to_rgb8();

    let pixels = rgb.into_raw();
    normalize(pixels, size).map_err(|e| Error::classification(format!("Failed to build input tensor: {}", e)))
}

fn normalize(pixels: Vec<u8>, size: usize) -> candle_core::Result<Tensor> {
    let data = Tensor::from_vec(pixels, (size, size, 3), &Device::Cpu)?.permute((2, 0, 1))?;
    let mean = Tensor::new(&IMAGENET_MEAN, &Device::Cpu)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGENET_STD, &Device::Cpu)?.reshape((3, 1, 1))?;

    (data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)
}
