use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use image::DynamicImage;

use crate::DeviceMap;

pub fn select_best_device(device_map: DeviceMap) -> Result<Device> {
    match device_map {
        DeviceMap::ForceCpu => Ok(Device::Cpu),
        DeviceMap::Ordinal(ordinal) if candle_core::utils::cuda_is_available() => {
            Ok(Device::new_cuda(ordinal)?)
        }
        DeviceMap::Ordinal(ordinal) if candle_core::utils::metal_is_available() => {
            Ok(Device::new_metal(ordinal)?)
        }
        DeviceMap::Ordinal(_) => {
            #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
            {
                tracing::info!(
                    "running on CPU, to run on GPU(metal), build with `--features metal`"
                );
            }
            #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
            {
                tracing::info!("running on CPU, to run on GPU, build with `--features cuda`");
            }
            Ok(Device::Cpu)
        }
    }
}

/// Half precision on accelerators, full precision on the CPU.
pub fn half_precision_for(device: &Device) -> DType {
    if device.is_cpu() {
        DType::F32
    } else {
        DType::F16
    }
}

/// Converts a tensor with shape (3, height, width) of u8 into an RGB image.
pub fn tensor_to_image(img: &Tensor) -> Result<DynamicImage> {
    let (channels, height, width) = img.dims3()?;
    if channels != 3 {
        anyhow::bail!("tensor_to_image expects an image with 3 channels");
    }
    let img = img.permute((1, 2, 0))?.flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    let buffer = image::ImageBuffer::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| candle_core::Error::msg("error converting tensor to image buffer"))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

/// Converts an RGB image into a (1, 3, height, width) f32 tensor scaled to [-1, 1].
pub fn image_to_tensor(img: &DynamicImage, device: &Device) -> Result<Tensor> {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let pixels = img.to_rgb8().into_raw();
    let tensor = Tensor::from_vec(pixels, (height, width, 3), &Device::Cpu)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(2. / 255., -1.)?
        .unsqueeze(0)?
        .to_device(device)?;
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_tensor_conversions_keep_shape() -> Result<()> {
        let img = DynamicImage::new_rgb8(4, 2);
        let tensor = image_to_tensor(&img, &Device::Cpu)?;
        assert_eq!(tensor.dims(), &[1, 3, 2, 4]);

        let pixels = Tensor::zeros((3, 2, 4), DType::U8, &Device::Cpu)?;
        let back = tensor_to_image(&pixels)?;
        assert_eq!((back.width(), back.height()), (4, 2));
        Ok(())
    }

    #[test]
    fn rejects_non_rgb_tensors() -> Result<()> {
        let pixels = Tensor::zeros((1, 2, 2), DType::U8, &Device::Cpu)?;
        assert!(tensor_to_image(&pixels).is_err());
        Ok(())
    }

    #[test]
    fn cpu_runs_in_full_precision() {
        assert_eq!(half_precision_for(&Device::Cpu), DType::F32);
    }
}
