use crate::common::*;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Blends a soft per-category layout into a false-color RGB batch.
///
/// Only the first `num_categories` channels participate; trailing
/// channels (the background slot) are ignored. Every pixel is the
/// palette-weighted sum over category channels, then the whole batch is
/// scaled by one global factor so its maximum maps to 255.
pub fn layout_to_rgb(layout: &Tensor, palette: &Tensor, num_categories: i64) -> Result<Tensor> {
    let (_batch, channels, _height, _width) = layout.size4()?;
    let (palette_len, palette_channels) = palette.size2()?;
    ensure!(
        palette_channels == 3,
        "palette must map categories to RGB, got {} channels",
        palette_channels
    );
    ensure!(
        channels >= num_categories && palette_len >= num_categories,
        "layout has {} channels and palette {} entries, need {}",
        channels,
        palette_len,
        num_categories
    );

    let weights = layout
        .narrow(1, 0, num_categories)
        .to_device(palette.device())
        .to_kind(Kind::Float);
    let blended = Tensor::einsum("bchw,cd->bdhw", &[&weights, palette], None);

    let max = f64::from(&blended.max());
    let scaled = if max > 0.0 {
        blended * (255.0 / max)
    } else {
        blended
    };
    Ok(scaled)
}

/// Undoes ImageNet normalization, producing `uint8` RGB in `0..=255`.
pub fn imagenet_deprocess_batch(images: &Tensor) -> Result<Tensor> {
    let (_batch, channels, _height, _width) = images.size4()?;
    ensure!(
        channels == 3,
        "expected 3-channel images, got {}",
        channels
    );

    let device = images.device();
    let mean = Tensor::of_slice(&IMAGENET_MEAN)
        .view([1, 3, 1, 1])
        .to_device(device);
    let std = Tensor::of_slice(&IMAGENET_STD)
        .view([1, 3, 1, 1])
        .to_device(device);

    let restored = (images * std + mean) * 255.0;
    Ok(restored.clamp(0.0, 255.0).to_kind(Kind::Uint8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_category_maps_to_pure_color() {
        // one image, category 0 fully covers the 2x2 canvas; the
        // background channel must be ignored
        let layout = Tensor::of_slice(&[
            1.0f32, 1.0, 1.0, 1.0, // category 0
            0.0, 0.0, 0.0, 0.0, // category 1
            9.0, 9.0, 9.0, 9.0, // background slot
        ])
        .view([1, 3, 2, 2]);
        let palette = Tensor::of_slice(&[
            100.0f32, 0.0, 50.0, //
            0.0, 200.0, 0.0, //
        ])
        .view([2, 3]);

        let rgb = layout_to_rgb(&layout, &palette, 2).unwrap();
        assert_eq!(rgb.size(), vec![1, 3, 2, 2]);
        // max weight-color product is 100, scaled to 255
        assert!((f64::from(&rgb.i((0, 0, 0, 0))) - 255.0).abs() < 1e-4);
        assert!((f64::from(&rgb.i((0, 1, 0, 0))) - 0.0).abs() < 1e-4);
        assert!((f64::from(&rgb.i((0, 2, 0, 0))) - 127.5).abs() < 1e-4);
    }

    #[test]
    fn normalization_is_global_across_batch() {
        // second image carries the batch maximum; the first image's
        // values must be scaled by the same factor, not to its own max
        let layout = Tensor::of_slice(&[
            1.0f32, 1.0, 1.0, 1.0, //
            2.0, 2.0, 2.0, 2.0, //
        ])
        .view([2, 1, 2, 2]);
        let palette = Tensor::of_slice(&[255.0f32, 255.0, 255.0]).view([1, 3]);

        let rgb = layout_to_rgb(&layout, &palette, 1).unwrap();
        assert!((f64::from(&rgb.i((0, 0, 0, 0))) - 127.5).abs() < 1e-4);
        assert!((f64::from(&rgb.i((1, 0, 0, 0))) - 255.0).abs() < 1e-4);
    }

    #[test]
    fn all_zero_layout_stays_zero() {
        let layout = Tensor::zeros(&[1, 2, 2, 2], FLOAT_CPU);
        let palette = Tensor::of_slice(&[255.0f32, 0.0, 0.0, 0.0, 255.0, 0.0]).view([2, 3]);
        let rgb = layout_to_rgb(&layout, &palette, 2).unwrap();
        assert!(f64::from(&rgb.abs().max()) < 1e-9);
    }

    #[test]
    fn deprocess_restores_pixel_range() {
        let images = Tensor::zeros(&[1, 3, 2, 2], FLOAT_CPU);
        let restored = imagenet_deprocess_batch(&images).unwrap();
        assert_eq!(restored.kind(), Kind::Uint8);
        // zero in normalized space is the ImageNet mean
        assert_eq!(i64::from(&restored.i((0, 0, 0, 0))), 123);
    }
}
