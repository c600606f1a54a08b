//! Frame change detection
//!
//! Avoids spending engine time on visually static video.

use image::RgbaImage;

/// Whether `current` is close enough to `previous` to skip recognition.
///
/// Only skips when detection is enabled and both frames share dimensions;
/// a resize or a missing previous frame always reprocesses.
pub fn should_skip(
    enabled: bool,
    threshold_percent: i32,
    current: &RgbaImage,
    previous: Option<&RgbaImage>,
) -> bool {
    if !enabled {
        return false;
    }
    let Some(previous) = previous else {
        return false;
    };
    if current.dimensions() != previous.dimensions() {
        return false;
    }

    let (width, height) = current.dimensions();
    let area = width as f32 * height as f32;
    let threshold = (threshold_percent as f32 / 100.0 * area) as i64;

    (changed_pixels(current, previous) as i64) < threshold
}

/// Pixels whose absolute difference has non-zero intensity
pub fn changed_pixels(a: &RgbaImage, b: &RgbaImage) -> usize {
    a.pixels()
        .zip(b.pixels())
        .filter(|(pa, pb)| {
            let d = |i: usize| pa.0[i].abs_diff(pb.0[i]) as u32;
            diff_intensity(d(0), d(1), d(2)) != 0
        })
        .count()
}

/// BT.601 luma in 14-bit fixed point, rounded; alpha is ignored
fn diff_intensity(r: u32, g: u32, b: u32) -> u32 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    (r * R + g * G + b * B + (1 << 13)) >> 14
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frame(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(10, 10, Rgba([value, value, value, 255]))
    }

    #[test]
    fn test_identical_frames_skip() {
        let a = frame(40);
        assert!(should_skip(true, 1, &a, Some(&a.clone())));
    }

    #[test]
    fn test_disabled_never_skips() {
        let a = frame(40);
        assert!(!should_skip(false, 50, &a, Some(&a.clone())));
    }

    #[test]
    fn test_missing_or_resized_previous_never_skips() {
        let a = frame(40);
        assert!(!should_skip(true, 50, &a, None));

        let resized = RgbaImage::from_pixel(10, 11, Rgba([40, 40, 40, 255]));
        assert!(!should_skip(true, 50, &a, Some(&resized)));
    }

    #[test]
    fn test_zero_threshold_never_skips() {
        let a = frame(40);
        assert!(!should_skip(true, 0, &a, Some(&a.clone())));
    }

    #[test]
    fn test_change_above_threshold_reprocesses() {
        let previous = frame(0);
        let mut current = frame(0);
        // 20 of 100 pixels change, threshold is 10 pixels
        for x in 0..10 {
            for y in 0..2 {
                current.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        assert_eq!(changed_pixels(&current, &previous), 20);
        assert!(!should_skip(true, 10, &current, Some(&previous)));
        // but stays below a 30 pixel threshold
        assert!(should_skip(true, 30, &current, Some(&previous)));
    }

    #[test]
    fn test_alpha_only_change_is_invisible() {
        let previous = frame(10);
        let mut current = frame(10);
        current.put_pixel(0, 0, Rgba([10, 10, 10, 0]));
        assert_eq!(changed_pixels(&current, &previous), 0);
    }
}
