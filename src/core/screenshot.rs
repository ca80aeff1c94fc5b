use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{ImageFormat, RgbaImage};
use xcap::Monitor;

/// Capture the primary monitor at native resolution as a PNG data URI.
pub async fn capture_full() -> Result<String, String> {
    tauri::async_runtime::spawn_blocking(|| {
        let image = capture_primary()?;
        encode_png_data_uri(&image)
    })
    .await
    .map_err(|err| format!("Screenshot task failed: {err}"))?
}

/// Capture a region of the primary monitor, in device pixels.
pub async fn capture_region(x: u32, y: u32, width: u32, height: u32) -> Result<String, String> {
    tauri::async_runtime::spawn_blocking(move || {
        let image = capture_primary()?;
        let cropped = crop_region(&image, x, y, width, height)?;
        encode_png_data_uri(&cropped)
    })
    .await
    .map_err(|err| format!("Screenshot task failed: {err}"))?
}

fn capture_primary() -> Result<RgbaImage, String> {
    let monitors = Monitor::all().map_err(|err| format!("Failed to get monitors: {err}"))?;
    let monitor = monitors
        .iter()
        .find(|monitor| monitor.is_primary().unwrap_or(false))
        .or_else(|| monitors.first())
        .ok_or_else(|| "No monitors found".to_string())?;

    monitor
        .capture_image()
        .map_err(|err| format!("Failed to capture screenshot: {err}"))
}

fn crop_region(
    image: &RgbaImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<RgbaImage, String> {
    if width == 0 || height == 0 {
        return Err("Region must not be empty".to_string());
    }
    if x.saturating_add(width) > image.width() || y.saturating_add(height) > image.height() {
        return Err(format!(
            "Region {width}x{height}+{x}+{y} is outside the {}x{} display",
            image.width(),
            image.height()
        ));
    }

    Ok(image::imageops::crop_imm(image, x, y, width, height).to_image())
}

fn encode_png_data_uri(image: &RgbaImage) -> Result<String, String> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|err| format!("Failed to encode image: {err}"))?;

    Ok(format!(
        "data:image/png;base64,{}",
        STANDARD.encode(buffer.into_inner())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        })
    }

    #[test]
    fn encodes_a_png_data_uri() {
        let uri = encode_png_data_uri(&test_image(4, 4)).expect("encode");
        assert!(uri.starts_with("data:image/png;base64,"));

        let payload = uri.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = STANDARD.decode(payload).expect("valid base64");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn crops_a_region_within_bounds() {
        let image = test_image(10, 10);
        let cropped = crop_region(&image, 2, 3, 4, 5).expect("crop");
        assert_eq!(cropped.width(), 4);
        assert_eq!(cropped.height(), 5);
        assert_eq!(cropped.get_pixel(0, 0), image.get_pixel(2, 3));
    }

    #[test]
    fn rejects_out_of_bounds_or_empty_regions() {
        let image = test_image(10, 10);
        assert!(crop_region(&image, 8, 8, 4, 4).is_err());
        assert!(crop_region(&image, 0, 0, 0, 5).is_err());
    }
}
