use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{ColorType, ImageEncoder, ImageError, Rgb, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::canvas::force_opaque;
use crate::error::IoError;
use crate::ops::compose::flatten;

/// JPEG quality used for exports.
pub const JPEG_QUALITY: u8 = 95;

/// Background used when flattening an export without a fill color.
pub const FLATTEN_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

// ============================================================================
// LOADING
// ============================================================================

/// Decode any supported raster file into an opaque RGBA capture.
pub fn load_image(path: &Path) -> Result<RgbaImage, IoError> {
    let img = image::open(path)
        .map_err(|source| IoError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(IoError::EmptyImage);
    }
    crate::log_info!("loaded {} ({}x{})", path.display(), img.width(), img.height());
    Ok(force_opaque(&img))
}

/// Decode an in-memory file (clipboard, drag-drop payload).
pub fn load_from_memory(bytes: &[u8]) -> Result<RgbaImage, IoError> {
    let img = image::load_from_memory(bytes)
        .map_err(|source| IoError::Decode {
            path: "<memory>".into(),
            source,
        })?
        .to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(IoError::EmptyImage);
    }
    Ok(force_opaque(&img))
}

// ============================================================================
// SAVING
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
        }
    }

    /// Detect format from extension; unknown extensions map to `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tiff" | "tif" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    /// Formats that store the alpha channel as-is.
    pub fn keeps_alpha(&self) -> bool {
        matches!(self, SaveFormat::Png | SaveFormat::Tga | SaveFormat::Tiff)
    }
}

/// Save an export buffer to `path` as `format`. Formats without alpha are
/// flattened against `fill`, or white when no fill is set.
pub fn save_export(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    fill: Option<Rgb<u8>>,
) -> Result<(), IoError> {
    encode_and_write(image, path, format, fill.unwrap_or(FLATTEN_BACKGROUND)).map_err(|source| {
        IoError::Encode {
            path: path.to_path_buf(),
            source,
        }
    })?;
    crate::log_info!("saved {} as {}", path.display(), format.extension());
    Ok(())
}

/// Encode and write an image to a file.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    background: Rgb<u8>,
) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let (w, h) = image.dimensions();

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(&mut writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Tiff => {
            TiffEncoder::new(&mut writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Jpeg => {
            let rgb = flatten(image, background);
            JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).write_image(
                rgb.as_raw(),
                w,
                h,
                ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            let rgb = flatten(image, background);
            BmpEncoder::new(&mut writer).write_image(rgb.as_raw(), w, h, ColorType::Rgb8)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::path::PathBuf;

    fn half_transparent() -> RgbaImage {
        RgbaImage::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgba([200, 10, 10, 255])
            } else {
                Rgba([200, 10, 10, 0])
            }
        })
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(SaveFormat::from_path(&PathBuf::from("a.JPEG")), Some(SaveFormat::Jpeg));
        assert_eq!(SaveFormat::from_path(&PathBuf::from("a.tif")), Some(SaveFormat::Tiff));
        assert_eq!(SaveFormat::from_path(&PathBuf::from("a.xyz")), None);
        assert!(SaveFormat::Png.keeps_alpha());
        assert!(!SaveFormat::Bmp.keeps_alpha());
    }

    #[test]
    fn png_keeps_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        save_export(&half_transparent(), &path, SaveFormat::Png, None).unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(back.get_pixel(0, 0).0, [200, 10, 10, 255]);
        assert_eq!(back.get_pixel(3, 1).0[3], 0);
    }

    #[test]
    fn bmp_flattens_against_fill() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bmp");
        save_export(&half_transparent(), &path, SaveFormat::Bmp, Some(Rgb([0, 255, 0]))).unwrap();
        let back = image::open(&path).unwrap().to_rgb8();
        assert_eq!(back.get_pixel(0, 0).0, [200, 10, 10]);
        assert_eq!(back.get_pixel(3, 1).0, [0, 255, 0]);
    }

    #[test]
    fn format_wins_over_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        save_export(&half_transparent(), &path, SaveFormat::Jpeg, None).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn load_forces_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.png");
        half_transparent().save(&path).unwrap();
        let img = load_image(&path).unwrap();
        assert!(img.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn load_reports_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        assert!(matches!(load_image(&path), Err(IoError::Decode { .. })));
        assert!(matches!(load_from_memory(b"junk"), Err(IoError::Decode { .. })));
    }
}
