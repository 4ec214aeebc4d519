use std::io::Cursor;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use tracing::debug;

use crate::llm::service::GeneratedImage;

const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    #[default]
    #[value(alias = "jpg")]
    Jpeg,
    Png,
    /// Keep the bytes the service returned.
    Original,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Không thể đọc ảnh đã tạo: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Không thể lưu ảnh: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub extension: &'static str,
}

impl ExportedImage {
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.extension)
    }
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/heic" => "heic",
        _ => "png",
    }
}

pub fn export_image(
    image: &GeneratedImage,
    format: ExportFormat,
) -> Result<ExportedImage, ExportError> {
    if format == ExportFormat::Original {
        return Ok(ExportedImage {
            bytes: image.bytes.clone(),
            mime_type: image.mime_type.clone(),
            extension: extension_for_mime(&image.mime_type),
        });
    }

    let decoded = image::load_from_memory(&image.bytes).map_err(ExportError::Decode)?;
    let mut bytes = Vec::new();
    let exported = match format {
        ExportFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = decoded.to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
                .encode_image(&rgb)
                .map_err(ExportError::Encode)?;
            ExportedImage {
                bytes,
                mime_type: "image/jpeg".to_string(),
                extension: "jpg",
            }
        }
        _ => {
            decoded
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .map_err(ExportError::Encode)?;
            ExportedImage {
                bytes,
                mime_type: "image/png".to_string(),
                extension: "png",
            }
        }
    };
    debug!(
        width = decoded.width(),
        height = decoded.height(),
        size = exported.bytes.len(),
        mime_type = %exported.mime_type,
        "Exported ID photo"
    );
    Ok(exported)
}

/// `--output` may name a directory, in which case the default file name is
/// used inside it.
pub fn resolve_output_path(output: Option<&Path>, exported: &ExportedImage, stem: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(exported.file_name(stem)),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(exported.file_name(stem)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn generated_png() -> GeneratedImage {
        let mut canvas = RgbaImage::from_pixel(6, 8, Rgba([74, 144, 226, 255]));
        canvas.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode fixture");
        GeneratedImage {
            bytes,
            mime_type: "image/png".to_string(),
        }
    }

    #[test]
    fn jpeg_export_flattens_alpha() {
        let exported = export_image(&generated_png(), ExportFormat::Jpeg).expect("export");
        assert_eq!(exported.mime_type, "image/jpeg");
        assert_eq!(exported.file_name("anh-the-ai"), "anh-the-ai.jpg");
        assert_eq!(&exported.bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&exported.bytes).expect("valid jpeg");
        assert_eq!((decoded.width(), decoded.height()), (6, 8));
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn png_export_keeps_dimensions() {
        let exported = export_image(&generated_png(), ExportFormat::Png).expect("export");
        assert_eq!(exported.file_name("anh-the-ai"), "anh-the-ai.png");
        let decoded = image::load_from_memory(&exported.bytes).expect("valid png");
        assert_eq!((decoded.width(), decoded.height()), (6, 8));
    }

    #[test]
    fn original_export_passes_bytes_through() {
        let image = GeneratedImage {
            bytes: vec![1, 2, 3],
            mime_type: "image/webp".to_string(),
        };
        let exported = export_image(&image, ExportFormat::Original).expect("export");
        assert_eq!(exported.bytes, vec![1, 2, 3]);
        assert_eq!(exported.file_name("photo"), "photo.webp");
    }

    #[test]
    fn undecodable_image_is_an_error() {
        let image = GeneratedImage {
            bytes: vec![1, 2, 3],
            mime_type: "image/png".to_string(),
        };
        assert!(matches!(
            export_image(&image, ExportFormat::Png),
            Err(ExportError::Decode(_))
        ));
    }

    #[test]
    fn format_names_parse() {
        assert_eq!(ExportFormat::from_str("JPG", true), Ok(ExportFormat::Jpeg));
        assert_eq!(ExportFormat::from_str("original", true), Ok(ExportFormat::Original));
        assert!(ExportFormat::from_str("gif", true).is_err());
    }

    #[test]
    fn output_defaults_to_stem_in_working_directory() {
        let exported = ExportedImage {
            bytes: Vec::new(),
            mime_type: "image/png".to_string(),
            extension: "png",
        };
        assert_eq!(
            resolve_output_path(None, &exported, "anh-the-ai"),
            PathBuf::from("anh-the-ai.png")
        );
        let dir = std::env::temp_dir();
        assert_eq!(
            resolve_output_path(Some(&dir), &exported, "anh-the-ai"),
            dir.join("anh-the-ai.png")
        );
        assert_eq!(
            resolve_output_path(Some(Path::new("out/photo.png")), &exported, "x"),
            PathBuf::from("out/photo.png")
        );
    }
}
