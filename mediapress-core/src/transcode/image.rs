//! Image re-encoding.
//!
//! Images are decoded and re-encoded in-process in a single blocking step,
//! so they report no intra-task progress. The output format follows the
//! destination extension: lossy WebP by default, or the source format when
//! formats are kept. Cancellation is checked before decoding and again before
//! the result is published.

use crate::error::{CoreError, CoreResult};
use crate::progress::TaskProgress;
use crate::task::{Outcome, SkipReason, Task};
use crate::temp_files::PartialOutput;
use crate::utils::file_size;

use super::{TaskEnv, Transcoder, completed, failed, prepare_destination};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTranscoder;

impl ImageTranscoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Output format for a destination path.
fn output_format(dest: &Path) -> CoreResult<ImageFormat> {
    let ext = dest.extension().and_then(|e| e.to_str()).unwrap_or_default();
    ImageFormat::from_extension(ext)
        .ok_or_else(|| CoreError::Image(format!("Unsupported output format '{ext}'")))
}

/// Encodes `img` into `path` as `format`.
pub fn encode_image(img: &DynamicImage, format: ImageFormat, quality: u8, path: &Path) -> CoreResult<()> {
    match format {
        ImageFormat::WebP => {
            let source = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            let encoder = webp::Encoder::from_image(&source)
                .map_err(|e| CoreError::Image(format!("WebP encoder: {e}")))?;
            let data = encoder.encode(f32::from(quality));
            std::fs::write(path, &*data)?;
        }
        ImageFormat::Jpeg => {
            let mut writer = BufWriter::new(File::create(path)?);
            // JPEG has no alpha channel.
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))?;
        }
        ImageFormat::Png => {
            let mut writer = BufWriter::new(File::create(path)?);
            img.write_with_encoder(PngEncoder::new_with_quality(
                &mut writer,
                CompressionType::Best,
                FilterType::Adaptive,
            ))?;
        }
        other => {
            let mut writer = BufWriter::new(File::create(path)?);
            img.write_to(&mut writer, other)?;
        }
    }
    Ok(())
}

impl Transcoder for ImageTranscoder {
    fn process(
        &self,
        task: &Task,
        env: &TaskEnv<'_>,
        progress: &mut TaskProgress,
    ) -> CoreResult<Outcome> {
        let dest = match prepare_destination(task, env.ctx) {
            Ok(dest) => dest,
            Err(outcome) => return Ok(outcome),
        };
        if dest.exists() {
            return Ok(Outcome::skipped(SkipReason::Exists));
        }
        if env.shutdown.is_cancelled() {
            return Ok(Outcome::Aborted);
        }
        progress.show();
        progress.set_prefix("IMG");

        let format = match output_format(&dest) {
            Ok(format) => format,
            Err(e) => return Ok(failed(e.to_string())),
        };
        let partial = match PartialOutput::new(&dest) {
            Ok(partial) => partial,
            Err(e) => return Ok(failed(e.to_string())),
        };

        let img = match image::open(&task.source) {
            Ok(img) => img,
            Err(e) => return Ok(failed(format!("Decode failed: {e}"))),
        };
        if env.shutdown.is_cancelled() {
            return Ok(Outcome::Aborted);
        }
        if let Err(e) = encode_image(&img, format, env.ctx.quality.image_quality, partial.path()) {
            return Ok(failed(e.to_string()));
        }
        if env.shutdown.is_cancelled() {
            return Ok(Outcome::Aborted);
        }

        let input_size = file_size(&task.source);
        let dest = match partial.commit() {
            Ok(dest) => dest,
            Err(e) => return Ok(failed(e.to_string())),
        };
        Ok(completed(task, input_size, &dest, env.ctx))
    }
}
