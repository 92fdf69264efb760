use std::{
    io::Write as _,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    context::FlowContext,
    core::FrameRgba,
    error::{FlowError, FlowResult},
    math::{mul_div255, sanitize_duration},
};

/// Receives the fixed-rate frame sequence produced by an export run.
pub trait ExportSink {
    fn begin(&mut self, width: u32, height: u32, fps: u32) -> FlowResult<()>;
    fn write_frame(&mut self, frame: &FrameRgba) -> FlowResult<()>;
    fn finish(&mut self) -> FlowResult<()>;
}

#[derive(Clone, Copy, Debug)]
pub struct ExportConfig {
    pub fps: u32,
    pub duration: f64,
}

impl ExportConfig {
    pub fn new(fps: u32, duration: f64) -> Self {
        Self {
            fps: fps.max(1),
            duration: sanitize_duration(duration),
        }
    }

    pub fn total_frames(&self) -> usize {
        (self.duration * f64::from(self.fps)).round().max(1.0) as usize
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ExportProgress {
    pub frame: usize,
    pub total: usize,
}

impl ExportProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.frame as f64 / self.total as f64 * 100.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportControl {
    Continue,
    Cancel,
}

impl FlowContext {
    /// Renders `round(duration * fps)` frames at a fixed timestep into
    /// `sink`. Returns true on completion, false when the progress callback
    /// cancelled; either way the clock ends in the same idle state as a
    /// normal stop.
    #[tracing::instrument(skip(self, sink, progress))]
    pub fn export_animation(
        &mut self,
        config: ExportConfig,
        sink: &mut dyn ExportSink,
        mut progress: impl FnMut(ExportProgress) -> ExportControl,
    ) -> FlowResult<bool> {
        if !self.regions.has_playable() {
            return Err(FlowError::export(
                "no region with a selection and nonzero direction",
            ));
        }
        let config = ExportConfig::new(config.fps, config.duration);
        let total = config.total_frames();
        let dt = 1.0 / f64::from(config.fps);

        self.stop(true);
        self.exporting = true;
        self.animating = true;
        let canvas = self.canvas;
        let result = (|| -> FlowResult<bool> {
            sink.begin(canvas.width, canvas.height, config.fps)?;
            for index in 0..total {
                let elapsed = index as f64 * dt;
                self.render_frame(elapsed, config.duration, dt);
                sink.write_frame(&self.frame.to_frame())?;
                let report = ExportProgress {
                    frame: index + 1,
                    total,
                };
                if progress(report) == ExportControl::Cancel {
                    tracing::info!(frame = report.frame, total, "export cancelled");
                    return Ok(false);
                }
            }
            sink.finish()?;
            tracing::info!(total, "export complete");
            Ok(true)
        })();

        self.exporting = false;
        self.stop(true);
        result
    }
}

/// Pipes raw RGBA frames to the system `ffmpeg` binary, flattening the
/// premultiplied raster over an opaque background for yuv420p output. Using
/// the binary avoids native FFmpeg dev header/lib requirements.
pub struct FfmpegSink {
    out_path: PathBuf,
    bg_rgb: [u8; 3],
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    scratch: Vec<u8>,
}

impl FfmpegSink {
    pub fn new(out_path: impl Into<PathBuf>, bg_rgb: [u8; 3]) -> Self {
        Self {
            out_path: out_path.into(),
            bg_rgb,
            child: None,
            stdin: None,
            scratch: Vec::new(),
        }
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn ensure_parent_dir(path: &Path) -> FlowResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))
            .map_err(FlowError::Other)?;
    }
    Ok(())
}

impl ExportSink for FfmpegSink {
    fn begin(&mut self, width: u32, height: u32, fps: u32) -> FlowResult<()> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(FlowError::validation("encode width/height/fps must be non-zero"));
        }
        if width % 2 != 0 || height % 2 != 0 {
            // yuv420p requires even dimensions.
            return Err(FlowError::validation(
                "encode width/height must be even for yuv420p output",
            ));
        }
        ensure_parent_dir(&self.out_path)?;
        if !is_ffmpeg_on_path() {
            return Err(FlowError::export(
                "ffmpeg is required for video export, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{width}x{height}"),
            "-r",
            &fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&self.out_path);

        let mut child = cmd
            .spawn()
            .map_err(|e| FlowError::export(format!("failed to spawn ffmpeg: {e}")))?;
        self.stdin = Some(
            child
                .stdin
                .take()
                .ok_or_else(|| FlowError::export("failed to open ffmpeg stdin"))?,
        );
        self.child = Some(child);
        self.scratch = vec![0u8; width as usize * height as usize * 4];
        Ok(())
    }

    fn write_frame(&mut self, frame: &FrameRgba) -> FlowResult<()> {
        if frame.data.len() != self.scratch.len() {
            return Err(FlowError::validation(
                "frame size mismatch with configured encode dimensions",
            ));
        }
        flatten_to_opaque_rgba8(&mut self.scratch, &frame.data, frame.premultiplied, self.bg_rgb)?;
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(FlowError::export("ffmpeg sink is not started"));
        };
        stdin
            .write_all(&self.scratch)
            .map_err(|e| FlowError::export(format!("failed to write frame to ffmpeg: {e}")))
    }

    fn finish(&mut self) -> FlowResult<()> {
        drop(self.stdin.take());
        let Some(child) = self.child.take() else {
            return Err(FlowError::export("ffmpeg sink is not started"));
        };
        let output = child
            .wait_with_output()
            .map_err(|e| FlowError::export(format!("failed to wait for ffmpeg: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FlowError::export(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Source-over onto an opaque background, producing fully opaque RGBA8.
fn flatten_to_opaque_rgba8(
    dst: &mut [u8],
    src: &[u8],
    src_is_premul: bool,
    bg_rgb: [u8; 3],
) -> FlowResult<()> {
    if dst.len() != src.len() || dst.len() % 4 != 0 {
        return Err(FlowError::validation(
            "flatten expects equal-length rgba8 buffers",
        ));
    }
    let bg = [
        u16::from(bg_rgb[0]),
        u16::from(bg_rgb[1]),
        u16::from(bg_rgb[2]),
    ];
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - a;
        for c in 0..3 {
            let fg = if src_is_premul {
                u16::from(s[c])
            } else {
                u16::from(mul_div255(u16::from(s[c]), a))
            };
            d[c] = (fg + u16::from(mul_div255(bg[c], inv))).min(255) as u8;
        }
        d[3] = 255;
    }
    Ok(())
}

/// Encodes a region's current mask as a grayscale-in-alpha PNG, so painted
/// selections can be saved and inspected outside the engine.
pub fn encode_mask_png(alpha: &[u8], width: u32, height: u32) -> FlowResult<Vec<u8>> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| FlowError::validation("mask size overflow"))?;
    if width == 0 || height == 0 || alpha.len() != expected {
        return Err(FlowError::validation("mask data must match width*height"));
    }
    let mut rgba = Vec::with_capacity(expected * 4);
    for &a in alpha {
        rgba.extend_from_slice(&[0, 0, 0, a]);
    }
    let buf = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| FlowError::export("mask buffer construction failed"))?;
    let mut out = Vec::new();
    buf.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| FlowError::export(format!("mask png encode failed: {e}")))?;
    Ok(out)
}
