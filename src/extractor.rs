use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{FrameError, FrameWriteFailure};
use crate::selector::FrameRange;
use crate::video_source::{seek_and_read, FrameSource};

/// 默认 JPEG 质量
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// 代表帧在场景中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameRole {
    Start,
    Mid,
    End,
}

impl FrameRole {
    pub const ALL: [FrameRole; 3] = [FrameRole::Start, FrameRole::Mid, FrameRole::End];

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameRole::Start => "start",
            FrameRole::Mid => "mid",
            FrameRole::End => "end",
        }
    }
}

impl fmt::Display for FrameRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个代表帧的提取结果
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// 场景序号（从 1 开始）
    pub scene_index: usize,
    pub role: FrameRole,
    /// 实际请求的帧号（已夹紧）
    pub frame_index: u64,
    pub output_path: PathBuf,
    pub success: bool,
    pub error: Option<String>,
}

/// 输出文件路径：`<out>/scene_<NNN>_<role>.jpg`
pub fn output_path(out_dir: &Path, scene_index: usize, role: FrameRole) -> PathBuf {
    out_dir.join(format!("scene_{scene_index:03}_{role}.jpg"))
}

/// 把帧号夹紧到 `[0, total - 1]`；总帧数为 0 时返回 `None`
pub fn clamp_index(index: u64, total_frames: u64) -> Option<u64> {
    total_frames.checked_sub(1).map(|last| index.min(last))
}

/// 关键帧提取器：读取代表帧并保存为 JPEG
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    out_dir: PathBuf,
    jpeg_quality: u8,
}

impl FrameExtractor {
    pub fn new(out_dir: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        Self {
            out_dir: out_dir.into(),
            jpeg_quality,
        }
    }

    /// 提取一个场景的首/中/尾三帧。
    ///
    /// 总是返回三个结果；单帧失败只记录，不影响其余帧。
    pub fn extract_scene<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        scene_index: usize,
        range: &FrameRange,
    ) -> Vec<ExtractionOutcome> {
        let total_frames = source.total_frame_count();

        FrameRole::ALL
            .iter()
            .map(|&role| {
                let requested = range.index_of(role);
                let frame_index = clamp_index(requested, total_frames).unwrap_or(requested);
                let path = output_path(&self.out_dir, scene_index, role);

                let result = self.extract_frame(source, requested, total_frames, &path);
                if let Err(e) = &result {
                    warn!("⚠️  [关键帧] 场景 {:03} {} 帧提取失败: {}", scene_index, role, e);
                }

                ExtractionOutcome {
                    scene_index,
                    role,
                    frame_index,
                    output_path: path,
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                }
            })
            .collect()
    }

    fn extract_frame<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        index: u64,
        total_frames: u64,
        path: &Path,
    ) -> Result<(), FrameError> {
        let index = clamp_index(index, total_frames).ok_or(FrameError::EmptyVideo)?;
        let frame = seek_and_read(source, index)?;
        self.save_jpeg(&frame, path)?;
        debug!("💾 [关键帧] 已保存第 {} 帧: {}", index, path.display());
        Ok(())
    }

    /// 编码为 JPEG 并写入 `path`，输出目录不存在时创建
    pub fn save_jpeg(&self, frame: &DynamicImage, path: &Path) -> Result<(), FrameWriteFailure> {
        let io_err = |source: std::io::Error| FrameWriteFailure::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
        let rgb = frame.to_rgb8();
        JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            .map_err(|source| FrameWriteFailure::Encode {
                path: path.to_path_buf(),
                source,
            })?;
        writer.flush().map_err(io_err)?;

        Ok(())
    }
}
