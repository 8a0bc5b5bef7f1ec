use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::extractor::FrameRole;
use crate::processor::RunSummary;
use crate::scene_detector::SceneBoundary;

/// 单个代表帧的记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEntry {
    pub role: FrameRole,
    pub frame_index: u64,
    /// 图片文件名（相对输出目录）
    pub file: String,
    pub success: bool,
}

/// 单个场景的元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneEntry {
    /// 场景编号（从 1 开始）
    pub scene_id: usize,
    /// 场景开始时间（秒）
    pub start_time: f64,
    /// 场景结束时间（秒，不包含）
    pub end_time: f64,
    pub start_frame: u64,
    pub mid_frame: u64,
    pub end_frame: u64,
    pub frames: Vec<FrameEntry>,
}

/// 整次运行的清单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneManifest {
    /// 输入视频文件路径
    pub input_video: String,
    pub fps: f64,
    pub total_frames: u64,
    pub threshold: f64,
    /// 生成时间（RFC 3339）
    pub generated_at: String,
    pub scene_count: usize,
    pub scenes: Vec<SceneEntry>,
}

impl SceneManifest {
    pub fn from_run(
        input_video: &Path,
        fps: f64,
        threshold: f64,
        scenes: &[SceneBoundary],
        summary: &RunSummary,
    ) -> Self {
        let entries: Vec<SceneEntry> = scenes
            .iter()
            .zip(&summary.ranges)
            .enumerate()
            .map(|(i, (scene, range))| {
                let scene_id = i + 1;
                let frames = summary
                    .outcomes
                    .iter()
                    .filter(|o| o.scene_index == scene_id)
                    .map(|o| FrameEntry {
                        role: o.role,
                        frame_index: o.frame_index,
                        file: o
                            .output_path
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        success: o.success,
                    })
                    .collect();

                SceneEntry {
                    scene_id,
                    start_time: scene.start.seconds(),
                    end_time: scene.end.seconds(),
                    start_frame: range.start,
                    mid_frame: range.mid,
                    end_frame: range.end,
                    frames,
                }
            })
            .collect();

        Self {
            input_video: input_video.to_string_lossy().to_string(),
            fps,
            total_frames: summary.total_frames,
            threshold,
            generated_at: Utc::now().to_rfc3339(),
            scene_count: entries.len(),
            scenes: entries,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("创建输出目录失败")?;
        }
        let json = serde_json::to_string_pretty(self).context("序列化清单失败")?;
        std::fs::write(path, json)
            .with_context(|| format!("写入清单文件失败: {}", path.display()))?;
        Ok(())
    }
}
