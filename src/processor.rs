use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::error::{ExtractError, VideoError};
use crate::extractor::{ExtractionOutcome, FrameExtractor, DEFAULT_JPEG_QUALITY};
use crate::metadata::SceneManifest;
use crate::scene_detector::{
    detect_video_scenes, DetectorConfig, SceneBoundary, DEFAULT_ANALYSIS_WIDTH,
    DEFAULT_MIN_SCENE_LEN, DEFAULT_THRESHOLD,
};
use crate::selector::{select_frames, FrameRange};
use crate::video_source::{FfmpegSource, FrameSource};

/// 清单文件名
pub const MANIFEST_FILE_NAME: &str = "scenes.json";

/// 关键帧提取配置
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessConfig {
    /// 场景变化检测阈值（HSV 平均绝对差，0-255），越低越敏感
    pub threshold: f64,
    /// 最短场景长度（帧）
    pub min_scene_len: u64,
    /// 场景检测时缩放到的宽度，0 表示不缩放
    pub analysis_width: u32,
    /// 没有切换点时把整段视频当作一个场景
    pub start_in_scene: bool,
    /// JPEG 质量（1-100）
    pub jpeg_quality: u8,
    /// 输出目录
    pub output_dir: PathBuf,
    /// 是否写入 scenes.json
    pub write_manifest: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_scene_len: DEFAULT_MIN_SCENE_LEN,
            analysis_width: DEFAULT_ANALYSIS_WIDTH,
            start_in_scene: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            output_dir: PathBuf::from("images"),
            write_manifest: false,
        }
    }
}

impl ProcessConfig {
    pub fn detector(&self) -> DetectorConfig {
        DetectorConfig {
            threshold: self.threshold,
            min_scene_len: self.min_scene_len,
            analysis_width: self.analysis_width,
            start_in_scene: self.start_in_scene,
        }
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ExtractError::Config(format!(
                "threshold 必须是非负数，当前为 {}",
                self.threshold
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ExtractError::Config(format!(
                "jpeg_quality 必须在 1-100 之间，当前为 {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// 一次运行的结果
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// 没有检测到场景，未输出任何文件
    NoScenes,
    Completed(RunSummary),
}

/// 提取汇总
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// 输出目录（已解析为绝对路径）
    pub output_dir: PathBuf,
    pub total_frames: u64,
    pub ranges: Vec<FrameRange>,
    pub outcomes: Vec<ExtractionOutcome>,
}

impl RunSummary {
    pub fn scene_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// 处理视频文件：检测场景，再为每个场景保存首/中/尾三帧。
///
/// 只有视频无法打开（或配置无效）时返回错误；没有场景、单帧失败都记录在结果里。
pub fn process_video(
    input_video_path: impl AsRef<Path>,
    config: &ProcessConfig,
) -> Result<RunOutcome, ExtractError> {
    let input_video_path = input_video_path.as_ref();
    config.validate()?;

    let total_start = Instant::now();
    info!("🎬 [视频处理] 开始处理视频: {}", input_video_path.display());

    // 1. 场景检测（独立的解码会话）
    let detect_start = Instant::now();
    let detection = detect_video_scenes(input_video_path, &config.detector())?;
    info!(
        "✅ [视频处理] 场景检测完成，耗时: {:.2}秒，扫描 {} 帧",
        detect_start.elapsed().as_secs_f64(),
        detection.frames_scanned
    );

    // 2. 提取关键帧（随机访问的解码会话）
    let outcome = run_pipeline(
        &detection.scenes,
        || FfmpegSource::open(input_video_path),
        config,
    )?;

    // 3. 写入清单
    if let RunOutcome::Completed(summary) = &outcome {
        if config.write_manifest {
            let manifest = SceneManifest::from_run(
                input_video_path,
                detection.fps,
                config.threshold,
                &detection.scenes,
                summary,
            );
            let manifest_path = config.output_dir.join(MANIFEST_FILE_NAME);
            match manifest.write_to(&manifest_path) {
                Ok(()) => info!("📝 [视频处理] 清单已保存到: {}", manifest_path.display()),
                Err(e) => warn!("⚠️  [视频处理] 写入清单失败: {:#}", e),
            }
        }
    }

    info!(
        "🎉 [视频处理] 处理完成！总耗时: {:.2}秒",
        total_start.elapsed().as_secs_f64()
    );
    Ok(outcome)
}

/// 场景列表为空时直接结束（不打开帧源、不创建输出目录），否则提取
pub fn run_pipeline<S, F>(
    scenes: &[SceneBoundary],
    open_source: F,
    config: &ProcessConfig,
) -> Result<RunOutcome, ExtractError>
where
    S: FrameSource,
    F: FnOnce() -> Result<S, VideoError>,
{
    if scenes.is_empty() {
        warn!(
            "⚠️  [视频处理] 没有检测到任何场景，可以尝试降低 --threshold（当前 {:.1}）",
            config.threshold
        );
        return Ok(RunOutcome::NoScenes);
    }

    extract_scenes(scenes, open_source, config).map(RunOutcome::Completed)
}

/// 打开帧源，按顺序为每个场景选帧并提取。
///
/// 帧源归本函数所有，无论提取过程中是否 panic 都会在离开作用域时释放。
pub fn extract_scenes<S, F>(
    scenes: &[SceneBoundary],
    open_source: F,
    config: &ProcessConfig,
) -> Result<RunSummary, ExtractError>
where
    S: FrameSource,
    F: FnOnce() -> Result<S, VideoError>,
{
    let mut source = open_source()?;
    let total_frames = source.total_frame_count();
    info!(
        "📊 [视频处理] 场景数: {} | 总帧数: {}",
        scenes.len(),
        total_frames
    );

    let extractor = FrameExtractor::new(&config.output_dir, config.jpeg_quality);
    let mut ranges = Vec::with_capacity(scenes.len());
    let mut outcomes = Vec::with_capacity(scenes.len() * 3);

    for (i, scene) in scenes.iter().enumerate() {
        let scene_index = i + 1;
        let range = select_frames(scene);
        let scene_outcomes = extractor.extract_scene(&mut source, scene_index, &range);

        info!(
            "[Scene {:03}] frames [{}, {}, {}] -> saved: start={}, mid={}, end={}",
            scene_index,
            range.start,
            range.mid,
            range.end,
            scene_outcomes[0].success,
            scene_outcomes[1].success,
            scene_outcomes[2].success
        );

        ranges.push(range);
        outcomes.extend(scene_outcomes);
    }

    drop(source);

    let summary = RunSummary {
        output_dir: resolve_dir(&config.output_dir),
        total_frames,
        ranges,
        outcomes,
    };
    info!(
        "✅ [视频处理] 完成！图片已保存到: {}（成功 {} 张，失败 {} 张）",
        summary.output_dir.display(),
        summary.succeeded(),
        summary.failed()
    );
    Ok(summary)
}

/// 解析为绝对路径；目录不存在时基于当前目录拼接
fn resolve_dir(dir: &Path) -> PathBuf {
    dir.canonicalize().unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProcessConfig::default();
        assert_eq!(config.threshold, 27.0);
        assert_eq!(config.output_dir, PathBuf::from("images"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let negative = ProcessConfig {
            threshold: -1.0,
            ..Default::default()
        };
        assert!(matches!(negative.validate(), Err(ExtractError::Config(_))));

        let nan = ProcessConfig {
            threshold: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());

        let quality = ProcessConfig {
            jpeg_quality: 101,
            ..Default::default()
        };
        assert!(quality.validate().is_err());
    }

    #[test]
    fn test_detector_config_is_threaded_through() {
        let config = ProcessConfig {
            threshold: 12.5,
            min_scene_len: 3,
            analysis_width: 0,
            start_in_scene: true,
            ..Default::default()
        };
        let detector = config.detector();
        assert_eq!(detector.threshold, 12.5);
        assert_eq!(detector.min_scene_len, 3);
        assert_eq!(detector.analysis_width, 0);
        assert!(detector.start_in_scene);
    }

    #[test]
    fn test_missing_video_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessConfig {
            output_dir: dir.path().join("images"),
            ..Default::default()
        };
        let result = process_video(dir.path().join("missing.mp4"), &config);
        assert!(matches!(
            result,
            Err(ExtractError::Video(VideoError::Open { .. }))
        ));
        assert!(!dir.path().join("images").exists());
    }
}
