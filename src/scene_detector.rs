use image::{DynamicImage, RgbImage};
use std::path::Path;
use tracing::{debug, info};

use crate::error::VideoError;
use crate::video_source::{FfmpegSource, FrameSource};

/// 默认阈值（HSV 平均绝对差，0-255）
pub const DEFAULT_THRESHOLD: f64 = 27.0;
/// 默认最短场景长度（帧）
pub const DEFAULT_MIN_SCENE_LEN: u64 = 15;
/// 默认分析宽度
pub const DEFAULT_ANALYSIS_WIDTH: u32 = 256;

/// 帧精度的时间码
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timecode {
    frame: u64,
    fps: f64,
}

impl Timecode {
    pub fn new(frame: u64, fps: f64) -> Self {
        Self { frame, fps }
    }

    pub fn frames(&self) -> u64 {
        self.frame
    }

    pub fn seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// 一个场景，`end` 是下一个场景的起点（不包含）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneBoundary {
    pub start: Timecode,
    pub end: Timecode,
}

/// 场景检测配置
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// 场景切换阈值，越低越敏感
    pub threshold: f64,
    /// 最短场景长度（帧），0 表示不限制
    pub min_scene_len: u64,
    /// 分析前缩放到的宽度，0 表示不缩放
    pub analysis_width: u32,
    /// 没有检测到切换点时，是否把整段视频当作一个场景
    pub start_in_scene: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_scene_len: DEFAULT_MIN_SCENE_LEN,
            analysis_width: DEFAULT_ANALYSIS_WIDTH,
            start_in_scene: false,
        }
    }
}

/// 一帧的 HSV 平面（H: 0-179，S/V: 0-255）
struct HsvPlanes {
    width: u32,
    height: u32,
    hue: Vec<u8>,
    sat: Vec<u8>,
    val: Vec<u8>,
}

impl HsvPlanes {
    fn from_rgb(img: &RgbImage) -> Self {
        let len = (img.width() * img.height()) as usize;
        let mut hue = Vec::with_capacity(len);
        let mut sat = Vec::with_capacity(len);
        let mut val = Vec::with_capacity(len);

        for pixel in img.pixels() {
            let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
            hue.push(h);
            sat.push(s);
            val.push(v);
        }

        Self {
            width: img.width(),
            height: img.height(),
            hue,
            sat,
            val,
        }
    }
}

/// RGB 转 HSV，使用 H 0-179 / S,V 0-255 的刻度
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = f32::from(r);
    let g = f32::from(g);
    let b = f32::from(b);

    let max = r.max(g.max(b));
    let min = r.min(g.min(b));
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    let s = if max == 0.0 { 0.0 } else { 255.0 * delta / max };

    ((h / 2.0).round().min(179.0) as u8, s.round() as u8, max as u8)
}

fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let sum: u64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum();
    sum as f64 / a.len() as f64
}

/// 内容差异检测器。
///
/// 分数是相邻两帧在 H、S、V 三个通道上平均绝对差的均值，范围 0-255：
/// 纯黑切到纯白的分数是 85。尺寸不同的两帧记为 255。
pub struct ContentDetector {
    threshold: f64,
    min_scene_len: u64,
    last_frame: Option<HsvPlanes>,
    last_cut: u64,
}

impl ContentDetector {
    pub fn new(threshold: f64, min_scene_len: u64) -> Self {
        Self {
            threshold,
            min_scene_len,
            last_frame: None,
            last_cut: 0,
        }
    }

    /// 计算两帧之间的差异分数
    pub fn frame_score(frame1: &DynamicImage, frame2: &DynamicImage) -> f64 {
        let a = HsvPlanes::from_rgb(&frame1.to_rgb8());
        let b = HsvPlanes::from_rgb(&frame2.to_rgb8());
        Self::planes_score(&a, &b)
    }

    fn planes_score(a: &HsvPlanes, b: &HsvPlanes) -> f64 {
        if a.width != b.width || a.height != b.height {
            return 255.0;
        }
        (mean_abs_diff(&a.hue, &b.hue) + mean_abs_diff(&a.sat, &b.sat) + mean_abs_diff(&a.val, &b.val))
            / 3.0
    }

    /// 处理第 `index` 帧，若在此帧切换场景则返回 `Some(index)`
    pub fn process_frame(&mut self, index: u64, frame: &DynamicImage) -> Option<u64> {
        let planes = HsvPlanes::from_rgb(&frame.to_rgb8());

        let cut = match &self.last_frame {
            Some(prev) => {
                let score = Self::planes_score(prev, &planes);
                let long_enough = index - self.last_cut >= self.min_scene_len;
                if score > self.threshold && long_enough {
                    debug!("第 {} 帧检测到场景切换，分数 {:.2}", index, score);
                    Some(index)
                } else {
                    None
                }
            }
            None => None,
        };

        if let Some(cut) = cut {
            self.last_cut = cut;
        }
        self.last_frame = Some(planes);
        cut
    }
}

/// 场景切分器：顺序扫描一遍，输出连续、完整覆盖视频的场景列表
pub struct SceneSegmenter {
    config: DetectorConfig,
}

impl SceneSegmenter {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// 对一个顺序帧序列做场景切分。
    ///
    /// 返回 `(场景列表, 扫描的帧数)`。
    pub fn segment<I>(&self, frames: I, fps: f64) -> (Vec<SceneBoundary>, u64)
    where
        I: IntoIterator<Item = DynamicImage>,
    {
        let mut detector = ContentDetector::new(self.config.threshold, self.config.min_scene_len);
        let mut cuts = Vec::new();
        let mut frame_count = 0u64;

        for (index, frame) in (0u64..).zip(frames) {
            if let Some(cut) = detector.process_frame(index, &frame) {
                cuts.push(cut);
            }
            frame_count = index + 1;
            if frame_count % 1000 == 0 {
                debug!("已分析 {} 帧，切换点 {} 个", frame_count, cuts.len());
            }
        }

        let scenes = scenes_from_cuts(&cuts, frame_count, fps, self.config.start_in_scene);
        (scenes, frame_count)
    }

    /// 从帧源当前位置读到结尾并切分
    pub fn segment_source<S: FrameSource + ?Sized>(&self, source: &mut S) -> (Vec<SceneBoundary>, u64) {
        let fps = source.frame_rate();
        self.segment(std::iter::from_fn(|| source.read_frame()), fps)
    }
}

/// 把切换点转换为场景列表。
///
/// 没有帧时返回空列表；没有切换点时，除非 `start_in_scene`，也返回空列表。
pub fn scenes_from_cuts(
    cuts: &[u64],
    total_frames: u64,
    fps: f64,
    start_in_scene: bool,
) -> Vec<SceneBoundary> {
    if total_frames == 0 || (cuts.is_empty() && !start_in_scene) {
        return Vec::new();
    }

    let starts = std::iter::once(0).chain(cuts.iter().copied());
    let ends = cuts.iter().copied().chain(std::iter::once(total_frames));

    starts
        .zip(ends)
        .filter(|(start, end)| start < end)
        .map(|(start, end)| SceneBoundary {
            start: Timecode::new(start, fps),
            end: Timecode::new(end, fps),
        })
        .collect()
}

/// 场景检测结果
#[derive(Debug, Clone)]
pub struct SceneDetection {
    pub scenes: Vec<SceneBoundary>,
    pub fps: f64,
    pub frames_scanned: u64,
}

/// 打开独立的解码会话，扫描整段视频并切分场景
pub fn detect_video_scenes(
    path: impl AsRef<Path>,
    config: &DetectorConfig,
) -> Result<SceneDetection, VideoError> {
    let path = path.as_ref();
    let mut source = FfmpegSource::open_scaled(path, config.analysis_width)?;
    let fps = source.frame_rate();

    info!(
        "⏳ [场景检测] 开始扫描: {} (threshold={:.1}, min_scene_len={})",
        path.display(),
        config.threshold,
        config.min_scene_len
    );
    let (scenes, frames_scanned) = SceneSegmenter::new(config.clone()).segment_source(&mut source);

    Ok(SceneDetection {
        scenes,
        fps,
        frames_scanned,
    })
}
