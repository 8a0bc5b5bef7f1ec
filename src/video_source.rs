use ffmpeg_next as ffmpeg;
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{FrameReadFailure, VideoError};

/// seek 之后最多读取的次数：首次读取 + 一次重试
pub const MAX_READ_ATTEMPTS: u32 = 2;

/// 帧率无法从容器读取时使用的默认值
const DEFAULT_FPS: f64 = 30.0;

/// 按帧号随机访问的帧源
pub trait FrameSource {
    /// 视频总帧数，未知时为 0
    fn total_frame_count(&self) -> u64;

    fn frame_rate(&self) -> f64;

    /// 定位到 `index`，下一次 `read_frame` 返回该帧
    fn seek(&mut self, index: u64) -> Result<(), VideoError>;

    /// 解码下一帧，流结束或解码失败时返回 `None`
    fn read_frame(&mut self) -> Option<DynamicImage>;
}

/// 定位并读取一帧。
///
/// 部分解码后端在 seek 之后需要多读一次才能拿到帧，所以读取失败时
/// 不重新 seek，直接再读一次；最多 [`MAX_READ_ATTEMPTS`] 次。
pub fn seek_and_read<S: FrameSource + ?Sized>(
    source: &mut S,
    index: u64,
) -> Result<DynamicImage, FrameReadFailure> {
    source
        .seek(index)
        .map_err(|source| FrameReadFailure::Seek { index, source })?;

    let mut attempts = 0;
    while attempts < MAX_READ_ATTEMPTS {
        attempts += 1;
        if let Some(frame) = source.read_frame() {
            if attempts > 1 {
                debug!("第 {} 帧在第 {} 次读取时成功", index, attempts);
            }
            return Ok(frame);
        }
    }

    Err(FrameReadFailure::Exhausted { index, attempts })
}

/// 基于 FFmpeg 的帧源，持有一个独立的解码会话。
///
/// 解码器、缩放器和输入上下文在 drop 时释放。
pub struct FfmpegSource {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    converter: RgbConverter,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    start_pts: i64,
    fps: f64,
    total_frames: u64,
    /// seek 之后等待的目标帧号
    pending_target: Option<u64>,
    eof_sent: bool,
}

impl FfmpegSource {
    /// 以原始分辨率打开，用于提取输出帧
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        Self::open_scaled(path, 0)
    }

    /// 打开并把输出缩放到 `target_width` 宽（保持宽高比）。
    /// `target_width` 为 0 或不小于原始宽度时不缩放。
    pub fn open_scaled(path: impl AsRef<Path>, target_width: u32) -> Result<Self, VideoError> {
        let path = path.as_ref();
        init_ffmpeg()?;

        let input = ffmpeg::format::input(&path).map_err(|source| VideoError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| VideoError::NoVideoStream(path.to_path_buf()))?;

        let stream_index = stream.index();
        let time_base = stream.time_base();
        // AV_NOPTS_VALUE 是 i64::MIN
        let start_pts = stream.start_time().max(0);
        let fps = frame_rate_of(&stream);
        let total_frames = estimate_frame_count(&stream, input.duration(), fps);

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(VideoError::Decoder)?;

        let (out_width, out_height) = scaled_size(decoder.width(), decoder.height(), target_width);
        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            out_width,
            out_height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(VideoError::Decoder)?;

        debug!(
            "打开视频 {}: {}x{} -> {}x{}, {:.3} fps, {} 帧, 起始 pts {}",
            path.display(),
            decoder.width(),
            decoder.height(),
            out_width,
            out_height,
            fps,
            total_frames,
            start_pts
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            decoder,
            converter: RgbConverter::new(scaler),
            stream_index,
            time_base,
            start_pts,
            fps,
            total_frames,
            pending_target: None,
            eof_sent: false,
        })
    }

    /// 从解码器取出下一帧，必要时继续送入数据包
    fn next_decoded(&mut self) -> Option<ffmpeg::frame::Video> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Some(decoded);
            }
            if self.eof_sent {
                return None;
            }

            let mut fed = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                // 损坏的数据包直接跳过
                if self.decoder.send_packet(&packet).is_ok() {
                    fed = true;
                    break;
                }
            }

            if !fed {
                // 处理解码器中剩余的帧
                if self.decoder.send_eof().is_err() {
                    return None;
                }
                self.eof_sent = true;
            }
        }
    }
}

impl FrameSource for FfmpegSource {
    fn total_frame_count(&self) -> u64 {
        self.total_frames
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn seek(&mut self, index: u64) -> Result<(), VideoError> {
        // 向前找最近的关键帧，之后在 read_frame 里解码到目标帧
        let timestamp = seek_timestamp(index, self.fps, self.start_pts, self.time_base);
        self.input
            .seek(timestamp, ..timestamp)
            .map_err(VideoError::Seek)?;

        self.decoder.flush();
        self.converter.clear();
        self.eof_sent = false;
        self.pending_target = Some(index);
        Ok(())
    }

    fn read_frame(&mut self) -> Option<DynamicImage> {
        loop {
            let decoded = match self.converter.take_held() {
                Some(held) => held,
                None => self.next_decoded()?,
            };

            if let Some(target) = self.pending_target {
                let current = decoded
                    .timestamp()
                    .map(|pts| pts_to_frame_index(pts, self.start_pts, self.time_base, self.fps));
                if current.is_some_and(|current| current < target) {
                    continue;
                }
            }

            let image = self.converter.convert(decoded)?;
            self.pending_target = None;
            return Some(image);
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        debug!("释放视频: {}", self.path.display());
    }
}

/// 把解码帧转换成 RGB8 图像。
///
/// 转换失败时保留这一帧，下一次读取会再转换它，而不是取后面的帧。
struct RgbConverter {
    scaler: ffmpeg::software::scaling::Context,
    held: Option<ffmpeg::frame::Video>,
}

impl RgbConverter {
    fn new(scaler: ffmpeg::software::scaling::Context) -> Self {
        Self { scaler, held: None }
    }

    fn take_held(&mut self) -> Option<ffmpeg::frame::Video> {
        self.held.take()
    }

    fn clear(&mut self) {
        self.held = None;
    }

    fn convert(&mut self, decoded: ffmpeg::frame::Video) -> Option<DynamicImage> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
            warn!("缩放帧失败: {}", e);
            self.held = Some(decoded);
            return None;
        }

        let image = frame_to_image(&rgb_frame);
        if image.is_none() {
            warn!("RGB 帧数据不完整");
            self.held = Some(decoded);
        }
        image
    }
}

/// 初始化 FFmpeg，并把库日志降到 ERROR 级别
fn init_ffmpeg() -> Result<(), VideoError> {
    ffmpeg::init().map_err(VideoError::Init)?;
    ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
    Ok(())
}

fn frame_rate_of(stream: &ffmpeg::format::stream::Stream) -> f64 {
    [stream.avg_frame_rate(), stream.rate()]
        .into_iter()
        .find(|rate| rate.numerator() > 0 && rate.denominator() > 0)
        .map(f64::from)
        .unwrap_or(DEFAULT_FPS)
}

fn seconds_of(ticks: i64, time_base: ffmpeg::Rational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    ticks as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator())
}

/// 把流时间戳换算成从 0 开始的帧号（四舍五入）
fn pts_to_frame_index(pts: i64, start_pts: i64, time_base: ffmpeg::Rational, fps: f64) -> u64 {
    let seconds = seconds_of(pts - start_pts, time_base);
    (seconds * fps).round().max(0.0) as u64
}

/// 帧号对应的 seek 时间戳（AV_TIME_BASE 单位），包含流的起始偏移
fn seek_timestamp(index: u64, fps: f64, start_pts: i64, time_base: ffmpeg::Rational) -> i64 {
    let seconds = seconds_of(start_pts, time_base) + index as f64 / fps;
    (seconds * ffmpeg::ffi::AV_TIME_BASE as f64) as i64
}

fn estimate_frame_count(
    stream: &ffmpeg::format::stream::Stream,
    container_duration: i64,
    fps: f64,
) -> u64 {
    let stream_seconds = if stream.duration() > 0 {
        seconds_of(stream.duration(), stream.time_base())
    } else {
        0.0
    };
    let container_seconds = if container_duration > 0 {
        container_duration as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
    } else {
        0.0
    };

    frame_count_from(stream.frames(), stream_seconds, container_seconds, fps)
}

/// 容器报告的帧数；没有时用时长 × 帧率估算，流时长优先于容器时长
fn frame_count_from(reported: i64, stream_seconds: f64, container_seconds: f64, fps: f64) -> u64 {
    if reported > 0 {
        return reported as u64;
    }

    let seconds = if stream_seconds > 0.0 {
        stream_seconds
    } else {
        container_seconds.max(0.0)
    };
    (seconds * fps).round() as u64
}

/// 计算缩放后的尺寸，高度保持偶数
fn scaled_size(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    if target_width == 0 || target_width >= width || width == 0 {
        return (width, height);
    }
    let scaled_height = (u64::from(height) * u64::from(target_width) / u64::from(width)) as u32;
    (target_width, (scaled_height & !1).max(2))
}

/// 将 RGB24 帧转换为 DynamicImage（逐行拷贝，跳过行尾填充）
fn frame_to_image(frame: &ffmpeg::frame::Video) -> Option<DynamicImage> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let row_bytes = width * 3;
    let mut pixels = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
        let row_start = y * stride;
        pixels.extend_from_slice(data.get(row_start..row_start + row_bytes)?);
    }

    RgbImage::from_raw(frame.width(), frame.height(), pixels).map(DynamicImage::ImageRgb8)
}
