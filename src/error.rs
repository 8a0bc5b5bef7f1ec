use ffmpeg_next as ffmpeg;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 打开 / 解码视频时的错误
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("初始化 FFmpeg 失败: {0}")]
    Init(#[source] ffmpeg::Error),

    /// 无法打开视频（路径无效或无法解码），整个流程的致命错误
    #[error("无法打开视频文件 {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: ffmpeg::Error,
    },

    #[error("未找到视频流: {}", .0.display())]
    NoVideoStream(PathBuf),

    #[error("无法创建视频解码器: {0}")]
    Decoder(#[source] ffmpeg::Error),

    #[error("Seek 失败: {0}")]
    Seek(#[source] ffmpeg::Error),
}

/// 单帧读取失败（已经重试过）
#[derive(Debug, Error)]
pub enum FrameReadFailure {
    #[error("seek 到第 {index} 帧失败: {source}")]
    Seek {
        index: u64,
        #[source]
        source: VideoError,
    },

    #[error("第 {index} 帧读取失败（共尝试 {attempts} 次）")]
    Exhausted { index: u64, attempts: u32 },
}

/// 单帧写入失败
#[derive(Debug, Error)]
pub enum FrameWriteFailure {
    #[error("写入 {} 失败: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("编码 {} 失败: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// 一个代表帧的提取失败，只会被记录进结果，不会中断批处理
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("视频没有可用帧")]
    EmptyVideo,

    #[error(transparent)]
    Read(#[from] FrameReadFailure),

    #[error(transparent)]
    Write(#[from] FrameWriteFailure),
}

/// 流程级错误：只有打开失败和配置错误会越过编排层
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Video(#[from] VideoError),

    #[error("配置无效: {0}")]
    Config(String),
}
