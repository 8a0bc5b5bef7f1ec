use anyhow::{Context, Result};
use clap::Parser;
use scene_keyframes::{process_video, ConfigLoader, ConfigOverrides, RunOutcome};
use std::path::PathBuf;

/// 场景关键帧提取工具 - 检测镜头切换，为每个场景保存首/中/尾三帧
#[derive(Parser, Debug)]
#[command(name = "scene-keyframes")]
#[command(about = "检测视频场景，并为每个场景保存 start/mid/end 三张 JPG", long_about = None)]
struct Args {
    /// 输入视频文件路径
    video: PathBuf,

    /// 输出目录（默认: images）
    #[arg(long)]
    out: Option<PathBuf>,

    /// 场景切换阈值（HSV 平均差异，0-255；越低越敏感，默认 27.0）
    /// 可通过环境变量 SCENE_KEYFRAMES_THRESHOLD 或配置文件设置
    #[arg(long)]
    threshold: Option<f64>,

    /// 最短场景长度（帧，默认 15）
    #[arg(long)]
    min_scene_len: Option<u64>,

    /// 场景检测前缩放到的宽度，0 表示不缩放（默认 256）
    #[arg(long)]
    analysis_width: Option<u32>,

    /// JPEG 质量 1-100（默认 95）
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// 没有检测到切换点时，把整段视频当作一个场景
    #[arg(long, overrides_with = "no_start_in_scene")]
    start_in_scene: bool,

    /// 关闭 --start-in-scene（覆盖环境变量和配置文件）
    #[arg(long, overrides_with = "start_in_scene")]
    no_start_in_scene: bool,

    /// 在输出目录写入 scenes.json 清单
    #[arg(long, overrides_with = "no_manifest")]
    manifest: bool,

    /// 不写 scenes.json（覆盖环境变量和配置文件）
    #[arg(long, overrides_with = "manifest")]
    no_manifest: bool,

    /// 配置文件路径（可选，支持 .ini 格式）
    /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    #[arg(long)]
    config: Option<PathBuf>,

    /// 日志级别（trace, debug, info, warn, error）
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            threshold: self.threshold,
            min_scene_len: self.min_scene_len,
            analysis_width: self.analysis_width,
            start_in_scene: switch(self.start_in_scene, self.no_start_in_scene),
            jpeg_quality: self.jpeg_quality,
            output_dir: self.out.clone(),
            write_manifest: switch(self.manifest, self.no_manifest),
            log_level: self.log_level.clone(),
        }
    }
}

/// 成对的开关参数：都没给时交给环境变量和配置文件决定
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = ConfigLoader::load_config(args.config.as_deref(), args.overrides())
        .context("加载配置失败")?;

    // 初始化日志
    let level = loaded
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let config = loaded.process;
    tracing::info!(
        "使用配置: threshold={:.2}, min_scene_len={}, analysis_width={}, out={}",
        config.threshold,
        config.min_scene_len,
        config.analysis_width,
        config.output_dir.display()
    );

    let outcome = process_video(&args.video, &config)
        .with_context(|| format!("处理视频失败: {}", args.video.display()))?;

    match outcome {
        RunOutcome::NoScenes => {
            tracing::info!("没有输出任何图片");
        }
        RunOutcome::Completed(summary) => {
            tracing::info!(
                "共 {} 个场景，成功保存 {} 张，失败 {} 张。输出目录: {}",
                summary.scene_count(),
                summary.succeeded(),
                summary.failed(),
                summary.output_dir.display()
            );
        }
    }

    Ok(())
}
