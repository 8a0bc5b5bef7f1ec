use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

use crate::processor::ProcessConfig;

/// 配置文件中读取的节
const SECTION: &str = "scene_keyframes";
/// 默认配置文件名
const CONFIG_FILE_NAME: &str = "scene-keyframes.ini";
const DEFAULT_LOG_LEVEL: &str = "info";

/// 单一来源（命令行、环境变量或配置文件）提供的配置项，未设置的为 `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub threshold: Option<f64>,
    pub min_scene_len: Option<u64>,
    pub analysis_width: Option<u32>,
    pub start_in_scene: Option<bool>,
    pub jpeg_quality: Option<u8>,
    pub output_dir: Option<PathBuf>,
    pub write_manifest: Option<bool>,
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    /// 以 `self` 为准，缺失项从 `fallback` 补齐
    pub fn or(self, fallback: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            threshold: self.threshold.or(fallback.threshold),
            min_scene_len: self.min_scene_len.or(fallback.min_scene_len),
            analysis_width: self.analysis_width.or(fallback.analysis_width),
            start_in_scene: self.start_in_scene.or(fallback.start_in_scene),
            jpeg_quality: self.jpeg_quality.or(fallback.jpeg_quality),
            output_dir: self.output_dir.or(fallback.output_dir),
            write_manifest: self.write_manifest.or(fallback.write_manifest),
            log_level: self.log_level.or(fallback.log_level),
        }
    }

    /// 缺失项使用默认值
    pub fn resolve(self) -> LoadedConfig {
        let defaults = ProcessConfig::default();
        LoadedConfig {
            process: ProcessConfig {
                threshold: self.threshold.unwrap_or(defaults.threshold),
                min_scene_len: self.min_scene_len.unwrap_or(defaults.min_scene_len),
                analysis_width: self.analysis_width.unwrap_or(defaults.analysis_width),
                start_in_scene: self.start_in_scene.unwrap_or(defaults.start_in_scene),
                jpeg_quality: self.jpeg_quality.unwrap_or(defaults.jpeg_quality),
                output_dir: self.output_dir.unwrap_or(defaults.output_dir),
                write_manifest: self.write_manifest.unwrap_or(defaults.write_manifest),
            },
            log_level: self
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }
}

/// 合并后的完整配置
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub process: ProcessConfig,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值。
    ///
    /// 显式指定的配置文件读取失败会报错；默认位置找不到文件则忽略。
    pub fn load_config(config_file: Option<&Path>, cli: ConfigOverrides) -> Result<LoadedConfig> {
        let file_config = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_from_default_locations().unwrap_or_default(),
        };

        let loaded = cli
            .or(Self::load_from_env())
            .or(file_config)
            .resolve();
        loaded.process.validate()?;
        Ok(loaded)
    }

    /// 从环境变量加载配置
    fn load_from_env() -> ConfigOverrides {
        fn var(name: &str) -> Option<String> {
            env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        ConfigOverrides {
            threshold: var("SCENE_KEYFRAMES_THRESHOLD").and_then(|v| v.trim().parse().ok()),
            min_scene_len: var("SCENE_KEYFRAMES_MIN_SCENE_LEN").and_then(|v| v.trim().parse().ok()),
            analysis_width: var("SCENE_KEYFRAMES_ANALYSIS_WIDTH").and_then(|v| v.trim().parse().ok()),
            start_in_scene: var("SCENE_KEYFRAMES_START_IN_SCENE").and_then(|v| parse_bool(&v)),
            jpeg_quality: var("SCENE_KEYFRAMES_JPEG_QUALITY").and_then(|v| v.trim().parse().ok()),
            output_dir: var("SCENE_KEYFRAMES_OUT").map(PathBuf::from),
            write_manifest: var("SCENE_KEYFRAMES_MANIFEST").and_then(|v| parse_bool(&v)),
            log_level: var("SCENE_KEYFRAMES_LOG_LEVEL"),
        }
    }

    /// 从INI配置文件加载配置
    pub fn load_from_file(config_path: &Path) -> Result<ConfigOverrides> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }

        let mut config_parser = configparser::ini::Ini::new();
        config_parser
            .load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;

        // 先读 [scene_keyframes] 节，没有则使用 [DEFAULT] 节
        let get = |key: &str| {
            config_parser
                .get(SECTION, key)
                .or_else(|| config_parser.get("DEFAULT", key))
                .filter(|v| !v.trim().is_empty())
        };

        Ok(ConfigOverrides {
            threshold: get("threshold").and_then(|v| v.trim().parse().ok()),
            min_scene_len: get("min_scene_len").and_then(|v| v.trim().parse().ok()),
            analysis_width: get("analysis_width").and_then(|v| v.trim().parse().ok()),
            start_in_scene: get("start_in_scene").and_then(|v| parse_bool(&v)),
            jpeg_quality: get("jpeg_quality").and_then(|v| v.trim().parse().ok()),
            output_dir: get("output_dir").map(PathBuf::from),
            write_manifest: get("manifest").and_then(|v| parse_bool(&v)),
            log_level: config_parser
                .get("logging", "level")
                .or_else(|| get("log_level")),
        })
    }

    /// 从默认位置加载配置文件
    fn load_from_default_locations() -> Result<ConfigOverrides> {
        let mut candidates = vec![
            // 1. 当前目录
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from(format!(".{CONFIG_FILE_NAME}")),
        ];
        // 2. 用户主目录
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(format!(".{CONFIG_FILE_NAME}")));
        }
        // 3. /etc (Linux/macOS)
        candidates.push(Path::new("/etc").join(CONFIG_FILE_NAME));

        match candidates.iter().find(|path| path.exists()) {
            Some(path) => Self::load_from_file(path),
            None => Err(anyhow::anyhow!("未找到配置文件")),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
