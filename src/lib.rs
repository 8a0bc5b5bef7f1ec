pub mod config;
pub mod error;
pub mod extractor;
pub mod metadata;
pub mod processor;
pub mod scene_detector;
pub mod selector;
pub mod video_source;

pub use config::{ConfigLoader, ConfigOverrides, LoadedConfig};
pub use error::{ExtractError, FrameError, FrameReadFailure, FrameWriteFailure, VideoError};
pub use extractor::{ExtractionOutcome, FrameExtractor, FrameRole};
pub use metadata::SceneManifest;
pub use processor::{extract_scenes, process_video, run_pipeline, ProcessConfig, RunOutcome, RunSummary};
pub use scene_detector::{detect_video_scenes, DetectorConfig, SceneBoundary, SceneSegmenter, Timecode};
pub use selector::{select_frames, FrameRange};
pub use video_source::{seek_and_read, FfmpegSource, FrameSource};
