use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb};
use scene_keyframes::{
    extract_scenes, run_pipeline, DetectorConfig, FrameRange, FrameSource, ProcessConfig,
    RunOutcome, SceneSegmenter, VideoError,
};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::rc::Rc;

const FPS: f64 = 30.0;

/// 内存中的帧序列，模拟随机访问的解码会话
struct MemorySource {
    frames: Vec<DynamicImage>,
    cursor: usize,
    released: Rc<Cell<bool>>,
    panic_at: Option<usize>,
}

impl MemorySource {
    fn new(frames: Vec<DynamicImage>, released: Rc<Cell<bool>>) -> Self {
        Self {
            frames,
            cursor: 0,
            released,
            panic_at: None,
        }
    }
}

impl FrameSource for MemorySource {
    fn total_frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn frame_rate(&self) -> f64 {
        FPS
    }

    fn seek(&mut self, index: u64) -> Result<(), VideoError> {
        self.cursor = index as usize;
        Ok(())
    }

    fn read_frame(&mut self) -> Option<DynamicImage> {
        if self.panic_at == Some(self.cursor) {
            panic!("decoder crashed at frame {}", self.cursor);
        }
        let frame = self.frames.get(self.cursor).cloned();
        self.cursor += 1;
        frame
    }
}

impl Drop for MemorySource {
    fn drop(&mut self) {
        assert!(!self.released.get(), "source released twice");
        self.released.set(true);
    }
}

fn solid(value: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(16, 16, |_, _| Rgb([value, value, value])))
}

/// 10 秒 30fps：前 5 秒黑，后 5 秒白
fn hard_cut_clip() -> Vec<DynamicImage> {
    std::iter::repeat_with(|| solid(0))
        .take(150)
        .chain(std::iter::repeat_with(|| solid(255)).take(150))
        .collect()
}

fn config_for(out_dir: &Path) -> ProcessConfig {
    ProcessConfig {
        output_dir: out_dir.to_path_buf(),
        ..Default::default()
    }
}

fn brightness(path: &Path) -> u8 {
    let img = image::open(path).unwrap();
    let (w, h) = img.dimensions();
    img.to_luma8().get_pixel(w / 2, h / 2)[0]
}

#[test]
fn test_hard_cut_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("images");
    let config = config_for(&out_dir);

    let frames = hard_cut_clip();
    let (scenes, total) = SceneSegmenter::new(config.detector()).segment(frames.clone(), FPS);
    assert_eq!(total, 300);
    assert_eq!(scenes.len(), 2);

    let released = Rc::new(Cell::new(false));
    let source_flag = released.clone();
    let outcome = run_pipeline(&scenes, move || Ok(MemorySource::new(frames, source_flag)), &config)
        .unwrap();

    let summary = match outcome {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::NoScenes => panic!("expected scenes"),
    };
    assert!(released.get());
    assert_eq!(summary.total_frames, 300);
    assert_eq!(
        summary.ranges,
        vec![
            FrameRange { start: 0, mid: 74, end: 149 },
            FrameRange { start: 150, mid: 224, end: 299 },
        ]
    );
    assert_eq!(summary.succeeded(), 6);
    assert_eq!(summary.failed(), 0);

    let expected = [
        ("scene_001_start.jpg", 0),
        ("scene_001_mid.jpg", 74),
        ("scene_001_end.jpg", 149),
        ("scene_002_start.jpg", 150),
        ("scene_002_mid.jpg", 224),
        ("scene_002_end.jpg", 299),
    ];
    for (outcome, (name, frame)) in summary.outcomes.iter().zip(expected) {
        assert_eq!(outcome.output_path, out_dir.join(name));
        assert_eq!(outcome.frame_index, frame);
        assert!(outcome.output_path.is_file());
    }

    // 场景 1 的尾帧仍是黑色，场景 2 的首帧已经是白色
    assert!(brightness(&out_dir.join("scene_001_end.jpg")) < 16);
    assert!(brightness(&out_dir.join("scene_002_start.jpg")) > 239);

    assert_eq!(summary.output_dir, out_dir.canonicalize().unwrap());
}

#[test]
fn test_uniform_clip_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("images");
    let config = config_for(&out_dir);

    let frames: Vec<_> = std::iter::repeat_with(|| solid(128)).take(90).collect();
    let (scenes, _) = SceneSegmenter::new(config.detector()).segment(frames, FPS);
    assert!(scenes.is_empty());

    let opened = Cell::new(false);
    let outcome = run_pipeline(
        &scenes,
        || {
            opened.set(true);
            Err::<MemorySource, _>(VideoError::NoVideoStream("unused".into()))
        },
        &config,
    )
    .unwrap();

    assert!(matches!(outcome, RunOutcome::NoScenes));
    assert!(!opened.get());
    assert!(!out_dir.exists());
}

#[test]
fn test_open_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir.path().join("images"));
    let (scenes, _) = SceneSegmenter::new(DetectorConfig::default()).segment(hard_cut_clip(), FPS);

    let result = extract_scenes(
        &scenes,
        || Err::<MemorySource, _>(VideoError::NoVideoStream("broken.mp4".into())),
        &config,
    );
    assert!(result.is_err());
}

#[test]
fn test_frame_count_mismatch_is_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("images");
    let config = config_for(&out_dir);

    // 检测会话看到 300 帧，提取会话只报告 280 帧
    let (scenes, _) = SceneSegmenter::new(config.detector()).segment(hard_cut_clip(), FPS);
    let mut frames = hard_cut_clip();
    frames.truncate(280);

    let released = Rc::new(Cell::new(false));
    let flag = released.clone();
    let summary = extract_scenes(&scenes, move || Ok(MemorySource::new(frames, flag)), &config).unwrap();

    let indices: Vec<_> = summary.outcomes.iter().map(|o| o.frame_index).collect();
    assert_eq!(indices, vec![0, 74, 149, 150, 224, 279]);
    assert_eq!(summary.succeeded(), 6);
    assert!(released.get());
}

#[test]
fn test_source_released_when_extraction_panics() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir.path().join("images"));
    let (scenes, _) = SceneSegmenter::new(config.detector()).segment(hard_cut_clip(), FPS);

    let released = Rc::new(Cell::new(false));
    let flag = released.clone();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        extract_scenes(
            &scenes,
            move || {
                let mut source = MemorySource::new(hard_cut_clip(), flag);
                source.panic_at = Some(150);
                Ok(source)
            },
            &config,
        )
    }));

    assert!(result.is_err());
    assert!(released.get());
    // 崩溃之前的场景已经写出
    assert!(dir.path().join("images").join("scene_001_end.jpg").is_file());
}
