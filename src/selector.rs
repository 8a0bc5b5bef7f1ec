use crate::extractor::FrameRole;
use crate::scene_detector::SceneBoundary;

/// 一个场景的三个代表帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub start: u64,
    pub mid: u64,
    pub end: u64,
}

impl FrameRange {
    pub fn index_of(&self, role: FrameRole) -> u64 {
        match role {
            FrameRole::Start => self.start,
            FrameRole::Mid => self.mid,
            FrameRole::End => self.end,
        }
    }
}

/// 把场景的半开区间转换成闭区间帧号，并选出首/中/尾三帧。
///
/// `end` 是下一个场景的起点，所以场景的最后一帧是 `end - 1`。
/// 区间为空或倒置时，尾帧退化为首帧；中间帧向前取整。
pub fn select_frames(scene: &SceneBoundary) -> FrameRange {
    let start = scene.start.frames();
    let mut end = scene.end.frames().saturating_sub(1);
    if end < start {
        end = start;
    }
    let mid = (start + end) / 2;

    FrameRange { start, mid, end }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_detector::Timecode;

    fn scene(start: u64, end: u64) -> SceneBoundary {
        SceneBoundary {
            start: Timecode::new(start, 30.0),
            end: Timecode::new(end, 30.0),
        }
    }

    #[test]
    fn test_end_is_exclusive() {
        assert_eq!(
            select_frames(&scene(0, 150)),
            FrameRange { start: 0, mid: 74, end: 149 }
        );
        assert_eq!(
            select_frames(&scene(150, 300)),
            FrameRange { start: 150, mid: 224, end: 299 }
        );
    }

    #[test]
    fn test_zero_length_scene_collapses_to_start() {
        let range = select_frames(&scene(42, 42));
        assert_eq!(range, FrameRange { start: 42, mid: 42, end: 42 });
    }

    #[test]
    fn test_inverted_scene_collapses_to_start() {
        let range = select_frames(&scene(10, 3));
        assert_eq!(range, FrameRange { start: 10, mid: 10, end: 10 });

        let range = select_frames(&scene(0, 0));
        assert_eq!(range, FrameRange { start: 0, mid: 0, end: 0 });
    }

    #[test]
    fn test_mid_rounds_toward_earlier_frame() {
        assert_eq!(select_frames(&scene(10, 14)).mid, 11);
        assert_eq!(select_frames(&scene(10, 12)).mid, 10);
    }

    #[test]
    fn test_range_is_ordered() {
        for (start, end) in [(0, 1), (5, 6), (5, 100), (7, 2), (0, 0)] {
            let range = select_frames(&scene(start, end));
            assert!(range.start <= range.mid);
            assert!(range.mid <= range.end);
        }
    }

    #[test]
    fn test_index_of_role() {
        let range = select_frames(&scene(0, 150));
        assert_eq!(range.index_of(FrameRole::Start), 0);
        assert_eq!(range.index_of(FrameRole::Mid), 74);
        assert_eq!(range.index_of(FrameRole::End), 149);
    }
}
