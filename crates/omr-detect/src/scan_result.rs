//! Output type for one completed decode, and the source-of-capture tag that
//! governs which preprocessing/estimator/threshold path a decode takes.

use serde::{Deserialize, Serialize};

use crate::bubble::{AnswerMark, BubbleKind};

/// Where the image being decoded came from — governs which preprocessing
/// steps run, which bubble estimator is used, and which adaptive-threshold
/// baselines apply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Camera,
    Upload,
}

impl Source {
    pub fn is_camera(self) -> bool {
        matches!(self, Source::Camera)
    }
}

/// One sampled bubble's score and the threshold it was judged against,
/// present only when a decode opts into `capture_bubble_debug`
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BubbleDebug {
    pub kind: BubbleKind,
    /// 1-based ID column or question number.
    pub index: usize,
    /// Row within the ID column, or choice index within the question.
    pub choice: usize,
    pub score: f32,
    pub threshold: f32,
}

/// Result of decoding one answer sheet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanResult {
    /// One entry per ID column; `None` when that column's marks were blank
    /// or ambiguous
    pub student_id: Vec<Option<u8>>,
    /// One entry per question, 1-indexed position implied by the index + 1.
    pub answers: Vec<AnswerMark>,
    /// 1-based question numbers where a second choice also cleared its
    /// adaptive threshold within 40% of the primary mark.
    pub multiple_answer_questions: Vec<usize>,
    /// 1-based ID column indices where a second row also cleared its
    /// adaptive threshold within 50% of the primary mark.
    pub id_double_shade_columns: Vec<usize>,
    /// `false` only when detection fell back to the full-frame quad.
    pub markers_found: bool,
    pub source_hint: Source,
    /// Present only when sheet decoding ran with bubble-level debug capture enabled.
    pub bubble_debug: Option<Vec<BubbleDebug>>,
}
