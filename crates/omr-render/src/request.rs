//! Renderer request shape

/// Everything needed to print one answer sheet.
#[derive(Clone, Debug, Default)]
pub struct SheetRequest {
    pub name: String,
    pub num_questions: usize,
    pub choices_per_question: usize,
    pub exam_code: Option<String>,
    pub header_text: Option<String>,
    /// Accepted per the interface contract; rendered as a bordered slot in
    /// the header rather than rasterized (`DESIGN.md` records why full
    /// image embedding was left out of this pass).
    pub logo_bytes: Option<Vec<u8>>,
}
