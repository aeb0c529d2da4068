//! Renderer error type

/// Errors a sheet render can fail with.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("no question template is registered for {num_questions} questions")]
    TemplateUnknown { num_questions: usize },

    #[error("failed to write rendered PDF: {0}")]
    RendererIOError(#[from] std::io::Error),
}
