pub type FlowResult<T> = Result<T, FlowError>;

#[derive(thiserror::Error, Debug)]
pub enum FlowError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("animation error: {0}")]
    Animation(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("export error: {0}")]
    Export(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn animation(msg: impl Into<String>) -> Self {
        Self::Animation(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            FlowError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            FlowError::animation("x")
                .to_string()
                .contains("animation error:")
        );
        assert!(FlowError::render("x").to_string().contains("render error:"));
        assert!(FlowError::export("x").to_string().contains("export error:"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = FlowError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
