use thiserror::Error;

use crate::{application::render::RenderConfigError, config::LoadError, infra::error::InfraError};

/// Failures surfaced by the binary. The render pipeline itself never fails;
/// everything here happens around it.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Render(#[from] RenderConfigError),
}

impl AppError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Infra(InfraError::Io(_)) => 3,
            AppError::Infra(_) | AppError::Render(_) => 1,
        }
    }
}
