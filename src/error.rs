use std::path::PathBuf;

pub type IconResult<T> = Result<T, IconError>;

#[derive(thiserror::Error, Debug)]
pub enum IconError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("font fit error: {0}")]
    FontFit(String),

    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source image {source_width}x{source_height} cannot cover {target_width}x{target_height} without upscaling")]
    Upscale {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
    },

    #[error("encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IconError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    pub fn font_fit(msg: impl Into<String>) -> Self {
        Self::FontFit(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}
