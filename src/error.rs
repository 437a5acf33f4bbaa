use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while building one video from the asset pools.
///
/// All of these are fatal to the current job only; the automation loop keeps
/// going.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no audio file in the pool had a readable duration")]
    NoValidAudio,

    #[error("no image files available for the slideshow")]
    NoValidImages,

    #[error("{stage} encode produced no usable output at {output}: {detail}")]
    EncodeFailed {
        stage: &'static str,
        output: PathBuf,
        detail: String,
    },

    #[error("merging audio and video streams failed at {output}: {detail}")]
    MergeFailed { output: PathBuf, detail: String },
}

/// Credential acquisition failures. Fatal to the current upload step only.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("client secret bundle unreadable at {path}: {detail}")]
    ClientSecret { path: PathBuf, detail: String },

    #[error("interactive authorization failed: {0}")]
    Flow(String),

    #[error("token endpoint rejected the request: {0}")]
    TokenExchange(String),
}

/// Transfer failures. The whole upload aborts on the first one; retries are a
/// new-attempt concern of the caller.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not read artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upload rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Everything one cycle can fail with. The controller translates any of these
/// into a failed cycle and keeps the loop alive.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),
}
