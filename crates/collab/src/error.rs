use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CollabError {
    #[snafu(display("collaborator id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("message search failed on `{stage}`: {details}"))]
    SearchFailed {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("no search query is active; call search before loading pages"))]
    NoActiveQuery { stage: &'static str },
    #[snafu(display("audio capture device unavailable on `{stage}`: {details}"))]
    CaptureUnavailable {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("audio capture is not running"))]
    CaptureNotRunning { stage: &'static str },
    #[snafu(display("audio asset '{asset_id}' does not exist"))]
    AssetMissing {
        stage: &'static str,
        asset_id: String,
    },
    #[snafu(display("audio playback failed on `{stage}`: {details}"))]
    PlaybackFailed {
        stage: &'static str,
        details: String,
    },
}

pub type CollabResult<T> = Result<T, CollabError>;
