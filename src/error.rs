use thiserror::Error;

use crate::ruler::RulerId;

pub type Result<T, E = FishMeshError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum FishMeshError {
    /// The four box corners are collinear or coincident.
    #[error("measure box corners do not span a quadrilateral")]
    DegenerateQuadrilateral,

    #[error("ruler {ruler_id} has {points} point(s), expected exactly 2")]
    IncompleteRuler { ruler_id: RulerId, points: usize },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("image has no pixels")]
    EmptyImage,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
