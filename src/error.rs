use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeformError {
    #[error("mesh has {positions} positions but {uvs} uv coordinates")]
    MismatchedAttributes { positions: usize, uvs: usize },
    #[error("index count {0} is not a multiple of three")]
    PartialTriangle(usize),
    #[error("index {index} references a vertex outside of the {vertex_count} available")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("mesh attribute {0} is missing or has an unsupported format")]
    MissingAttribute(&'static str),
    #[error("deactivation radius {deactivation} must exceed activation radius {activation}")]
    InvalidRadii { activation: f32, deactivation: f32 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("culling readback failed: {0}")]
    Readback(String),
    #[error("culling readback returned {actual} flags, expected {expected}")]
    ReadbackSize { expected: usize, actual: usize },
    #[error("partition covers {actual} indices, expected {expected}")]
    IncompletePartition { expected: usize, actual: usize },
    #[error("submesh {0} is not declared")]
    UnknownSubMesh(usize),
    #[error("submesh range {start}..{end} exceeds the {index_count} uploaded indices")]
    SubMeshRange {
        start: usize,
        end: usize,
        index_count: usize,
    },
    #[error("buffer upload of {len} elements at {start} exceeds the declared size {size}")]
    UploadOutOfRange { start: usize, len: usize, size: usize },
}

impl DeformError {
    /// Whether the error describes inconsistent source geometry.
    ///
    /// These abort an activation attempt, everything else only costs a single tick.
    pub fn is_invalid_mesh(&self) -> bool {
        matches!(
            self,
            DeformError::MismatchedAttributes { .. }
                | DeformError::PartialTriangle(_)
                | DeformError::IndexOutOfRange { .. }
                | DeformError::MissingAttribute(_)
        )
    }
}

pub type DeformResult<T> = Result<T, DeformError>;
