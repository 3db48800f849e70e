//! Usage errors: programmer misuse of the API, as opposed to data problems,
//! which always land in an [`Exception`](crate::exception::Exception) tree.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid type specified: {0}. Must be one of: boolean, integer, number, string")]
    InvalidDataType(String),

    #[error("Invalid format specified. Must be a non-empty string")]
    EmptyFormat,

    #[error("Format \"{format}\" is already defined for type \"{ty}\"")]
    DuplicateDataType { ty: String, format: String },

    #[error("Data types must be registered before the first schema is compiled")]
    RegistrySealed,

    #[error("Cannot merge schemas that belong to different schema sets")]
    ForeignSchema,

    #[error("At least one schema is required to merge")]
    EmptyMerge,

    #[error("Invalid params specified. Must be a plain object")]
    InvalidParams,
}
