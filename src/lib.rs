//! OpenAPI v2/v3 Schema Object engine: compile raw definitions, then
//! validate, deserialize, serialize, populate and merge values against them.
pub mod compile;
pub mod data_type;
pub mod error;
pub mod exception;
pub mod merge;
pub mod outcome;
pub mod populate;
pub mod schema;
pub mod value;

mod definition;
mod guard;
mod transform;
mod validate;

pub use compile::{compile, compile_document, Compilation, CompileOptions, Compiled};
pub use data_type::{register_data_type, DataType, DataTypes};
pub use error::{Error, Result};
pub use exception::{Diagnostic, Exception};
pub use merge::{merge, MergeOptions, Merged};
pub use outcome::Outcome;
pub use populate::{PopulateOptions, Replacement};
pub use schema::{Major, Schema, SchemaId, SchemaSet, Type};
pub use value::{Attributes, Value};
