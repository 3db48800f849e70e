//! Pluggable `(type, format)` data types.
//!
//! A data type replaces the built-in conversion and primitive validation for
//! schemas declaring its `(type, format)` pair. Tables are keyed by type and
//! then format, and a pair can be registered only once.
//!
//! The process-wide table is filled during application setup with
//! [`register_data_type`] and sealed by the first compile that uses it
//! ([`global`]); after that it is read without locking and further
//! registration fails with [`Error::RegistrySealed`].
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::{Lazy, OnceCell};

use crate::error::{Error, Result};
use crate::exception::Exception;
use crate::schema::{Schema, Type};
use crate::value::Value;

pub trait DataType: Send + Sync {
    /// Wire value to native value.
    fn deserialize(&self, schema: Schema<'_>, value: &Value) -> std::result::Result<Value, String>;

    /// Native value to wire value.
    fn serialize(&self, schema: Schema<'_>, value: &Value) -> std::result::Result<Value, String>;

    /// Replaces the built-in primitive check for the schema.
    fn validate(&self, schema: Schema<'_>, value: &Value, exception: &mut Exception);

    /// Random value generation; optional.
    fn random(&self, _schema: Schema<'_>) -> Option<Value> {
        None
    }

    /// Numeric data types allow `minimum`/`maximum` and friends.
    fn is_numeric(&self) -> bool {
        false
    }

    /// Extra compile-time checks of a schema using this data type.
    fn compile(&self, _schema: Schema<'_>, _exception: &mut Exception) {}
}

#[derive(Default)]
pub struct DataTypes {
    table: HashMap<Type, HashMap<String, Box<dyn DataType>>>,
}

impl fmt::Debug for DataTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (ty, formats) in &self.table {
            map.entry(ty, &formats.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

impl DataTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: &str, format: &str, data_type: impl DataType + 'static) -> Result<()> {
        let ty = Type::parse(ty)
            .filter(|t| !matches!(t, Type::Array | Type::Object))
            .ok_or_else(|| Error::InvalidDataType(ty.to_string()))?;
        if format.is_empty() {
            return Err(Error::EmptyFormat);
        }
        let formats = self.table.entry(ty).or_default();
        if formats.contains_key(format) {
            return Err(Error::DuplicateDataType { ty: ty.to_string(), format: format.to_string() });
        }
        formats.insert(format.to_string(), Box::new(data_type));
        Ok(())
    }

    pub fn get(&self, ty: Type, format: &str) -> Option<&dyn DataType> {
        let data_type: &dyn DataType = self.table.get(&ty)?.get(format)?.as_ref();
        Some(data_type)
    }

    pub fn contains(&self, ty: Type, format: &str) -> bool {
        self.get(ty, format).is_some()
    }
}

// ------------------------------ Global ------------------------------------ //

static PENDING: Lazy<Mutex<Option<DataTypes>>> = Lazy::new(|| Mutex::new(Some(DataTypes::new())));
static SEALED: OnceCell<Arc<DataTypes>> = OnceCell::new();

/// Register a data type in the process-wide table.
pub fn register_data_type(ty: &str, format: &str, data_type: impl DataType + 'static) -> Result<()> {
    let mut pending = PENDING.lock().unwrap_or_else(PoisonError::into_inner);
    match pending.as_mut() {
        Some(table) => table.register(ty, format, data_type),
        None => Err(Error::RegistrySealed),
    }
}

/// The process-wide table. The first call seals it.
pub fn global() -> Arc<DataTypes> {
    SEALED
        .get_or_init(|| {
            let table = PENDING.lock().unwrap_or_else(PoisonError::into_inner).take();
            tracing::debug!("sealing the global data type registry");
            Arc::new(table.unwrap_or_default())
        })
        .clone()
}

// ------------------------------- Tests ------------------------------------ //
