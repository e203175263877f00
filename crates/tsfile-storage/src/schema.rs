//! Column schemas and the per-file schema registry

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tsfile_common::error::{Error, Result, SchemaError};
use tsfile_common::types::{ColumnCategory, DataType};

/// Name, type and category of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub category: ColumnCategory,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType, category: ColumnCategory) -> Self {
        Self {
            name: name.into(),
            data_type,
            category,
        }
    }

    /// A measured value column
    pub fn field(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, ColumnCategory::Field)
    }

    /// An identifying column
    pub fn tag(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, ColumnCategory::Tag)
    }

    fn check_storable(&self) -> Result<()> {
        if self.data_type.is_storable() {
            Ok(())
        } else {
            Err(Error::TypeNotSupported(self.data_type))
        }
    }
}

/// Named ordered list of columns with unique names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Build a schema, rejecting repeated column names and untyped columns
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Result<Self> {
        let mut schema = Self {
            name: name.into(),
            columns: Vec::with_capacity(columns.len()),
        };
        for column in columns {
            schema.push_column(column).map_err(|e| match e {
                Error::Schema(SchemaError::AlreadyExists { owner, column }) => {
                    SchemaError::DuplicateColumn { owner, column }.into()
                }
                other => other,
            })?;
        }
        Ok(schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn push_column(&mut self, column: ColumnSchema) -> Result<()> {
        column.check_storable()?;
        if self.column(&column.name).is_some() {
            return Err(SchemaError::AlreadyExists {
                owner: self.name.clone(),
                column: column.name,
            }
            .into());
        }
        self.columns.push(column);
        Ok(())
    }
}

/// One measurement of a device: a field column
pub type TimeseriesSchema = ColumnSchema;

/// A device together with the timeseries it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSchema {
    pub device_id: String,
    pub timeseries: Vec<TimeseriesSchema>,
}

impl DeviceSchema {
    pub fn new(device_id: impl Into<String>, timeseries: Vec<TimeseriesSchema>) -> Self {
        Self {
            device_id: device_id.into(),
            timeseries,
        }
    }
}

/// Whether a registered owner was declared as a table or grown as a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerKind {
    Table,
    Device,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RegisteredOwner {
    kind: OwnerKind,
    schema: TableSchema,
}

/// Every table and device known to one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    owners: BTreeMap<String, RegisteredOwner>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a whole table. Fails if the name is taken.
    pub fn register_table(&mut self, schema: TableSchema) -> Result<()> {
        if self.owners.contains_key(schema.name()) {
            return Err(SchemaError::TableAlreadyExists(schema.name().to_string()).into());
        }
        debug!("Registering table {} with {} columns", schema.name(), schema.len());
        self.owners.insert(
            schema.name().to_string(),
            RegisteredOwner {
                kind: OwnerKind::Table,
                schema,
            },
        );
        Ok(())
    }

    /// Add one timeseries to a device, creating the device on first use.
    /// A name already registered as a table is refused.
    pub fn register_timeseries(&mut self, device_id: &str, column: ColumnSchema) -> Result<()> {
        column.check_storable()?;
        match self.owners.get_mut(device_id) {
            Some(owner) if owner.kind == OwnerKind::Table => {
                Err(SchemaError::TableAlreadyExists(device_id.to_string()).into())
            }
            Some(owner) => owner.schema.push_column(column),
            None => {
                debug!("Registering device {}", device_id);
                let schema = TableSchema::new(device_id, vec![column])?;
                self.owners.insert(
                    device_id.to_string(),
                    RegisteredOwner {
                        kind: OwnerKind::Device,
                        schema,
                    },
                );
                Ok(())
            }
        }
    }

    /// Register each timeseries of a device in order.
    ///
    /// Stops at the first failure; series registered before it stay.
    pub fn register_device(&mut self, device: &DeviceSchema) -> Result<()> {
        for column in &device.timeseries {
            self.register_timeseries(&device.device_id, column.clone())?;
        }
        Ok(())
    }

    /// Schema of a table or device
    pub fn get(&self, owner: &str) -> Option<&TableSchema> {
        self.owners.get(owner).map(|o| &o.schema)
    }

    pub fn kind(&self, owner: &str) -> Option<OwnerKind> {
        self.owners.get(owner).map(|o| o.kind)
    }

    /// Look up a column, reporting whether the owner or the column is missing
    pub fn lookup_column(&self, owner: &str, column: &str) -> Result<&ColumnSchema> {
        let schema = self
            .get(owner)
            .ok_or_else(|| SchemaError::DeviceNotFound(owner.to_string()))?;
        schema.column(column).ok_or_else(|| {
            SchemaError::ColumnNotFound {
                owner: owner.to_string(),
                column: column.to_string(),
            }
            .into()
        })
    }

    /// Tables in name order
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.owners
            .values()
            .filter(|o| o.kind == OwnerKind::Table)
            .map(|o| &o.schema)
    }

    /// Every owner, tables and devices, in name order
    pub fn owners(&self) -> impl Iterator<Item = &TableSchema> {
        self.owners.values().map(|o| &o.schema)
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
