//! The catalog: the "Schema" external interface, a collaborator of the
//! storage core rather than part of it. It tracks an ordered column list
//! with types per table, plus the file each table's heap data lives in.
//! Index metadata (B-tree/hash) is out of scope and has been dropped, along
//! with the `uuid` dependency it pulled in.

use std::{fs, path::Path, path::PathBuf};

use common::{ColumnId, DbError, DbResult, TableId};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use types::SqlType;

/// Persistent catalog that stores table schemas and their backing file
/// paths.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    tables: Vec<TableMeta>,
    next_table_id: u64,
    #[serde(skip)]
    #[serde(default)]
    table_name_index: HashMap<String, usize>,
    #[serde(skip)]
    #[serde(default)]
    table_id_index: HashMap<TableId, usize>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        let mut catalog = Self {
            tables: Vec::new(),
            next_table_id: 1,
            table_name_index: HashMap::new(),
            table_id_index: HashMap::new(),
        };
        catalog.rebuild_indexes();
        catalog
    }

    /// Load a catalog from disk, returning an empty catalog if the file does
    /// not exist.
    pub fn load(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read_to_string(path)?;
        let mut catalog: Catalog = serde_json::from_str(&data)
            .map_err(|err| DbError::Catalog(format!("invalid catalog file: {err}")))?;
        catalog.rebuild_indexes();
        Ok(catalog)
    }

    /// Persist the catalog contents as pretty JSON.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| DbError::Catalog(format!("serialize failed: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Returns an immutable reference to a table by name.
    pub fn table(&self, name: &str) -> DbResult<&TableMeta> {
        let idx = self
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))?;
        self.tables
            .get(idx)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))
    }

    /// Returns an immutable reference to a table by identifier.
    pub fn table_by_id(&self, id: TableId) -> DbResult<&TableMeta> {
        let idx = self
            .table_id_index
            .get(&id)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table id {}", id.0)))?;
        self.tables
            .get(idx)
            .ok_or_else(|| DbError::Catalog(format!("unknown table id {}", id.0)))
    }

    /// Register a new table with the given columns and backing file path,
    /// returning its identifier.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<Column>,
        file_path: PathBuf,
    ) -> DbResult<TableId> {
        if self.table_name_index.contains_key(name) {
            return Err(DbError::Catalog(format!("table '{name}' already exists")));
        }
        let schema = TableSchema::try_new(columns)?;
        let table_id = TableId(self.next_table_id);
        self.next_table_id += 1;
        let table = TableMeta {
            id: table_id,
            name: name.to_string(),
            schema,
            file_path,
        };
        self.tables.push(table);
        self.rebuild_indexes();
        Ok(table_id)
    }

    /// Remove a table from the catalog.
    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let idx = self
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))?;
        self.tables.remove(idx);
        self.rebuild_indexes();
        Ok(())
    }

    /// Immutable iterator over all tables.
    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.iter()
    }

    fn rebuild_indexes(&mut self) {
        self.table_name_index.clear();
        self.table_id_index.clear();
        for (idx, table) in self.tables.iter().enumerate() {
            self.table_name_index.insert(table.name.clone(), idx);
            self.table_id_index.insert(table.id, idx);
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata describing a registered table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableMeta {
    pub id: TableId,
    pub name: String,
    pub schema: TableSchema,
    pub file_path: PathBuf,
}

/// Column layout for a table, along with a name-to-ordinal lookup.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    pub name_to_ordinal: HashMap<String, ColumnId>,
}

impl TableSchema {
    pub fn try_new(columns: Vec<Column>) -> DbResult<Self> {
        if columns.is_empty() {
            return Err(DbError::Catalog(
                "table must contain at least one column".into(),
            ));
        }
        if columns.len() > u16::MAX as usize {
            return Err(DbError::Catalog(
                "too many columns for a single table".into(),
            ));
        }
        let mut name_to_ordinal = HashMap::new();
        for (idx, column) in columns.iter().enumerate() {
            let ordinal = idx as ColumnId;
            if name_to_ordinal
                .insert(column.name.clone(), ordinal)
                .is_some()
            {
                return Err(DbError::Catalog(format!(
                    "duplicate column '{}' found while building schema",
                    column.name
                )));
            }
        }
        Ok(Self {
            columns,
            name_to_ordinal,
        })
    }

    /// Returns the ordinal for a column name.
    pub fn column_index(&self, name: &str) -> Option<ColumnId> {
        self.name_to_ordinal.get(name).copied()
    }

    /// Returns the SQL type for the provided ordinal.
    pub fn column_type(&self, ordinal: ColumnId) -> Option<&SqlType> {
        self.columns.get(ordinal as usize).map(|c| &c.ty)
    }

    /// Number of columns in the schema.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Describes a logical column within a table schema.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: SqlType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[cfg(test)]
mod tests;
