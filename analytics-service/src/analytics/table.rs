use serde::{ser::SerializeStruct, Serialize, Serializer};

/// A row type with a fixed, ordered column schema.
///
/// `COLUMNS` must list the serialized field names in declaration order so
/// that CSV artifacts and JSON responses carry the schema even with zero rows.
pub trait TableRow: Serialize {
    const COLUMNS: &'static [&'static str];
}

/// An owned, schema-carrying result table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table<R> {
    rows: Vec<R>,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<R: TableRow> Table<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &'static [&'static str] {
        R::COLUMNS
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }

    /// Keep only the rows matching `keep`; the schema is unchanged.
    pub fn filter<F>(self, keep: F) -> Self
    where
        F: FnMut(&R) -> bool,
    {
        Self {
            rows: self.rows.into_iter().filter(keep).collect(),
        }
    }
}

impl<R: TableRow> Serialize for Table<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Table", 2)?;
        s.serialize_field("columns", R::COLUMNS)?;
        s.serialize_field("rows", &self.rows)?;
        s.end()
    }
}
