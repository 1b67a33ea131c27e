use anyhow::Result;

use crate::entity::Entity;
use crate::error::WarehouseError;

/// One untyped row as extracted from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based position in the source export.
    pub row_number: i64,
    pub values: Vec<Option<String>>,
}

impl RawRow {
    pub fn new(row_number: i64, values: Vec<Option<String>>) -> Self {
        Self { row_number, values }
    }

    /// Trimmed value at `idx`; blank text reads as null.
    pub fn text(&self, idx: usize) -> Option<&str> {
        self.values
            .get(idx)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A raw record set for one entity: column names plus text rows.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub entity: Entity,
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(entity: Entity, columns: Vec<String>) -> Self {
        Self {
            entity,
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from literal rows, numbering them from 1.
    pub fn from_rows<I, R, S>(entity: Entity, columns: &[&str], rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                RawRow::new(
                    i as i64 + 1,
                    r.into_iter().map(|v| v.map(Into::into)).collect(),
                )
            })
            .collect();
        Self {
            entity,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a required column. Absence is fatal for the caller.
    pub fn column_index(&self, name: &str) -> Result<usize, WarehouseError> {
        self.columns
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| WarehouseError::MissingColumn {
                entity: self.entity,
                column: name.to_string(),
            })
    }
}

/// Reads the raw (bronze) record set of an entity.
pub trait TableReader {
    fn read_raw(&self, entity: Entity) -> Result<RawTable>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_null() {
        let row = RawRow::new(1, vec![Some("  U1 ".into()), Some("   ".into()), None]);
        assert_eq!(row.text(0), Some("U1"));
        assert_eq!(row.text(1), None);
        assert_eq!(row.text(2), None);
        assert_eq!(row.text(7), None);
    }

    #[test]
    fn missing_column_names_entity() {
        let t = RawTable::from_rows(
            Entity::Users,
            &["user_id"],
            vec![vec![Some("U1")]],
        );
        assert_eq!(t.column_index("USER_ID").unwrap(), 0);
        let err = t.column_index("signup_date").unwrap_err();
        assert_eq!(err.to_string(), "missing column in users: signup_date");
    }
}
