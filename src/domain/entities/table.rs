use std::collections::BTreeMap;
use std::fmt;

/// Header under which every row exposes its id.
pub const ID_HEADER: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub i64);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row identity. Server ids are numbers or strings; `Placeholder` is a
/// client-side temporary id handed out by the reducer and is never sent to
/// the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowId {
    Number(i64),
    Text(String),
    Placeholder(u64),
}

impl RowId {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, RowId::Placeholder(_))
    }

    pub fn as_cell(&self) -> CellValue {
        match self {
            RowId::Number(value) => CellValue::Number((*value).into()),
            RowId::Text(value) => CellValue::Text(value.clone()),
            RowId::Placeholder(_) => CellValue::Null,
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Number(value) => write!(f, "{value}"),
            RowId::Text(value) => write!(f, "{value}"),
            RowId::Placeholder(seq) => write!(f, "pending-{seq}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    /// Text shown in a grid cell and used to seed the edit buffer.
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(value) => value.to_string(),
            CellValue::Number(value) => value.to_string(),
            CellValue::Text(value) => value.clone(),
        }
    }
}

impl From<serde_json::Value> for CellValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(value) => CellValue::Bool(value),
            serde_json::Value::Number(value) => CellValue::Number(value),
            serde_json::Value::String(value) => CellValue::Text(value),
            nested => CellValue::Text(nested.to_string()),
        }
    }
}

impl From<CellValue> for serde_json::Value {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(value) => serde_json::Value::Bool(value),
            CellValue::Number(value) => serde_json::Value::Number(value),
            CellValue::Text(value) => serde_json::Value::String(value),
        }
    }
}

pub type RowValues = BTreeMap<String, CellValue>;

/// Partial row update. `None` means "leave unchanged"; `Some(CellValue::Null)`
/// overwrites with null.
pub type RowPatch = BTreeMap<String, Option<CellValue>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub values: RowValues,
}

impl Row {
    pub fn get(&self, header: &str) -> Option<CellValue> {
        if header == ID_HEADER {
            return Some(self.id.as_cell());
        }
        self.values.get(header).cloned()
    }

    pub fn cell_text(&self, header: &str) -> String {
        self.get(header)
            .map(|value| value.display_text())
            .unwrap_or_default()
    }
}

/// A row as supplied by the server or a caller, before the store assigns
/// a placeholder id to it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewRow {
    pub id: Option<RowId>,
    pub values: RowValues,
}

impl From<Row> for NewRow {
    fn from(row: Row) -> Self {
        NewRow {
            id: Some(row.id),
            values: row.values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: TableId,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn has_header(&self, header: &str) -> bool {
        self.headers.iter().any(|h| h == header)
    }

    pub fn row(&self, row_id: &RowId) -> Option<&Row> {
        self.rows.iter().find(|row| &row.id == row_id)
    }

    pub fn header_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Headers the grid lets the user type into.
    pub fn editable_headers(&self) -> Vec<&str> {
        self.headers
            .iter()
            .map(String::as_str)
            .filter(|h| *h != ID_HEADER)
            .collect()
    }

    /// Empty-string values for every editable header, the shape of a fresh row.
    pub fn blank_row_values(&self) -> RowValues {
        self.editable_headers()
            .into_iter()
            .map(|header| (header.to_string(), CellValue::empty()))
            .collect()
    }

    #[cfg(test)]
    pub fn to_record(&self) -> TableRecord {
        TableRecord {
            id: self.id,
            headers: self.headers.clone(),
            rows: self.rows.iter().cloned().map(NewRow::from).collect(),
        }
    }
}

/// A complete table as delivered by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRecord {
    pub id: TableId,
    pub headers: Vec<String>,
    pub rows: Vec<NewRow>,
}

/// Name and description the server keeps for a table, apart from its
/// headers and rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub id: TableId,
    pub name: String,
    pub description: String,
}

impl TableMeta {
    /// Label for lists and titles; unnamed tables fall back to their id.
    pub fn label(&self) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            format!("Table #{}", self.id)
        } else {
            name.to_string()
        }
    }
}
