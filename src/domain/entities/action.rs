use crate::domain::entities::table::{NewRow, RowId, RowPatch, TableId, TableMeta, TableRecord};

/// Every change the store accepts. `reduce` matches this exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum TableAction {
    SetTables(Vec<TableRecord>),
    AddTable(TableRecord),
    AddRow {
        table_id: TableId,
        row: NewRow,
    },
    EditRow {
        table_id: TableId,
        row_id: RowId,
        patch: RowPatch,
    },
    DeleteRow {
        table_id: TableId,
        row_id: RowId,
    },
    EditTableHeaders {
        table_id: TableId,
        headers: Vec<String>,
    },
    AddColumn {
        table_id: TableId,
        header: String,
    },
    DeleteColumn {
        table_id: TableId,
        header: String,
    },
    EditHeader {
        table_id: TableId,
        old_header: String,
        new_header: String,
    },
    DeleteTable {
        table_id: TableId,
    },
    SetTableMeta(Vec<TableMeta>),
    AddTableMeta(TableMeta),
    /// `description: None` keeps the current description.
    RenameTable {
        table_id: TableId,
        name: String,
        description: Option<String>,
    },
}

impl TableAction {
    pub fn name(&self) -> &'static str {
        match self {
            TableAction::SetTables(_) => "set_tables",
            TableAction::AddTable(_) => "add_table",
            TableAction::AddRow { .. } => "add_row",
            TableAction::EditRow { .. } => "edit_row",
            TableAction::DeleteRow { .. } => "delete_row",
            TableAction::EditTableHeaders { .. } => "edit_table_headers",
            TableAction::AddColumn { .. } => "add_column",
            TableAction::DeleteColumn { .. } => "delete_column",
            TableAction::EditHeader { .. } => "edit_header",
            TableAction::DeleteTable { .. } => "delete_table",
            TableAction::SetTableMeta(_) => "set_table_meta",
            TableAction::AddTableMeta(_) => "add_table_meta",
            TableAction::RenameTable { .. } => "rename_table",
        }
    }
}
