use crate::domain::entities::action::TableAction;
use crate::domain::entities::table::{
    CellValue, NewRow, Row, RowId, RowValues, Table, TableId, TableMeta, TableRecord, ID_HEADER,
};

/// All tables of the active session. Only [`reduce`] produces a changed
/// store; the fields are private to this module.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStore {
    tables: Vec<Table>,
    meta: Vec<TableMeta>,
    next_placeholder: u64,
}

impl Default for TableStore {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            meta: Vec::new(),
            next_placeholder: 1,
        }
    }
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, table_id: TableId) -> Option<&Table> {
        self.tables.iter().find(|table| table.id == table_id)
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables.iter().map(|table| table.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn meta(&self, table_id: TableId) -> Option<&TableMeta> {
        self.meta.iter().find(|meta| meta.id == table_id)
    }

    pub fn label(&self, table_id: TableId) -> String {
        self.meta(table_id)
            .map(TableMeta::label)
            .unwrap_or_else(|| format!("Table #{table_id}"))
    }

    pub fn has_pending_rows(&self) -> bool {
        self.tables
            .iter()
            .flat_map(|table| table.rows.iter())
            .any(|row| !row.id.is_resolved())
    }

    fn table_mut(&mut self, table_id: TableId) -> Option<&mut Table> {
        self.tables.iter_mut().find(|table| table.id == table_id)
    }

    fn allocate_placeholder(&mut self) -> RowId {
        let id = RowId::Placeholder(self.next_placeholder);
        self.next_placeholder += 1;
        id
    }

    fn materialize(&mut self, record: TableRecord) -> Table {
        let mut table = Table {
            id: record.id,
            headers: Vec::with_capacity(record.headers.len()),
            rows: Vec::with_capacity(record.rows.len()),
        };
        for header in record.headers {
            if !table.has_header(&header) {
                table.headers.push(header);
            }
        }
        for new_row in record.rows {
            let id = match new_row.id {
                Some(id) => id,
                None => self.allocate_placeholder(),
            };
            if table.row(&id).is_some() {
                continue;
            }
            let values = retain_headers(new_row.values, &table.headers);
            table.rows.push(Row { id, values });
        }
        table
    }
}

fn retain_headers(mut values: RowValues, headers: &[String]) -> RowValues {
    values.retain(|key, _| key != ID_HEADER && headers.iter().any(|h| h == key));
    values
}

/// Computes the next store. Never panics; an action naming an unknown
/// table hands back `state` untouched.
pub fn reduce(mut state: TableStore, action: TableAction) -> TableStore {
    match action {
        TableAction::SetTables(records) => {
            state.tables.clear();
            for record in records {
                if state.table(record.id).is_some() {
                    continue;
                }
                let table = state.materialize(record);
                state.tables.push(table);
            }
            state
        }
        TableAction::AddTable(record) => {
            if state.table(record.id).is_none() {
                let table = state.materialize(record);
                state.tables.push(table);
            }
            state
        }
        TableAction::AddRow { table_id, row } => {
            if state.table(table_id).is_none() {
                return state;
            }
            add_row(&mut state, table_id, row);
            state
        }
        TableAction::EditRow {
            table_id,
            row_id,
            patch,
        } => {
            if let Some(table) = state.table_mut(table_id) {
                let headers = table.headers.clone();
                if let Some(row) = table.rows.iter_mut().find(|row| row.id == row_id) {
                    for (key, value) in patch {
                        let Some(value) = value else {
                            continue;
                        };
                        if key == ID_HEADER || !headers.contains(&key) {
                            continue;
                        }
                        row.values.insert(key, value);
                    }
                }
            }
            state
        }
        TableAction::DeleteRow { table_id, row_id } => {
            if let Some(table) = state.table_mut(table_id) {
                table.rows.retain(|row| row.id != row_id);
            }
            state
        }
        TableAction::EditTableHeaders { table_id, headers } => {
            if let Some(table) = state.table_mut(table_id) {
                let mut unique: Vec<String> = Vec::with_capacity(headers.len());
                for header in headers {
                    if !unique.contains(&header) {
                        unique.push(header);
                    }
                }
                for row in &mut table.rows {
                    row.values.retain(|key, _| unique.contains(key));
                }
                table.headers = unique;
            }
            state
        }
        TableAction::AddColumn { table_id, header } => {
            if let Some(table) = state.table_mut(table_id) {
                if !table.has_header(&header) {
                    if header != ID_HEADER {
                        for row in &mut table.rows {
                            row.values.insert(header.clone(), CellValue::empty());
                        }
                    }
                    table.headers.push(header);
                }
            }
            state
        }
        TableAction::DeleteColumn { table_id, header } => {
            if let Some(table) = state.table_mut(table_id) {
                table.headers.retain(|h| h != &header);
                for row in &mut table.rows {
                    row.values.remove(&header);
                }
            }
            state
        }
        TableAction::EditHeader {
            table_id,
            old_header,
            new_header,
        } => {
            if let Some(table) = state.table_mut(table_id) {
                let renamable = old_header != ID_HEADER
                    && new_header != ID_HEADER
                    && old_header != new_header
                    && !table.has_header(&new_header);
                if let (true, Some(idx)) = (renamable, table.header_index(&old_header)) {
                    table.headers[idx] = new_header.clone();
                    for row in &mut table.rows {
                        if let Some(value) = row.values.remove(&old_header) {
                            row.values.insert(new_header.clone(), value);
                        }
                    }
                }
            }
            state
        }
        TableAction::DeleteTable { table_id } => {
            state.tables.retain(|table| table.id != table_id);
            state.meta.retain(|meta| meta.id != table_id);
            state
        }
        TableAction::SetTableMeta(entries) => {
            state.meta.clear();
            for meta in entries {
                if state.meta(meta.id).is_none() {
                    state.meta.push(meta);
                }
            }
            state
        }
        TableAction::AddTableMeta(meta) => {
            if state.meta(meta.id).is_none() {
                state.meta.push(meta);
            }
            state
        }
        TableAction::RenameTable {
            table_id,
            name,
            description,
        } => {
            if let Some(meta) = state.meta.iter_mut().find(|meta| meta.id == table_id) {
                meta.name = name;
                if let Some(description) = description {
                    meta.description = description;
                }
            }
            state
        }
    }
}

fn add_row(state: &mut TableStore, table_id: TableId, row: NewRow) {
    let id = match row.id {
        Some(id) => id,
        None => state.allocate_placeholder(),
    };
    let Some(table) = state.table_mut(table_id) else {
        return;
    };
    if table.row(&id).is_some() {
        return;
    }
    let values = retain_headers(row.values, &table.headers);
    table.rows.push(Row { id, values });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::table::RowPatch;

    fn text(value: &str) -> CellValue {
        CellValue::text(value)
    }

    fn sample_store() -> TableStore {
        let record = TableRecord {
            id: TableId(1),
            headers: vec!["id".to_string(), "name".to_string()],
            rows: vec![NewRow {
                id: Some(RowId::Number(1)),
                values: RowValues::from([("name".to_string(), text("A"))]),
            }],
        };
        reduce(TableStore::new(), TableAction::SetTables(vec![record]))
    }

    fn row_of(store: &TableStore, table: i64, row: i64) -> Row {
        store
            .table(TableId(table))
            .and_then(|t| t.row(&RowId::Number(row)))
            .cloned()
            .expect("row should exist")
    }

    #[test]
    fn actions_on_unknown_table_leave_store_unchanged() {
        let state = sample_store();
        let missing = TableId(42);
        let actions = vec![
            TableAction::AddRow {
                table_id: missing,
                row: NewRow::default(),
            },
            TableAction::EditRow {
                table_id: missing,
                row_id: RowId::Number(1),
                patch: RowPatch::from([("name".to_string(), Some(text("Z")))]),
            },
            TableAction::DeleteRow {
                table_id: missing,
                row_id: RowId::Number(1),
            },
            TableAction::EditTableHeaders {
                table_id: missing,
                headers: vec!["x".to_string()],
            },
            TableAction::AddColumn {
                table_id: missing,
                header: "age".to_string(),
            },
            TableAction::DeleteColumn {
                table_id: missing,
                header: "name".to_string(),
            },
            TableAction::EditHeader {
                table_id: missing,
                old_header: "name".to_string(),
                new_header: "title".to_string(),
            },
            TableAction::DeleteTable { table_id: missing },
            TableAction::RenameTable {
                table_id: missing,
                name: "Budget".to_string(),
                description: None,
            },
        ];

        for action in actions {
            let name = action.name();
            let next = reduce(state.clone(), action);
            assert_eq!(next, state, "{name} should be a no-op for an unknown table");
        }
    }

    #[test]
    fn edit_row_merges_fields() {
        let next = reduce(
            sample_store(),
            TableAction::EditRow {
                table_id: TableId(1),
                row_id: RowId::Number(1),
                patch: RowPatch::from([("name".to_string(), Some(text("B")))]),
            },
        );

        let row = row_of(&next, 1, 1);
        assert_eq!(row.id, RowId::Number(1));
        assert_eq!(row.values, RowValues::from([("name".to_string(), text("B"))]));
    }

    #[test]
    fn edit_row_with_empty_patch_keeps_row() {
        let state = sample_store();
        let next = reduce(
            state.clone(),
            TableAction::EditRow {
                table_id: TableId(1),
                row_id: RowId::Number(1),
                patch: RowPatch::new(),
            },
        );
        assert_eq!(row_of(&next, 1, 1), row_of(&state, 1, 1));
    }

    #[test]
    fn edit_row_skips_undefined_but_applies_null() {
        let state = reduce(
            sample_store(),
            TableAction::AddColumn {
                table_id: TableId(1),
                header: "note".to_string(),
            },
        );
        let next = reduce(
            state,
            TableAction::EditRow {
                table_id: TableId(1),
                row_id: RowId::Number(1),
                patch: RowPatch::from([
                    ("name".to_string(), None),
                    ("note".to_string(), Some(CellValue::Null)),
                    ("id".to_string(), Some(text("hijack"))),
                    ("unknown".to_string(), Some(text("x"))),
                ]),
            },
        );

        let row = row_of(&next, 1, 1);
        assert_eq!(row.id, RowId::Number(1));
        assert_eq!(row.values.get("name"), Some(&text("A")));
        assert_eq!(row.values.get("note"), Some(&CellValue::Null));
        assert!(!row.values.contains_key("unknown"));
    }

    #[test]
    fn add_column_fills_rows_with_empty_text() {
        let edited = reduce(
            sample_store(),
            TableAction::EditRow {
                table_id: TableId(1),
                row_id: RowId::Number(1),
                patch: RowPatch::from([("name".to_string(), Some(text("B")))]),
            },
        );
        let next = reduce(
            edited,
            TableAction::AddColumn {
                table_id: TableId(1),
                header: "age".to_string(),
            },
        );

        let table = next.table(TableId(1)).expect("table should exist");
        assert_eq!(table.headers, vec!["id", "name", "age"]);
        let row = row_of(&next, 1, 1);
        assert_eq!(row.values.get("name"), Some(&text("B")));
        assert_eq!(row.values.get("age"), Some(&CellValue::empty()));
    }

    #[test]
    fn add_column_with_existing_header_is_ignored() {
        let state = sample_store();
        let next = reduce(
            state.clone(),
            TableAction::AddColumn {
                table_id: TableId(1),
                header: "name".to_string(),
            },
        );
        assert_eq!(next, state);
    }

    #[test]
    fn delete_then_add_column_resets_values() {
        let state = sample_store();
        let removed = reduce(
            state.clone(),
            TableAction::DeleteColumn {
                table_id: TableId(1),
                header: "name".to_string(),
            },
        );
        assert!(!row_of(&removed, 1, 1).values.contains_key("name"));

        let restored = reduce(
            removed,
            TableAction::AddColumn {
                table_id: TableId(1),
                header: "name".to_string(),
            },
        );
        let table = restored.table(TableId(1)).expect("table should exist");
        assert_eq!(
            table.headers,
            state.table(TableId(1)).expect("table should exist").headers
        );
        assert_eq!(
            row_of(&restored, 1, 1).values.get("name"),
            Some(&CellValue::empty())
        );
    }

    #[test]
    fn edit_header_rekeys_rows() {
        let next = reduce(
            sample_store(),
            TableAction::EditHeader {
                table_id: TableId(1),
                old_header: "name".to_string(),
                new_header: "title".to_string(),
            },
        );
        let table = next.table(TableId(1)).expect("table should exist");
        assert_eq!(table.headers, vec!["id", "title"]);
        let row = row_of(&next, 1, 1);
        assert_eq!(row.values.get("title"), Some(&text("A")));
        assert!(!row.values.contains_key("name"));
    }

    #[test]
    fn edit_header_never_touches_id() {
        let state = sample_store();
        let next = reduce(
            state.clone(),
            TableAction::EditHeader {
                table_id: TableId(1),
                old_header: "id".to_string(),
                new_header: "key".to_string(),
            },
        );
        assert_eq!(next, state);
    }

    #[test]
    fn edit_table_headers_drops_removed_keys() {
        let next = reduce(
            sample_store(),
            TableAction::EditTableHeaders {
                table_id: TableId(1),
                headers: vec!["id".to_string()],
            },
        );
        let table = next.table(TableId(1)).expect("table should exist");
        assert_eq!(table.headers, vec!["id"]);
        assert!(row_of(&next, 1, 1).values.is_empty());
    }

    #[test]
    fn delete_missing_row_keeps_length() {
        let next = reduce(
            sample_store(),
            TableAction::DeleteRow {
                table_id: TableId(1),
                row_id: RowId::Number(999),
            },
        );
        assert_eq!(next.table(TableId(1)).map(|t| t.rows.len()), Some(1));
    }

    #[test]
    fn add_row_without_id_gets_distinct_placeholders() {
        let mut state = sample_store();
        for _ in 0..3 {
            state = reduce(
                state,
                TableAction::AddRow {
                    table_id: TableId(1),
                    row: NewRow {
                        id: None,
                        values: RowValues::from([("name".to_string(), text("new"))]),
                    },
                },
            );
        }

        let table = state.table(TableId(1)).expect("table should exist");
        let placeholders: Vec<&RowId> = table
            .rows
            .iter()
            .map(|row| &row.id)
            .filter(|id| !id.is_resolved())
            .collect();
        assert_eq!(placeholders.len(), 3);
        assert_ne!(placeholders[0], placeholders[1]);
        assert_ne!(placeholders[1], placeholders[2]);
        assert!(state.has_pending_rows());
    }

    #[test]
    fn add_row_with_duplicate_id_is_ignored() {
        let state = sample_store();
        let next = reduce(
            state.clone(),
            TableAction::AddRow {
                table_id: TableId(1),
                row: NewRow {
                    id: Some(RowId::Number(1)),
                    values: RowValues::new(),
                },
            },
        );
        assert_eq!(next, state);
    }

    #[test]
    fn delete_then_add_table_round_trips() {
        let state = sample_store();
        let original = state
            .table(TableId(1))
            .expect("table should exist")
            .clone();

        let removed = reduce(state, TableAction::DeleteTable { table_id: TableId(1) });
        assert!(removed.is_empty());

        let restored = reduce(removed, TableAction::AddTable(original.to_record()));
        assert_eq!(restored.table(TableId(1)), Some(&original));
    }

    #[test]
    fn set_tables_replaces_everything() {
        let state = sample_store();
        let next = reduce(
            state,
            TableAction::SetTables(vec![TableRecord {
                id: TableId(7),
                headers: vec!["id".to_string(), "amount".to_string()],
                rows: Vec::new(),
            }]),
        );
        assert_eq!(next.table_ids(), vec![TableId(7)]);
    }

    fn meta(id: i64, name: &str) -> TableMeta {
        TableMeta {
            id: TableId(id),
            name: name.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn table_meta_is_listed_renamed_and_deleted() {
        let state = reduce(
            sample_store(),
            TableAction::SetTableMeta(vec![meta(1, "Budget"), meta(1, "dup"), meta(2, "")]),
        );
        assert_eq!(state.label(TableId(1)), "Budget");
        assert_eq!(state.label(TableId(2)), "Table #2");
        assert_eq!(state.label(TableId(9)), "Table #9");

        let state = reduce(
            state,
            TableAction::RenameTable {
                table_id: TableId(1),
                name: "Expenses".to_string(),
                description: Some("2024".to_string()),
            },
        );
        let renamed = state.meta(TableId(1)).expect("meta should exist");
        assert_eq!(renamed.name, "Expenses");
        assert_eq!(renamed.description, "2024");

        let state = reduce(state, TableAction::DeleteTable { table_id: TableId(1) });
        assert!(state.meta(TableId(1)).is_none());
        assert!(state.table(TableId(1)).is_none());
    }

    #[test]
    fn add_table_meta_keeps_existing_entry() {
        let state = reduce(TableStore::new(), TableAction::AddTableMeta(meta(3, "First")));
        let state = reduce(state, TableAction::AddTableMeta(meta(3, "Second")));
        assert_eq!(state.label(TableId(3)), "First");
    }
}
