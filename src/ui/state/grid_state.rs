use crate::domain::entities::table::{CellValue, RowId, RowPatch, Table, TableId, ID_HEADER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellCursor {
    pub row_index: usize,
    pub row_id: RowId,
    pub header: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GridMode {
    #[default]
    Idle,
    Editing(CellCursor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKey {
    Enter,
    Tab,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Escape,
}

/// A finished cell edit, ready for the sync service.
#[derive(Debug, Clone, PartialEq)]
pub struct CellCommit {
    pub table_id: TableId,
    pub row_id: RowId,
    pub header: String,
    pub value: String,
}

impl CellCommit {
    pub fn patch(&self) -> RowPatch {
        RowPatch::from([(self.header.clone(), Some(CellValue::text(self.value.clone())))])
    }
}

enum Nav {
    Move(usize, String),
    Idle,
}

/// Cell focus and edit buffer of the grid. Every transition that leaves a
/// cell returns the commit for it; the caller sends it to the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridEditor {
    mode: GridMode,
    buffer: String,
}

impl GridEditor {
    #[cfg(test)]
    pub fn mode(&self) -> &GridMode {
        &self.mode
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_editing(&self, row_index: usize, header: &str) -> bool {
        matches!(&self.mode, GridMode::Editing(c) if c.row_index == row_index && c.header == header)
    }

    pub fn input(&mut self, text: String) {
        if matches!(self.mode, GridMode::Editing(_)) {
            self.buffer = text;
        }
    }

    pub fn click(&mut self, table: &Table, row_index: usize, header: &str) -> Option<CellCommit> {
        if header == ID_HEADER || !table.has_header(header) || row_index >= table.rows.len() {
            return None;
        }
        let commit = self.pending_commit(table);
        self.begin(table, row_index, header);
        commit
    }

    pub fn blur(&mut self, table: &Table) -> Option<CellCommit> {
        let commit = self.pending_commit(table);
        self.reset();
        commit
    }

    pub fn key(&mut self, table: &Table, key: GridKey) -> Option<CellCommit> {
        let GridMode::Editing(cursor) = &self.mode else {
            return None;
        };
        if key == GridKey::Escape {
            self.reset();
            return None;
        }

        let nav = next_cell(table, cursor, key);
        let commit = self.pending_commit(table);
        match nav {
            Nav::Move(row_index, header) => self.begin(table, row_index, &header),
            Nav::Idle => self.reset(),
        }
        commit
    }

    /// Leaves editing without committing.
    pub fn reset(&mut self) {
        self.mode = GridMode::Idle;
        self.buffer.clear();
    }

    fn begin(&mut self, table: &Table, row_index: usize, header: &str) {
        let Some(row) = table.rows.get(row_index) else {
            self.reset();
            return;
        };
        self.buffer = row.cell_text(header);
        self.mode = GridMode::Editing(CellCursor {
            row_index,
            row_id: row.id.clone(),
            header: header.to_string(),
        });
    }

    fn pending_commit(&self, table: &Table) -> Option<CellCommit> {
        let GridMode::Editing(cursor) = &self.mode else {
            return None;
        };
        if !cursor.row_id.is_resolved() {
            log::debug!("dropping edit of unsaved row {}", cursor.row_id);
            return None;
        }
        Some(CellCommit {
            table_id: table.id,
            row_id: cursor.row_id.clone(),
            header: cursor.header.clone(),
            value: self.buffer.clone(),
        })
    }
}

fn next_cell(table: &Table, cursor: &CellCursor, key: GridKey) -> Nav {
    let headers = table.editable_headers();
    let row = cursor.row_index;
    let row_count = table.rows.len();
    let Some(col) = headers.iter().position(|h| *h == cursor.header) else {
        return Nav::Idle;
    };
    let at = |row: usize, col: usize| Nav::Move(row, headers[col].to_string());

    match key {
        GridKey::Enter if row + 1 < row_count => at(row + 1, col),
        GridKey::Enter => Nav::Idle,
        GridKey::Tab if col + 1 < headers.len() => at(row, col + 1),
        GridKey::Tab if row + 1 < row_count => at(row + 1, 0),
        GridKey::Tab => Nav::Idle,
        GridKey::ArrowUp if row > 0 => at(row - 1, col),
        GridKey::ArrowDown if row + 1 < row_count => at(row + 1, col),
        GridKey::ArrowLeft if col > 0 => at(row, col - 1),
        GridKey::ArrowRight if col + 1 < headers.len() => at(row, col + 1),
        GridKey::ArrowUp | GridKey::ArrowDown | GridKey::ArrowLeft | GridKey::ArrowRight => {
            Nav::Idle
        }
        GridKey::Escape => Nav::Idle,
    }
}
