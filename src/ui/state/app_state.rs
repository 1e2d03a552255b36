use dioxus::prelude::*;

use crate::domain::entities::action::TableAction;
use crate::domain::entities::table::TableId;
use crate::domain::store::{reduce, TableStore};
use crate::ui::state::grid_state::GridEditor;
use crate::usecase::services::sync_service::{StoreHandle, SyncResult, TableSyncService};

impl StoreHandle for Signal<TableStore> {
    fn with_store<R>(&self, f: impl FnOnce(&TableStore) -> R) -> R {
        f(&self.peek())
    }

    fn dispatch(&mut self, action: TableAction) {
        log::trace!("dispatch {}", action.name());
        let mut store = self.write();
        let current = std::mem::take(&mut *store);
        *store = reduce(current, action);
    }
}

/// Number of sync operations still running. Buttons stay disabled until
/// the last one reports back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InFlight(u32);

impl InFlight {
    pub fn start(&mut self) {
        self.0 += 1;
    }

    pub fn finish(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    pub fn is_busy(&self) -> bool {
        self.0 > 0
    }
}

/// Session state shared with every component through context.
#[derive(Clone, Copy)]
pub struct AppState {
    pub tables: Signal<TableStore>,
    pub selected_table: Signal<Option<TableId>>,
    pub editor: Signal<GridEditor>,
    pub in_flight: Signal<InFlight>,
    pub status: Signal<String>,
    pub session_expired: Signal<bool>,
    pub new_table_name: Signal<String>,
    pub new_table_description: Signal<String>,
    pub new_table_headers: Signal<String>,
    pub renaming_header: Signal<Option<String>>,
    pub rename_value: Signal<String>,
    pub renaming_table: Signal<bool>,
    pub table_name_draft: Signal<String>,
    pub headers_draft: Signal<Option<String>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            tables: use_signal(TableStore::new),
            selected_table: use_signal(|| None::<TableId>),
            editor: use_signal(GridEditor::default),
            in_flight: use_signal(InFlight::default),
            status: use_signal(|| "Ready".to_string()),
            session_expired: use_signal(|| false),
            new_table_name: use_signal(default_table_name),
            new_table_description: use_signal(String::new),
            new_table_headers: use_signal(|| "id, date, item, amount".to_string()),
            renaming_header: use_signal(|| None::<String>),
            rename_value: use_signal(String::new),
            renaming_table: use_signal(|| false),
            table_name_draft: use_signal(String::new),
            headers_draft: use_signal(|| None::<String>),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.read().is_busy()
    }

    pub fn begin_op(mut self) {
        self.in_flight.write().start();
    }

    /// Full fetch that populates the store at session start.
    pub async fn start_session(mut self, sync: &TableSyncService) {
        self.begin_op();
        self.status.set("Loading tables...".to_string());
        let mut tables = self.tables;
        let result = sync.load_tables(&mut tables).await;
        self.selected_table.set(None);
        match result {
            Ok(count) => {
                self.session_expired.set(false);
                self.in_flight.write().finish();
                self.status.set(format!("Loaded {count} tables"));
                self.revalidate_selection();
            }
            Err(err) => self.finish("load tables", Err(err)),
        }
    }

    /// Drops everything the session held.
    pub fn teardown(mut self) {
        log::info!("tearing down session");
        self.editor.write().reset();
        self.tables.dispatch(TableAction::SetTables(Vec::new()));
        self.selected_table.set(None);
        self.close_drafts();
    }

    fn close_drafts(mut self) {
        self.renaming_header.set(None);
        self.renaming_table.set(false);
        self.headers_draft.set(None);
    }

    pub fn revalidate_selection(mut self) {
        let available = self.tables.peek().table_ids();
        let current = *self.selected_table.peek();
        let next = choose_selection(current, &available);
        if next != current {
            self.editor.write().reset();
            self.selected_table.set(next);
        }
    }

    pub fn select(mut self, table_id: TableId) {
        if *self.selected_table.peek() == Some(table_id) {
            return;
        }
        self.editor.write().reset();
        self.close_drafts();
        self.selected_table.set(Some(table_id));
    }

    /// Reports the outcome of a sync operation in the status line.
    pub fn finish(mut self, label: &str, result: SyncResult<()>) {
        self.in_flight.write().finish();
        match result {
            Ok(()) => self.status.set(format!("{label}: saved")),
            Err(err) if err.is_session_expired() => {
                log::error!("{label} failed: {err}");
                self.status.set(err.to_string());
                self.teardown();
                self.session_expired.set(true);
            }
            Err(err) => {
                log::warn!("{label} failed: {err}");
                self.status.set(format!("{label} failed: {err}"));
            }
        }
        self.revalidate_selection();
    }
}

/// Keeps the current table while it still exists, else falls back to the
/// first available one.
pub fn choose_selection(current: Option<TableId>, available: &[TableId]) -> Option<TableId> {
    match current {
        Some(id) if available.contains(&id) => Some(id),
        _ => available.first().copied(),
    }
}

pub fn default_table_name() -> String {
    format!("Table {}", chrono::Local::now().format("%m%d"))
}
