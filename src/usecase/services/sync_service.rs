use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::entities::action::TableAction;
use crate::domain::entities::table::{
    NewRow, RowId, RowPatch, RowValues, Table, TableId, TableMeta, TableRecord, ID_HEADER,
};
use crate::domain::store::{reduce, TableStore};
use crate::usecase::ports::table_api::{ApiError, NewTable, TableApi};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Rejected locally; no request was sent.
    #[error("{0}")]
    Validation(String),
}

impl SyncError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, SyncError::Api(ApiError::SessionExpired))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Owner of a [`TableStore`] that the sync service reads and dispatches into.
pub trait StoreHandle {
    fn with_store<R>(&self, f: impl FnOnce(&TableStore) -> R) -> R;
    fn dispatch(&mut self, action: TableAction);
}

impl StoreHandle for TableStore {
    fn with_store<R>(&self, f: impl FnOnce(&TableStore) -> R) -> R {
        f(self)
    }

    fn dispatch(&mut self, action: TableAction) {
        log::trace!("dispatch {}", action.name());
        let current = std::mem::take(self);
        *self = reduce(current, action);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum QueueKey {
    Table(TableId),
    Row(TableId, RowId),
}

/// FIFO lanes keyed by table or row. Operations on the same key reach the
/// server and the store in the order they were issued.
#[derive(Default)]
struct SyncQueues {
    lanes: Mutex<HashMap<QueueKey, Arc<AsyncMutex<()>>>>,
}

impl SyncQueues {
    fn lane(&self, key: QueueKey) -> Arc<AsyncMutex<()>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        lanes.entry(key).or_default().clone()
    }

    /// Waits for every earlier operation on `key` to finish.
    async fn enter(&self, key: QueueKey) -> LaneTurn<'_> {
        let guard = self.lane(key).lock_owned().await;
        LaneTurn {
            queues: self,
            guard: Some(guard),
        }
    }

    fn prune(&self) {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        lanes.retain(|_, lane| Arc::strong_count(lane) > 1);
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct LaneTurn<'a> {
    queues: &'a SyncQueues,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LaneTurn<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.queues.prune();
    }
}

/// Sends each edit to the server and applies it to the store only once the
/// server has confirmed it. On failure the store is left as it was.
pub struct TableSyncService {
    api: Arc<dyn TableApi>,
    queues: SyncQueues,
}

impl TableSyncService {
    pub fn new(api: Arc<dyn TableApi>) -> Self {
        Self {
            api,
            queues: SyncQueues::default(),
        }
    }

    /// Fetches contents and metadata; the store changes only when both
    /// arrive.
    pub async fn load_tables<S: StoreHandle>(&self, store: &mut S) -> SyncResult<usize> {
        log::debug!("loading table contents");
        let tables = confirmed("load_tables", self.api.list_tables().await)?;
        let meta = confirmed("load_table_meta", self.api.list_table_meta().await)?;
        let count = tables.len();
        store.dispatch(TableAction::SetTables(tables));
        store.dispatch(TableAction::SetTableMeta(meta));
        log::info!("loaded {count} tables");
        Ok(count)
    }

    /// Reloads everything when rows are still waiting for a server id.
    /// Returns whether a reload happened.
    pub async fn reconcile_pending<S: StoreHandle>(&self, store: &mut S) -> SyncResult<bool> {
        if !store.with_store(TableStore::has_pending_rows) {
            return Ok(false);
        }
        self.load_tables(store).await?;
        Ok(true)
    }

    pub async fn create_table<S: StoreHandle>(
        &self,
        store: &mut S,
        table: NewTable,
    ) -> SyncResult<TableId> {
        if table.name.trim().is_empty() {
            return Err(invalid("table name is required"));
        }
        validate_header_list(&table.headers)?;

        let created = confirmed("create_table", self.api.create_table(&table).await)?;
        let table_id = created.id;
        let headers = if created.headers.is_empty() {
            table.headers
        } else {
            created.headers
        };
        store.dispatch(TableAction::AddTable(TableRecord {
            id: table_id,
            headers,
            rows: Vec::new(),
        }));
        store.dispatch(TableAction::AddTableMeta(TableMeta {
            id: table_id,
            name: table.name,
            description: table.description,
        }));
        log::info!("created table {table_id}");
        Ok(table_id)
    }

    pub async fn delete_table<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
    ) -> SyncResult<()> {
        let _turn = self.queues.enter(QueueKey::Table(table_id)).await;
        table_snapshot(store, table_id)?;

        confirmed("delete_table", self.api.delete_table(table_id).await)?;
        store.dispatch(TableAction::DeleteTable { table_id });
        Ok(())
    }

    pub async fn rename_table<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
        name: String,
        description: Option<String>,
    ) -> SyncResult<()> {
        let _turn = self.queues.enter(QueueKey::Table(table_id)).await;

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(invalid("table name is required"));
        }
        if !store.with_store(|s| s.meta(table_id).is_some()) {
            return Err(invalid(format!("no table with id {table_id}")));
        }

        let server_meta = confirmed(
            "rename_table",
            self.api
                .rename_table(table_id, &name, description.as_deref())
                .await,
        )?;
        let (name, description) = match server_meta {
            Some(meta) if meta.id == table_id => (meta.name, Some(meta.description)),
            _ => (name, description),
        };
        store.dispatch(TableAction::RenameTable {
            table_id,
            name,
            description,
        });
        Ok(())
    }

    /// Adds a row and returns the id it ended up with in the store.
    pub async fn add_row<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
        values: RowValues,
    ) -> SyncResult<RowId> {
        table_snapshot(store, table_id)?;

        let stored = confirmed("add_row", self.api.add_row(table_id, &values).await)?;
        let mut merged = values;
        merged.extend(stored.values);
        let server_id = stored.id;
        store.dispatch(TableAction::AddRow {
            table_id,
            row: NewRow {
                id: server_id.clone(),
                values: merged,
            },
        });

        let row_id = match server_id {
            Some(id) => id,
            None => {
                log::warn!("server returned no id for new row in table {table_id}");
                store
                    .with_store(|s| {
                        s.table(table_id)
                            .and_then(|t| t.rows.last())
                            .map(|row| row.id.clone())
                    })
                    .ok_or_else(|| invalid("row was not added"))?
            }
        };
        Ok(row_id)
    }

    /// Swaps a placeholder id for the server's by reloading, since the add-row
    /// response may not carry one. The server appends rows, so the settled
    /// id is the table's last row after the reload.
    pub async fn settle_row<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
        row_id: RowId,
    ) -> SyncResult<RowId> {
        if row_id.is_resolved() {
            return Ok(row_id);
        }
        self.reconcile_pending(store).await?;
        store
            .with_store(|s| {
                s.table(table_id)
                    .and_then(|t| t.rows.last())
                    .map(|row| row.id.clone())
            })
            .filter(RowId::is_resolved)
            .ok_or_else(|| invalid("row was not found after reload"))
    }

    pub async fn duplicate_row<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
        row_id: &RowId,
    ) -> SyncResult<RowId> {
        let table = table_snapshot(store, table_id)?;
        let source = table
            .row(row_id)
            .ok_or_else(|| invalid(format!("no row with id {row_id} in table {table_id}")))?;
        let values = source.values.clone();
        self.add_row(store, table_id, values).await
    }

    pub async fn edit_row<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
        row_id: RowId,
        patch: RowPatch,
    ) -> SyncResult<()> {
        let key = QueueKey::Row(table_id, row_id.clone());
        let _turn = self.queues.enter(key).await;

        let table = table_snapshot(store, table_id)?;
        require_resolved_row(&table, &row_id)?;
        let values: RowValues = patch
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect();
        if values.is_empty() {
            return Err(invalid("nothing to update"));
        }

        let server_row = confirmed(
            "edit_row",
            self.api.edit_row(table_id, &row_id, &values).await,
        )?;
        let applied = server_row.unwrap_or(values);
        store.dispatch(TableAction::EditRow {
            table_id,
            row_id,
            patch: applied.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        });
        Ok(())
    }

    pub async fn delete_row<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
        row_id: RowId,
    ) -> SyncResult<()> {
        let _turn = self.queues.enter(QueueKey::Row(table_id, row_id.clone())).await;

        let table = table_snapshot(store, table_id)?;
        require_resolved_row(&table, &row_id)?;

        confirmed("delete_row", self.api.delete_row(table_id, &row_id).await)?;
        store.dispatch(TableAction::DeleteRow { table_id, row_id });
        Ok(())
    }

    pub async fn add_column<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
        header: String,
    ) -> SyncResult<()> {
        let _turn = self.queues.enter(QueueKey::Table(table_id)).await;

        let table = table_snapshot(store, table_id)?;
        let header = header.trim().to_string();
        if header.is_empty() {
            return Err(invalid("column name is required"));
        }
        if table.has_header(&header) {
            return Err(invalid(format!("column '{header}' already exists")));
        }

        let server_headers = confirmed("add_column", self.api.add_column(table_id, &header).await)?;
        store.dispatch(TableAction::AddColumn { table_id, header });
        adopt_server_headers(store, table_id, server_headers);
        Ok(())
    }

    pub async fn delete_column<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
        header: String,
    ) -> SyncResult<()> {
        let _turn = self.queues.enter(QueueKey::Table(table_id)).await;

        let table = table_snapshot(store, table_id)?;
        if header == ID_HEADER {
            return Err(invalid("the id column cannot be deleted"));
        }
        if !table.has_header(&header) {
            return Err(invalid(format!("no column named '{header}'")));
        }
        if table.headers.len() <= 1 {
            return Err(invalid("cannot delete the last remaining column"));
        }
        let remaining: Vec<String> = table
            .headers
            .iter()
            .filter(|h| **h != header)
            .cloned()
            .collect();

        let server_headers = confirmed(
            "delete_column",
            self.api.set_headers(table_id, &remaining).await,
        )?;
        store.dispatch(TableAction::DeleteColumn { table_id, header });
        adopt_server_headers(store, table_id, server_headers);
        Ok(())
    }

    pub async fn edit_headers<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
        headers: Vec<String>,
    ) -> SyncResult<()> {
        let _turn = self.queues.enter(QueueKey::Table(table_id)).await;

        table_snapshot(store, table_id)?;
        validate_header_list(&headers)?;

        let server_headers = confirmed(
            "edit_headers",
            self.api.set_headers(table_id, &headers).await,
        )?;
        store.dispatch(TableAction::EditTableHeaders { table_id, headers });
        adopt_server_headers(store, table_id, server_headers);
        Ok(())
    }

    pub async fn rename_header<S: StoreHandle>(
        &self,
        store: &mut S,
        table_id: TableId,
        old_header: String,
        new_header: String,
    ) -> SyncResult<()> {
        let _turn = self.queues.enter(QueueKey::Table(table_id)).await;

        let table = table_snapshot(store, table_id)?;
        let new_header = new_header.trim().to_string();
        if old_header == ID_HEADER || new_header == ID_HEADER {
            return Err(invalid("the id column cannot be renamed"));
        }
        if new_header.is_empty() {
            return Err(invalid("column name is required"));
        }
        if !table.has_header(&old_header) {
            return Err(invalid(format!("no column named '{old_header}'")));
        }
        if table.has_header(&new_header) {
            return Err(invalid(format!("column '{new_header}' already exists")));
        }

        confirmed(
            "rename_header",
            self.api
                .rename_header(table_id, &old_header, &new_header)
                .await,
        )?;
        store.dispatch(TableAction::EditHeader {
            table_id,
            old_header,
            new_header,
        });
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> SyncError {
    SyncError::Validation(message.into())
}

fn confirmed<T>(operation: &str, result: Result<T, ApiError>) -> SyncResult<T> {
    match result {
        Ok(value) => {
            log::debug!("{operation} confirmed by server");
            Ok(value)
        }
        Err(err) => {
            log::warn!("{operation} failed: {err}");
            Err(SyncError::Api(err))
        }
    }
}

/// Replaces the local header list with the server's echo when they differ.
fn adopt_server_headers<S: StoreHandle>(
    store: &mut S,
    table_id: TableId,
    server_headers: Option<Vec<String>>,
) {
    let Some(headers) = server_headers else {
        return;
    };
    if let Err(err) = validate_header_list(&headers) {
        log::warn!("ignoring header list from server for table {table_id}: {err}");
        return;
    }
    let current = store.with_store(|s| s.table(table_id).map(|t| t.headers.clone()));
    if current.as_ref() != Some(&headers) {
        log::debug!("table {table_id} headers differ from server, adopting server list");
        store.dispatch(TableAction::EditTableHeaders { table_id, headers });
    }
}

fn table_snapshot<S: StoreHandle>(store: &S, table_id: TableId) -> SyncResult<Table> {
    store
        .with_store(|s| s.table(table_id).cloned())
        .ok_or_else(|| invalid(format!("no table with id {table_id}")))
}

fn require_resolved_row(table: &Table, row_id: &RowId) -> SyncResult<()> {
    if !row_id.is_resolved() {
        return Err(invalid("row is not saved yet"));
    }
    if table.row(row_id).is_none() {
        return Err(invalid(format!(
            "no row with id {row_id} in table {}",
            table.id
        )));
    }
    Ok(())
}

fn validate_header_list(headers: &[String]) -> SyncResult<()> {
    if headers.is_empty() {
        return Err(invalid("at least one column is required"));
    }
    for (idx, header) in headers.iter().enumerate() {
        if header.trim().is_empty() {
            return Err(invalid("column names cannot be blank"));
        }
        if headers[..idx].contains(header) {
            return Err(invalid(format!("duplicate column '{header}'")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_list_rejects_blank_and_duplicates() {
        let ok = vec!["id".to_string(), "amount".to_string()];
        assert!(validate_header_list(&ok).is_ok());

        let blank = vec!["id".to_string(), " ".to_string()];
        assert!(matches!(
            validate_header_list(&blank),
            Err(SyncError::Validation(_))
        ));

        let dup = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(
            validate_header_list(&dup),
            Err(SyncError::Validation("duplicate column 'a'".to_string()))
        );

        assert!(validate_header_list(&[]).is_err());
    }

    #[test]
    fn queues_prune_idle_lanes() {
        let queues = SyncQueues::default();
        let lane = queues.lane(QueueKey::Table(TableId(1)));
        drop(queues.lane(QueueKey::Row(TableId(1), RowId::Number(2))));
        queues.prune();
        assert_eq!(queues.pending(), 1);
        drop(lane);
        queues.prune();
        assert_eq!(queues.pending(), 0);
    }

    #[test]
    fn same_key_shares_a_lane() {
        let queues = SyncQueues::default();
        let a = queues.lane(QueueKey::Row(TableId(1), RowId::Number(2)));
        let b = queues.lane(QueueKey::Row(TableId(1), RowId::Number(2)));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn session_expiry_is_detectable() {
        assert!(SyncError::Api(ApiError::SessionExpired).is_session_expired());
        assert!(!SyncError::Validation("x".to_string()).is_session_expired());
    }
}
