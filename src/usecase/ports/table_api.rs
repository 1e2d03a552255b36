use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::table::{NewRow, RowId, RowValues, TableId, TableMeta, TableRecord};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("{0}")]
    Transport(String),
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("session expired, please sign in again")]
    SessionExpired,
    #[error("unexpected response from server: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTable {
    pub name: String,
    pub description: String,
    pub headers: Vec<String>,
}

/// Remote table store. Every call is exactly one request.
#[async_trait]
pub trait TableApi: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableRecord>, ApiError>;
    /// Names and descriptions, kept by the server apart from the contents.
    async fn list_table_meta(&self) -> Result<Vec<TableMeta>, ApiError>;

    async fn create_table(&self, table: &NewTable) -> Result<TableRecord, ApiError>;
    async fn delete_table(&self, table_id: TableId) -> Result<(), ApiError>;
    /// Returns the server's copy of the metadata when it sends one.
    async fn rename_table(
        &self,
        table_id: TableId,
        name: &str,
        description: Option<&str>,
    ) -> Result<Option<TableMeta>, ApiError>;

    /// Returns the row as the server stored it; the id is present when the
    /// server assigned or echoed one.
    async fn add_row(&self, table_id: TableId, values: &RowValues) -> Result<NewRow, ApiError>;
    /// Returns the server's full copy of the updated row when it sends one.
    async fn edit_row(
        &self,
        table_id: TableId,
        row_id: &RowId,
        values: &RowValues,
    ) -> Result<Option<RowValues>, ApiError>;
    async fn delete_row(&self, table_id: TableId, row_id: &RowId) -> Result<(), ApiError>;

    /// Both column calls return the server's header list when it sends one.
    async fn add_column(
        &self,
        table_id: TableId,
        header: &str,
    ) -> Result<Option<Vec<String>>, ApiError>;
    /// Replaces the header list; the server drops columns that disappear.
    async fn set_headers(
        &self,
        table_id: TableId,
        headers: &[String],
    ) -> Result<Option<Vec<String>>, ApiError>;
    async fn rename_header(
        &self,
        table_id: TableId,
        old_header: &str,
        new_header: &str,
    ) -> Result<(), ApiError>;
}
