use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::entities::table::{NewRow, RowId, RowValues, TableId, TableMeta, TableRecord};
use crate::infra::http::transport::HttpTransport;
use crate::infra::http::wire::{
    parse_added_row, parse_created_table, parse_headers, parse_table_list, parse_table_meta_list,
    parse_updated_meta, parse_updated_row, row_id_to_wire, values_to_wire,
};
use crate::usecase::ports::table_api::{ApiError, NewTable, TableApi};

const TABLE_CONTENTS: &str = "main/table-contents/";
const TABLE_META: &str = "main/tables/";
const UPDATE_TABLE: &str = "main/tables/update/";
const CREATE_TABLE: &str = "main/create-tableContent/";
const ADD_ROW: &str = "main/add-row/";
const UPDATE_ROW: &str = "main/update-row/";
const DELETE_ROW: &str = "main/delete-row/";
const ADD_COLUMN: &str = "main/add-column/";
const DELETE_COLUMN: &str = "main/delete-column/";
const EDIT_HEADER: &str = "main/edit-header/";

fn table_path(table_id: TableId) -> String {
    format!("main/tables/{}/", table_id.0)
}

pub struct HttpTableApi {
    pub transport: Arc<HttpTransport>,
}

#[async_trait]
impl TableApi for HttpTableApi {
    async fn list_tables(&self) -> Result<Vec<TableRecord>, ApiError> {
        let payload = self.transport.get(TABLE_CONTENTS).await?;
        parse_table_list(payload)
    }

    async fn list_table_meta(&self) -> Result<Vec<TableMeta>, ApiError> {
        let payload = self.transport.get(TABLE_META).await?;
        parse_table_meta_list(payload)
    }

    async fn create_table(&self, table: &NewTable) -> Result<TableRecord, ApiError> {
        let body = json!({
            "table_name": table.name,
            "description": table.description,
            "headers": table.headers,
            "data": { "headers": table.headers },
        });
        let payload = self.transport.post(CREATE_TABLE, &body).await?;
        parse_created_table(payload, table)
    }

    async fn delete_table(&self, table_id: TableId) -> Result<(), ApiError> {
        self.transport.delete(&table_path(table_id)).await?;
        Ok(())
    }

    async fn rename_table(
        &self,
        table_id: TableId,
        name: &str,
        description: Option<&str>,
    ) -> Result<Option<TableMeta>, ApiError> {
        let mut body = json!({
            "id": table_id.0,
            "table_name": name,
        });
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        let payload = self.transport.put(UPDATE_TABLE, &body).await?;
        Ok(parse_updated_meta(payload))
    }

    async fn add_row(&self, table_id: TableId, values: &RowValues) -> Result<NewRow, ApiError> {
        let body = json!({
            "tableId": table_id.0,
            "row": values_to_wire(values),
        });
        let payload = self.transport.post(ADD_ROW, &body).await?;
        Ok(parse_added_row(payload))
    }

    async fn edit_row(
        &self,
        table_id: TableId,
        row_id: &RowId,
        values: &RowValues,
    ) -> Result<Option<RowValues>, ApiError> {
        let body = json!({
            "table_id": table_id.0,
            "row_id": row_id_to_wire(row_id),
            "new_row": values_to_wire(values),
        });
        let payload = self.transport.patch(UPDATE_ROW, &body).await?;
        Ok(parse_updated_row(payload))
    }

    async fn delete_row(&self, table_id: TableId, row_id: &RowId) -> Result<(), ApiError> {
        let body = json!({
            "tableId": table_id.0,
            "rowId": row_id_to_wire(row_id),
        });
        self.transport.post(DELETE_ROW, &body).await?;
        Ok(())
    }

    async fn add_column(
        &self,
        table_id: TableId,
        header: &str,
    ) -> Result<Option<Vec<String>>, ApiError> {
        let body = json!({
            "table_id": table_id.0,
            "header": header,
        });
        let payload = self.transport.post(ADD_COLUMN, &body).await?;
        Ok(parse_headers(&payload))
    }

    async fn set_headers(
        &self,
        table_id: TableId,
        headers: &[String],
    ) -> Result<Option<Vec<String>>, ApiError> {
        let body = json!({
            "tableId": table_id.0,
            "headers": headers,
        });
        let payload = self.transport.post(DELETE_COLUMN, &body).await?;
        Ok(parse_headers(&payload))
    }

    async fn rename_header(
        &self,
        table_id: TableId,
        old_header: &str,
        new_header: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "tableId": table_id.0,
            "oldHeader": old_header,
            "newHeader": new_header,
        });
        self.transport.post(EDIT_HEADER, &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_path_embeds_id() {
        assert_eq!(table_path(TableId(42)), "main/tables/42/");
    }
}
