use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::domain::entities::table::{
    CellValue, NewRow, RowId, RowValues, TableId, TableMeta, TableRecord, ID_HEADER,
};
use crate::usecase::ports::table_api::{ApiError, NewTable};

pub const NO_RESPONSE: &str = "No response received from server";

#[derive(Debug, Deserialize)]
struct TableContentWire {
    id: i64,
    data: TableDataWire,
}

#[derive(Debug, Default, Deserialize)]
struct TableDataWire {
    #[serde(default)]
    headers: Vec<String>,
    #[serde(default)]
    rows: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct CreatedTableWire {
    #[serde(alias = "id")]
    table_id: Option<i64>,
    #[serde(default)]
    headers: Vec<String>,
    data: Option<CreatedTableDataWire>,
}

#[derive(Debug, Deserialize)]
struct CreatedTableDataWire {
    id: Option<i64>,
    #[serde(default)]
    headers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TableMetaWire {
    id: i64,
    #[serde(default)]
    table_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl From<TableMetaWire> for TableMeta {
    fn from(wire: TableMetaWire) -> Self {
        TableMeta {
            id: TableId(wire.id),
            name: wire.table_name.unwrap_or_default(),
            description: wire.description.unwrap_or_default(),
        }
    }
}

/// Turns a raw status + body into the JSON payload or an [`ApiError`].
pub fn interpret_response(status: u16, body: &str) -> Result<Value, ApiError> {
    if !(200..300).contains(&status) {
        return Err(ApiError::Server {
            status,
            message: error_message(body, status),
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let payload: Value =
        serde_json::from_str(body).map_err(|err| ApiError::Decode(err.to_string()))?;
    if payload.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(ApiError::Server {
            status,
            message: error_message(body, status),
        });
    }
    Ok(payload)
}

/// Server-provided `message`, then `error`, else a status-derived fallback.
pub fn error_message(body: &str, status: u16) -> String {
    let payload: Option<Value> = serde_json::from_str(body).ok();
    payload
        .as_ref()
        .and_then(|p| {
            ["message", "error"]
                .iter()
                .find_map(|key| p.get(*key).and_then(Value::as_str))
        })
        .filter(|message| !message.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP error! status: {status}"))
}

pub fn parse_table_list(payload: Value) -> Result<Vec<TableRecord>, ApiError> {
    let tables: Vec<TableContentWire> =
        serde_json::from_value(payload).map_err(|err| ApiError::Decode(err.to_string()))?;
    Ok(tables
        .into_iter()
        .map(|table| TableRecord {
            id: TableId(table.id),
            headers: table.data.headers,
            rows: table.data.rows.into_iter().map(row_from_wire).collect(),
        })
        .collect())
}

pub fn parse_created_table(payload: Value, requested: &NewTable) -> Result<TableRecord, ApiError> {
    let created: CreatedTableWire =
        serde_json::from_value(payload).map_err(|err| ApiError::Decode(err.to_string()))?;
    let (nested_id, nested_headers) = match created.data {
        Some(data) => (data.id, data.headers),
        None => (None, Vec::new()),
    };
    let id = created
        .table_id
        .or(nested_id)
        .ok_or_else(|| ApiError::Decode("created table has no id".to_string()))?;
    let headers = [created.headers, nested_headers]
        .into_iter()
        .find(|headers| !headers.is_empty())
        .unwrap_or_else(|| requested.headers.clone());
    Ok(TableRecord {
        id: TableId(id),
        headers,
        rows: Vec::new(),
    })
}

/// The metadata list comes wrapped as `{message, data: [..]}`; a bare array
/// is accepted too.
pub fn parse_table_meta_list(payload: Value) -> Result<Vec<TableMeta>, ApiError> {
    let list = match payload {
        Value::Object(mut object) => object.remove("data").unwrap_or(Value::Null),
        other => other,
    };
    if list.is_null() {
        return Ok(Vec::new());
    }
    let entries: Vec<TableMetaWire> =
        serde_json::from_value(list).map_err(|err| ApiError::Decode(err.to_string()))?;
    Ok(entries.into_iter().map(TableMeta::from).collect())
}

pub fn parse_updated_meta(payload: Value) -> Option<TableMeta> {
    match payload {
        Value::Object(mut object) => {
            let data = object.remove("data")?;
            serde_json::from_value::<TableMetaWire>(data)
                .ok()
                .map(TableMeta::from)
        }
        _ => None,
    }
}

/// Header list echoed by the column endpoints.
pub fn parse_headers(payload: &Value) -> Option<Vec<String>> {
    let headers = payload.get("headers")?.as_array()?;
    headers
        .iter()
        .map(|header| header.as_str().map(str::to_string))
        .collect()
}

/// The add-row response carries the stored row under `data`.
pub fn parse_added_row(payload: Value) -> NewRow {
    match payload {
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Object(row)) => row_from_wire(row),
            _ => NewRow::default(),
        },
        _ => NewRow::default(),
    }
}

pub fn parse_updated_row(payload: Value) -> Option<RowValues> {
    match payload {
        Value::Object(mut object) => match object.remove("updated_row") {
            Some(Value::Object(row)) => Some(row_from_wire(row).values),
            _ => None,
        },
        _ => None,
    }
}

pub fn access_token(payload: &Value) -> Option<String> {
    ["access_token", "access"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

pub fn row_from_wire(mut row: Map<String, Value>) -> NewRow {
    let id = row.remove(ID_HEADER).and_then(row_id_from_wire);
    let values = row
        .into_iter()
        .map(|(key, value)| (key, CellValue::from(value)))
        .collect();
    NewRow { id, values }
}

fn row_id_from_wire(value: Value) -> Option<RowId> {
    match value {
        Value::Number(number) => Some(match number.as_i64() {
            Some(id) => RowId::Number(id),
            None => RowId::Text(number.to_string()),
        }),
        Value::String(text) if !text.is_empty() => Some(RowId::Text(text)),
        _ => None,
    }
}

pub fn row_id_to_wire(row_id: &RowId) -> Value {
    match row_id {
        RowId::Number(id) => json!(id),
        RowId::Text(id) => json!(id),
        RowId::Placeholder(_) => Value::Null,
    }
}

pub fn values_to_wire(values: &RowValues) -> Value {
    Value::Object(
        values
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value.clone())))
            .collect(),
    )
}
