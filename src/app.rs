use std::future::Future;
use std::sync::Arc;

use dioxus::prelude::*;
use rfd::{MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};

use crate::config::AppConfig;
use crate::domain::entities::table::{RowId, TableId, ID_HEADER};
use crate::infra::http::repo::HttpTableApi;
use crate::infra::http::transport::HttpTransport;
use crate::ui::state::app_state::AppState;
use crate::ui::state::grid_state::{CellCommit, GridKey};
use crate::usecase::ports::table_api::NewTable;
use crate::usecase::services::sync_service::{SyncResult, TableSyncService};

const CELL_STYLE: &str = "border: 1px solid #bbb; padding: 6px; min-width: 120px;";
const HEADER_STYLE: &str =
    "border: 1px solid #bbb; padding: 6px; background: #f5f5f5; text-align: left; position: sticky; top: 0;";
const BUTTON_STYLE: &str =
    "border: 1px solid #bbb; background: #fff; padding: 4px 10px; border-radius: 6px; cursor: pointer;";

#[derive(Clone)]
struct Services {
    config: AppConfig,
    transport: Arc<HttpTransport>,
    sync: Arc<TableSyncService>,
}

impl Services {
    fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        let api = Arc::new(HttpTableApi {
            transport: transport.clone(),
        });
        Ok(Self {
            config: config.clone(),
            transport,
            sync: Arc::new(TableSyncService::new(api)),
        })
    }
}

fn grid_key(key: &Key) -> Option<GridKey> {
    match key {
        Key::Enter => Some(GridKey::Enter),
        Key::Tab => Some(GridKey::Tab),
        Key::ArrowUp => Some(GridKey::ArrowUp),
        Key::ArrowDown => Some(GridKey::ArrowDown),
        Key::ArrowLeft => Some(GridKey::ArrowLeft),
        Key::ArrowRight => Some(GridKey::ArrowRight),
        Key::Escape => Some(GridKey::Escape),
        _ => None,
    }
}

fn parse_header_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

/// Runs one sync operation off the event handler and reports its outcome.
fn run_sync<F, Fut>(state: AppState, label: &'static str, op: F)
where
    F: FnOnce() -> Fut + 'static,
    Fut: Future<Output = SyncResult<()>> + 'static,
{
    state.begin_op();
    spawn(async move {
        let result = op().await;
        state.finish(label, result);
    });
}

fn submit_cell(state: AppState, sync: Arc<TableSyncService>, commit: CellCommit) {
    run_sync(state, "edit cell", move || async move {
        let mut tables = state.tables;
        let patch = commit.patch();
        sync.edit_row(&mut tables, commit.table_id, commit.row_id, patch)
            .await
    });
}

#[component]
pub fn App() -> Element {
    let config = use_context::<AppConfig>();
    let services = use_hook(|| Services::connect(&config).map_err(|err| format!("{err:#}")));

    match services {
        Ok(services) => rsx! { Workspace { services } },
        Err(message) => rsx! {
            div { style: "padding: 24px; font-family: sans-serif;",
                h2 { "finsheet" }
                p { style: "color: #b00020;", "Cannot start: {message}" }
            }
        },
    }
}

impl PartialEq for Services {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.sync, &other.sync)
    }
}

#[component]
fn Workspace(services: Services) -> Element {
    let state = AppState::new();
    use_context_provider(|| state);
    use_context_provider(|| services.clone());

    let sync_for_start = services.sync.clone();
    use_hook(move || {
        spawn(async move {
            state.start_session(&sync_for_start).await;
        });
    });

    let status = state.status;
    let busy = state.is_busy();
    let session_expired = state.session_expired;
    let sync_for_reconnect = services.sync.clone();
    let transport_for_reconnect = services.transport.clone();
    let token_for_reconnect = services.config.access_token.clone();

    rsx! {
        div {
            style: "font-family: sans-serif; display: flex; height: 100vh;",
            Sidebar {}
            div {
                style: "flex: 1; padding: 12px; overflow: auto;",
                div {
                    style: "margin-bottom: 8px; color: #555;",
                    if busy { "Working... " }
                    "{status}"
                }
                if session_expired() {
                    div {
                        style: "margin-bottom: 12px;",
                        button {
                            style: BUTTON_STYLE,
                            onclick: move |_| {
                                let sync = sync_for_reconnect.clone();
                                let transport = transport_for_reconnect.clone();
                                let token = token_for_reconnect.clone();
                                spawn(async move {
                                    transport.restore_session(token).await;
                                    state.start_session(&sync).await;
                                });
                            },
                            "Reconnect"
                        }
                    }
                }
                Toolbar {}
                TableGrid {}
            }
        }
    }
}

#[component]
fn Sidebar() -> Element {
    let mut state = use_context::<AppState>();
    let services = use_context::<Services>();
    let (no_tables, entries) = {
        let store = state.tables.read();
        let entries: Vec<(TableId, String)> = store
            .table_ids()
            .into_iter()
            .map(|table_id| (table_id, store.label(table_id)))
            .collect();
        (store.is_empty(), entries)
    };
    let selected = (state.selected_table)();
    let busy = state.is_busy();
    let sync_for_create = services.sync.clone();

    rsx! {
        div {
            style: "width: 240px; border-right: 1px solid #ddd; padding: 12px; display: flex; flex-direction: column; gap: 8px;",
            h3 { "Tables" }
            if no_tables {
                p { style: "color: #888;", "No tables yet" }
            }
            for (table_id, label) in entries {
                div {
                    key: "{table_id}",
                    style: if selected == Some(table_id) { "padding: 6px; border-radius: 6px; cursor: pointer; background: #eef4ff;" } else { "padding: 6px; border-radius: 6px; cursor: pointer;" },
                    title: "Table #{table_id}",
                    onclick: move |_| state.select(table_id),
                    "{label}"
                }
            }
            hr {}
            h4 { "New table" }
            input {
                placeholder: "Name",
                value: (state.new_table_name)(),
                oninput: move |event| state.new_table_name.set(event.value()),
            }
            input {
                placeholder: "Description",
                value: (state.new_table_description)(),
                oninput: move |event| state.new_table_description.set(event.value()),
            }
            input {
                placeholder: "Columns, comma separated",
                value: (state.new_table_headers)(),
                oninput: move |event| state.new_table_headers.set(event.value()),
            }
            button {
                style: BUTTON_STYLE,
                disabled: busy,
                onclick: move |_| {
                    let name = state.new_table_name.peek().trim().to_string();
                    let description = state.new_table_description.peek().trim().to_string();
                    let table = NewTable {
                        description: if description.is_empty() { name.clone() } else { description },
                        name,
                        headers: parse_header_list(&state.new_table_headers.peek()),
                    };
                    let sync = sync_for_create.clone();
                    run_sync(state, "create table", move || async move {
                        let mut tables = state.tables;
                        let table_id = sync.create_table(&mut tables, table).await?;
                        state.select(table_id);
                        Ok(())
                    });
                },
                "Create"
            }
        }
    }
}

#[component]
fn Toolbar() -> Element {
    let mut state = use_context::<AppState>();
    let services = use_context::<Services>();
    let Some(table_id) = (state.selected_table)() else {
        return rsx! {};
    };
    let store = state.tables.read();
    let Some(table) = store.table(table_id) else {
        return rsx! {};
    };
    let row_count = table.rows.len();
    let header_count = table.headers.len();
    let blank_row = table.blank_row_values();
    let header_text = table.headers.join(", ");
    let label = store.label(table_id);
    let description = store
        .meta(table_id)
        .map(|meta| meta.description.clone())
        .unwrap_or_default();
    drop(store);

    let busy = state.is_busy();
    let renaming = (state.renaming_table)();
    let headers_draft = (state.headers_draft)();
    let sync_add_row = services.sync.clone();
    let sync_add_column = services.sync.clone();
    let sync_refresh = services.sync.clone();
    let sync_delete = services.sync.clone();
    let sync_rename = services.sync.clone();
    let sync_headers = services.sync.clone();
    let label_for_rename = label.clone();
    let label_for_delete = label.clone();

    rsx! {
        div {
            style: "display: flex; gap: 8px; align-items: center; margin-bottom: 4px;",
            if renaming {
                input {
                    value: (state.table_name_draft)(),
                    onmounted: move |event| async move {
                        let _ = event.set_focus(true).await;
                    },
                    oninput: move |event| state.table_name_draft.set(event.value()),
                    onkeydown: move |event: KeyboardEvent| match event.key() {
                        Key::Escape => state.renaming_table.set(false),
                        Key::Enter => {
                            let name = state.table_name_draft.peek().clone();
                            state.renaming_table.set(false);
                            let sync = sync_rename.clone();
                            run_sync(state, "rename table", move || async move {
                                let mut tables = state.tables;
                                sync.rename_table(&mut tables, table_id, name, None).await
                            });
                        }
                        _ => {}
                    },
                }
            } else {
                h3 {
                    style: "margin: 0; cursor: pointer;",
                    title: "Table #{table_id}",
                    ondoubleclick: move |_| {
                        state.table_name_draft.set(label_for_rename.clone());
                        state.renaming_table.set(true);
                    },
                    "{label}"
                }
            }
            span {
                style: "padding: 2px 8px; border-radius: 999px; background: #e3ecff; font-size: 12px;",
                "{row_count} entries"
            }
            button {
                style: BUTTON_STYLE,
                disabled: busy,
                onclick: move |_| {
                    let sync = sync_add_row.clone();
                    let values = blank_row.clone();
                    run_sync(state, "add row", move || async move {
                        let mut tables = state.tables;
                        let row_id = sync.add_row(&mut tables, table_id, values).await?;
                        sync.settle_row(&mut tables, table_id, row_id).await.map(|_| ())
                    });
                },
                "Add row"
            }
            button {
                style: BUTTON_STYLE,
                disabled: busy,
                onclick: move |_| {
                    let sync = sync_add_column.clone();
                    let header = format!("column_{}", header_count + 1);
                    run_sync(state, "add column", move || async move {
                        let mut tables = state.tables;
                        sync.add_column(&mut tables, table_id, header).await
                    });
                },
                "Add column"
            }
            button {
                style: BUTTON_STYLE,
                disabled: busy,
                onclick: move |_| state.headers_draft.set(Some(header_text.clone())),
                "Edit columns"
            }
            button {
                style: BUTTON_STYLE,
                disabled: busy,
                onclick: move |_| {
                    let sync = sync_refresh.clone();
                    run_sync(state, "refresh", move || async move {
                        let mut tables = state.tables;
                        sync.load_tables(&mut tables).await.map(|_| ())
                    });
                },
                "Refresh"
            }
            button {
                style: BUTTON_STYLE,
                disabled: busy,
                onclick: move |_| {
                    let confirm = MessageDialog::new()
                        .set_level(MessageLevel::Warning)
                        .set_title("Delete table")
                        .set_description(format!("Delete \"{label_for_delete}\"? This cannot be undone."))
                        .set_buttons(MessageButtons::YesNo)
                        .show();
                    if confirm != MessageDialogResult::Yes {
                        return;
                    }
                    let sync = sync_delete.clone();
                    run_sync(state, "delete table", move || async move {
                        let mut tables = state.tables;
                        sync.delete_table(&mut tables, table_id).await
                    });
                },
                "Delete table"
            }
        }
        if !description.is_empty() {
            p { style: "margin: 0 0 8px 0; color: #666;", "{description}" }
        }
        if let Some(draft) = headers_draft {
            div {
                style: "display: flex; gap: 8px; align-items: center; margin-bottom: 12px;",
                input {
                    style: "flex: 1;",
                    value: "{draft}",
                    oninput: move |event| state.headers_draft.set(Some(event.value())),
                }
                button {
                    style: BUTTON_STYLE,
                    disabled: busy,
                    onclick: move |_| {
                        let Some(draft) = state.headers_draft.peek().clone() else {
                            return;
                        };
                        state.headers_draft.set(None);
                        let headers = parse_header_list(&draft);
                        let sync = sync_headers.clone();
                        run_sync(state, "edit columns", move || async move {
                            let mut tables = state.tables;
                            sync.edit_headers(&mut tables, table_id, headers).await
                        });
                    },
                    "Apply"
                }
                button {
                    style: BUTTON_STYLE,
                    onclick: move |_| state.headers_draft.set(None),
                    "Cancel"
                }
            }
        }
    }
}

#[component]
fn TableGrid() -> Element {
    let mut state = use_context::<AppState>();
    let services = use_context::<Services>();
    let Some(table_id) = (state.selected_table)() else {
        return rsx! {
            p { style: "color: #888;", "No table selected or table has no data." }
        };
    };
    let Some(table) = state.tables.read().table(table_id).cloned() else {
        return rsx! {
            p { style: "color: #888;", "No table selected or table has no data." }
        };
    };
    let editor = state.editor.read().clone();
    let renaming = (state.renaming_header)();
    let busy = state.is_busy();
    let sync = services.sync.clone();

    rsx! {
        table {
            style: "border-collapse: collapse; font-size: 14px;",
            thead {
                tr {
                    for header in table.headers.clone() {
                        th {
                            key: "{header}",
                            style: HEADER_STYLE,
                            if renaming.as_deref() == Some(header.as_str()) {
                                HeaderRename { table_id, header: header.clone() }
                            } else {
                                span { "{header}" }
                                if header != ID_HEADER {
                                    HeaderActions { table_id, header: header.clone(), busy }
                                }
                            }
                        }
                    }
                    th { style: HEADER_STYLE, "" }
                }
            }
            tbody {
                if table.rows.is_empty() {
                    tr {
                        td { style: CELL_STYLE, colspan: "{table.headers.len() + 1}", "No rows" }
                    }
                }
                for (row_index, row) in table.rows.iter().enumerate() {
                    tr {
                        key: "{row.id}",
                        style: if row.id.is_resolved() { "" } else { "background: #fff7d6;" },
                        for header in table.headers.clone() {
                            if editor.is_editing(row_index, &header) {
                                td {
                                    key: "{header}",
                                    style: CELL_STYLE,
                                    input {
                                        value: "{editor.buffer()}",
                                        onmounted: move |event| async move {
                                            let _ = event.set_focus(true).await;
                                        },
                                        oninput: move |event| state.editor.write().input(event.value()),
                                        onkeydown: {
                                            let sync = sync.clone();
                                            move |event: KeyboardEvent| {
                                                let Some(key) = grid_key(&event.key()) else {
                                                    return;
                                                };
                                                if key != GridKey::Enter {
                                                    event.prevent_default();
                                                }
                                                let commit = {
                                                    let store = state.tables.peek();
                                                    let Some(table) = store.table(table_id) else {
                                                        return;
                                                    };
                                                    state.editor.write().key(table, key)
                                                };
                                                if let Some(commit) = commit {
                                                    submit_cell(state, sync.clone(), commit);
                                                }
                                            }
                                        },
                                        onblur: {
                                            let sync = sync.clone();
                                            let header = header.clone();
                                            move |_| {
                                                // Stale blur from a cell the keyboard already left.
                                                if !state.editor.peek().is_editing(row_index, &header) {
                                                    return;
                                                }
                                                let commit = {
                                                    let store = state.tables.peek();
                                                    let Some(table) = store.table(table_id) else {
                                                        return;
                                                    };
                                                    state.editor.write().blur(table)
                                                };
                                                if let Some(commit) = commit {
                                                    submit_cell(state, sync.clone(), commit);
                                                }
                                            }
                                        },
                                    }
                                }
                            } else {
                                td {
                                    key: "{header}",
                                    style: if header == ID_HEADER { "border: 1px solid #bbb; padding: 6px; color: #888;" } else { CELL_STYLE },
                                    onclick: {
                                        let sync = sync.clone();
                                        let header = header.clone();
                                        move |_| {
                                            let commit = {
                                                let store = state.tables.peek();
                                                let Some(table) = store.table(table_id) else {
                                                    return;
                                                };
                                                state.editor.write().click(table, row_index, &header)
                                            };
                                            if let Some(commit) = commit {
                                                submit_cell(state, sync.clone(), commit);
                                            }
                                        }
                                    },
                                    "{row.cell_text(&header)}"
                                }
                            }
                        }
                        td {
                            style: CELL_STYLE,
                            RowActions { table_id, row_id: row.id.clone(), busy }
                        }
                    }
                }
            }
        }
    }
}

#[component]
fn HeaderActions(table_id: TableId, header: String, busy: bool) -> Element {
    let mut state = use_context::<AppState>();
    let services = use_context::<Services>();
    let header_for_rename = header.clone();
    let sync = services.sync.clone();

    rsx! {
        button {
            style: "margin-left: 6px; font-size: 11px;",
            disabled: busy,
            onclick: move |_| {
                state.rename_value.set(header_for_rename.clone());
                state.renaming_header.set(Some(header_for_rename.clone()));
            },
            "Rename"
        }
        button {
            style: "margin-left: 4px; font-size: 11px;",
            disabled: busy,
            onclick: move |_| {
                let sync = sync.clone();
                let header = header.clone();
                run_sync(state, "delete column", move || async move {
                    let mut tables = state.tables;
                    sync.delete_column(&mut tables, table_id, header).await
                });
            },
            "Delete"
        }
    }
}

#[component]
fn HeaderRename(table_id: TableId, header: String) -> Element {
    let mut state = use_context::<AppState>();
    let services = use_context::<Services>();
    let sync = services.sync.clone();

    rsx! {
        input {
            value: (state.rename_value)(),
            onmounted: move |event| async move {
                let _ = event.set_focus(true).await;
            },
            oninput: move |event| state.rename_value.set(event.value()),
            onkeydown: move |event: KeyboardEvent| {
                match event.key() {
                    Key::Escape => state.renaming_header.set(None),
                    Key::Enter => {
                        let new_header = state.rename_value.peek().clone();
                        state.renaming_header.set(None);
                        if new_header.trim() == header {
                            return;
                        }
                        let sync = sync.clone();
                        let old_header = header.clone();
                        run_sync(state, "rename column", move || async move {
                            let mut tables = state.tables;
                            sync.rename_header(&mut tables, table_id, old_header, new_header)
                                .await
                        });
                    }
                    _ => {}
                }
            },
        }
    }
}

#[component]
fn RowActions(table_id: TableId, row_id: RowId, busy: bool) -> Element {
    let state = use_context::<AppState>();
    let services = use_context::<Services>();
    let sync_duplicate = services.sync.clone();
    let sync_delete = services.sync.clone();
    let row_for_duplicate = row_id.clone();
    let resolved = row_id.is_resolved();

    rsx! {
        button {
            style: "font-size: 11px;",
            disabled: busy || !resolved,
            onclick: move |_| {
                let sync = sync_duplicate.clone();
                let row_id = row_for_duplicate.clone();
                run_sync(state, "duplicate row", move || async move {
                    let mut tables = state.tables;
                    let copy = sync.duplicate_row(&mut tables, table_id, &row_id).await?;
                    sync.settle_row(&mut tables, table_id, copy).await.map(|_| ())
                });
            },
            "Duplicate"
        }
        button {
            style: "margin-left: 4px; font-size: 11px;",
            disabled: busy || !resolved,
            onclick: move |_| {
                let sync = sync_delete.clone();
                let row_id = row_id.clone();
                run_sync(state, "delete row", move || async move {
                    let mut tables = state.tables;
                    sync.delete_row(&mut tables, table_id, row_id).await
                });
            },
            "Delete"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_list_is_trimmed_and_skips_blanks() {
        assert_eq!(
            parse_header_list(" id, date ,, amount ,"),
            vec!["id", "date", "amount"]
        );
        assert!(parse_header_list("  ").is_empty());
    }

    #[test]
    fn navigation_keys_map_to_grid_keys() {
        assert_eq!(grid_key(&Key::Tab), Some(GridKey::Tab));
        assert_eq!(grid_key(&Key::Escape), Some(GridKey::Escape));
        assert_eq!(grid_key(&Key::Character("a".to_string())), None);
    }
}
