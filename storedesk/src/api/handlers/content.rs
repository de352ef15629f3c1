//! Storefront and CMS rows, passed straight through to their configured tables.

use crate::AppState;
use crate::clients::{ClientError, Row};
use crate::errors::{Error, Result};
use crate::models::content::ContentKind;
use crate::types::{RowId, TableId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

fn content_table(state: &AppState, kind: &str) -> Result<(ContentKind, TableId)> {
    let kind: ContentKind = kind.parse().map_err(|_| Error::not_found("Content kind", kind))?;
    let table = kind
        .table(&state.config.table_store.tables)
        .ok_or_else(|| Error::not_configured(format!("table_store.tables.{kind}")))?;
    Ok((kind, table))
}

fn row_not_found(kind: ContentKind, id: &str) -> impl FnOnce(ClientError) -> Error + '_ {
    move |e| {
        if e.is_not_found() {
            Error::not_found(kind.to_string(), id)
        } else {
            e.into()
        }
    }
}

/// Row ids belong to the table store; callers cannot pick or change them.
fn without_id(mut row: Row) -> Row {
    row.remove("id");
    row
}

#[tracing::instrument(skip_all)]
pub async fn list_content(State(state): State<AppState>, Path(kind): Path<String>) -> Result<Json<Vec<Row>>> {
    let (_, table) = content_table(&state, &kind)?;
    Ok(Json(state.table_store.list_rows(table).await?))
}

#[tracing::instrument(skip_all)]
pub async fn create_content(State(state): State<AppState>, Path(kind): Path<String>, Json(row): Json<Row>) -> Result<(StatusCode, Json<Row>)> {
    let (_, table) = content_table(&state, &kind)?;
    let created = state.table_store.create_row(table, &without_id(row)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[tracing::instrument(skip_all)]
pub async fn update_content(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, RowId)>,
    Json(row): Json<Row>,
) -> Result<Json<Row>> {
    let (kind, table) = content_table(&state, &kind)?;
    let patch = without_id(row);
    if patch.is_empty() {
        return Err(Error::bad_request("Nothing to update"));
    }
    let updated = state
        .table_store
        .update_row(table, &id, &patch)
        .await
        .map_err(row_not_found(kind, &id))?;
    Ok(Json(updated))
}

#[tracing::instrument(skip_all)]
pub async fn delete_content(State(state): State<AppState>, Path((kind, id)): Path<(String, RowId)>) -> Result<StatusCode> {
    let (kind, table) = content_table(&state, &kind)?;
    state
        .table_store
        .delete_row(table, &id)
        .await
        .map_err(row_not_found(kind, &id))?;
    Ok(StatusCode::NO_CONTENT)
}
