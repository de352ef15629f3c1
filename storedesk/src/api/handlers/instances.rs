use crate::AppState;
use crate::api::models::instances::{InstanceCreate, InstanceResponse, ReconcileResponse, ReloadResponse};
use crate::clients::gateway::CreateGatewayInstance;
use crate::errors::{Error, Result};
use crate::models::instances::{Instance, InstanceCreateRow};
use crate::models::{decode_row, encode_row};
use crate::sync::pairing::PairingState;
use crate::types::{InstanceStatus, RowId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

fn with_pairing(state: &AppState, instance: Instance) -> InstanceResponse {
    let pairing = state.pairing.state(&instance.id);
    InstanceResponse { instance, pairing }
}

async fn existing(state: &AppState, id: &str) -> Result<Instance> {
    state.instances.get(id).await.ok_or_else(|| Error::not_found("Instance", id))
}

#[tracing::instrument(skip_all)]
pub async fn list_instances(State(state): State<AppState>) -> Result<Json<Vec<InstanceResponse>>> {
    let instances = state.instances.list().await;
    Ok(Json(instances.into_iter().map(|i| with_pairing(&state, i)).collect()))
}

/// Create the instance at the gateway, then record it.
///
/// When the gateway hands back a pairing image straight away, a pairing session starts with it.
#[tracing::instrument(skip_all)]
pub async fn create_instance(
    State(state): State<AppState>,
    Json(request): Json<InstanceCreate>,
) -> Result<(StatusCode, Json<InstanceResponse>)> {
    let request = request.normalized()?;
    if state.instances.find_by_name(&request.name).await.is_some() {
        return Err(Error::bad_request(format!("An instance named '{}' already exists", request.name)));
    }

    let gateway = state.gateways.gateway().await?;
    let created = gateway
        .create_instance(&CreateGatewayInstance::new(request.name.clone(), request.phone.clone()))
        .await?;

    let pairing = created.qrcode.unwrap_or_default();
    let status = if pairing.image().is_some() {
        InstanceStatus::Connecting
    } else {
        InstanceStatus::Disconnected
    };

    let row = encode_row(&InstanceCreateRow::new(
        request.name,
        request.phone,
        created.instance.instance_id.clone(),
        status,
    ))?;
    let saved = state
        .table_store
        .create_row(state.config.table_store.tables.instances, &row)
        .await?;
    let instance: Instance = decode_row(saved)?;
    info!(instance_id = %instance.id, name = %instance.name, "Created instance");

    state.instances.insert(instance.clone()).await;
    let pairing = state.pairing.start(&instance, gateway, &pairing).await;

    Ok((StatusCode::CREATED, Json(InstanceResponse { instance, pairing })))
}

/// Delete the instance row and forget the instance locally.
#[tracing::instrument(skip_all)]
pub async fn delete_instance(State(state): State<AppState>, Path(id): Path<RowId>) -> Result<StatusCode> {
    existing(&state, &id).await?;

    match state
        .table_store
        .delete_row(state.config.table_store.tables.instances, &id)
        .await
    {
        Ok(()) => {}
        // Already gone upstream; still drop the local record
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }

    state.pairing.cancel(&id);
    state.instances.remove(&id).await;
    info!(instance_id = %id, "Deleted instance");
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip_all)]
pub async fn reload_instances(State(state): State<AppState>) -> Result<Json<ReloadResponse>> {
    let loaded = state
        .instances
        .load(state.table_store.as_ref(), state.config.table_store.tables.instances)
        .await?;
    Ok(Json(ReloadResponse { loaded }))
}

#[tracing::instrument(skip_all)]
pub async fn reconcile_instances(State(state): State<AppState>) -> Result<Json<ReconcileResponse>> {
    let updated = state.reconciler.reconcile_once().await?;
    Ok(Json(ReconcileResponse { updated }))
}

#[tracing::instrument(skip_all)]
pub async fn connect_instance(State(state): State<AppState>, Path(id): Path<RowId>) -> Result<Json<PairingState>> {
    Ok(Json(state.pairing.connect(&id).await?))
}

#[tracing::instrument(skip_all)]
pub async fn get_pairing(State(state): State<AppState>, Path(id): Path<RowId>) -> Result<Json<PairingState>> {
    existing(&state, &id).await?;
    Ok(Json(state.pairing.state(&id)))
}

#[tracing::instrument(skip_all)]
pub async fn cancel_pairing(State(state): State<AppState>, Path(id): Path<RowId>) -> Result<StatusCode> {
    existing(&state, &id).await?;
    state.pairing.cancel(&id);
    Ok(StatusCode::NO_CONTENT)
}
