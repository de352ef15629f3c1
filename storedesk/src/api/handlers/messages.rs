use crate::AppState;
use crate::api::models::messages::{ListMessagesQuery, MessageSend};
use crate::clients::gateway::OutgoingText;
use crate::errors::{Error, Result};
use crate::models::instances::Instance;
use crate::models::messages::{Message, MessageCreateRow, SCHEDULED_STATUS};
use crate::models::{decode_row, decode_rows, encode_row};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::Utc;
use std::cmp::Reverse;
use tracing::info;

/// The explicit instance, or the settings' default one.
async fn resolve_instance(state: &AppState, requested: Option<&str>) -> Result<Instance> {
    let id = match requested.filter(|id| !id.trim().is_empty()) {
        Some(id) => id.to_string(),
        None => state
            .settings
            .get()
            .await
            .and_then(|s| s.default_instance_id)
            .ok_or_else(|| Error::not_configured("default instance"))?,
    };
    state.instances.get(&id).await.ok_or_else(|| Error::not_found("Instance", id.as_str()))
}

#[tracing::instrument(skip_all)]
pub async fn list_messages(State(state): State<AppState>, Query(query): Query<ListMessagesQuery>) -> Result<Json<Vec<Message>>> {
    let rows = state.table_store.list_rows(state.config.table_store.tables.messages).await?;
    let mut messages: Vec<Message> = decode_rows(rows)?;

    if let Some(instance_id) = query.instance_id.as_deref() {
        messages.retain(|m| m.instance_id.as_deref() == Some(instance_id));
    }
    messages.sort_by_key(|m| Reverse((m.created_at, m.id.parse::<u64>().unwrap_or(0))));

    Ok(Json(messages))
}

/// Hand a text to the gateway, then append it to the message history.
///
/// The history row is written only after the gateway accepted the message. If that write fails
/// the message has still gone out and the failure is reported as an upstream error.
#[tracing::instrument(skip_all)]
pub async fn send_message(State(state): State<AppState>, Json(request): Json<MessageSend>) -> Result<(StatusCode, Json<Message>)> {
    let now = Utc::now();
    request.validate(now)?;
    let instance = resolve_instance(&state, request.instance_id.as_deref()).await?;

    let text = OutgoingText {
        number: request.to.trim().to_string(),
        text: request.body.clone(),
    };
    let gateway = state.gateways.gateway().await?;
    let sent = match request.scheduled_at {
        Some(at) => gateway.schedule_text(&instance.name, &text, at).await?,
        None => gateway.send_text(&instance.name, &text).await?,
    };

    let status = match request.scheduled_at {
        Some(_) => Some(SCHEDULED_STATUS.to_string()),
        None => sent.status.map(|s| s.to_lowercase()),
    };
    let row = encode_row(&MessageCreateRow {
        instance_id: instance.id.clone(),
        to: text.number,
        body: text.text,
        kind: "text".to_string(),
        status,
        gateway_message_id: sent.key.and_then(|k| k.id),
        scheduled_at: request.scheduled_at,
        created_at: now,
    })?;
    let saved = state.table_store.create_row(state.config.table_store.tables.messages, &row).await?;
    let message: Message = decode_row(saved)?;

    info!(
        message_id = %message.id,
        instance = %instance.name,
        scheduled = request.scheduled_at.is_some(),
        "Message handed to gateway"
    );
    Ok((StatusCode::CREATED, Json(message)))
}
