use crate::AppState;
use crate::api::models::settings::{SettingsResponse, SettingsSave};
use crate::errors::{Error, Result};
use axum::{Json, extract::State};

#[tracing::instrument(skip_all)]
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<SettingsResponse>> {
    Ok(Json(state.settings.get().await.into()))
}

/// Save settings through the single writer. A default instance must be one the store knows.
#[tracing::instrument(skip_all)]
pub async fn update_settings(State(state): State<AppState>, Json(request): Json<SettingsSave>) -> Result<Json<SettingsResponse>> {
    let update = request.into_update()?;

    if let Some(id) = update.default_instance_id.as_deref()
        && !id.is_empty()
        && state.instances.get(id).await.is_none()
    {
        return Err(Error::bad_request(format!("Default instance {id} does not exist")));
    }

    let saved = state.settings.save(update).await?;
    Ok(Json(Some(saved).into()))
}
