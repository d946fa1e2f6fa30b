use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::db;
use crate::db::soundboards::DEFAULT_PAGE_LIMIT;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::soundboard::{
    attach_offsets, check_publishable, normalize_title, parse_status, validate_sounds, Sound,
    Soundboard, SoundboardRequest, SoundboardWrite, DEFAULT_TITLE,
};
use crate::models::{DataResponse, PageResponse};
use crate::sprite::job::{SourceSound, SpriteOutput};
use crate::state::AppState;
use crate::storage::{self, StorageError};

#[derive(Debug, Deserialize)]
pub struct DeleteClipRequest {
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
}

/// Store one uploaded clip and hand back its public URL.
pub async fn upload_clip(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let mut clip = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.file_name().is_none() {
            continue;
        }
        let content_type = field.content_type().unwrap_or("").to_ascii_lowercase();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;
        clip = Some((content_type, bytes));
        break;
    }

    let (content_type, bytes) =
        clip.ok_or_else(|| AppError::BadRequest("no audio file sent".to_string()))?;
    let ext = storage::validate_clip(&content_type, bytes.len()).map_err(|msg| {
        if bytes.len() > storage::MAX_CLIP_SIZE {
            AppError::PayloadTooLarge(msg)
        } else {
            AppError::BadRequest(msg)
        }
    })?;

    let key = storage::clip_key(&auth.user_id, ext);
    let url = state.blobs.put(&key, bytes.to_vec(), &content_type).await?;
    if let Err(e) = state.blobs.make_public(&key).await {
        if let Err(del) = state.blobs.delete(&key).await {
            tracing::warn!("failed to remove unpublished clip {key}: {del}");
        }
        return Err(e.into());
    }

    tracing::debug!("user {} uploaded clip {key}", auth.user_id);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "data": { "url": url, "key": key } })),
    ))
}

/// Delete one of the caller's uploaded clips by URL or key.
pub async fn delete_clip(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<DeleteClipRequest>,
) -> Result<StatusCode, AppError> {
    let filename = input
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("no audio file sent".to_string()))?;
    let key = storage::key_from_url(filename.trim())
        .ok_or_else(|| AppError::BadRequest("invalid audio file name".to_string()))?;

    if !storage::is_clip_of(key, &auth.user_id) {
        return Err(AppError::Forbidden(
            "the audio belongs to a different user".to_string(),
        ));
    }

    state.blobs.delete(key).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_soundboard(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<SoundboardRequest>,
) -> Result<(StatusCode, Json<DataResponse<Soundboard>>), AppError> {
    let input = request.data;
    let title = normalize_title(input.title.as_deref())
        .map_err(AppError::BadRequest)?
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let status = parse_status(input.status.as_deref())
        .map_err(AppError::BadRequest)?
        .unwrap_or_default();
    let sounds = input
        .sounds
        .ok_or_else(|| AppError::BadRequest("a soundboard needs at least one sound".to_string()))?;

    let (sounds, built) = build_sprite(&state, sounds, &auth.user_id).await?;
    let write = SoundboardWrite {
        title,
        status,
        sounds,
        sprite: built.sprite_url().to_string(),
    };

    let created = match check_publishable(write.status, &write.sprite, &write.sounds)
        .map_err(AppError::BadRequest)
    {
        Ok(()) => db::soundboards::create_soundboard(&state.db, &auth.user_id, &write).await,
        Err(e) => Err(e),
    };
    let soundboard = match created {
        Ok(soundboard) => soundboard,
        Err(e) => {
            state.sprites.discard(&built.assets).await;
            return Err(e);
        }
    };

    tracing::info!(
        "user {} created soundboard {} with {} sound(s)",
        auth.user_id,
        soundboard.id,
        soundboard.sounds.len()
    );
    Ok((StatusCode::CREATED, Json(DataResponse::new(soundboard))))
}

pub async fn list_my_soundboards(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<Soundboard>>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, db::soundboards::MAX_PAGE_LIMIT);

    let (data, total) = db::soundboards::list_owned(
        &state.db,
        &auth.user_id,
        page,
        limit,
        query.sort.as_deref(),
    )
    .await?;

    Ok(Json(PageResponse {
        data,
        total,
        page,
        limit,
    }))
}

pub async fn get_my_soundboard(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(soundboard_id): Path<String>,
) -> Result<Json<DataResponse<Soundboard>>, AppError> {
    let soundboard = db::soundboards::get_owned(&state.db, &soundboard_id, &auth.user_id).await?;
    Ok(Json(DataResponse::new(soundboard)))
}

/// Partial update. A new sound list rebuilds the sprite; without one the
/// stored sprite and times are kept.
pub async fn update_my_soundboard(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(soundboard_id): Path<String>,
    Json(request): Json<SoundboardRequest>,
) -> Result<Json<DataResponse<Soundboard>>, AppError> {
    let input = request.data;
    let current = db::soundboards::get_owned(&state.db, &soundboard_id, &auth.user_id).await?;

    let title = normalize_title(input.title.as_deref())
        .map_err(AppError::BadRequest)?
        .unwrap_or_else(|| current.title.clone());
    let status = parse_status(input.status.as_deref())
        .map_err(AppError::BadRequest)?
        .unwrap_or(current.status);

    let (sounds, sprite, built) = match input.sounds {
        Some(sounds) => {
            let (sounds, built) = build_sprite(&state, sounds, &auth.user_id).await?;
            let sprite = built.sprite_url().to_string();
            (sounds, sprite, Some(built))
        }
        None => (current.sounds.clone(), current.sprite.clone(), None),
    };
    let write = SoundboardWrite {
        title,
        status,
        sounds,
        sprite,
    };

    let updated = match check_publishable(write.status, &write.sprite, &write.sounds)
        .map_err(AppError::BadRequest)
    {
        Ok(()) => {
            db::soundboards::update_owned(
                &state.db,
                &soundboard_id,
                &auth.user_id,
                &write,
                built.is_some(),
            )
            .await
        }
        Err(e) => Err(e),
    };
    let soundboard = match updated {
        Ok(soundboard) => soundboard,
        Err(e) => {
            if let Some(ref built) = built {
                state.sprites.discard(&built.assets).await;
            }
            return Err(e);
        }
    };

    if built.is_some() {
        release_sprite(&state, &current.sprite, &auth.user_id).await;
    }
    Ok(Json(DataResponse::new(soundboard)))
}

pub async fn delete_my_soundboard(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(soundboard_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = db::soundboards::delete_owned(&state.db, &soundboard_id, &auth.user_id).await?;
    release_sprite(&state, &deleted.sprite, &auth.user_id).await;
    tracing::info!("user {} deleted soundboard {}", auth.user_id, deleted.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Public read of a published soundboard.
pub async fn get_soundboard(
    State(state): State<AppState>,
    Path(soundboard_id): Path<String>,
) -> Result<Json<DataResponse<Soundboard>>, AppError> {
    let soundboard = db::soundboards::get_published(&state.db, &soundboard_id).await?;
    Ok(Json(DataResponse::new(soundboard)))
}

/// Validate a sound list, run the sprite builder over it and attach the
/// resulting offsets.
async fn build_sprite(
    state: &AppState,
    sounds: Vec<Sound>,
    owner_id: &str,
) -> Result<(Vec<Sound>, SpriteOutput), AppError> {
    let mut sounds = validate_sounds(sounds).map_err(AppError::BadRequest)?;
    let prefixes = &state.sprites.config().source_prefixes;
    let sources = sounds
        .iter()
        .enumerate()
        .map(|(i, sound)| {
            let source = SourceSound::parse(&sound.audio)
                .map_err(|msg| AppError::BadRequest(format!("sounds[{i}]: {msg}")))?;
            if !source.is_under(prefixes) {
                return Err(AppError::BadRequest(format!(
                    "sounds[{i}]: audio must be an uploaded clip"
                )));
            }
            Ok(source)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let built = state.sprites.build(sources, owner_id).await?;
    attach_offsets(&mut sounds, &built.offsets);
    Ok((sounds, built))
}

/// Best-effort removal of a replaced sprite and its sibling formats.
async fn release_sprite(state: &AppState, sprite_url: &str, owner_id: &str) {
    let Some(key) = storage::key_from_url(sprite_url) else {
        return;
    };
    if !storage::key_belongs_to(key, owner_id) {
        tracing::warn!("not releasing sprite {key}: not owned by {owner_id}");
        return;
    }

    let stem = key.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(key);
    let mut keys = vec![key.to_string()];
    for format in &state.sprites.config().formats {
        let sibling = format!("{stem}.{}", format.ext());
        if !keys.contains(&sibling) {
            keys.push(sibling);
        }
    }

    for key in keys {
        match state.blobs.delete(&key).await {
            Ok(()) => tracing::debug!("released sprite asset {key}"),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => tracing::warn!("failed to release sprite asset {key}: {e}"),
        }
    }
}
