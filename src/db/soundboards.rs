use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::AppError;
use crate::models::soundboard::{Sound, Soundboard, SoundboardStatus, SoundboardWrite};
use crate::snowflake;

pub const DEFAULT_PAGE_LIMIT: u32 = 100;
pub const MAX_PAGE_LIMIT: u32 = 100;

type SoundboardRow = (String, String, String, String, String, String, String);

type SoundRow = (
    Option<String>,
    Option<i64>,
    Option<i64>,
    String,
    bool,
    String,
    String,
    String,
    Option<String>,
    bool,
);

const SELECT_SOUNDBOARDS: &str =
    "SELECT id, title, status, sprite, author_id, created_at, updated_at FROM soundboards";

fn row_to_sound(row: SoundRow) -> Sound {
    let times = match (row.1, row.2) {
        (Some(start), Some(end)) => vec![start.max(0) as u64, end.max(0) as u64],
        _ => Vec::new(),
    };
    Sound {
        title: row.0,
        times,
        audio: row.3,
        use_emoji: row.4,
        emoji_id: row.5,
        emoji_skin: row.6,
        emoji_native: row.7,
        uid: row.8,
        custom: row.9,
    }
}

fn row_to_soundboard(row: SoundboardRow, sounds: Vec<Sound>) -> Soundboard {
    Soundboard {
        id: row.0,
        title: row.1,
        status: row.2.parse().unwrap_or_default(),
        sounds,
        sprite: row.3,
        author_id: row.4,
        created_at: row.5,
        updated_at: row.6,
    }
}

async fn load_sounds(pool: &SqlitePool, soundboard_id: &str) -> Result<Vec<Sound>, AppError> {
    let rows = sqlx::query_as::<_, SoundRow>(
        "SELECT title, start_ms, end_ms, audio, use_emoji, emoji_id, emoji_skin, emoji_native, uid, custom FROM sounds WHERE soundboard_id = ? ORDER BY position ASC",
    )
    .bind(soundboard_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_sound).collect())
}

async fn hydrate(pool: &SqlitePool, row: SoundboardRow) -> Result<Soundboard, AppError> {
    let sounds = load_sounds(pool, &row.0).await?;
    Ok(row_to_soundboard(row, sounds))
}

async fn replace_sounds(
    tx: &mut Transaction<'_, Sqlite>,
    soundboard_id: &str,
    sounds: &[Sound],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sounds WHERE soundboard_id = ?")
        .bind(soundboard_id)
        .execute(&mut **tx)
        .await?;

    for (position, sound) in sounds.iter().enumerate() {
        let (start, end) = match sound.times.as_slice() {
            [start, end] => (Some(*start as i64), Some(*end as i64)),
            _ => (None, None),
        };
        sqlx::query(
            "INSERT INTO sounds (soundboard_id, position, title, start_ms, end_ms, audio, use_emoji, emoji_id, emoji_skin, emoji_native, uid, custom) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(soundboard_id)
        .bind(position as i64)
        .bind(&sound.title)
        .bind(start)
        .bind(end)
        .bind(&sound.audio)
        .bind(sound.use_emoji)
        .bind(&sound.emoji_id)
        .bind(&sound.emoji_skin)
        .bind(&sound.emoji_native)
        .bind(&sound.uid)
        .bind(sound.custom)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn create_soundboard(
    pool: &SqlitePool,
    author_id: &str,
    input: &SoundboardWrite,
) -> Result<Soundboard, AppError> {
    let id = snowflake::generate();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO soundboards (id, title, status, sprite, author_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&input.title)
    .bind(input.status.as_str())
    .bind(&input.sprite)
    .bind(author_id)
    .execute(&mut *tx)
    .await?;

    replace_sounds(&mut tx, &id, &input.sounds).await?;
    tx.commit().await?;

    get_owned(pool, &id, author_id).await
}

/// A soundboard owned by `author_id`. Someone else's board is reported as
/// not found.
pub async fn get_owned(
    pool: &SqlitePool,
    soundboard_id: &str,
    author_id: &str,
) -> Result<Soundboard, AppError> {
    let row = sqlx::query_as::<_, SoundboardRow>(&format!(
        "{SELECT_SOUNDBOARDS} WHERE id = ? AND author_id = ?"
    ))
    .bind(soundboard_id)
    .bind(author_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("unknown_soundboard".to_string()))?;

    hydrate(pool, row).await
}

pub async fn get_published(pool: &SqlitePool, soundboard_id: &str) -> Result<Soundboard, AppError> {
    let row = sqlx::query_as::<_, SoundboardRow>(&format!(
        "{SELECT_SOUNDBOARDS} WHERE id = ? AND status = ?"
    ))
    .bind(soundboard_id)
    .bind(SoundboardStatus::Published.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("unknown_soundboard".to_string()))?;

    hydrate(pool, row).await
}

/// Map a client sort key onto an ORDER BY clause. Unknown keys fall back to
/// newest first.
pub fn order_clause(sort: Option<&str>) -> &'static str {
    match sort.unwrap_or("-createdAt") {
        "createdAt" => "created_at ASC, id ASC",
        "updatedAt" => "updated_at ASC, id ASC",
        "-updatedAt" => "updated_at DESC, id DESC",
        "title" => "title ASC, id ASC",
        "-title" => "title DESC, id DESC",
        "status" => "status ASC, id ASC",
        "-status" => "status DESC, id DESC",
        _ => "created_at DESC, id DESC",
    }
}

/// One page of the author's soundboards plus the author's total count.
pub async fn list_owned(
    pool: &SqlitePool,
    author_id: &str,
    page: u32,
    limit: u32,
    sort: Option<&str>,
) -> Result<(Vec<Soundboard>, i64), AppError> {
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = (page.max(1) as i64 - 1) * limit as i64;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM soundboards WHERE author_id = ?")
        .bind(author_id)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, SoundboardRow>(&format!(
        "{SELECT_SOUNDBOARDS} WHERE author_id = ? ORDER BY {} LIMIT ? OFFSET ?",
        order_clause(sort)
    ))
    .bind(author_id)
    .bind(limit as i64)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let mut soundboards = Vec::with_capacity(rows.len());
    for row in rows {
        soundboards.push(hydrate(pool, row).await?);
    }
    Ok((soundboards, total))
}

/// Update an owned soundboard.
///
/// Sprite and sounds are only written together (`replace_sound_list`), so a
/// metadata-only update never puts back a sprite another request replaced.
pub async fn update_owned(
    pool: &SqlitePool,
    soundboard_id: &str,
    author_id: &str,
    input: &SoundboardWrite,
    replace_sound_list: bool,
) -> Result<Soundboard, AppError> {
    let mut tx = pool.begin().await?;

    let result = if replace_sound_list {
        sqlx::query(
            "UPDATE soundboards SET title = ?, status = ?, sprite = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ? AND author_id = ?",
        )
        .bind(&input.title)
        .bind(input.status.as_str())
        .bind(&input.sprite)
        .bind(soundboard_id)
        .bind(author_id)
        .execute(&mut *tx)
        .await?
    } else {
        sqlx::query(
            "UPDATE soundboards SET title = ?, status = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ? AND author_id = ?",
        )
        .bind(&input.title)
        .bind(input.status.as_str())
        .bind(soundboard_id)
        .bind(author_id)
        .execute(&mut *tx)
        .await?
    };

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("unknown_soundboard".to_string()));
    }

    if replace_sound_list {
        replace_sounds(&mut tx, soundboard_id, &input.sounds).await?;
    }
    tx.commit().await?;

    get_owned(pool, soundboard_id, author_id).await
}

/// Delete an owned soundboard, returning it so its sprite can be released.
pub async fn delete_owned(
    pool: &SqlitePool,
    soundboard_id: &str,
    author_id: &str,
) -> Result<Soundboard, AppError> {
    let soundboard = get_owned(pool, soundboard_id, author_id).await?;

    sqlx::query("DELETE FROM soundboards WHERE id = ? AND author_id = ?")
        .bind(soundboard_id)
        .bind(author_id)
        .execute(pool)
        .await?;

    Ok(soundboard)
}
