use sqlx::SqlitePool;

use crate::error::AppError;
use crate::models::membership::{
    CreateMembership, CreateMembershipType, Linked, Membership, MembershipType,
    UpdateMembershipType,
};
use crate::snowflake;

type TypeRow = (String, String, i64, String, String, String);

type MembershipRow = (
    String,
    String,
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
);

fn row_to_type(row: TypeRow) -> MembershipType {
    MembershipType {
        id: row.0,
        title: row.1,
        amount: row.2,
        stripe_id: row.3,
        created_at: row.4,
        updated_at: row.5,
    }
}

fn row_to_membership(row: MembershipRow) -> Membership {
    Membership {
        id: row.0,
        membership_type: Linked::new(row.1, "title", row.2),
        amount: row.3,
        expires_at: row.4,
        member: match (row.5, row.6) {
            (Some(id), Some(username)) => Some(Linked::new(id, "username", username)),
            _ => None,
        },
        created_at: row.7,
        updated_at: row.8,
    }
}

const SELECT_TYPES: &str =
    "SELECT id, title, amount, stripe_id, created_at, updated_at FROM membership_types";

const SELECT_MEMBERSHIPS: &str = "SELECT m.id, t.id, t.title, m.amount, m.expires_at, u.id, u.username, m.created_at, m.updated_at FROM memberships m JOIN membership_types t ON m.type_id = t.id LEFT JOIN users u ON m.member_id = u.id";

pub async fn list_types(pool: &SqlitePool) -> Result<Vec<MembershipType>, AppError> {
    let rows = sqlx::query_as::<_, TypeRow>(&format!("{SELECT_TYPES} ORDER BY created_at ASC"))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(row_to_type).collect())
}

pub async fn get_type(pool: &SqlitePool, type_id: &str) -> Result<MembershipType, AppError> {
    let row = sqlx::query_as::<_, TypeRow>(&format!("{SELECT_TYPES} WHERE id = ?"))
        .bind(type_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_membership_type".to_string()))?;
    Ok(row_to_type(row))
}

pub async fn create_type(
    pool: &SqlitePool,
    input: &CreateMembershipType,
) -> Result<MembershipType, AppError> {
    let id = snowflake::generate();
    sqlx::query("INSERT INTO membership_types (id, title, amount, stripe_id) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(&input.title)
        .bind(input.amount)
        .bind(&input.stripe_id)
        .execute(pool)
        .await?;
    get_type(pool, &id).await
}

pub async fn update_type(
    pool: &SqlitePool,
    type_id: &str,
    input: &UpdateMembershipType,
) -> Result<MembershipType, AppError> {
    let current = get_type(pool, type_id).await?;
    sqlx::query(
        "UPDATE membership_types SET title = ?, amount = ?, stripe_id = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(input.title.as_deref().unwrap_or(&current.title))
    .bind(input.amount.unwrap_or(current.amount))
    .bind(input.stripe_id.as_deref().unwrap_or(&current.stripe_id))
    .bind(type_id)
    .execute(pool)
    .await?;
    get_type(pool, type_id).await
}

pub async fn delete_type(pool: &SqlitePool, type_id: &str) -> Result<(), AppError> {
    let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memberships WHERE type_id = ?")
        .bind(type_id)
        .fetch_one(pool)
        .await?;
    if in_use > 0 {
        return Err(AppError::Conflict(
            "membership type is still in use".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM membership_types WHERE id = ?")
        .bind(type_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("unknown_membership_type".to_string()));
    }
    Ok(())
}

pub async fn list_memberships(pool: &SqlitePool) -> Result<Vec<Membership>, AppError> {
    let rows = sqlx::query_as::<_, MembershipRow>(&format!(
        "{SELECT_MEMBERSHIPS} ORDER BY m.created_at ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_to_membership).collect())
}

pub async fn get_membership(pool: &SqlitePool, id: &str) -> Result<Membership, AppError> {
    let row = sqlx::query_as::<_, MembershipRow>(&format!("{SELECT_MEMBERSHIPS} WHERE m.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_membership".to_string()))?;
    Ok(row_to_membership(row))
}

/// Memberships default to expiring one year after creation.
pub async fn create_membership(
    pool: &SqlitePool,
    input: &CreateMembership,
) -> Result<Membership, AppError> {
    get_type(pool, &input.type_id).await?;
    if let Some(ref member) = input.member {
        crate::db::users::get_user(pool, member).await?;
    }

    let id = snowflake::generate();
    let expires_at = input.expires_at.clone().unwrap_or_else(|| {
        (chrono::Utc::now() + chrono::Duration::days(365))
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string()
    });

    sqlx::query(
        "INSERT INTO memberships (id, type_id, amount, expires_at, member_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&input.type_id)
    .bind(input.amount)
    .bind(&expires_at)
    .bind(&input.member)
    .execute(pool)
    .await?;

    get_membership(pool, &id).await
}
