use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipType {
    pub id: String,
    pub title: String,
    /// Price in minor currency units.
    pub amount: i64,
    pub stripe_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMembershipType {
    pub title: String,
    pub amount: i64,
    pub stripe_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMembershipType {
    pub title: Option<String>,
    pub amount: Option<i64>,
    pub stripe_id: Option<String>,
}

/// A reference to a related record, expanded with its display field.
#[derive(Debug, Clone, Serialize)]
pub struct Linked {
    pub id: String,
    #[serde(flatten)]
    pub label: serde_json::Map<String, serde_json::Value>,
}

impl Linked {
    pub fn new(id: String, field: &str, value: String) -> Self {
        let mut label = serde_json::Map::new();
        label.insert(field.to_string(), serde_json::Value::String(value));
        Self { id, label }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: String,
    #[serde(rename = "type")]
    pub membership_type: Linked,
    pub amount: i64,
    pub expires_at: String,
    pub member: Option<Linked>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMembership {
    #[serde(rename = "type")]
    pub type_id: String,
    pub amount: i64,
    pub expires_at: Option<String>,
    pub member: Option<String>,
}
