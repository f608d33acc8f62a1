//! Metadata that turbostream attaches to each commit.
//!
//! Only the commonly useful profile fields are typed. Everything here is optional because the
//! upstream service omits or nulls fields freely.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct HydratedMetadata {
    #[serde(default)]
    pub user: Option<HydratedUser>,
    #[serde(default)]
    pub mentions: Option<HashMap<String, HydratedUser>>,
    #[serde(default)]
    pub parent_post: Option<Value>,
    #[serde(default)]
    pub reply_post: Option<Value>,
    #[serde(default)]
    pub quote_post: Option<Value>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct HydratedUser {
    pub did: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub followers_count: Option<u64>,
    #[serde(default)]
    pub follows_count: Option<u64>,
    #[serde(default)]
    pub posts_count: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}
