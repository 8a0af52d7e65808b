//! Default queries for the blog collections (`posts`, `categories`, `tags`).

use serde_json::json;

use crate::error::Result;
use crate::query::Query;
use crate::session::Session;
use crate::transport::Transport;
use crate::types::Entity;

pub const POSTS: &str = "posts";
pub const CATEGORIES: &str = "categories";
pub const TAGS: &str = "tags";

/// Listing query: author profile and category populated, overlaid with the
/// caller's parameters.
pub fn list_query(params: Query) -> Query {
    Query::new()
        .populate(json!({ "profile": "*", "category": "*" }))
        .merge(params)
}

/// Detail query: everything a post page renders.
pub fn detail_query() -> Query {
    Query::new().populate(json!({
        "profile": { "populate": ["avatar"] },
        "category": "*",
        "tags": "*",
        "cover_image": "*",
        "seo": "*",
    }))
}

pub fn slug_query(slug: &str) -> Query {
    Query::new().filter("slug", "$eq", slug).populate(json!({
        "profile": { "populate": { "avatar": true } },
        "category": true,
        "tags": true,
        "cover_image": true,
        "seo": true,
    }))
}

/// First post with the given slug.
pub async fn find_by_slug<T: Transport>(session: &Session<T>, slug: &str) -> Result<Option<Entity>> {
    let (posts, _) = session.find(POSTS, &slug_query(slug)).await?;
    Ok(posts.into_iter().next())
}
