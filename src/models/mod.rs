use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum post content length in characters.
pub const POST_CONTENT_MAX: usize = 2000;
/// Maximum comment content length in characters.
pub const COMMENT_CONTENT_MAX: usize = 1000;
/// Maximum share message length in characters.
pub const SHARE_MESSAGE_MAX: usize = 500;
/// Maximum profile bio length in characters.
pub const BIO_MAX: usize = 500;
/// Maximum profile location length in characters.
pub const LOCATION_MAX: usize = 100;

/// Registered account. Interaction counters live on [`UserProfile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 1:1 extension of [`User`] carrying the denormalized follow/post counters.
/// Created in the same transaction as its user, so it is never absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub bio: String,
    pub location: String,
    pub avatar_url: String,
    pub followers_count: i64,
    pub following_count: i64,
    pub posts_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post with denormalized interaction counters and a soft-delete flag.
/// Counters equal the count of corresponding rows once writes settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub image_url: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub shares_count: i64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Comment on a post. `parent_id` forms a reply tree; a reply always belongs
/// to the same post as its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_username: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub likes_count: i64,
    pub replies_count: i64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub replies: Vec<Comment>,
}

/// Like row: targets exactly one of post/comment, unique per (user, target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Share row with an optional message, unique per (user, post).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub post_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Directed follow edge. Never self-referential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub id: String,
    pub follower_id: String,
    pub follower_username: String,
    pub following_id: String,
    pub following_username: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a toggle mutation: whether the relationship is now active plus
/// the refreshed counter value, read inside the same transaction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToggleOutcome {
    pub active: bool,
    pub count: i64,
}

// Request/Response types for the API

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ShareRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub limit: i64,
    pub offset: i64,
}
