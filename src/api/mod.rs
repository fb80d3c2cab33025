use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{AuthService, AuthUser};
use crate::models::*;
use crate::store::{Store, StoreError};

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
}

/// Map a store error to its HTTP response.
fn store_error_response(err: StoreError) -> HttpResponse {
    match err {
        StoreError::NotFound(msg) => HttpResponse::NotFound().json(ApiResponse::<()>::error(msg)),
        StoreError::InvalidOperation(msg) => {
            HttpResponse::BadRequest().json(ApiResponse::<()>::error(msg))
        }
        StoreError::AlreadyExists(msg) => {
            HttpResponse::Conflict().json(ApiResponse::<()>::error(msg))
        }
        StoreError::Conflict(msg) => HttpResponse::Conflict().json(ApiResponse::<()>::error(msg)),
        StoreError::Database(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Database error: {}", e))),
    }
}

/// Trim content and enforce the length limit. Runs before any transaction.
fn validate_content(content: &str, max: usize, what: &str) -> Result<String, String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(format!("{} content is required", what));
    }
    if trimmed.chars().count() > max {
        return Err(format!("{} content cannot exceed {} characters", what, max));
    }
    Ok(trimmed.to_string())
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Auth Endpoints ====================

pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> impl Responder {
    let username = body.username.trim();
    if username.is_empty() || body.email.trim().is_empty() || body.password.is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("username, email and password are required"));
    }

    let password_hash = match state.auth_service.hash_password(&body.password) {
        Ok(hash) => hash,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to hash password"))
        }
    };

    let mut user = User {
        id: String::new(),
        username: username.to_string(),
        email: body.email.trim().to_string(),
        password_hash,
        display_name: body
            .display_name
            .clone()
            .unwrap_or_else(|| username.to_string()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    if let Err(e) = state.store.create_user(&mut user) {
        return store_error_response(e);
    }

    let token = match state.auth_service.generate_token(&user.id) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"))
        }
    };

    HttpResponse::Created().json(ApiResponse::success(LoginResponse { token, user }))
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    let user = match state.store.get_user_by_username(&body.username) {
        Ok(u) => u,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error("Invalid credentials"));
        }
        Err(e) => return store_error_response(e),
    };

    let valid = state
        .auth_service
        .verify_password(&body.password, &user.password_hash)
        .unwrap_or(false);

    if !valid {
        return HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid credentials"));
    }

    let token = match state.auth_service.generate_token(&user.id) {
        Ok(t) => t,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"))
        }
    };

    HttpResponse::Ok().json(ApiResponse::success(LoginResponse { token, user }))
}

pub async fn get_current_user(state: web::Data<AppState>, auth_user: AuthUser) -> impl Responder {
    let user = match state.store.get_user(&auth_user.user_id) {
        Ok(u) => u,
        Err(e) => return store_error_response(e),
    };
    let profile = match state.store.get_profile(&auth_user.user_id) {
        Ok(p) => p,
        Err(e) => return store_error_response(e),
    };
    HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "user": user,
        "profile": profile,
    })))
}

// ==================== Post Endpoints ====================

#[derive(Deserialize)]
pub struct ListPostsQuery {
    author_id: Option<String>,
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_posts(
    state: web::Data<AppState>,
    query: web::Query<ListPostsQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(20).min(100);
    let offset = query.offset.unwrap_or(0);

    match state.store.list_posts(
        query.author_id.as_deref(),
        query.search.as_deref(),
        limit,
        offset,
    ) {
        Ok(posts) => HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse {
            items: posts,
            limit,
            offset,
        })),
        Err(e) => store_error_response(e),
    }
}

pub async fn create_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<CreatePostRequest>,
) -> impl Responder {
    let content = match validate_content(&body.content, POST_CONTENT_MAX, "Post") {
        Ok(c) => c,
        Err(msg) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(msg)),
    };

    let mut post = Post {
        id: String::new(),
        author_id: auth_user.user_id.clone(),
        author_username: String::new(),
        content,
        image_url: body.image_url.clone(),
        likes_count: 0,
        comments_count: 0,
        shares_count: 0,
        is_deleted: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.create_post(&mut post) {
        Ok(_) => HttpResponse::Created().json(ApiResponse::success(post)),
        Err(e) => store_error_response(e),
    }
}

pub async fn get_post(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.store.get_active_post(&path.into_inner()) {
        Ok(post) => HttpResponse::Ok().json(ApiResponse::success(post)),
        Err(e) => store_error_response(e),
    }
}

pub async fn update_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<UpdatePostRequest>,
) -> impl Responder {
    let id = path.into_inner();
    let content = match validate_content(&body.content, POST_CONTENT_MAX, "Post") {
        Ok(c) => c,
        Err(msg) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(msg)),
    };

    let post = match state.store.get_active_post(&id) {
        Ok(p) => p,
        Err(e) => return store_error_response(e),
    };
    if post.author_id != auth_user.user_id {
        return HttpResponse::Forbidden()
            .json(ApiResponse::<()>::error("Only the author can edit this post"));
    }

    match state.store.update_post(&id, &content) {
        Ok(updated) => HttpResponse::Ok().json(ApiResponse::success(updated)),
        Err(e) => store_error_response(e),
    }
}

pub async fn delete_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    let post = match state.store.get_active_post(&id) {
        Ok(p) => p,
        Err(e) => return store_error_response(e),
    };
    if post.author_id != auth_user.user_id {
        return HttpResponse::Forbidden()
            .json(ApiResponse::<()>::error("Only the author can delete this post"));
    }

    match state.store.soft_delete_post(&id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => store_error_response(e),
    }
}

pub async fn like_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .store
        .toggle_post_like(&auth_user.user_id, &path.into_inner())
    {
        Ok(outcome) => HttpResponse::Ok().json(ApiResponse::success(outcome)),
        Err(e) => store_error_response(e),
    }
}

pub async fn list_post_likes(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.list_post_likes(&path.into_inner()) {
        Ok(likes) => HttpResponse::Ok().json(ApiResponse::success(likes)),
        Err(e) => store_error_response(e),
    }
}

// ==================== Comment Endpoints ====================

#[derive(Deserialize)]
pub struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_comments(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    let post_id = path.into_inner();
    let limit = query.limit.unwrap_or(50).min(100);
    let offset = query.offset.unwrap_or(0);

    // Listing comments of a deleted post is a read of the post.
    if let Err(e) = state.store.get_active_post(&post_id) {
        return store_error_response(e);
    }
    match state.store.list_comments(&post_id, limit, offset) {
        Ok(comments) => HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse {
            items: comments,
            limit,
            offset,
        })),
        Err(e) => store_error_response(e),
    }
}

pub async fn create_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<CreateCommentRequest>,
) -> impl Responder {
    let content = match validate_content(&body.content, COMMENT_CONTENT_MAX, "Comment") {
        Ok(c) => c,
        Err(msg) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(msg)),
    };

    let mut comment = Comment {
        id: String::new(),
        post_id: path.into_inner(),
        author_id: auth_user.user_id.clone(),
        author_username: String::new(),
        parent_id: body.parent_id.clone(),
        content,
        likes_count: 0,
        replies_count: 0,
        is_deleted: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        replies: Vec::new(),
    };

    match state.store.create_comment(&mut comment) {
        Ok(_) => HttpResponse::Created().json(ApiResponse::success(comment)),
        Err(e) => store_error_response(e),
    }
}

pub async fn get_comment(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    let mut comment = match state.store.get_active_comment(&id) {
        Ok(c) => c,
        Err(e) => return store_error_response(e),
    };
    comment.replies = match state.store.list_replies(&id) {
        Ok(replies) => replies,
        Err(e) => return store_error_response(e),
    };
    HttpResponse::Ok().json(ApiResponse::success(comment))
}

pub async fn update_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<UpdateCommentRequest>,
) -> impl Responder {
    let id = path.into_inner();
    let content = match validate_content(&body.content, COMMENT_CONTENT_MAX, "Comment") {
        Ok(c) => c,
        Err(msg) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(msg)),
    };

    let comment = match state.store.get_active_comment(&id) {
        Ok(c) => c,
        Err(e) => return store_error_response(e),
    };
    if comment.author_id != auth_user.user_id {
        return HttpResponse::Forbidden()
            .json(ApiResponse::<()>::error("Only the author can edit this comment"));
    }

    match state.store.update_comment(&id, &content) {
        Ok(updated) => HttpResponse::Ok().json(ApiResponse::success(updated)),
        Err(e) => store_error_response(e),
    }
}

pub async fn delete_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();
    let comment = match state.store.get_active_comment(&id) {
        Ok(c) => c,
        Err(e) => return store_error_response(e),
    };
    if comment.author_id != auth_user.user_id {
        return HttpResponse::Forbidden()
            .json(ApiResponse::<()>::error("Only the author can delete this comment"));
    }

    match state.store.soft_delete_comment(&id) {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => store_error_response(e),
    }
}

pub async fn like_comment(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .store
        .toggle_comment_like(&auth_user.user_id, &path.into_inner())
    {
        Ok(outcome) => HttpResponse::Ok().json(ApiResponse::success(outcome)),
        Err(e) => store_error_response(e),
    }
}

// ==================== Share Endpoints ====================

pub async fn share_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    body: Option<web::Json<ShareRequest>>,
) -> impl Responder {
    let message = body.map(|b| b.message.clone()).unwrap_or_default();
    let message = message.trim().to_string();
    if message.chars().count() > SHARE_MESSAGE_MAX {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::error(format!(
            "Share message cannot exceed {} characters",
            SHARE_MESSAGE_MAX
        )));
    }

    let mut share = Share {
        id: String::new(),
        user_id: auth_user.user_id.clone(),
        username: String::new(),
        post_id: path.into_inner(),
        message,
        created_at: Utc::now(),
    };

    match state.store.create_share(&mut share) {
        Ok(_) => HttpResponse::Created().json(ApiResponse::success(share)),
        Err(e) => store_error_response(e),
    }
}

pub async fn unshare_post(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .store
        .delete_share(&auth_user.user_id, &path.into_inner())
    {
        Ok(_) => HttpResponse::NoContent().finish(),
        Err(e) => store_error_response(e),
    }
}

pub async fn list_post_shares(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.list_post_shares(&path.into_inner()) {
        Ok(shares) => HttpResponse::Ok().json(ApiResponse::success(shares)),
        Err(e) => store_error_response(e),
    }
}

// ==================== User Endpoints ====================

#[derive(Deserialize)]
pub struct UserSearchQuery {
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_users(
    state: web::Data<AppState>,
    query: web::Query<UserSearchQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(20).min(100);
    let offset = query.offset.unwrap_or(0);
    match state.store.search_users(query.search.as_deref(), limit, offset) {
        Ok(users) => HttpResponse::Ok().json(ApiResponse::success(users)),
        Err(e) => store_error_response(e),
    }
}

pub async fn follow_user(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> impl Responder {
    match state
        .store
        .toggle_follow(&auth_user.user_id, &path.into_inner())
    {
        Ok(outcome) => HttpResponse::Ok().json(ApiResponse::success(outcome)),
        Err(e) => store_error_response(e),
    }
}

pub async fn get_profile(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let user_id = path.into_inner();
    let user = match state.store.get_user(&user_id) {
        Ok(u) => u,
        Err(e) => return store_error_response(e),
    };
    let profile = match state.store.get_profile(&user_id) {
        Ok(p) => p,
        Err(e) => return store_error_response(e),
    };
    HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "user": user,
        "profile": profile,
    })))
}

pub async fn update_profile(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<UpdateProfileRequest>,
) -> impl Responder {
    if let Some(bio) = &body.bio {
        if bio.chars().count() > BIO_MAX {
            return HttpResponse::BadRequest().json(ApiResponse::<()>::error(format!(
                "Bio cannot exceed {} characters",
                BIO_MAX
            )));
        }
    }
    if let Some(location) = &body.location {
        if location.chars().count() > LOCATION_MAX {
            return HttpResponse::BadRequest().json(ApiResponse::<()>::error(format!(
                "Location cannot exceed {} characters",
                LOCATION_MAX
            )));
        }
    }

    match state.store.update_profile(
        &auth_user.user_id,
        body.display_name.as_deref(),
        body.bio.as_deref(),
        body.location.as_deref(),
        body.avatar_url.as_deref(),
    ) {
        Ok(profile) => HttpResponse::Ok().json(ApiResponse::success(profile)),
        Err(e) => store_error_response(e),
    }
}

pub async fn list_followers(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.list_followers(&path.into_inner()) {
        Ok(follows) => HttpResponse::Ok().json(ApiResponse::success(follows)),
        Err(e) => store_error_response(e),
    }
}

pub async fn list_following(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.list_following(&path.into_inner()) {
        Ok(follows) => HttpResponse::Ok().json(ApiResponse::success(follows)),
        Err(e) => store_error_response(e),
    }
}

// ==================== Feed Endpoints ====================

pub async fn feed(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<PageQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(20).min(100);
    let offset = query.offset.unwrap_or(0);
    match state.store.feed(&auth_user.user_id, limit, offset) {
        Ok(posts) => HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse {
            items: posts,
            limit,
            offset,
        })),
        Err(e) => store_error_response(e),
    }
}

pub async fn trending(state: web::Data<AppState>, query: web::Query<PageQuery>) -> impl Responder {
    let limit = query.limit.unwrap_or(50).min(50);
    match state.store.trending(limit) {
        Ok(posts) => HttpResponse::Ok().json(ApiResponse::success(posts)),
        Err(e) => store_error_response(e),
    }
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(health))
        // Auth
        .route("/api/auth/register", web::post().to(register))
        .route("/api/auth/login", web::post().to(login))
        .route("/api/auth/me", web::get().to(get_current_user))
        // Posts
        .route("/api/posts", web::get().to(list_posts))
        .route("/api/posts", web::post().to(create_post))
        .route("/api/posts/{id}", web::get().to(get_post))
        .route("/api/posts/{id}", web::put().to(update_post))
        .route("/api/posts/{id}", web::delete().to(delete_post))
        .route("/api/posts/{id}/like", web::post().to(like_post))
        .route("/api/posts/{id}/likes", web::get().to(list_post_likes))
        .route("/api/posts/{id}/comments", web::get().to(list_comments))
        .route("/api/posts/{id}/comments", web::post().to(create_comment))
        .route("/api/posts/{id}/share", web::post().to(share_post))
        .route("/api/posts/{id}/share", web::delete().to(unshare_post))
        .route("/api/posts/{id}/shares", web::get().to(list_post_shares))
        // Comments
        .route("/api/comments/{id}", web::get().to(get_comment))
        .route("/api/comments/{id}", web::put().to(update_comment))
        .route("/api/comments/{id}", web::delete().to(delete_comment))
        .route("/api/comments/{id}/like", web::post().to(like_comment))
        // Users
        .route("/api/users", web::get().to(list_users))
        .route("/api/users/{id}/follow", web::post().to(follow_user))
        .route("/api/users/{id}/profile", web::get().to(get_profile))
        .route("/api/users/{id}/followers", web::get().to(list_followers))
        .route("/api/users/{id}/following", web::get().to(list_following))
        .route("/api/profile", web::put().to(update_profile))
        // Feed
        .route("/api/feed", web::get().to(feed))
        .route("/api/trending", web::get().to(trending));
}
