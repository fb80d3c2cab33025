use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Write conflict, retry: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store.
///
/// Every mutation that touches a denormalized counter runs the row change
/// and the counter adjustment in one transaction, and the adjustment is
/// always a relative `SET c = c +/- 1` keyed by primary key, never a
/// read-then-write.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                display_name TEXT DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                bio TEXT DEFAULT '',
                location TEXT DEFAULT '',
                avatar_url TEXT DEFAULT '',
                followers_count INTEGER NOT NULL DEFAULT 0,
                following_count INTEGER NOT NULL DEFAULT 0,
                posts_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                content TEXT NOT NULL,
                image_url TEXT,
                likes_count INTEGER NOT NULL DEFAULT 0,
                comments_count INTEGER NOT NULL DEFAULT 0,
                shares_count INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                parent_id TEXT,
                content TEXT NOT NULL,
                likes_count INTEGER NOT NULL DEFAULT 0,
                replies_count INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id),
                FOREIGN KEY (author_id) REFERENCES users(id),
                FOREIGN KEY (parent_id) REFERENCES comments(id)
            );

            CREATE TABLE IF NOT EXISTS likes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                post_id TEXT,
                comment_id TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (post_id) REFERENCES posts(id),
                FOREIGN KEY (comment_id) REFERENCES comments(id),
                CHECK ((post_id IS NULL) != (comment_id IS NULL))
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_likes_user_post
                ON likes(user_id, post_id) WHERE post_id IS NOT NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_likes_user_comment
                ON likes(user_id, comment_id) WHERE comment_id IS NOT NULL;

            CREATE TABLE IF NOT EXISTS shares (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                post_id TEXT NOT NULL,
                message TEXT DEFAULT '',
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (post_id) REFERENCES posts(id),
                UNIQUE(user_id, post_id)
            );

            CREATE TABLE IF NOT EXISTS follows (
                id TEXT PRIMARY KEY,
                follower_id TEXT NOT NULL,
                following_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (follower_id) REFERENCES users(id),
                FOREIGN KEY (following_id) REFERENCES users(id),
                UNIQUE(follower_id, following_id),
                CHECK (follower_id != following_id)
            );

            CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_posts_deleted ON posts(is_deleted, created_at);
            CREATE INDEX IF NOT EXISTS idx_posts_likes ON posts(likes_count);
            CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
            CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id);
            CREATE INDEX IF NOT EXISTS idx_likes_comment ON likes(comment_id);
            CREATE INDEX IF NOT EXISTS idx_shares_post ON shares(post_id);
            CREATE INDEX IF NOT EXISTS idx_follows_follower ON follows(follower_id);
            CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    /// Create a user together with their profile. Both rows land in one
    /// transaction so a user without a profile can never be observed.
    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        user.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        let tx = conn.transaction()?;
        let inserted = tx.execute(
            r#"INSERT INTO users (id, username, email, password_hash, display_name, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                &user.id,
                &user.username,
                &user.email,
                &user.password_hash,
                &user.display_name,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        );
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(StoreError::AlreadyExists(
                    "username or email already taken".to_string(),
                ));
            }
            return Err(e.into());
        }
        tx.execute(
            r#"INSERT INTO user_profiles (user_id, created_at, updated_at)
               VALUES (?1, ?2, ?3)"#,
            params![&user.id, now.to_rfc3339(), now.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("User {}", id))
                }
                _ => StoreError::Database(e),
            })
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            row_to_user,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", username))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn search_users(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM users
               WHERE ?1 IS NULL
                  OR username LIKE '%' || ?1 || '%'
                  OR display_name LIKE '%' || ?1 || '%'
               ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"#,
        )?;
        let rows = stmt.query_map(params![search, limit, offset], row_to_user)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn get_profile(&self, user_id: &str) -> StoreResult<UserProfile> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM user_profiles WHERE user_id = ?1",
            params![user_id],
            row_to_profile,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("Profile for user {}", user_id))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn update_profile(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        bio: Option<&str>,
        location: Option<&str>,
        avatar_url: Option<&str>,
    ) -> StoreResult<UserProfile> {
        let mut conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        if let Some(name) = display_name {
            let rows = tx.execute(
                "UPDATE users SET display_name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, &now, user_id],
            )?;
            if rows == 0 {
                return Err(StoreError::NotFound(format!("User {}", user_id)));
            }
        }
        let rows = tx.execute(
            r#"UPDATE user_profiles SET
                 bio = COALESCE(?1, bio),
                 location = COALESCE(?2, location),
                 avatar_url = COALESCE(?3, avatar_url),
                 updated_at = ?4
               WHERE user_id = ?5"#,
            params![bio, location, avatar_url, &now, user_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Profile for user {}", user_id)));
        }
        let profile = tx.query_row(
            "SELECT * FROM user_profiles WHERE user_id = ?1",
            params![user_id],
            row_to_profile,
        )?;
        tx.commit()?;
        Ok(profile)
    }

    // ==================== Post Operations ====================

    /// Insert a post and bump the author's posts_count in one transaction.
    pub fn create_post(&self, post: &mut Post) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        post.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        post.created_at = now;
        post.updated_at = now;
        post.is_deleted = false;

        let tx = conn.transaction()?;
        post.author_username = tx
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                params![&post.author_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("User {}", post.author_id)))?;

        tx.execute(
            r#"INSERT INTO posts (id, author_id, content, image_url, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                &post.id,
                &post.author_id,
                &post.content,
                &post.image_url,
                post.created_at.to_rfc3339(),
                post.updated_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "UPDATE user_profiles SET posts_count = posts_count + 1 WHERE user_id = ?1",
            params![&post.author_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Fetch a post, treating soft-deleted rows as absent.
    pub fn get_active_post(&self, id: &str) -> StoreResult<Post> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"SELECT p.*, u.username AS author_username FROM posts p
               JOIN users u ON u.id = p.author_id
               WHERE p.id = ?1 AND p.is_deleted = 0"#,
            params![id],
            row_to_post,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("Post {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn update_post(&self, id: &str, content: &str) -> StoreResult<Post> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE posts SET content = ?1, updated_at = ?2 WHERE id = ?3 AND is_deleted = 0",
            params![content, &now, id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Post {}", id)));
        }
        conn.query_row(
            r#"SELECT p.*, u.username AS author_username FROM posts p
               JOIN users u ON u.id = p.author_id WHERE p.id = ?1"#,
            params![id],
            row_to_post,
        )
        .map_err(StoreError::Database)
    }

    /// Mark a post deleted. One-way; counters stay frozen at their last value.
    pub fn soft_delete_post(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE posts SET is_deleted = 1, updated_at = ?1 WHERE id = ?2 AND is_deleted = 0",
            params![&now, id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Post {}", id)));
        }
        Ok(())
    }

    pub fn list_posts(
        &self,
        author_id: Option<&str>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Post>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT p.*, u.username AS author_username FROM posts p
               JOIN users u ON u.id = p.author_id
               WHERE p.is_deleted = 0
                 AND (?1 IS NULL OR p.author_id = ?1)
                 AND (?2 IS NULL
                      OR p.content LIKE '%' || ?2 || '%'
                      OR u.username LIKE '%' || ?2 || '%')
               ORDER BY p.created_at DESC LIMIT ?3 OFFSET ?4"#,
        )?;
        let rows = stmt.query_map(params![author_id, search, limit, offset], row_to_post)?;
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }

    /// Posts by authors the user follows, newest first. Falls back to the
    /// trending ordering when the followed authors have no visible posts.
    pub fn feed(&self, user_id: &str, limit: i64, offset: i64) -> StoreResult<Vec<Post>> {
        let posts = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                r#"SELECT p.*, u.username AS author_username FROM posts p
                   JOIN users u ON u.id = p.author_id
                   WHERE p.is_deleted = 0
                     AND p.author_id IN
                         (SELECT following_id FROM follows WHERE follower_id = ?1)
                   ORDER BY p.created_at DESC LIMIT ?2 OFFSET ?3"#,
            )?;
            let rows = stmt.query_map(params![user_id, limit, offset], row_to_post)?;
            let mut posts = Vec::new();
            for row in rows {
                posts.push(row?);
            }
            posts
        };

        if posts.is_empty() && offset == 0 {
            return self.trending(limit);
        }
        Ok(posts)
    }

    /// Globally popular posts: likes desc, then comments desc, then newest.
    pub fn trending(&self, limit: i64) -> StoreResult<Vec<Post>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT p.*, u.username AS author_username FROM posts p
               JOIN users u ON u.id = p.author_id
               WHERE p.is_deleted = 0
               ORDER BY p.likes_count DESC, p.comments_count DESC, p.created_at DESC
               LIMIT ?1"#,
        )?;
        let rows = stmt.query_map(params![limit.min(50)], row_to_post)?;
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }

    // ==================== Comment Operations ====================

    /// Insert a comment and bump the post's comments_count (and the parent's
    /// replies_count for replies) in one transaction. The post must be
    /// visible; a parent must belong to the same post and be visible.
    pub fn create_comment(&self, comment: &mut Comment) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        comment.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        comment.created_at = now;
        comment.updated_at = now;
        comment.is_deleted = false;

        let tx = conn.transaction()?;

        let post_visible: Option<bool> = tx
            .query_row(
                "SELECT is_deleted = 0 FROM posts WHERE id = ?1",
                params![&comment.post_id],
                |row| row.get(0),
            )
            .optional()?;
        if post_visible != Some(true) {
            return Err(StoreError::NotFound(format!("Post {}", comment.post_id)));
        }

        if let Some(parent_id) = &comment.parent_id {
            let parent_ok: Option<bool> = tx
                .query_row(
                    "SELECT post_id = ?2 AND is_deleted = 0 FROM comments WHERE id = ?1",
                    params![parent_id, &comment.post_id],
                    |row| row.get(0),
                )
                .optional()?;
            if parent_ok != Some(true) {
                return Err(StoreError::NotFound(format!("Parent comment {}", parent_id)));
            }
        }

        comment.author_username = tx
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                params![&comment.author_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("User {}", comment.author_id)))?;

        tx.execute(
            r#"INSERT INTO comments (id, post_id, author_id, parent_id, content, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                &comment.id,
                &comment.post_id,
                &comment.author_id,
                &comment.parent_id,
                &comment.content,
                comment.created_at.to_rfc3339(),
                comment.updated_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "UPDATE posts SET comments_count = comments_count + 1 WHERE id = ?1",
            params![&comment.post_id],
        )?;
        if let Some(parent_id) = &comment.parent_id {
            tx.execute(
                "UPDATE comments SET replies_count = replies_count + 1 WHERE id = ?1",
                params![parent_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetch a comment, treating soft-deleted rows as absent.
    pub fn get_active_comment(&self, id: &str) -> StoreResult<Comment> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"SELECT c.*, u.username AS author_username FROM comments c
               JOIN users u ON u.id = c.author_id
               WHERE c.id = ?1 AND c.is_deleted = 0"#,
            params![id],
            row_to_comment,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("Comment {}", id))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn update_comment(&self, id: &str, content: &str) -> StoreResult<Comment> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE comments SET content = ?1, updated_at = ?2 WHERE id = ?3 AND is_deleted = 0",
            params![content, &now, id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Comment {}", id)));
        }
        conn.query_row(
            r#"SELECT c.*, u.username AS author_username FROM comments c
               JOIN users u ON u.id = c.author_id WHERE c.id = ?1"#,
            params![id],
            row_to_comment,
        )
        .map_err(StoreError::Database)
    }

    /// Mark a comment deleted. The post's comments_count and the parent's
    /// replies_count are intentionally left untouched (frozen counters).
    pub fn soft_delete_comment(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE comments SET is_deleted = 1, updated_at = ?1 WHERE id = ?2 AND is_deleted = 0",
            params![&now, id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Comment {}", id)));
        }
        Ok(())
    }

    /// Root comments for a post, newest first, each with its visible replies.
    pub fn list_comments(
        &self,
        post_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Comment>> {
        let mut comments = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                r#"SELECT c.*, u.username AS author_username FROM comments c
                   JOIN users u ON u.id = c.author_id
                   WHERE c.post_id = ?1 AND c.parent_id IS NULL AND c.is_deleted = 0
                   ORDER BY c.created_at DESC LIMIT ?2 OFFSET ?3"#,
            )?;
            let rows = stmt.query_map(params![post_id, limit, offset], row_to_comment)?;
            let mut comments = Vec::new();
            for row in rows {
                comments.push(row?);
            }
            comments
        };
        for comment in &mut comments {
            comment.replies = self.list_replies(&comment.id)?;
        }
        Ok(comments)
    }

    pub fn list_replies(&self, parent_id: &str) -> StoreResult<Vec<Comment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT c.*, u.username AS author_username FROM comments c
               JOIN users u ON u.id = c.author_id
               WHERE c.parent_id = ?1 AND c.is_deleted = 0
               ORDER BY c.created_at ASC"#,
        )?;
        let rows = stmt.query_map(params![parent_id], row_to_comment)?;
        let mut replies = Vec::new();
        for row in rows {
            replies.push(row?);
        }
        Ok(replies)
    }

    // ==================== Like Operations ====================

    /// Idempotent like toggle on a post. Creates the like row and increments
    /// likes_count, or deletes it and decrements, in one transaction; the
    /// returned count is read back before commit.
    pub fn toggle_post_like(&self, user_id: &str, post_id: &str) -> StoreResult<ToggleOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let post_visible: Option<bool> = tx
            .query_row(
                "SELECT is_deleted = 0 FROM posts WHERE id = ?1",
                params![post_id],
                |row| row.get(0),
            )
            .optional()?;
        if post_visible != Some(true) {
            return Err(StoreError::NotFound(format!("Post {}", post_id)));
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM likes WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
                |row| row.get(0),
            )
            .optional()?;

        let active = match existing {
            Some(like_id) => {
                tx.execute("DELETE FROM likes WHERE id = ?1", params![like_id])?;
                tx.execute(
                    "UPDATE posts SET likes_count = likes_count - 1 WHERE id = ?1",
                    params![post_id],
                )?;
                false
            }
            None => {
                let inserted = tx.execute(
                    r#"INSERT INTO likes (id, user_id, post_id, created_at)
                       VALUES (?1, ?2, ?3, ?4)"#,
                    params![
                        Uuid::new_v4().to_string(),
                        user_id,
                        post_id,
                        Utc::now().to_rfc3339(),
                    ],
                );
                if let Err(e) = inserted {
                    // Unique index backstop: a racing create lost.
                    if is_unique_violation(&e) {
                        return Err(StoreError::Conflict(format!(
                            "like toggle raced on post {}",
                            post_id
                        )));
                    }
                    return Err(e.into());
                }
                tx.execute(
                    "UPDATE posts SET likes_count = likes_count + 1 WHERE id = ?1",
                    params![post_id],
                )?;
                true
            }
        };

        let count: i64 = tx.query_row(
            "SELECT likes_count FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(ToggleOutcome { active, count })
    }

    /// Idempotent like toggle on a comment. Same shape as the post toggle.
    pub fn toggle_comment_like(
        &self,
        user_id: &str,
        comment_id: &str,
    ) -> StoreResult<ToggleOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let comment_visible: Option<bool> = tx
            .query_row(
                "SELECT is_deleted = 0 FROM comments WHERE id = ?1",
                params![comment_id],
                |row| row.get(0),
            )
            .optional()?;
        if comment_visible != Some(true) {
            return Err(StoreError::NotFound(format!("Comment {}", comment_id)));
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM likes WHERE user_id = ?1 AND comment_id = ?2",
                params![user_id, comment_id],
                |row| row.get(0),
            )
            .optional()?;

        let active = match existing {
            Some(like_id) => {
                tx.execute("DELETE FROM likes WHERE id = ?1", params![like_id])?;
                tx.execute(
                    "UPDATE comments SET likes_count = likes_count - 1 WHERE id = ?1",
                    params![comment_id],
                )?;
                false
            }
            None => {
                let inserted = tx.execute(
                    r#"INSERT INTO likes (id, user_id, comment_id, created_at)
                       VALUES (?1, ?2, ?3, ?4)"#,
                    params![
                        Uuid::new_v4().to_string(),
                        user_id,
                        comment_id,
                        Utc::now().to_rfc3339(),
                    ],
                );
                if let Err(e) = inserted {
                    if is_unique_violation(&e) {
                        return Err(StoreError::Conflict(format!(
                            "like toggle raced on comment {}",
                            comment_id
                        )));
                    }
                    return Err(e.into());
                }
                tx.execute(
                    "UPDATE comments SET likes_count = likes_count + 1 WHERE id = ?1",
                    params![comment_id],
                )?;
                true
            }
        };

        let count: i64 = tx.query_row(
            "SELECT likes_count FROM comments WHERE id = ?1",
            params![comment_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(ToggleOutcome { active, count })
    }

    pub fn list_post_likes(&self, post_id: &str) -> StoreResult<Vec<Like>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT l.*, u.username FROM likes l
               JOIN users u ON u.id = l.user_id
               WHERE l.post_id = ?1 ORDER BY l.created_at ASC"#,
        )?;
        let rows = stmt.query_map(params![post_id], row_to_like)?;
        let mut likes = Vec::new();
        for row in rows {
            likes.push(row?);
        }
        Ok(likes)
    }

    // ==================== Share Operations ====================

    /// Create a share. Asymmetric with like/follow by design: sharing an
    /// already-shared post fails with AlreadyExists instead of unsharing.
    pub fn create_share(&self, share: &mut Share) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        share.id = Uuid::new_v4().to_string();
        share.created_at = Utc::now();

        let tx = conn.transaction()?;
        let post_visible: Option<bool> = tx
            .query_row(
                "SELECT is_deleted = 0 FROM posts WHERE id = ?1",
                params![&share.post_id],
                |row| row.get(0),
            )
            .optional()?;
        if post_visible != Some(true) {
            return Err(StoreError::NotFound(format!("Post {}", share.post_id)));
        }

        share.username = tx
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                params![&share.user_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("User {}", share.user_id)))?;

        let inserted = tx.execute(
            r#"INSERT INTO shares (id, user_id, post_id, message, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &share.id,
                &share.user_id,
                &share.post_id,
                &share.message,
                share.created_at.to_rfc3339(),
            ],
        );
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(StoreError::AlreadyExists(
                    "post already shared".to_string(),
                ));
            }
            return Err(e.into());
        }
        tx.execute(
            "UPDATE posts SET shares_count = shares_count + 1 WHERE id = ?1",
            params![&share.post_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_share(&self, user_id: &str, post_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let rows = tx.execute(
            "DELETE FROM shares WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!(
                "Share of post {} by user {}",
                post_id, user_id
            )));
        }
        tx.execute(
            "UPDATE posts SET shares_count = shares_count - 1 WHERE id = ?1",
            params![post_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_post_shares(&self, post_id: &str) -> StoreResult<Vec<Share>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT s.*, u.username FROM shares s
               JOIN users u ON u.id = s.user_id
               WHERE s.post_id = ?1 ORDER BY s.created_at ASC"#,
        )?;
        let rows = stmt.query_map(params![post_id], row_to_share)?;
        let mut shares = Vec::new();
        for row in rows {
            shares.push(row?);
        }
        Ok(shares)
    }

    // ==================== Follow Operations ====================

    /// Idempotent follow toggle. Adjusts the target's followers_count and
    /// the actor's following_count together with the edge row in one
    /// transaction; the returned count is the target's followers_count.
    pub fn toggle_follow(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> StoreResult<ToggleOutcome> {
        if follower_id == following_id {
            return Err(StoreError::InvalidOperation(
                "cannot follow yourself".to_string(),
            ));
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let target_exists: Option<String> = tx
            .query_row(
                "SELECT id FROM users WHERE id = ?1",
                params![following_id],
                |row| row.get(0),
            )
            .optional()?;
        if target_exists.is_none() {
            return Err(StoreError::NotFound(format!("User {}", following_id)));
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                params![follower_id, following_id],
                |row| row.get(0),
            )
            .optional()?;

        let active = match existing {
            Some(follow_id) => {
                tx.execute("DELETE FROM follows WHERE id = ?1", params![follow_id])?;
                tx.execute(
                    "UPDATE user_profiles SET followers_count = followers_count - 1 WHERE user_id = ?1",
                    params![following_id],
                )?;
                tx.execute(
                    "UPDATE user_profiles SET following_count = following_count - 1 WHERE user_id = ?1",
                    params![follower_id],
                )?;
                false
            }
            None => {
                let inserted = tx.execute(
                    r#"INSERT INTO follows (id, follower_id, following_id, created_at)
                       VALUES (?1, ?2, ?3, ?4)"#,
                    params![
                        Uuid::new_v4().to_string(),
                        follower_id,
                        following_id,
                        Utc::now().to_rfc3339(),
                    ],
                );
                if let Err(e) = inserted {
                    if is_unique_violation(&e) {
                        return Err(StoreError::Conflict(format!(
                            "follow toggle raced on user {}",
                            following_id
                        )));
                    }
                    return Err(e.into());
                }
                tx.execute(
                    "UPDATE user_profiles SET followers_count = followers_count + 1 WHERE user_id = ?1",
                    params![following_id],
                )?;
                tx.execute(
                    "UPDATE user_profiles SET following_count = following_count + 1 WHERE user_id = ?1",
                    params![follower_id],
                )?;
                true
            }
        };

        let count: i64 = tx.query_row(
            "SELECT followers_count FROM user_profiles WHERE user_id = ?1",
            params![following_id],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(ToggleOutcome { active, count })
    }

    pub fn list_followers(&self, user_id: &str) -> StoreResult<Vec<Follow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT f.*, fu.username AS follower_username, tu.username AS following_username
               FROM follows f
               JOIN users fu ON fu.id = f.follower_id
               JOIN users tu ON tu.id = f.following_id
               WHERE f.following_id = ?1 ORDER BY f.created_at DESC"#,
        )?;
        let rows = stmt.query_map(params![user_id], row_to_follow)?;
        let mut follows = Vec::new();
        for row in rows {
            follows.push(row?);
        }
        Ok(follows)
    }

    pub fn list_following(&self, user_id: &str) -> StoreResult<Vec<Follow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT f.*, fu.username AS follower_username, tu.username AS following_username
               FROM follows f
               JOIN users fu ON fu.id = f.follower_id
               JOIN users tu ON tu.id = f.following_id
               WHERE f.follower_id = ?1 ORDER BY f.created_at DESC"#,
        )?;
        let rows = stmt.query_map(params![user_id], row_to_follow)?;
        let mut follows = Vec::new();
        for row in rows {
            follows.push(row?);
        }
        Ok(follows)
    }

    // ==================== Consistency Helpers ====================

    /// Count the live like rows for a post. Used by tests to check that the
    /// denormalized counter matches the relationship rows after writes settle.
    pub fn count_post_likes(&self, post_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        display_name: row.get("display_name")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.get("user_id")?,
        bio: row.get("bio")?,
        location: row.get("location")?,
        avatar_url: row.get("avatar_url")?,
        followers_count: row.get("followers_count")?,
        following_count: row.get("following_count")?,
        posts_count: row.get("posts_count")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_post(row: &rusqlite::Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get("id")?,
        author_id: row.get("author_id")?,
        author_username: row.get("author_username")?,
        content: row.get("content")?,
        image_url: row.get("image_url")?,
        likes_count: row.get("likes_count")?,
        comments_count: row.get("comments_count")?,
        shares_count: row.get("shares_count")?,
        is_deleted: row.get("is_deleted")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_comment(row: &rusqlite::Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get("id")?,
        post_id: row.get("post_id")?,
        author_id: row.get("author_id")?,
        author_username: row.get("author_username")?,
        parent_id: row.get("parent_id")?,
        content: row.get("content")?,
        likes_count: row.get("likes_count")?,
        replies_count: row.get("replies_count")?,
        is_deleted: row.get("is_deleted")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        replies: Vec::new(),
    })
}

fn row_to_like(row: &rusqlite::Row) -> rusqlite::Result<Like> {
    Ok(Like {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        username: row.get("username")?,
        post_id: row.get("post_id")?,
        comment_id: row.get("comment_id")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

fn row_to_share(row: &rusqlite::Row) -> rusqlite::Result<Share> {
    Ok(Share {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        username: row.get("username")?,
        post_id: row.get("post_id")?,
        message: row.get("message")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

fn row_to_follow(row: &rusqlite::Row) -> rusqlite::Result<Follow> {
    Ok(Follow {
        id: row.get("id")?,
        follower_id: row.get("follower_id")?,
        follower_username: row.get("follower_username")?,
        following_id: row.get("following_id")?,
        following_username: row.get("following_username")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user(store: &Store, username: &str) -> User {
        let mut user = User {
            id: String::new(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "hash".to_string(),
            display_name: username.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_user(&mut user).unwrap();
        user
    }

    fn make_post(store: &Store, author: &User, content: &str) -> Post {
        let mut post = Post {
            id: String::new(),
            author_id: author.id.clone(),
            author_username: String::new(),
            content: content.to_string(),
            image_url: None,
            likes_count: 0,
            comments_count: 0,
            shares_count: 0,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_post(&mut post).unwrap();
        post
    }

    fn make_comment(store: &Store, author: &User, post: &Post, parent: Option<&str>) -> Comment {
        let mut comment = Comment {
            id: String::new(),
            post_id: post.id.clone(),
            author_id: author.id.clone(),
            author_username: String::new(),
            parent_id: parent.map(str::to_string),
            content: "a comment".to_string(),
            likes_count: 0,
            replies_count: 0,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            replies: Vec::new(),
        };
        store.create_comment(&mut comment).unwrap();
        comment
    }

    #[test]
    fn user_creation_also_creates_profile() {
        let store = Store::in_memory().unwrap();
        let user = make_user(&store, "alice");
        let profile = store.get_profile(&user.id).unwrap();
        assert_eq!(profile.followers_count, 0);
        assert_eq!(profile.following_count, 0);
        assert_eq!(profile.posts_count, 0);
    }

    #[test]
    fn duplicate_username_rejected() {
        let store = Store::in_memory().unwrap();
        make_user(&store, "alice");
        let mut dup = User {
            id: String::new(),
            username: "alice".to_string(),
            email: "other@example.com".to_string(),
            password_hash: "hash".to_string(),
            display_name: "alice".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            store.create_user(&mut dup),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn create_post_increments_posts_count() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        make_post(&store, &alice, "hello");
        make_post(&store, &alice, "world");
        let profile = store.get_profile(&alice.id).unwrap();
        assert_eq!(profile.posts_count, 2);
    }

    #[test]
    fn like_toggle_is_idempotent_pair() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let post = make_post(&store, &alice, "hello");

        let on = store.toggle_post_like(&bob.id, &post.id).unwrap();
        assert!(on.active);
        assert_eq!(on.count, 1);

        let off = store.toggle_post_like(&bob.id, &post.id).unwrap();
        assert!(!off.active);
        assert_eq!(off.count, 0);

        assert_eq!(store.count_post_likes(&post.id).unwrap(), 0);
    }

    #[test]
    fn likes_counter_matches_rows_after_many_toggles() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        let post = make_post(&store, &alice, "hello");

        let likers: Vec<User> = (0..5)
            .map(|i| make_user(&store, &format!("user{}", i)))
            .collect();
        for user in &likers {
            store.toggle_post_like(&user.id, &post.id).unwrap();
        }
        // user0 and user1 unlike again
        store.toggle_post_like(&likers[0].id, &post.id).unwrap();
        store.toggle_post_like(&likers[1].id, &post.id).unwrap();

        let fetched = store.get_active_post(&post.id).unwrap();
        assert_eq!(fetched.likes_count, 3);
        assert_eq!(store.count_post_likes(&post.id).unwrap(), 3);
    }

    #[test]
    fn concurrent_likes_from_distinct_users_all_count() {
        let store = Arc::new(Store::in_memory().unwrap());
        let alice = make_user(&store, "alice");
        let post = make_post(&store, &alice, "hello");

        let n = 8;
        let users: Vec<User> = (0..n)
            .map(|i| make_user(&store, &format!("liker{}", i)))
            .collect();

        let mut handles = Vec::new();
        for user in users {
            let store = store.clone();
            let post_id = post.id.clone();
            handles.push(std::thread::spawn(move || {
                store.toggle_post_like(&user.id, &post_id).unwrap()
            }));
        }
        for handle in handles {
            let outcome = handle.join().unwrap();
            assert!(outcome.active);
        }

        let fetched = store.get_active_post(&post.id).unwrap();
        assert_eq!(fetched.likes_count, n);
        assert_eq!(store.count_post_likes(&post.id).unwrap(), n);
    }

    #[test]
    fn comment_and_reply_update_both_counters() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let post = make_post(&store, &alice, "hello");

        let root = make_comment(&store, &alice, &post, None);
        make_comment(&store, &bob, &post, Some(&root.id));

        let fetched_post = store.get_active_post(&post.id).unwrap();
        assert_eq!(fetched_post.comments_count, 2);
        let fetched_root = store.get_active_comment(&root.id).unwrap();
        assert_eq!(fetched_root.replies_count, 1);
    }

    #[test]
    fn reply_must_share_parents_post() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        let post_a = make_post(&store, &alice, "first");
        let post_b = make_post(&store, &alice, "second");
        let parent = make_comment(&store, &alice, &post_a, None);

        let mut stray = Comment {
            id: String::new(),
            post_id: post_b.id.clone(),
            author_id: alice.id.clone(),
            author_username: String::new(),
            parent_id: Some(parent.id.clone()),
            content: "wrong post".to_string(),
            likes_count: 0,
            replies_count: 0,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            replies: Vec::new(),
        };
        assert!(matches!(
            store.create_comment(&mut stray),
            Err(StoreError::NotFound(_))
        ));
        // Failed create must leave both counters untouched.
        assert_eq!(store.get_active_post(&post_b.id).unwrap().comments_count, 0);
        assert_eq!(store.get_active_comment(&parent.id).unwrap().replies_count, 0);
    }

    #[test]
    fn soft_deleted_post_rejects_interactions_and_keeps_counters() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let post = make_post(&store, &alice, "hello");
        store.toggle_post_like(&bob.id, &post.id).unwrap();

        store.soft_delete_post(&post.id).unwrap();

        assert!(matches!(
            store.get_active_post(&post.id),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.toggle_post_like(&bob.id, &post.id),
            Err(StoreError::NotFound(_))
        ));
        let mut comment = Comment {
            id: String::new(),
            post_id: post.id.clone(),
            author_id: bob.id.clone(),
            author_username: String::new(),
            parent_id: None,
            content: "too late".to_string(),
            likes_count: 0,
            replies_count: 0,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            replies: Vec::new(),
        };
        assert!(matches!(
            store.create_comment(&mut comment),
            Err(StoreError::NotFound(_))
        ));
        // Row and its like count stay in place for audit.
        assert_eq!(store.count_post_likes(&post.id).unwrap(), 1);
        assert!(store.list_posts(None, None, 50, 0).unwrap().is_empty());
    }

    #[test]
    fn soft_deleting_comment_freezes_counters() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        let post = make_post(&store, &alice, "hello");
        let root = make_comment(&store, &alice, &post, None);
        make_comment(&store, &alice, &post, Some(&root.id));

        store.soft_delete_comment(&root.id).unwrap();

        // comments_count intentionally keeps counting the deleted comment.
        let fetched = store.get_active_post(&post.id).unwrap();
        assert_eq!(fetched.comments_count, 2);
        assert!(store.list_comments(&post.id, 50, 0).unwrap().is_empty());
    }

    #[test]
    fn follow_toggle_round_trip_restores_counts() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");

        let on = store.toggle_follow(&alice.id, &bob.id).unwrap();
        assert!(on.active);
        assert_eq!(on.count, 1);
        assert_eq!(store.get_profile(&alice.id).unwrap().following_count, 1);

        let off = store.toggle_follow(&alice.id, &bob.id).unwrap();
        assert!(!off.active);
        assert_eq!(off.count, 0);
        assert_eq!(store.get_profile(&alice.id).unwrap().following_count, 0);
        assert_eq!(store.get_profile(&bob.id).unwrap().followers_count, 0);
    }

    #[test]
    fn self_follow_rejected() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        assert!(matches!(
            store.toggle_follow(&alice.id, &alice.id),
            Err(StoreError::InvalidOperation(_))
        ));
        assert!(store.list_followers(&alice.id).unwrap().is_empty());
    }

    #[test]
    fn duplicate_share_rejected_unshare_decrements() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let post = make_post(&store, &alice, "hello");

        let mut share = Share {
            id: String::new(),
            user_id: bob.id.clone(),
            username: String::new(),
            post_id: post.id.clone(),
            message: "look at this".to_string(),
            created_at: Utc::now(),
        };
        store.create_share(&mut share).unwrap();
        assert_eq!(store.get_active_post(&post.id).unwrap().shares_count, 1);

        let mut dup = Share {
            id: String::new(),
            user_id: bob.id.clone(),
            username: String::new(),
            post_id: post.id.clone(),
            message: String::new(),
            created_at: Utc::now(),
        };
        assert!(matches!(
            store.create_share(&mut dup),
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(store.get_active_post(&post.id).unwrap().shares_count, 1);

        store.delete_share(&bob.id, &post.id).unwrap();
        assert_eq!(store.get_active_post(&post.id).unwrap().shares_count, 0);
        assert!(matches!(
            store.delete_share(&bob.id, &post.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn feed_falls_back_to_trending_when_following_no_one() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bob");
        let carol = make_user(&store, "carol");
        let popular = make_post(&store, &bob, "popular");
        make_post(&store, &bob, "quiet");
        store.toggle_post_like(&carol.id, &popular.id).unwrap();

        let feed = store.feed(&alice.id, 20, 0).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].id, popular.id);

        store.toggle_follow(&alice.id, &carol.id).unwrap();
        // Carol has no posts, so the followed-author feed is empty again.
        let feed = store.feed(&alice.id, 20, 0).unwrap();
        assert_eq!(feed.len(), 2);

        store.toggle_follow(&alice.id, &bob.id).unwrap();
        let feed = store.feed(&alice.id, 20, 0).unwrap();
        assert_eq!(feed.len(), 2);
        // Followed feed is ordered by recency, not popularity.
        assert_eq!(feed[1].id, popular.id);
    }

    #[test]
    fn search_matches_content_and_author() {
        let store = Store::in_memory().unwrap();
        let alice = make_user(&store, "alice");
        let bob = make_user(&store, "bobcat");
        make_post(&store, &alice, "rust is nice");
        make_post(&store, &bob, "unrelated");

        let by_content = store.list_posts(None, Some("rust"), 50, 0).unwrap();
        assert_eq!(by_content.len(), 1);
        assert_eq!(by_content[0].author_username, "alice");

        let by_author = store.list_posts(None, Some("bobcat"), 50, 0).unwrap();
        assert_eq!(by_author.len(), 1);
        assert_eq!(by_author[0].content, "unrelated");
    }
}
