use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{NewPost, Newsletter, Post};

use super::schema::SCHEMA;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Newsletter operations

    pub async fn insert_newsletter(
        &self,
        url: String,
        name: String,
        description: Option<String>,
        author: Option<String>,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO newsletters (url, name, description, author) VALUES (?1, ?2, ?3, ?4)",
                    params![url, name, description, author],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn newsletter_by_url(&self, url: &str) -> Result<Option<Newsletter>> {
        let url = url.to_string();
        let newsletter = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, url, name, description, author, created_at, updated_at FROM newsletters WHERE url = ?1",
                )?;
                let newsletter = stmt
                    .query_row(params![url], |row| Ok(newsletter_from_row(row)))
                    .optional()?;
                Ok(newsletter)
            })
            .await?;
        Ok(newsletter)
    }

    pub async fn all_newsletters(&self) -> Result<Vec<Newsletter>> {
        let newsletters = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, url, name, description, author, created_at, updated_at FROM newsletters ORDER BY name",
                )?;
                let newsletters = stmt
                    .query_map([], |row| Ok(newsletter_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(newsletters)
            })
            .await?;
        Ok(newsletters)
    }

    /// Refresh `updated_at`, marking the newsletter as checked.
    pub async fn touch_newsletter(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE newsletters SET updated_at = datetime('now') WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Post operations

    /// URLs of every stored post for a newsletter, for diffing against a
    /// freshly fetched batch.
    pub async fn post_urls(&self, newsletter_id: i64) -> Result<HashSet<String>> {
        let urls = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT url FROM posts WHERE newsletter_id = ?1")?;
                let urls = stmt
                    .query_map(params![newsletter_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<HashSet<_>, _>>()?;
                Ok(urls)
            })
            .await?;
        Ok(urls)
    }

    /// Insert a batch of staged posts in a single transaction.
    pub async fn insert_posts(&self, newsletter_id: i64, posts: Vec<NewPost>) -> Result<usize> {
        let count = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for post in &posts {
                    tx.execute(
                        r#"INSERT INTO posts (url, title, subtitle, published_date, is_free, post_id, content, newsletter_id)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                        params![
                            post.url,
                            post.title,
                            post.subtitle,
                            post.published_date.to_rfc3339(),
                            post.is_free,
                            post.post_id,
                            post.content,
                            newsletter_id,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(posts.len())
            })
            .await?;
        Ok(count)
    }

    pub async fn posts_for_newsletter(&self, newsletter_id: i64) -> Result<Vec<Post>> {
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, url, title, subtitle, published_date, is_free, post_id, content, created_at, newsletter_id
                       FROM posts
                       WHERE newsletter_id = ?1
                       ORDER BY published_date DESC"#,
                )?;
                let posts = stmt
                    .query_map(params![newsletter_id], |row| Ok(post_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn newsletter_from_row(row: &Row) -> Newsletter {
    Newsletter {
        id: row.get(0).unwrap(),
        url: row.get(1).unwrap(),
        name: row.get(2).unwrap(),
        description: row.get(3).unwrap(),
        author: row.get(4).unwrap(),
        created_at: row
            .get::<_, String>(5)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(6)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn post_from_row(row: &Row) -> Post {
    Post {
        id: row.get(0).unwrap(),
        url: row.get(1).unwrap(),
        title: row.get(2).unwrap(),
        subtitle: row.get(3).unwrap(),
        published_date: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        is_free: row.get::<_, i64>(5).unwrap() != 0,
        post_id: row.get(6).unwrap(),
        content: row.get(7).unwrap(),
        created_at: row
            .get::<_, String>(8)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        newsletter_id: row.get(9).unwrap(),
    }
}
