pub const SCHEMA: &str = r#"
-- newsletters table
CREATE TABLE IF NOT EXISTS newsletters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    author TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_newsletters_url ON newsletters(url);

-- posts table
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    subtitle TEXT,
    published_date TEXT NOT NULL,
    is_free INTEGER NOT NULL DEFAULT 1,
    post_id TEXT,
    content TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    newsletter_id INTEGER NOT NULL REFERENCES newsletters(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_posts_newsletter_id ON posts(newsletter_id);
CREATE INDEX IF NOT EXISTS idx_posts_url ON posts(url);
CREATE INDEX IF NOT EXISTS idx_posts_published_date ON posts(published_date DESC);
"#;
