//! SQLite-backed cookie store.
//!
//! `SqliteCookieStore` keeps one row per cookie in a `cookies` table. Each
//! `persist` rewrites the table inside a transaction (DELETE + INSERT).
//! Database access goes through an `r2d2` pool so the store can be shared
//! across threads.

use std::path::Path;

use anyhow::Result;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::rusqlite::params;
use r2d2_sqlite::SqliteConnectionManager;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::cookies::cookie_jar::DefaultCookieJar;
use crate::cookies::store::CookieStore;
use crate::cookies::{Cookie, SameSite};

pub struct SqliteCookieStore {
    /// Connection pool for the SQLite database
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCookieStore {
    /// Opens (or creates) a SQLite database at `path` and ensures the schema exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::new(manager)?;

        pool.get()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS cookies (
                name TEXT NOT NULL PRIMARY KEY,
                value TEXT NOT NULL,
                path TEXT,
                domain TEXT,
                secure INTEGER NOT NULL,
                max_age INTEGER,
                expires TEXT,
                same_site TEXT,
                http_only INTEGER NOT NULL
            );",
        )?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn load_jar(&self) -> Result<DefaultCookieJar> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, value, path, domain, secure, max_age, expires, same_site, http_only
             FROM cookies ORDER BY rowid",
        )?;

        let rows = stmt.query_map([], |row| {
            let expires: Option<String> = row.get(6)?;
            let same_site: Option<String> = row.get(7)?;
            Ok(Cookie {
                name: row.get(0)?,
                value: row.get(1)?,
                path: row.get(2)?,
                domain: row.get(3)?,
                secure: row.get::<_, i64>(4)? != 0,
                max_age: row.get(5)?,
                expires: expires.and_then(|s| OffsetDateTime::parse(&s, &Rfc3339).ok()),
                same_site: same_site.as_deref().and_then(parse_same_site),
                http_only: row.get::<_, i64>(8)? != 0,
            })
        })?;

        let mut jar = DefaultCookieJar::new();
        for cookie in rows {
            jar.entries.push(cookie?);
        }
        Ok(jar)
    }

    fn save_jar(&self, jar: &DefaultCookieJar) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM cookies", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cookies (name, value, path, domain, secure, max_age, expires, same_site, http_only)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;

            for cookie in &jar.entries {
                let expires = match cookie.expires {
                    Some(at) => Some(at.format(&Rfc3339)?),
                    None => None,
                };
                stmt.execute(params![
                    cookie.name,
                    cookie.value,
                    cookie.path,
                    cookie.domain,
                    cookie.secure as i64,
                    cookie.max_age,
                    expires,
                    cookie.same_site.map(|s| s.to_string()),
                    cookie.http_only as i64
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

fn parse_same_site(s: &str) -> Option<SameSite> {
    match s {
        "Strict" => Some(SameSite::Strict),
        "Lax" => Some(SameSite::Lax),
        "None" => Some(SameSite::None),
        _ => None,
    }
}

impl CookieStore for SqliteCookieStore {
    fn load(&self) -> DefaultCookieJar {
        self.load_jar().unwrap_or_else(|e| {
            log::warn!("cookie database unreadable, starting empty: {e:#}");
            DefaultCookieJar::new()
        })
    }

    fn persist(&self, snapshot: &DefaultCookieJar) {
        if let Err(e) = self.save_jar(snapshot) {
            log::warn!("failed to persist cookies: {e:#}");
        }
    }

    fn clear(&self) {
        let result = self.conn().and_then(|conn| Ok(conn.execute("DELETE FROM cookies", [])?));
        if let Err(e) = result {
            log::warn!("failed to clear cookie database: {e:#}");
        }
    }
}
