pub mod error;
pub mod query;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

pub use error::{Result, SearchError};

/// Hard cap on hits returned per request.
const MAX_HITS: i64 = 5;

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub owner_user_id: Option<i64>,
    pub pinned: Option<bool>,
    pub media_type: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub memory_id: String,
    pub snippet: String,
    pub media_type: Option<String>,
    pub media_file_id: Option<String>,
    pub tags: Vec<String>,
    pub is_pinned: bool,
    pub created_at: String,
}

/// Build and run the `MATCH` query by hand, with tokenisation/stop-word
/// filtering and a pin boost ahead of the FTS engine's own BM25 ranking. Only
/// confirmed memories with confirmed tags are ever indexed
/// (`bearmemori_store::fts`), so pending/deleted/suggested-only-tag rows
/// are excluded automatically — no separate filter needed for them here.
pub fn search(conn: &Connection, raw_query: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>> {
    let Some(match_expr) = query::build_match_expression(raw_query) else {
        return Ok(Vec::new());
    };

    let mut sql = String::from(
        "SELECT m.id, meta.content, meta.tags, m.media_type, m.media_file_id, m.is_pinned, m.created_at
         FROM memories_fts
         JOIN memories_fts_meta meta ON meta.rowid_ref = memories_fts.rowid
         JOIN memories m ON m.id = meta.memory_id
         WHERE memories_fts MATCH ?1 AND m.status = 'confirmed'",
    );

    let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(match_expr)];

    if let Some(owner) = filters.owner_user_id {
        args.push(Box::new(owner));
        sql.push_str(&format!(" AND m.owner_user_id = ?{}", args.len()));
    }
    if let Some(pinned) = filters.pinned {
        args.push(Box::new(pinned));
        sql.push_str(&format!(" AND m.is_pinned = ?{}", args.len()));
    }
    if let Some(media_type) = &filters.media_type {
        args.push(Box::new(media_type.clone()));
        sql.push_str(&format!(" AND m.media_type = ?{}", args.len()));
    }
    if let Some(after) = &filters.created_after {
        args.push(Box::new(after.clone()));
        sql.push_str(&format!(" AND m.created_at >= ?{}", args.len()));
    }
    if let Some(before) = &filters.created_before {
        args.push(Box::new(before.clone()));
        sql.push_str(&format!(" AND m.created_at <= ?{}", args.len()));
    }

    sql.push_str(" ORDER BY m.is_pinned DESC, bm25(memories_fts) ASC, m.created_at DESC LIMIT ?");
    args.push(Box::new(MAX_HITS));
    sql = sql.replacen("LIMIT ?", &format!("LIMIT ?{}", args.len()), 1);

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();

    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        let content: String = row.get(1)?;
        let tags: String = row.get(2)?;
        Ok(SearchHit {
            memory_id: row.get(0)?,
            snippet: snippet_of(&content),
            media_type: row.get(3)?,
            media_file_id: row.get(4)?,
            tags: tags.split_whitespace().map(str::to_string).collect(),
            is_pinned: row.get::<_, i64>(5)? != 0,
            created_at: row.get(6)?,
        })
    })?;

    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn snippet_of(content: &str) -> String {
    const MAX_LEN: usize = 160;
    if content.chars().count() <= MAX_LEN {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(MAX_LEN).collect();
        format!("{truncated}…")
    }
}

/// True if the memory exists in the index at all — lets callers assert the
/// round-trip property without duplicating the join.
pub fn is_indexed(conn: &Connection, memory_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM memories_fts_meta WHERE memory_id = ?1", params![memory_id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bearmemori_core::Actor;
    use bearmemori_store::{db, memories, users};

    fn setup() -> Connection {
        let mut conn = db::open_in_memory().unwrap();
        users::get_or_create(&mut conn, 42, "alice").unwrap();
        memories::create(
            &mut conn,
            &Actor::User(42),
            memories::NewMemory {
                owner_user_id: 42,
                source_chat_id: None,
                source_message_id: None,
                content: Some("bought butter and a receipt at the store"),
                media_type: None,
                media_file_id: None,
                media_local_path: None,
            },
        )
        .unwrap();
        conn
    }

    #[test]
    fn confirmed_text_memory_is_searchable() {
        let conn = setup();
        let hits = search(&conn, "butter", &SearchFilters { owner_user_id: Some(42), ..Default::default() }).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn owner_filter_excludes_other_users() {
        let conn = setup();
        let hits = search(&conn, "butter", &SearchFilters { owner_user_id: Some(99), ..Default::default() }).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn pending_memory_is_not_indexed() {
        let mut conn = db::open_in_memory().unwrap();
        users::get_or_create(&mut conn, 1, "bob").unwrap();
        let mem = memories::create(
            &mut conn,
            &Actor::User(1),
            memories::NewMemory {
                owner_user_id: 1,
                source_chat_id: None,
                source_message_id: None,
                content: None,
                media_type: Some("image"),
                media_file_id: Some("f1"),
                media_local_path: Some("/tmp/f1.jpg"),
            },
        )
        .unwrap();
        assert!(!is_indexed(&conn, &mem.id).unwrap());
    }

    #[test]
    fn stop_word_only_query_returns_empty() {
        let conn = setup();
        let hits = search(&conn, "the and of", &SearchFilters::default()).unwrap();
        assert!(hits.is_empty());
    }
}
