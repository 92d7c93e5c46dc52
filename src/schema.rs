//! Per-namespace SQL for the relational adapter.
//!
//! The table name is the only interpolated token in any statement and it is
//! encoded to `[A-Za-z0-9_]` first; every value is bound as a parameter.

use rusqlite::Connection;

use crate::errors::{GraphBenchError, Result};

const EDGE_COLUMNS: &str = "id, v_from, v_to, weight, directed";

/// Encodes an arbitrary dataset name as a safe identifier.
///
/// ASCII letters and digits pass through, `_` becomes `__` and every other
/// byte (or a leading digit) becomes `_xx` in lowercase hex, so distinct names
/// never share a table.
pub fn table_prefix(raw: &str) -> String {
    if raw.is_empty() {
        return "_".to_string();
    }
    let mut name = String::with_capacity(raw.len());
    for (i, byte) in raw.bytes().enumerate() {
        match byte {
            b'_' => name.push_str("__"),
            b'0'..=b'9' if i == 0 => name.push_str(&format!("_{byte:02x}")),
            b if b.is_ascii_alphanumeric() => name.push(b as char),
            b => name.push_str(&format!("_{b:02x}")),
        }
    }
    name
}

#[derive(Clone, Debug)]
pub struct SqlStatements {
    pub table: String,
    pub create: String,
    pub insert: String,
    pub insert_with_id: String,
    pub select_id: String,
    pub select_logical_id: String,
    pub update_weight: String,
    pub delete_by_id: String,
    pub delete_one_matching: String,
    pub find_edge: String,
    pub find_edge_or_inv: String,
    pub edges_from: String,
    pub edges_to: String,
    pub edges_related: String,
    pub count_following: String,
    pub count_followers: String,
    pub count_related: String,
    pub nodes_related: String,
    pub remove_node: String,
    pub remove_all: String,
    pub count_edges: String,
    pub count_nodes: String,
}

impl SqlStatements {
    pub fn for_namespace(namespace: &str) -> Self {
        let t = format!("{}_edges", table_prefix(namespace));
        let from_v = "v_from=?1 OR (directed=0 AND v_to=?1)";
        let to_v = "v_to=?1 OR (directed=0 AND v_from=?1)";
        let touching_v = "v_from=?1 OR v_to=?1";
        Self {
            create: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {t} (
                    id       INTEGER PRIMARY KEY AUTOINCREMENT,
                    v_from   INTEGER NOT NULL,
                    v_to     INTEGER NOT NULL,
                    weight   REAL NOT NULL DEFAULT 1.0,
                    directed INTEGER NOT NULL DEFAULT 1
                );
                CREATE INDEX IF NOT EXISTS idx_{t}_from ON {t}(v_from);
                CREATE INDEX IF NOT EXISTS idx_{t}_to ON {t}(v_to);
                "#
            ),
            insert: format!("INSERT INTO {t}(v_from, v_to, weight, directed) VALUES(?1, ?2, ?3, ?4)"),
            insert_with_id: format!(
                "INSERT INTO {t}(id, v_from, v_to, weight, directed) VALUES(?1, ?2, ?3, ?4, ?5)"
            ),
            select_id: format!("SELECT id FROM {t} WHERE id=?1"),
            select_logical_id: format!(
                "SELECT id FROM {t} WHERE directed=?3 AND \
                 ((v_from=?1 AND v_to=?2) OR (?3=0 AND v_from=?2 AND v_to=?1)) \
                 ORDER BY id LIMIT 1"
            ),
            update_weight: format!("UPDATE {t} SET weight=?2 WHERE id=?1"),
            delete_by_id: format!("DELETE FROM {t} WHERE id=?1"),
            delete_one_matching: format!(
                "DELETE FROM {t} WHERE id = (SELECT id FROM {t} \
                 WHERE v_from=?1 AND v_to=?2 AND directed=?3 ORDER BY id LIMIT 1)"
            ),
            find_edge: format!(
                "SELECT {EDGE_COLUMNS} FROM {t} \
                 WHERE (v_from=?1 AND v_to=?2) OR (directed=0 AND v_from=?2 AND v_to=?1) \
                 ORDER BY id LIMIT 1"
            ),
            find_edge_or_inv: format!(
                "SELECT {EDGE_COLUMNS} FROM {t} \
                 WHERE (v_from=?1 AND v_to=?2) OR (v_from=?2 AND v_to=?1) \
                 ORDER BY id LIMIT 1"
            ),
            edges_from: format!("SELECT {EDGE_COLUMNS} FROM {t} WHERE {from_v} ORDER BY id"),
            edges_to: format!("SELECT {EDGE_COLUMNS} FROM {t} WHERE {to_v} ORDER BY id"),
            edges_related: format!("SELECT {EDGE_COLUMNS} FROM {t} WHERE {touching_v} ORDER BY id"),
            count_following: format!(
                "SELECT COUNT(*), COALESCE(SUM(weight), 0.0) FROM {t} WHERE {from_v}"
            ),
            count_followers: format!(
                "SELECT COUNT(*), COALESCE(SUM(weight), 0.0) FROM {t} WHERE {to_v}"
            ),
            count_related: format!(
                "SELECT COUNT(*), COALESCE(SUM(weight), 0.0) FROM {t} WHERE {touching_v}"
            ),
            nodes_related: format!(
                "SELECT v_to FROM {t} WHERE v_from=?1 UNION SELECT v_from FROM {t} WHERE v_to=?1"
            ),
            remove_node: format!("DELETE FROM {t} WHERE {touching_v}"),
            remove_all: format!("DELETE FROM {t}"),
            count_edges: format!("SELECT COUNT(*) FROM {t}"),
            count_nodes: format!(
                "SELECT COUNT(*) FROM (SELECT v_from FROM {t} UNION SELECT v_to FROM {t})"
            ),
            table: t,
        }
    }

    /// `SELECT v_from, v_to` over edges touching any of `count` bound vertices.
    /// Placeholders `?1..?count` are reused for both columns.
    pub fn edges_touching_group(&self, count: usize) -> String {
        let placeholders = (1..=count)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT v_from, v_to FROM {} WHERE v_from IN ({placeholders}) OR v_to IN ({placeholders})",
            self.table
        )
    }
}

pub fn ensure_schema(conn: &Connection, statements: &SqlStatements) -> Result<()> {
    conn.execute_batch(&statements.create)
        .map_err(|e| GraphBenchError::unavailable(format!("schema for {}: {e}", statements.table)))
}

/// Applies `PRAGMA key = value` pairs; pragmas that echo a row are accepted.
pub fn apply_pragmas(conn: &Connection, pragmas: &[(String, String)]) -> Result<()> {
    for (key, value) in pragmas {
        let is_token = |s: &str| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        };
        if !is_token(key) || !is_token(value) {
            return Err(GraphBenchError::config(format!(
                "invalid pragma {key} = {value}"
            )));
        }
        let sql = format!("PRAGMA {key} = {value}");
        match conn.execute(&sql, []) {
            Ok(_) | Err(rusqlite::Error::ExecuteReturnedResults) => {}
            Err(e) => {
                return Err(GraphBenchError::unavailable(format!("{sql}: {e}")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_prefix_escapes_unsafe_characters() {
        assert_eq!(table_prefix("Human Brain; DROP"), "Human_20Brain_3b_20DROP");
        assert_eq!(table_prefix("9lives"), "_39lives");
        assert_eq!(table_prefix("web_Google"), "web__Google");
        assert_eq!(table_prefix(""), "_");
    }

    #[test]
    fn test_table_prefix_keeps_names_apart() {
        let names = ["Mouse-Genes", "MouseGenes", "Mouse_Genes", "Mouse__Genes", "Mouse_2dGenes", "_39a", "9a", ""];
        let prefixes: std::collections::BTreeSet<String> = names.iter().map(|n| table_prefix(n)).collect();
        assert_eq!(prefixes.len(), names.len());
    }

    #[test]
    fn test_statements_scope_to_namespace_table() {
        let stmts = SqlStatements::for_namespace("mouse-genes");
        assert_eq!(stmts.table, "mouse_2dgenes_edges");
        assert!(stmts.count_edges.contains("mouse_2dgenes_edges"));
        assert!(stmts.edges_touching_group(2).ends_with("v_to IN (?1, ?2)"));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let stmts = SqlStatements::for_namespace("test");
        ensure_schema(&conn, &stmts).unwrap();
        ensure_schema(&conn, &stmts).unwrap();
        let count: i64 = conn.query_row(&stmts.count_edges, [], |row| row.get(0)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_pragmas_reject_injection() {
        let conn = Connection::open_in_memory().unwrap();
        let bad = vec![("cache_size".to_string(), "1; DROP TABLE x".to_string())];
        assert!(apply_pragmas(&conn, &bad).is_err());
        let good = vec![("cache_size".to_string(), "-2000".to_string())];
        assert!(apply_pragmas(&conn, &good).is_ok());
    }
}
