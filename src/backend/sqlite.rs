//! Relational adapter over SQLite.
//!
//! One `<namespace>_edges` table per handle, so several datasets can live in
//! the same database file. File-backed and in-memory connections form the
//! relational family; both go through the same statements.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::{debug, warn};

use super::{GraphBackend, NodeSet, two_hop};
use crate::{
    errors::{GraphBenchError, Result},
    graph::{Edge, GraphDegree, NodeId, row_to_edge, validate_edge},
    schema::{SqlStatements, apply_pragmas, ensure_schema},
};

/// Bound variables per `IN (...)` group query.
const GROUP_CHUNK: usize = 400;

#[derive(Clone, Debug, Default)]
pub struct SqliteConfig {
    /// When set, `insert_edge` merges into an existing row matching the
    /// incoming `id` or logical edge instead of appending a duplicate.
    pub check_uniqueness: bool,
    pub pragmas: Vec<(String, String)>,
}

impl SqliteConfig {
    /// Tuning used for file databases.
    pub fn file_defaults() -> Self {
        Self {
            check_uniqueness: false,
            pragmas: vec![
                ("journal_mode".into(), "WAL".into()),
                ("synchronous".into(), "NORMAL".into()),
                ("temp_store".into(), "MEMORY".into()),
                ("cache_size".into(), "10000".into()),
            ],
        }
    }
}

pub struct SqliteBackend {
    conn: Mutex<Connection>,
    namespace: String,
    statements: SqlStatements,
    check_uniqueness: bool,
}

impl SqliteBackend {
    pub fn open<P: AsRef<Path>>(path: P, namespace: &str, config: &SqliteConfig) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            GraphBenchError::unavailable(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_connection(conn, namespace, config)
    }

    pub fn in_memory(namespace: &str, config: &SqliteConfig) -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| GraphBenchError::unavailable(e.to_string()))?;
        Self::from_connection(conn, namespace, config)
    }

    pub fn from_connection(conn: Connection, namespace: &str, config: &SqliteConfig) -> Result<Self> {
        apply_pragmas(&conn, &config.pragmas)?;
        let statements = SqlStatements::for_namespace(namespace);
        ensure_schema(&conn, &statements)?;
        conn.set_prepared_statement_cache_capacity(64);
        Ok(Self {
            conn: Mutex::new(conn),
            namespace: namespace.to_string(),
            statements,
            check_uniqueness: config.check_uniqueness,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.statements.table
    }

    /// Inserts one edge, merging into an existing row first when
    /// `check_uniqueness` is set.
    pub fn insert_edge_checked(&self, edge: &Edge, check_uniqueness: bool) -> Result<bool> {
        validate_edge(edge)?;
        let conn = self.conn.lock();
        write_edge(&conn, &self.statements, edge, check_uniqueness)
    }

    /// Writes a batch inside one transaction. A failing edge rolls the whole
    /// batch back and the call reports zero.
    pub fn insert_edges_checked(&self, edges: &[Edge], check_uniqueness: bool) -> Result<usize> {
        for edge in edges {
            validate_edge(edge)?;
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut written = 0usize;
        for edge in edges {
            match write_edge(&tx, &self.statements, edge, check_uniqueness) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(err) if err.is_fatal_for_backend() => return Err(err),
                Err(err) => {
                    warn!(
                        namespace = %self.namespace,
                        batch = edges.len(),
                        error = %err,
                        "batch insert rolled back"
                    );
                    // Dropping the transaction rolls it back.
                    return Ok(0);
                }
            }
        }
        match tx.commit() {
            Ok(()) => Ok(written),
            Err(err) => {
                let err = GraphBenchError::from(err);
                if err.is_fatal_for_backend() {
                    return Err(err);
                }
                warn!(namespace = %self.namespace, error = %err, "batch commit failed");
                Ok(0)
            }
        }
    }

    fn query_edges(&self, sql: &str, v: NodeId) -> Result<Vec<Edge>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![v], row_to_edge)?;
        let mut edges = Vec::new();
        for edge in rows {
            edges.push(edge?);
        }
        Ok(edges)
    }

    fn query_edge_pair(&self, sql: &str, a: NodeId, b: NodeId) -> Result<Option<Edge>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        Ok(stmt.query_row(params![a, b], row_to_edge).optional()?)
    }

    fn query_degree(&self, sql: &str, v: NodeId) -> Result<GraphDegree> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let (count, weight): (i64, f64) =
            stmt.query_row(params![v], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(GraphDegree::new(count as u64, weight))
    }

    fn query_count(&self, sql: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn delete_edge(conn: &Connection, statements: &SqlStatements, edge: &Edge) -> Result<bool> {
        let affected = match edge.id {
            Some(id) => conn.prepare_cached(&statements.delete_by_id)?.execute(params![id])?,
            None => conn
                .prepare_cached(&statements.delete_one_matching)?
                .execute(params![edge.v_from, edge.v_to, edge.directed])?,
        };
        Ok(affected > 0)
    }
}

/// Shared write path of single and batched inserts.
fn write_edge(
    conn: &Connection,
    statements: &SqlStatements,
    edge: &Edge,
    check_uniqueness: bool,
) -> Result<bool> {
    if check_uniqueness {
        let existing: Option<i64> = match edge.id {
            Some(id) => conn
                .prepare_cached(&statements.select_id)?
                .query_row(params![id], |row| row.get(0))
                .optional()?,
            None => conn
                .prepare_cached(&statements.select_logical_id)?
                .query_row(params![edge.v_from, edge.v_to, edge.directed], |row| {
                    row.get(0)
                })
                .optional()?,
        };
        if let Some(id) = existing {
            conn.prepare_cached(&statements.update_weight)?
                .execute(params![id, edge.weight])?;
            return Ok(true);
        }
    }
    let affected = match edge.id {
        Some(id) => conn.prepare_cached(&statements.insert_with_id)?.execute(params![
            id,
            edge.v_from,
            edge.v_to,
            edge.weight,
            edge.directed
        ])?,
        None => conn.prepare_cached(&statements.insert)?.execute(params![
            edge.v_from,
            edge.v_to,
            edge.weight,
            edge.directed
        ])?,
    };
    Ok(affected > 0)
}

impl GraphBackend for SqliteBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn insert_edge(&self, edge: &Edge) -> Result<bool> {
        self.insert_edge_checked(edge, self.check_uniqueness)
    }

    fn insert_edges(&self, edges: &[Edge]) -> Result<usize> {
        self.insert_edges_checked(edges, self.check_uniqueness)
    }

    fn upsert_edge(&self, edge: &Edge) -> Result<bool> {
        self.insert_edge_checked(edge, true)
    }

    fn upsert_edges(&self, edges: &[Edge]) -> Result<usize> {
        self.insert_edges_checked(edges, true)
    }

    fn remove_edge(&self, edge: &Edge) -> Result<bool> {
        let conn = self.conn.lock();
        Self::delete_edge(&conn, &self.statements, edge)
    }

    fn remove_edges(&self, edges: &[Edge]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut removed = 0usize;
        for edge in edges {
            if Self::delete_edge(&tx, &self.statements, edge)? {
                removed += 1;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn find_edge(&self, v_from: NodeId, v_to: NodeId) -> Result<Option<Edge>> {
        self.query_edge_pair(&self.statements.find_edge, v_from, v_to)
    }

    fn find_edge_or_inv(&self, v1: NodeId, v2: NodeId) -> Result<Option<Edge>> {
        self.query_edge_pair(&self.statements.find_edge_or_inv, v1, v2)
    }

    fn edges_from(&self, v: NodeId) -> Result<Vec<Edge>> {
        self.query_edges(&self.statements.edges_from, v)
    }

    fn edges_to(&self, v: NodeId) -> Result<Vec<Edge>> {
        self.query_edges(&self.statements.edges_to, v)
    }

    fn edges_related(&self, v: NodeId) -> Result<Vec<Edge>> {
        self.query_edges(&self.statements.edges_related, v)
    }

    fn count_following(&self, v: NodeId) -> Result<GraphDegree> {
        self.query_degree(&self.statements.count_following, v)
    }

    fn count_followers(&self, v: NodeId) -> Result<GraphDegree> {
        self.query_degree(&self.statements.count_followers, v)
    }

    fn count_related(&self, v: NodeId) -> Result<GraphDegree> {
        self.query_degree(&self.statements.count_related, v)
    }

    fn nodes_related(&self, v: NodeId) -> Result<NodeSet> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&self.statements.nodes_related)?;
        let rows = stmt.query_map(params![v], |row| row.get::<_, i64>(0))?;
        let mut nodes = NodeSet::new();
        for node in rows {
            nodes.insert(node?);
        }
        nodes.remove(&v);
        Ok(nodes)
    }

    fn nodes_related_to_group(&self, vs: &[NodeId]) -> Result<NodeSet> {
        let group: NodeSet = vs.iter().copied().collect();
        let mut nodes = NodeSet::new();
        let conn = self.conn.lock();
        for chunk in vs.chunks(GROUP_CHUNK) {
            let sql = self.statements.edges_touching_group(chunk.len());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            for pair in rows {
                let (from, to) = pair?;
                for v in [from, to] {
                    if !group.contains(&v) {
                        nodes.insert(v);
                    }
                }
            }
        }
        Ok(nodes)
    }

    fn nodes_related_to_related(&self, v: NodeId, include_related: bool) -> Result<NodeSet> {
        two_hop(self, v, include_related)
    }

    fn remove_node(&self, v: NodeId) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn
            .prepare_cached(&self.statements.remove_node)?
            .execute(params![v])?;
        Ok(removed)
    }

    fn remove_all(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(&self.statements.remove_all, [])?;
        debug!(namespace = %self.namespace, removed, "namespace cleared");
        Ok(removed)
    }

    fn count_nodes(&self) -> Result<u64> {
        self.query_count(&self.statements.count_nodes)
    }

    fn count_edges(&self) -> Result<u64> {
        self.query_count(&self.statements.count_edges)
    }
}
