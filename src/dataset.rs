//! Delimited adjacency-list reader.
//!
//! Rows are `v_from v_to [weight [directed]]` split on `,`, `;`, tabs or
//! runs of whitespace. Edges are produced lazily so a dataset is never held
//! in memory beyond one chunk.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::{
    errors::{GraphBenchError, Result},
    graph::{Edge, NodeId},
};

pub struct DatasetReader<R> {
    lines: std::io::Lines<R>,
    source: PathBuf,
    line_no: usize,
    seen_data: bool,
}

impl DatasetReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            GraphBenchError::invalid_input(format!("cannot open dataset {}: {e}", path.display()))
        })?;
        Ok(Self::from_reader(BufReader::new(file), path))
    }
}

impl<R: BufRead> DatasetReader<R> {
    pub fn from_reader<P: AsRef<Path>>(reader: R, source: P) -> Self {
        Self {
            lines: reader.lines(),
            source: source.as_ref().to_path_buf(),
            line_no: 0,
            seen_data: false,
        }
    }

    /// Up to `len` edges; an empty vector marks the end of the file.
    pub fn next_chunk(&mut self, len: usize) -> Result<Vec<Edge>> {
        let mut chunk = Vec::with_capacity(len.min(1 << 16));
        while chunk.len() < len {
            match self.next() {
                Some(edge) => chunk.push(edge?),
                None => break,
            }
        }
        Ok(chunk)
    }

    fn parse_line(&self, line: &str) -> Result<Option<Edge>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('%') {
            return Ok(None);
        }
        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();
        let bad = |what: &str| {
            GraphBenchError::invalid_input(format!(
                "{}:{}: {what}",
                self.source.display(),
                self.line_no
            ))
        };
        if fields.len() < 2 {
            return Err(bad("expected at least two columns"));
        }
        let v_from = fields[0].parse::<NodeId>();
        let v_to = fields[1].parse::<NodeId>();
        let (v_from, v_to) = match (v_from, v_to) {
            (Ok(from), Ok(to)) => (from, to),
            // A non-numeric first row is a header.
            _ if !self.seen_data => return Ok(None),
            _ => return Err(bad("vertex ids must be integers")),
        };
        let mut edge = Edge::new(v_from, v_to);
        if let Some(weight) = fields.get(2) {
            edge.weight = weight
                .parse::<f64>()
                .ok()
                .filter(|w| w.is_finite())
                .ok_or_else(|| bad("weight must be a finite number"))?;
        }
        if let Some(directed) = fields.get(3) {
            edge.directed = parse_flag(directed).ok_or_else(|| bad("directed must be 0/1 or true/false"))?;
        }
        Ok(Some(edge))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" => Some(true),
        "0" | "false" | "f" | "no" => Some(false),
        _ => None,
    }
}

impl<R: BufRead> Iterator for DatasetReader<R> {
    type Item = Result<Edge>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(GraphBenchError::invalid_input(format!(
                        "{}: {e}",
                        self.source.display()
                    ))));
                }
            };
            self.line_no += 1;
            match self.parse_line(&line) {
                Ok(Some(edge)) => {
                    self.seen_data = true;
                    return Some(Ok(edge));
                }
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
