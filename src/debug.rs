use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSON-lines event sink. Every event bumps a counter named after its type;
/// counters are written out and reset by [`DebugLogger::emit_summary`].
#[derive(Clone)]
pub(crate) struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: HashMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: HashMap::new(),
            })),
        })
    }

    /// Writes `{"type": kind, ...fields}`. Non-object `fields` are stored
    /// under `"value"`.
    pub fn log_event(&self, kind: &str, fields: Value) {
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(kind.to_string()));
        match fields {
            Value::Object(extra) => object.extend(extra),
            Value::Null => {}
            other => {
                object.insert("value".to_string(), other);
            }
        }
        let line = Value::Object(object).to_string();
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(kind.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let counts: Map<String, Value> = counters
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect();
            let line = json!({
                "type": "debug.summary",
                "context": context,
                "counts": counts,
            });
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_json_lines_with_counted_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        logger.log_event("overlay.placed", json!({"role": "logo", "x": 35}));
        logger.log_event("overlay.placed", json!({"role": "actor"}));
        logger.log_event("text.skipped", json!({"role": "tagline", "reason": "no \"region\""}));
        logger.increment("banners", 2);
        logger.emit_summary("batch");
        logger.flush();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["type"], "overlay.placed");
        assert_eq!(lines[0]["x"], 35);
        assert_eq!(lines[2]["reason"], "no \"region\"");
        assert_eq!(lines[3]["type"], "debug.summary");
        assert_eq!(lines[3]["counts"]["overlay.placed"], 2);
        assert_eq!(lines[3]["counts"]["banners"], 2);
    }
}
