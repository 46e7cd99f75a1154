//! Alert sinks
//!
//! A small capability interface for emitting alert records. The default
//! sink appends newline-delimited JSON to a file with an immediate flush;
//! a composite sink fans out to several sinks and never lets one child
//! failure halt the pipeline.

use crate::models::Alert;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::warn;

pub trait AlertSink {
    fn emit(&mut self, alert: &Alert) -> Result<()>;
    fn close(&mut self) {}
}

/// Appends one JSON record per alert to an append-only file.
pub struct JsonlSink {
    file: File,
}

impl JsonlSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening alerts file {}", path.display()))?;
        Ok(Self { file })
    }
}

impl AlertSink for JsonlSink {
    fn emit(&mut self, alert: &Alert) -> Result<()> {
        let mut record = serde_json::to_string(alert)?;
        record.push('\n');
        self.file.write_all(record.as_bytes())?;
        // Flush per alert: records must survive abrupt termination
        self.file.flush()?;
        Ok(())
    }
}

/// Forwards each alert to every child sink, swallowing per-child errors.
pub struct MultiSink {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn AlertSink>>) -> Self {
        Self { sinks }
    }
}

impl AlertSink for MultiSink {
    fn emit(&mut self, alert: &Alert) -> Result<()> {
        for sink in &mut self.sinks {
            if let Err(err) = sink.emit(alert) {
                warn!("alert sink failed: {err:#}");
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        for sink in &mut self.sinks {
            sink.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn sample_alert(line: &str) -> Alert {
        Alert {
            novelty: 0.9,
            score: 5.0,
            template: "t".into(),
            line: line.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_jsonl_sink_appends_parseable_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let mut sink = JsonlSink::open(&path).unwrap();
        sink.emit(&sample_alert("first")).unwrap();
        sink.emit(&sample_alert("second")).unwrap();
        sink.close();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let alert: Alert = serde_json::from_str(line).unwrap();
            assert_eq!(alert.novelty, 0.9);
        }
        let second: Alert = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.line, "second");
    }

    #[test]
    fn test_jsonl_sink_reopens_in_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.emit(&sample_alert("first")).unwrap();
        }
        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.emit(&sample_alert("second")).unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    struct FailingSink;
    impl AlertSink for FailingSink {
        fn emit(&mut self, _alert: &Alert) -> Result<()> {
            anyhow::bail!("boom")
        }
    }

    struct CountingSink {
        emitted: Rc<Cell<usize>>,
    }
    impl AlertSink for CountingSink {
        fn emit(&mut self, _alert: &Alert) -> Result<()> {
            self.emitted.set(self.emitted.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_multi_sink_isolates_failures() {
        let emitted = Rc::new(Cell::new(0));
        let mut multi = MultiSink::new(vec![
            Box::new(FailingSink),
            Box::new(CountingSink { emitted: emitted.clone() }),
        ]);
        multi.emit(&sample_alert("x")).unwrap();
        multi.emit(&sample_alert("y")).unwrap();
        assert_eq!(emitted.get(), 2);
    }
}
