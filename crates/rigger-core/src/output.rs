//! Line-oriented output sink shared by the task context and shell sessions.

use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
enum Sink {
    Stdout,
    Buffer(Vec<String>),
    Quiet,
}

/// Where command echoes and capability messages go.
///
/// Clones share the same sink, so a buffer handed to a shell can be
/// inspected later through any clone.
#[derive(Debug, Clone)]
pub struct Output {
    sink: Arc<Mutex<Sink>>,
}

impl Default for Output {
    fn default() -> Self {
        Self::quiet()
    }
}

impl Output {
    pub fn stdout() -> Self {
        Self::from_sink(Sink::Stdout)
    }

    /// Collect lines in memory.
    pub fn buffer() -> Self {
        Self::from_sink(Sink::Buffer(Vec::new()))
    }

    pub fn quiet() -> Self {
        Self::from_sink(Sink::Quiet)
    }

    fn from_sink(sink: Sink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    pub fn writeln(&self, line: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *sink {
            Sink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{}", line);
            }
            Sink::Buffer(lines) => lines.push(line.to_string()),
            Sink::Quiet => {}
        }
    }

    pub fn write_lines(&self, lines: &[String]) {
        for line in lines {
            self.writeln(line);
        }
    }

    /// Lines collected so far; empty unless this is a buffer.
    pub fn lines(&self) -> Vec<String> {
        let sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        match &*sink {
            Sink::Buffer(lines) => lines.clone(),
            _ => Vec::new(),
        }
    }

    pub fn is_quiet(&self) -> bool {
        let sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*sink, Sink::Quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_shared_between_clones() {
        let output = Output::buffer();
        let clone = output.clone();
        clone.writeln("hello");
        output.write_lines(&["a".to_string(), "b".to_string()]);
        assert_eq!(output.lines(), vec!["hello", "a", "b"]);
    }

    #[test]
    fn quiet_discards_lines() {
        let output = Output::quiet();
        output.writeln("ignored");
        assert!(output.lines().is_empty());
        assert!(output.is_quiet());
    }
}
