use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::Write;

/// Append-only per-step status line sink. Inactive until a filename is set.
pub struct StatusFile {
    filename: Option<String>,
    file: Option<File>,
    pending: Vec<String>,
}

impl StatusFile {
    pub fn new() -> Self {
        StatusFile {
            filename: None,
            file: None,
            pending: Vec::new(),
        }
    }

    pub fn set_filename(&mut self, filename: impl Into<String>) {
        let filename = filename.into();
        match OpenOptions::new().create(true).append(true).open(&filename) {
            Ok(f) => {
                self.file = Some(f);
                self.filename = Some(filename);
            }
            Err(e) => {
                println!("could not open status file {}: {}", filename, e);
                self.file = None;
                self.filename = None;
            }
        }
    }

    pub fn get_filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.file.is_some()
    }

    pub fn reset_sim(&mut self) {
        self.pending.clear();
    }

    pub fn append_value(&mut self, v: impl Display) {
        self.pending.push(format!("{}", v));
    }

    /// Write and flush the accumulated values as one line.
    pub fn write_line(&mut self) {
        let line = self.pending.join(" ");
        self.pending.clear();
        if let Some(f) = &mut self.file {
            if writeln!(f, "{}", line).and_then(|_| f.flush()).is_err() {
                println!("failed writing status line");
            }
        }
    }
}

impl Default for StatusFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_sink_swallows_values() {
        let mut sf = StatusFile::new();
        assert!(!sf.is_active());
        sf.append_value(1.5);
        sf.append_value(42);
        sf.write_line();
    }

    #[test]
    fn lines_are_appended() {
        let dir = std::env::temp_dir().join("vpm3d-status-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("status.dat");
        let _ = std::fs::remove_file(&path);

        let mut sf = StatusFile::new();
        sf.set_filename(path.to_str().unwrap());
        assert!(sf.is_active());

        sf.append_value(0.1);
        sf.append_value(100);
        sf.write_line();
        sf.append_value(0.2);
        sf.append_value(101);
        sf.write_line();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "0.1 100");
        assert_eq!(lines[1], "0.2 101");
    }
}
