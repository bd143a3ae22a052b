//! Write-once sinks for produced provisioning outputs.
//!
//! The original deployment flow hands client credentials to the pipeline's
//! environment store; here that surface is a dotenv-style file the pipeline
//! sources. Values are written forward exactly once and never echoed into
//! tracing output.

use crate::errors::ProvisionError;
use crate::provision::Result;
use std::path::PathBuf;

/// Destination for produced configuration values and credentials.
pub trait OutputSink: Send {
    /// Set `key` to `value`, replacing any previous value for the key.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Dotenv-format file sink (`KEY=value` per line).
///
/// Existing keys are replaced in place, other lines are preserved, and the
/// file is created on first write.
pub struct DotenvFileSink {
    path: PathBuf,
}

impl DotenvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputSink for DotenvFileSink {
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let existing = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(ProvisionError::Output(format!(
                    "reading {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let mut lines: Vec<String> = Vec::new();
        let mut replaced = false;
        for line in existing.lines() {
            if line.split('=').next() == Some(key) {
                lines.push(format!("{}={}", key, value));
                replaced = true;
            } else {
                lines.push(line.to_string());
            }
        }
        if !replaced {
            lines.push(format!("{}={}", key, value));
        }

        let mut content = lines.join("\n");
        content.push('\n');
        std::fs::write(&self.path, content).map_err(|e| {
            ProvisionError::Output(format!("writing {}: {}", self.path.display(), e))
        })?;

        tracing::info!(%key, "provision output written");
        Ok(())
    }
}

/// In-memory sink for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryOutputSink {
    values: Vec<(String, String)>,
}

impl MemoryOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[(String, String)] {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of writes ever issued for `key`, including replacements.
    pub fn write_count(&self, key: &str) -> usize {
        self.values.iter().filter(|(k, _)| k == key).count()
    }
}

impl OutputSink for MemoryOutputSink {
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.push((key.to_string(), value.to_string()));
        Ok(())
    }
}
