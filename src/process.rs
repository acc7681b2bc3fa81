//! Synchronous external process invocation.

use crate::error::{FalError, Result};
use std::process::Command;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn flag_value(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Value following the first occurrence of `flag`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Printable form for logs; header values are masked so credentials never
    /// reach the debug file.
    pub fn display_redacted(&self) -> String {
        let mut out = self.program.clone();
        let mut mask_next = false;
        for arg in &self.args {
            out.push(' ');
            if mask_next {
                let name = arg.split(':').next().unwrap_or_default();
                if name.eq_ignore_ascii_case("authorization") {
                    out.push_str(&format!("\"{}: ***\"", name));
                } else {
                    out.push_str(&format!("\"{}\"", arg));
                }
                mask_next = false;
                continue;
            }
            mask_next = arg == "-H";
            out.push_str(arg);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }
}

pub trait CommandRunner: Send + Sync + 'static {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

pub type SharedCommandRunner = Arc<dyn CommandRunner>;

#[derive(Debug, Default, Clone)]
pub struct StdCommandRunner;

impl CommandRunner for StdCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = Command::new(spec.program.as_str())
            .args(spec.args.iter().map(String::as_str))
            .output()
            .map_err(|e| FalError::ProcessSpawn {
                program: spec.program.clone(),
                message: e.to_string(),
            })?;

        Ok(CommandOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).to_string(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).to_string(),
        })
    }
}

pub fn default_runner() -> SharedCommandRunner {
    Arc::new(StdCommandRunner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lookup() {
        let spec = CommandSpec::new("curl")
            .flag_value("--output", "/tmp/out.txt")
            .arg("--silent");
        assert_eq!(spec.value_of("--output"), Some("/tmp/out.txt"));
        assert_eq!(spec.value_of("--missing"), None);
        assert!(spec.has_flag("--silent"));
    }

    #[test]
    fn test_redaction() {
        let spec = CommandSpec::new("curl")
            .flag_value("-H", "Authorization: Key secret")
            .flag_value("-H", "Accept: application/json");
        let shown = spec.display_redacted();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("\"Authorization: ***\""));
        assert!(shown.contains("\"Accept: application/json\""));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let spec = CommandSpec::new("falgen-no-such-binary-xyz");
        let err = StdCommandRunner.run(&spec).unwrap_err();
        assert!(matches!(err, FalError::ProcessSpawn { .. }));
    }
}
