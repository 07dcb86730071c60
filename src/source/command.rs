//! Subprocess-backed term counting.
//!
//! Listing and properties come from a wrapped [`FsSource`]; term
//! frequencies come from an external counting program such as
//! `rg --count-matches`, which prints one `path:count` line per file.
//! A running child is killed as soon as the issuing generation goes stale.

use crate::config::CommandConfig;
use crate::error::{Error, Result};
use crate::source::{
    DocId, DocumentSource, FsSource, Property, PropertyAccessor, SourceContext, TermCounts,
    TermPattern,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// How often a running child is checked for exit or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct CommandSource {
    name: String,
    fs: FsSource,
    program: String,
    args: Vec<String>,
    no_match_exit_codes: Vec<i32>,
}

impl CommandSource {
    pub fn new(fs: FsSource, config: &CommandConfig) -> Result<Self> {
        let program = config.program.trim();
        if program.is_empty() {
            return Err(Error::MissingArgument("program"));
        }
        Ok(Self {
            name: format!("cmd:{}", program),
            fs,
            program: program.to_string(),
            args: config.args.clone(),
            no_match_exit_codes: config.no_match_exit_codes.clone(),
        })
    }

    /// Expand `{pattern}` and `{root}` placeholders
    fn command_args(&self, pattern: &str) -> Vec<String> {
        let root = self.fs.root().to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{pattern}", pattern).replace("{root}", &root))
            .collect()
    }

    fn is_acceptable(&self, status: &ExitStatus) -> bool {
        status.success()
            || status
                .code()
                .map(|code| self.no_match_exit_codes.contains(&code))
                .unwrap_or(false)
    }

    /// Run the counting program, killing it if the context is cancelled
    fn run(&self, ctx: &SourceContext, pattern: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(self.command_args(pattern))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::source_failure(&self.name, e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_all(stdout));
        let stderr_reader = thread::spawn(move || read_all(stderr));

        let status = loop {
            if ctx.token.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                debug!(source = %self.name, "killed stale counting process");
                return Err(Error::Cancelled);
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let output = stdout_reader
            .join()
            .map_err(|_| Error::source_failure(&self.name, "stdout reader panicked"))??;
        let errors = stderr_reader.join().ok().and_then(|r| r.ok()).unwrap_or_default();

        if !self.is_acceptable(&status) {
            return Err(Error::source_failure(
                &self.name,
                format!("{} exited with {}: {}", self.program, status, errors.trim()),
            ));
        }
        Ok(output)
    }
}

fn read_all<R: Read>(pipe: Option<R>) -> std::io::Result<String> {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_string(&mut buf)?;
    }
    Ok(buf)
}

/// Parse `path:count` lines; relative paths are resolved against `root`
fn parse_counts(output: &str, root: &Path) -> TermCounts {
    let mut counts = TermCounts::default();
    for line in output.lines() {
        let Some((path, count)) = line.rsplit_once(':') else {
            continue;
        };
        let Ok(count) = count.trim().parse::<u64>() else {
            continue;
        };
        if count == 0 {
            continue;
        }
        let path = PathBuf::from(path);
        let path = if path.is_absolute() { path } else { root.join(path) };
        *counts.entry(FsSource::doc_id(&path)).or_insert(0) += count;
    }
    counts
}

impl PropertyAccessor for CommandSource {
    fn property(&self, id: &DocId, name: &str) -> Option<Property> {
        self.fs.property(id, name)
    }
}

impl DocumentSource for CommandSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_documents(&self, ctx: &SourceContext) -> Result<Vec<DocId>> {
        self.fs.list_documents(ctx)
    }

    fn term_frequency(&self, ctx: &SourceContext, term: &TermPattern) -> Result<TermCounts> {
        let output = self.run(ctx, &term.to_regex())?;
        Ok(parse_counts(&output, self.fs.root()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FsConfig;
    use crate::session::CancelToken;
    use tempfile::TempDir;

    #[test]
    fn test_parse_counts() {
        let root = Path::new("/repo");
        let counts = parse_counts("/repo/a.rs:3\nsrc/b.rs:1\nnot a count\n/repo/c.rs:0\n", root);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&DocId::from("/repo/a.rs")], 3);
        assert_eq!(counts[&DocId::from("/repo/src/b.rs")], 1);
    }

    #[test]
    fn test_missing_program() {
        let dir = TempDir::new().unwrap();
        let fs = FsSource::new(dir.path(), &FsConfig::default()).unwrap();
        let config = CommandConfig {
            program: "  ".to_string(),
            ..CommandConfig::default()
        };
        assert!(matches!(
            CommandSource::new(fs, &config),
            Err(Error::MissingArgument("program"))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_abnormal_exit_is_source_failure() {
        let dir = TempDir::new().unwrap();
        let fs = FsSource::new(dir.path(), &FsConfig::default()).unwrap();
        let config = CommandConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "exit 2".to_string()],
            no_match_exit_codes: vec![1],
        };
        let source = CommandSource::new(fs, &config).unwrap();
        let ctx = SourceContext::new(CancelToken::new());
        let result = source.term_frequency(&ctx, &TermPattern::Literal("x".into()));
        assert!(matches!(result, Err(Error::SourceFailure { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_placeholders_are_expanded() {
        let dir = TempDir::new().unwrap();
        let fs = FsSource::new(dir.path(), &FsConfig::default()).unwrap();
        let root = fs.root().to_path_buf();
        let config = CommandConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo \"$1/hit.txt:4\"".to_string(),
                "sh".to_string(),
                "{root}".to_string(),
            ],
            no_match_exit_codes: vec![1],
        };
        let source = CommandSource::new(fs, &config).unwrap();
        let ctx = SourceContext::new(CancelToken::new());
        let counts = source
            .term_frequency(&ctx, &TermPattern::Literal("x".into()))
            .unwrap();
        assert_eq!(counts[&FsSource::doc_id(&root.join("hit.txt"))], 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_child() {
        let dir = TempDir::new().unwrap();
        let fs = FsSource::new(dir.path(), &FsConfig::default()).unwrap();
        let config = CommandConfig {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
            no_match_exit_codes: vec![],
        };
        let source = CommandSource::new(fs, &config).unwrap();
        let token = CancelToken::new();
        let ctx = SourceContext::new(token.clone());

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        });
        let started = std::time::Instant::now();
        let result = source.term_frequency(&ctx, &TermPattern::Literal("x".into()));
        canceller.join().unwrap();

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
