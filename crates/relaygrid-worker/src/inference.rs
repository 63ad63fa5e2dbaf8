//! Inference function interface and the external-command implementation.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, trace};

use relay_core::{BoxFuture, NO_FACE_VALUE};

/// Turns a local input file into an outcome value (a label, or the
/// `No-Face` sentinel).
pub trait Inference: Send + Sync {
    fn infer<'a>(&'a self, input: &'a Path) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Runs an external program with the input path appended as its last
/// argument and reads the value from the first non-empty line of stdout.
///
/// Empty output means no face was found. A non-zero exit is an error.
#[derive(Debug, Clone)]
pub struct CommandInference {
    program: String,
    args: Vec<String>,
}

impl CommandInference {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build from `[program, args...]` as written in `worker.inference_command`.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone()).with_args(args.iter().cloned()))
    }
}

impl Inference for CommandInference {
    fn infer<'a>(&'a self, input: &'a Path) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            trace!(program = %self.program, ?input, "spawn inference");
            let output = Command::new(&self.program)
                .args(&self.args)
                .arg(input)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| anyhow::anyhow!("spawn {}: {e}", self.program))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                );
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let value = stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or(NO_FACE_VALUE)
                .to_string();
            debug!(?input, %value, "inference finished");
            Ok(value)
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandInference {
        // `sh -c script name path`: the input path arrives as $1.
        CommandInference::new("sh").with_args(["-c", script, "inference"])
    }

    #[tokio::test]
    async fn first_stdout_line_is_the_value() {
        let value = shell("echo; echo '  Paul  '; echo ignored")
            .infer(Path::new("/tmp/a.jpg"))
            .await
            .unwrap();
        assert_eq!(value, "Paul");
    }

    #[tokio::test]
    async fn input_path_is_passed_last() {
        let value = shell("basename \"$1\"")
            .infer(Path::new("/tmp/scratch/a.jpg"))
            .await
            .unwrap();
        assert_eq!(value, "a.jpg");
    }

    #[tokio::test]
    async fn empty_output_means_no_face() {
        let value = shell("true").infer(Path::new("/tmp/a.jpg")).await.unwrap();
        assert_eq!(value, NO_FACE_VALUE);
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let err = shell("echo boom >&2; exit 3")
            .infer(Path::new("/tmp/a.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn from_command_line_splits_program() {
        let cmd = vec!["face-match".to_string(), "--weights".into(), "data.pt".into()];
        let inference = CommandInference::from_command_line(&cmd).unwrap();
        assert_eq!(inference.program, "face-match");
        assert_eq!(inference.args, vec!["--weights", "data.pt"]);
        assert!(CommandInference::from_command_line(&[]).is_none());
    }
}
