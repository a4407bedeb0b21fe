//! Exécution des outils GDAL en sous-processus
//!
//! Le processus est tué si le délai expire (`kill_on_drop` sur le futur abandonné).

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} not found on PATH")]
    NotFound(String),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Sorties décodées d'un outil terminé avec succès
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Lance `program args...` avec un délai maximal ; un code de sortie non nul est une erreur
pub async fn run_tool<I, S>(
    program: &str,
    args: I,
    envs: &[(&str, &str)],
    timeout: Duration,
) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        command.env(key, value);
    }

    let child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ToolError::NotFound(program.to_string()),
        _ => ToolError::Spawn {
            program: program.to_string(),
            source: e,
        },
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ToolError::Spawn {
            program: program.to_string(),
            source: e,
        })?,
        Err(_) => {
            return Err(ToolError::Timeout {
                program: program.to_string(),
                timeout,
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status,
            stderr,
        });
    }

    debug!(program, stdout_len = stdout.len(), "Tool finished");
    Ok(ToolOutput { stdout, stderr })
}

/// `program --version` : première ligne de la sortie
pub async fn tool_version(program: &str, timeout: Duration) -> Result<String, ToolError> {
    let output = run_tool(program, ["--version"], &[], timeout).await?;
    Ok(output.stdout.lines().next().unwrap_or_default().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program() {
        let err = tool_version("landplots-no-such-tool", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills() {
        let err = run_tool("sleep", ["5"], &[], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit() {
        let err = run_tool("sh", ["-c", "echo boom >&2; exit 3"], &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            ToolError::Failed { stderr, status, .. } => {
                assert_eq!(stderr, "boom");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_is_passed() {
        let out = run_tool("sh", ["-c", "printf %s \"$LANDPLOTS_PROBE\""], &[("LANDPLOTS_PROBE", "ok")], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout, "ok");
    }
}
