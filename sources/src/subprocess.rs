//! External CLIs (`op`, `keeper`) are opaque providers invoked with
//! `--format json`; stdout must parse as JSON, anything else is a source
//! failure carrying the captured stderr.

use crate::error::{SourceError, SourceResult};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub async fn run_json(
    program: &str,
    args: &[String],
    envs: &[(String, String)]
) -> SourceResult<serde_json::Value> {
    debug!(program, ?args, "Invoking CLI");

    let output = Command::new(program)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| SourceError::Spawn {
            program: program.to_string(),
            source
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(SourceError::Subprocess {
            program: program.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr
        });
    }

    serde_json::from_slice(&output.stdout).map_err(|e| SourceError::Json {
        program: program.to_string(),
        message: e.to_string(),
        stderr
    })
}
