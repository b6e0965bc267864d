//! Running external version-control clients.
//!
//! Every adapter primitive that talks to a history tool funnels through
//! [`invoke`]: one blocking subprocess per call, stdout/stderr captured,
//! no timeout and no retry. A hung client hangs the caller.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::{Error, Result};

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct Output {
    /// Exit status, or -1 when the process died without one.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args` in `cwd`, feeding `stdin` to the child if given.
///
/// Exit statuses listed in `expect` are handed back to the caller for
/// inspection; any other status becomes [`Error::CommandFailed`] carrying
/// the invoked arguments and both captured streams.
pub fn invoke(
    program: &str,
    args: &[&str],
    cwd: &Path,
    stdin: Option<&[u8]>,
    expect: &[i32],
) -> Result<Output> {
    debug!("{}$ {} {}", cwd.display(), program, args.join(" "));

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| Error::CommandFailed {
        command: render(program, args),
        status: -1,
        stdout: String::new(),
        stderr: e.to_string(),
    })?;

    if let Some(bytes) = stdin {
        // Take the handle so the pipe closes before we wait.
        let mut handle = child
            .stdin
            .take()
            .ok_or_else(|| Error::Other("child stdin unavailable".to_string()))?;
        handle.write_all(bytes)?;
    }

    let out = child.wait_with_output()?;
    let status = out.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
    debug!("{}\n{}{}", status, stdout, stderr);

    if !expect.contains(&status) {
        return Err(Error::CommandFailed {
            command: render(program, args),
            status,
            stdout,
            stderr,
        });
    }
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

fn render(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| a.to_string()));
    parts.join(" ")
}
