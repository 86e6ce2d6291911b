// SPDX-License-Identifier: MPL-2.0

//! Running version control commands with a time limit.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use wait_timeout::ChildExt;

use super::{CancelToken, SourceError};

/// How often a running command checks for cancellation.
const POLL: Duration = Duration::from_millis(100);

/// Output of a successful command.
#[derive(Debug)]
pub(crate) struct Output {
    pub stdout: String,
}

/// Run a command to completion and capture its output.
///
/// The child is killed when it runs longer than `timeout`
/// or when `cancel` is triggered.
pub(crate) fn run(
    program: &str,
    args: &[&str],
    dir: Option<&Path>,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<Output, SourceError> {
    let line = format!("{} {}", program, args.join(" "));
    if cancel.is_cancelled() {
        return Err(SourceError::Cancelled);
    }
    debug!("running `{}`", line);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let mut child = cmd.spawn().map_err(|source| SourceError::Io {
        context: format!("unable to spawn `{}`", line),
        source,
    })?;

    // Drain the pipes while waiting so a chatty child never blocks on a full buffer.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        let wait_err = |source| SourceError::Io {
            context: format!("waiting for `{}`", line),
            source,
        };
        if let Some(status) = child.wait_timeout(POLL).map_err(wait_err)? {
            break status;
        }
        if cancel.is_cancelled() || Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            return Err(SourceError::Timeout {
                command: line,
                timeout,
            });
        }
    };

    let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
    let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
    if !status.success() {
        return Err(SourceError::Command {
            command: line,
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(Output { stdout })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let out = run("echo", &["hello"], None, Duration::from_secs(5), &CancelToken::new()).unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn failure_is_reported() {
        let err = run("false", &[], None, Duration::from_secs(5), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, SourceError::Command { .. }));
    }

    #[test]
    fn timeout_kills_the_child() {
        let err = run("sleep", &["5"], None, Duration::from_millis(200), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout { .. }));
    }

    #[test]
    fn cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run("echo", &["x"], None, Duration::from_secs(5), &cancel).unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));
    }
}
