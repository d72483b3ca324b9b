//! Subprocess helpers shared by the tool wrappers.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};

use serde::Serialize;
use vidsync_common::config::ToolPaths;
use vidsync_common::error::{VidsyncError, VidsyncResult};

/// Stdout lines kept for error reports when streaming.
const STDOUT_TAIL_LINES: usize = 200;

/// Whether `binary` resolves to an executable.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Availability of one external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub name: &'static str,
    pub binary: String,
    pub available: bool,
}

/// Check every external tool the pipeline can call.
pub fn check_tools(tools: &ToolPaths) -> Vec<ToolStatus> {
    [
        ("ffmpeg", &tools.ffmpeg),
        ("ffprobe", &tools.ffprobe),
        ("tesseract", &tools.tesseract),
        ("docker", &tools.docker),
    ]
    .into_iter()
    .map(|(name, binary)| ToolStatus {
        name,
        binary: binary.clone(),
        available: command_exists(binary),
    })
    .collect()
}

/// Output of a finished process.
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
}

pub(crate) fn spawn_error(tool: &str, err: std::io::Error) -> VidsyncError {
    VidsyncError::external_tool(tool, "not started", String::new(), err.to_string())
}

/// Run to completion, capturing both streams.
///
/// A non-zero exit is an [`VidsyncError::ExternalTool`] carrying both
/// streams verbatim.
pub fn run_captured(cmd: &mut Command, tool: &str) -> VidsyncResult<Captured> {
    tracing::debug!(tool, command = ?cmd, "Running external tool");
    let output = cmd.output().map_err(|e| spawn_error(tool, e))?;
    let captured = Captured {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    if !output.status.success() {
        return Err(VidsyncError::external_tool(
            tool,
            output.status,
            captured.stdout,
            captured.stderr,
        ));
    }
    Ok(captured)
}

/// Call `on_line` for every line of `reader`, decoding bytes lossily.
///
/// Trailing `\n` and `\r` are stripped. Only an I/O error stops the loop.
fn for_each_line(reader: impl Read, mut on_line: impl FnMut(String)) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        on_line(String::from_utf8_lossy(&buf).into_owned());
    }
}

/// Kill and reap a child whose output can no longer be consumed.
fn stop_child(child: &mut Child, tool: &str) {
    if let Err(err) = child.kill() {
        tracing::debug!(tool, error = %err, "Kill failed, process already exited");
    }
    if let Err(err) = child.wait() {
        tracing::warn!(tool, error = %err, "Failed to reap process");
    }
}

/// Run to completion, logging stdout line by line as it arrives.
///
/// Stderr is drained on a separate thread so the child never blocks on a
/// full pipe. A progress line is logged every `progress_every` stdout
/// lines. Only the last stdout lines are kept for the error report.
/// Output that is not valid UTF-8 is logged lossily; success depends on
/// the exit status alone. If reading fails, the child is killed and reaped
/// before the error is returned.
pub fn run_streamed(cmd: &mut Command, tool: &str, progress_every: usize) -> VidsyncResult<usize> {
    tracing::debug!(tool, command = ?cmd, "Running external tool");
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(tool, e))?;
    tracing::info!(tool, pid = child.id(), "Process started");

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        stop_child(&mut child, tool);
        return Err(VidsyncError::pipeline(format!(
            "failed to capture {tool} output"
        )));
    };

    let stderr_tool = tool.to_string();
    let stderr_task = std::thread::spawn(move || -> String {
        let mut collected = String::new();
        let drained = for_each_line(stderr, |line| {
            tracing::info!(tool = %stderr_tool, "{line}");
            collected.push_str(&line);
            collected.push('\n');
        });
        if let Err(err) = drained {
            collected.push_str(&format!("<failed to read {stderr_tool} stderr: {err}>"));
        }
        collected
    });
    let join_stderr = |task: std::thread::JoinHandle<String>| {
        task.join()
            .unwrap_or_else(|_| format!("<failed to join {tool} stderr reader>"))
    };

    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDOUT_TAIL_LINES);
    let mut count = 0usize;
    let drained = for_each_line(stdout, |line| {
        count += 1;
        tracing::info!(tool, "{line}");
        if progress_every > 0 && count % progress_every == 0 {
            tracing::info!(tool, lines = count, "Output lines processed");
        }
        if tail.len() == STDOUT_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    });
    if let Err(err) = drained {
        stop_child(&mut child, tool);
        let stderr_output = join_stderr(stderr_task);
        tracing::debug!(tool, stderr = %stderr_output, "Stderr before read failure");
        return Err(VidsyncError::pipeline(format!(
            "failed reading {tool} output: {err}"
        )));
    }

    let status = match child.wait() {
        Ok(status) => status,
        Err(err) => {
            stop_child(&mut child, tool);
            join_stderr(stderr_task);
            return Err(VidsyncError::pipeline(format!(
                "failed to wait on {tool}: {err}"
            )));
        }
    };
    let stderr_output = join_stderr(stderr_task);

    if !status.success() {
        let stdout_tail = tail.into_iter().collect::<Vec<_>>().join("\n");
        return Err(VidsyncError::external_tool(
            tool,
            status,
            stdout_tail,
            stderr_output,
        ));
    }
    Ok(count)
}

/// Read until `buf` is full or the stream ends; returns bytes read.
pub(crate) fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
