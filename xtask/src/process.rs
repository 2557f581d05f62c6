use anyhow::{Context, Result};
use async_process::{Command, ExitStatus, Stdio};
use futures::io::BufReader;
use futures::{stream, AsyncBufReadExt, StreamExt};

/// Run a command, handing each stdout/stderr line to `on_line` as it arrives
pub async fn run_streaming<F>(program: &str, args: &[&str], mut on_line: F) -> Result<ExitStatus>
where
    F: FnMut(&str),
{
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {} {}", program, args.join(" ")))?;

    let stdout = child.stdout.take().context("stdout not captured")?;
    let stderr = child.stderr.take().context("stderr not captured")?;
    let mut lines = stream::select(
        BufReader::new(stdout).lines(),
        BufReader::new(stderr).lines(),
    );

    while let Some(line) = lines.next().await {
        on_line(&line?);
    }

    Ok(child.status().await?)
}

/// Run a command, echoing its output, and report whether it succeeded
pub async fn run_echoed(program: &str, args: &[&str]) -> Result<bool> {
    let status = run_streaming(program, args, |line| println!("{}", line)).await?;
    Ok(status.success())
}

/// Run a command quietly and report whether it succeeded
pub async fn succeeds(program: &str, args: &[&str]) -> bool {
    run_streaming(program, args, |_| {})
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
