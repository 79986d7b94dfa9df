use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::GuardError;
use crate::host::SafeHost;

/// Fixed invocation of the network diagnostic (ping by default).
#[derive(Debug, Clone)]
pub struct DiagnosticCommand {
    pub program: String,
    pub count: u32,
    pub timeout: Duration,
    /// Cap on captured bytes, applied to stdout and stderr separately.
    pub max_output_bytes: usize,
}

impl Default for DiagnosticCommand {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
            count: 4,
            timeout: Duration::from_secs(10),
            max_output_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticOutput {
    pub exit_code: Option<i32>,
    pub output: String,
}

impl DiagnosticCommand {
    /// Build the argument vector. The host is always exactly one element.
    pub fn build_args(&self, host: &SafeHost) -> Vec<String> {
        vec![
            "-c".to_string(),
            self.count.to_string(),
            host.as_str().to_string(),
        ]
    }

    /// Run the diagnostic against a validated host. No shell is involved.
    pub async fn run(&self, host: &SafeHost) -> Result<DiagnosticOutput, GuardError> {
        let args = self.build_args(host);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GuardError::internal(anyhow::anyhow!(
                    "failed to spawn {}: {e}",
                    self.program
                ))
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.max_output_bytes;

        let result = tokio::time::timeout(self.timeout, async {
            let (out, err) = tokio::join!(read_bounded(stdout, limit), read_bounded(stderr, limit));
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out?, err?))
        })
        .await;

        match result {
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    tracing::warn!(error = %e, "failed to kill timed out diagnostic");
                }
                // Reap so the child does not linger as a zombie.
                let _ = child.wait().await;
                tracing::warn!(
                    host = %host,
                    timeout_secs = self.timeout.as_secs(),
                    "diagnostic timed out"
                );
                Err(GuardError::UpstreamTimeout)
            }
            Ok(Err(e)) => Err(GuardError::internal(anyhow::anyhow!(
                "diagnostic I/O failed: {e}"
            ))),
            Ok(Ok((status, out, err))) => {
                let mut output = String::from_utf8_lossy(&out).into_owned();
                output.push_str(&String::from_utf8_lossy(&err));
                tracing::info!(
                    host = %host,
                    kind = ?host.kind(),
                    exit_code = ?status.code(),
                    "diagnostic finished"
                );
                Ok(DiagnosticOutput {
                    exit_code: status.code(),
                    output,
                })
            }
        }
    }
}

/// Read up to `limit` bytes, then drain and discard the rest so the child
/// never stalls on a full pipe.
async fn read_bounded<R>(reader: Option<R>, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let Some(reader) = reader else {
        return Ok(buf);
    };

    let mut head = reader.take(limit as u64);
    head.read_to_end(&mut buf).await?;
    let mut rest = head.into_inner();
    tokio::io::copy(&mut rest, &mut tokio::io::sink()).await?;
    Ok(buf)
}
