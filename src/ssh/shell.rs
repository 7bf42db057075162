// ABOUTME: Interactive shell channel exposed as three local byte streams.
// ABOUTME: A pump task moves data between the russh channel and in-memory pipes.

use crate::session::{PipeSetupError, RemoteShell, ShellPipes};
use async_trait::async_trait;
use parking_lot::Mutex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Buffer size of each in-memory pipe.
const PIPE_BUFFER: usize = 64 * 1024;

/// Stream id of stderr in SSH extended data.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Pump-side ends of the three pipes.
struct PumpEnds {
    stdin: DuplexStream,
    stdout: DuplexStream,
    stderr: DuplexStream,
}

pub(crate) struct SshShell {
    channel: Mutex<Option<Channel<Msg>>>,
    ends: Option<PumpEnds>,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SshShell {
    pub(crate) fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel: Mutex::new(Some(channel)),
            ends: None,
            cancel: CancellationToken::new(),
            pump: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    fn pipes(&mut self) -> Result<ShellPipes, PipeSetupError> {
        if self.ends.is_some() || self.channel.get_mut().is_none() {
            return Err(PipeSetupError::Pipe {
                stream: "stdin",
                reason: "pipes were already taken".to_string(),
            });
        }

        let (stdin_local, stdin_pump) = tokio::io::duplex(PIPE_BUFFER);
        let (stdout_local, stdout_pump) = tokio::io::duplex(PIPE_BUFFER);
        let (stderr_local, stderr_pump) = tokio::io::duplex(PIPE_BUFFER);

        self.ends = Some(PumpEnds {
            stdin: stdin_pump,
            stdout: stdout_pump,
            stderr: stderr_pump,
        });

        Ok(ShellPipes {
            stdin: Box::new(stdin_local),
            stdout: Box::new(stdout_local),
            stderr: Box::new(stderr_local),
        })
    }

    async fn request_shell(&mut self) -> Result<(), PipeSetupError> {
        let ends = self
            .ends
            .take()
            .ok_or_else(|| PipeSetupError::Shell("pipes must be taken first".to_string()))?;
        let mut channel = self
            .channel
            .get_mut()
            .take()
            .ok_or_else(|| PipeSetupError::Shell("shell already started".to_string()))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| PipeSetupError::Shell(e.to_string()))?;

        let handle = tokio::spawn(pump(channel, ends, self.cancel.clone()));
        *self.pump.lock() = Some(handle);
        Ok(())
    }

    async fn close(&self) -> std::io::Result<()> {
        self.cancel.cancel();
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            tokio::select! {
                result = pump => {
                    if let Err(e) = result {
                        return Err(std::io::Error::other(e));
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(2)) => {
                    return Err(std::io::Error::other("shell channel did not close in time"));
                }
            }
        }
        // Never started: dropping the channel releases it.
        self.channel.lock().take();
        Ok(())
    }
}

/// Move bytes between the channel and the pipes until either side ends.
///
/// Dropping the stdout and stderr ends on return is what tells the relay
/// readers the remote side is gone.
async fn pump(mut channel: Channel<Msg>, ends: PumpEnds, cancel: CancellationToken) {
    let PumpEnds {
        mut stdin,
        mut stdout,
        mut stderr,
    } = ends;
    let mut stdin_open = true;
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            r = stdin.read(&mut buf), if stdin_open => {
                match r {
                    Ok(0) => {
                        stdin_open = false;
                        let _ = channel.eof().await;
                    }
                    Ok(n) => {
                        if let Err(e) = channel.data(&buf[..n]).await {
                            tracing::debug!("Channel data error: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("Local input read error: {}", e);
                        break;
                    }
                }
            }

            msg = channel.wait() => {
                match msg {
                    Some(ChannelMsg::Data { ref data }) => {
                        if let Err(e) = stdout.write_all(data).await {
                            tracing::debug!("stdout pipe write error: {}", e);
                            break;
                        }
                    }
                    Some(ChannelMsg::ExtendedData { ref data, ext }) => {
                        if ext == SSH_EXTENDED_DATA_STDERR
                            && let Err(e) = stderr.write_all(data).await
                        {
                            tracing::debug!("stderr pipe write error: {}", e);
                        }
                    }
                    Some(ChannelMsg::Failure) => {
                        tracing::warn!("remote refused the shell request");
                        break;
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        tracing::debug!(exit_status, "remote shell exited");
                    }
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                }
            }
        }
    }

    if let Err(e) = channel.close().await {
        tracing::debug!("Channel close error: {}", e);
    }
}
