// ABOUTME: Sources of local input lines for the console.
// ABOUTME: Terminal input is read on its own thread so a pending read never blocks shutdown.

use async_trait::async_trait;
use std::io::{self, BufRead};
use tokio::io::{AsyncBufRead, Lines};
use tokio::sync::mpsc;

/// Where the console reads local lines from.
#[async_trait]
pub trait LineSource: Send {
    /// Next line without its terminator, `None` when input has ended.
    async fn next_line(&mut self) -> io::Result<Option<String>>;
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineSource for Lines<R> {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        Lines::next_line(self).await
    }
}

/// Lines read by a detached thread doing blocking reads.
///
/// `tokio::io::stdin` parks an uncancellable read on the blocking pool, and
/// runtime shutdown waits for it until the user presses enter. A plain thread
/// is simply abandoned when the process exits.
pub struct BlockingLines {
    rx: mpsc::Receiver<io::Result<String>>,
}

impl BlockingLines {
    /// Read the process's standard input.
    pub fn stdin() -> io::Result<Self> {
        Self::spawn(io::BufReader::new(io::stdin()))
    }

    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> io::Result<Self> {
        // One line of read-ahead at most.
        let (tx, rx) = mpsc::channel(1);
        std::thread::Builder::new()
            .name("beach-input".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    let failed = line.is_err();
                    if tx.blocking_send(line).is_err() || failed {
                        break;
                    }
                }
                tracing::debug!("local input reader finished");
            })?;
        Ok(Self { rx })
    }
}

#[async_trait]
impl LineSource for BlockingLines {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.rx.recv().await.transpose()
    }
}
