//! Line-oriented admin console.
//!
//! Each line is handed to [`AdminConsole::execute_line`]. Results go to the
//! output stream, errors to the error stream followed by the usage line when
//! the syntax was wrong. [`run`] serves stdin; [`serve`] takes any streams.

use std::io;
use std::sync::Arc;

use audiolink_core::protocol::command::SET_TARGET_USAGE;
use audiolink_core::CommandError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::application::commands::AdminConsole;

/// Reads commands from stdin until it closes.
pub async fn run(console: Arc<AdminConsole>) {
    let input = BufReader::new(tokio::io::stdin());
    match serve(&console, input, tokio::io::stdout(), tokio::io::stderr()).await {
        Ok(()) => debug!("stdin closed, console stopped"),
        Err(e) => warn!("console stopped: {e}"),
    }
}

/// Executes every line of `input` until end of stream.
///
/// # Errors
///
/// Returns the first read or write error.
pub async fn serve<R, W, E>(
    console: &AdminConsole,
    input: R,
    mut out: W,
    mut err: E,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match console.execute_line(&line) {
            Ok(text) => {
                out.write_all(format!("{text}\n").as_bytes()).await?;
                out.flush().await?;
            }
            Err(e) => {
                let mut text = format!("{e}\n");
                if shows_usage(&e) {
                    text.push_str(SET_TARGET_USAGE);
                    text.push('\n');
                }
                err.write_all(text.as_bytes()).await?;
                err.flush().await?;
            }
        }
    }
    Ok(())
}

fn shows_usage(e: &CommandError) -> bool {
    matches!(
        e,
        CommandError::Usage
            | CommandError::InvalidFormat(_)
            | CommandError::InvalidAddress(_)
            | CommandError::InvalidPort(_)
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
