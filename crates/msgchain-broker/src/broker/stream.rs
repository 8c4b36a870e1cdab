//! Line-oriented I/O between the broker and its peers.
//!
//! [`read_inbound`] decodes one message per line and submits it to the
//! broker; [`write_outbound`] encodes and writes outbound messages as they
//! are produced.

use crate::broker::{
    error::{BrokerError, Result},
    message::{Outbound, decode_inbound, encode_outbound},
    pool::manager::Broker,
};
use msgchain::TimeSource;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

/// Reads inbound lines until end of input. Blank lines are skipped and lines
/// that do not decode (invalid UTF-8 included) are logged and skipped.
/// Returns how many messages were submitted.
///
/// # Errors
///
/// Returns an error if reading fails or the broker refuses a message.
pub async fn read_inbound<R, T>(mut reader: R, broker: &Broker<T>) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    T: TimeSource + Send + Sync + 'static,
{
    let mut line = Vec::new();
    let mut submitted = 0;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        if line.trim_ascii().is_empty() {
            continue;
        }

        match decode_inbound(line.trim_ascii()) {
            Ok(message) => {
                broker.submit(message).await?;
                submitted += 1;
            }
            Err(e) => {
                tracing::warn!("Skipping inbound line: {e}");
            }
        }
    }

    tracing::debug!("Inbound stream closed after {submitted} messages");
    Ok(submitted)
}

/// Writes outbound messages until every sender is dropped. Returns how many
/// messages were written.
///
/// # Errors
///
/// Returns an error if a message cannot be encoded or the write fails.
pub async fn write_outbound<W>(mut writer: W, mut rx: mpsc::Receiver<Outbound>) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;

    while let Some(message) = rx.recv().await {
        let line = encode_outbound(&message)?;
        let flushed = async {
            writer.write_all(&line).await?;
            writer.flush().await
        };
        if let Err(e) = flushed.await {
            return Err(BrokerError::ChannelError {
                context: format!("Outbound write failed: {e}"),
            });
        }
        written += 1;
    }

    Ok(written)
}
