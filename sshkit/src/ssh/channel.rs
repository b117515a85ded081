use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::error::{SshError, SshResult};

/// Read every text line from `channel` until it reports end of stream.
///
/// Lines are joined with `\n` and trailing whitespace is trimmed. Invalid
/// UTF-8 is replaced rather than rejected. The channel itself is left open;
/// closing it stays with the caller.
pub async fn drain_channel_output<R>(channel: &mut R) -> SshResult<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(channel);
    let mut lines = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| SshError::Exec(format!("Failed to read channel output: {e}")))?;
        if n == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        lines.push(line.trim_end_matches(['\n', '\r']).to_string());
    }

    tracing::debug!(lines = lines.len(), "Drained channel output");

    Ok(lines.join("\n").trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn joins_lines_and_trims_trailing_whitespace() {
        let mut input: &[u8] = b"first\r\nsecond\nthird  \n\n";
        let output = drain_channel_output(&mut input).await.unwrap();
        assert_eq!(output, "first\nsecond\nthird");
    }

    #[tokio::test]
    async fn empty_stream_yields_empty_string() {
        let mut input: &[u8] = b"";
        assert_eq!(drain_channel_output(&mut input).await.unwrap(), "");
    }

    #[tokio::test]
    async fn keeps_leading_whitespace() {
        let mut input: &[u8] = b"  indented\nlast line without newline";
        let output = drain_channel_output(&mut input).await.unwrap();
        assert_eq!(output, "  indented\nlast line without newline");
    }

    #[tokio::test]
    async fn reads_until_writer_hangs_up() {
        let (mut reader, mut writer) = tokio::io::duplex(64);

        let producer = tokio::spawn(async move {
            for line in ["Welcome", "uptime: 3 days", "load: 0.01"] {
                writer.write_all(line.as_bytes()).await.unwrap();
                writer.write_all(b"\n").await.unwrap();
            }
        });

        let output = drain_channel_output(&mut reader).await.unwrap();
        producer.await.unwrap();
        assert_eq!(output, "Welcome\nuptime: 3 days\nload: 0.01");
    }

    #[tokio::test]
    async fn replaces_invalid_utf8() {
        let mut input: &[u8] = b"ok\n\xff\xfe\n";
        let output = drain_channel_output(&mut input).await.unwrap();
        assert!(output.starts_with("ok\n"));
        assert!(output.contains('\u{fffd}'));
    }
}
