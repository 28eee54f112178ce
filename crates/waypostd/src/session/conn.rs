//! Connection I/O for an established V1 session.

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use waypost_core::wire::{frame, Command, ProtocolError, MAX_BODY_SIZE, MAX_LINE_LEN};

use super::state::{Response, Session};

/// Drive `session` over `stream` until the peer disconnects, an I/O error
/// occurs, or a command fails. The session is closed on the way out.
pub async fn serve<S>(stream: S, mut session: Session)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let peer = session.remote_addr();
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = match (&mut reader).take(MAX_LINE_LEN as u64).read_until(b'\n', &mut line).await {
            Ok(n) => n,
            Err(e) => {
                tracing::info!(peer = %peer, error = %e, "read failed, closing session");
                break;
            }
        };
        if n == 0 {
            tracing::debug!(peer = %peer, "peer closed connection");
            break;
        }

        let response = if line.ends_with(b"\n") {
            match std::str::from_utf8(&line) {
                Ok(line) => respond(&mut session, line, &mut reader).await,
                Err(_) => Err(ProtocolError::invalid("command line is not valid UTF-8")),
            }
        } else if n >= MAX_LINE_LEN {
            Err(ProtocolError::invalid("command line too long"))
        } else {
            tracing::debug!(peer = %peer, "connection closed mid-line");
            break;
        };

        let (payload, fatal) = match response {
            Ok(payload) => (payload, false),
            Err(err) => {
                tracing::warn!(peer = %peer, error = %err, "protocol error, closing session");
                (err.payload(), true)
            }
        };
        if let Err(e) = writer.write_all(&frame(&payload)).await {
            tracing::info!(peer = %peer, error = %e, "write failed, closing session");
            break;
        }
        if fatal {
            break;
        }
    }

    let _ = writer.shutdown().await;
    session.close();
}

async fn respond<R>(session: &mut Session, line: &str, reader: &mut R) -> Response
where
    R: AsyncBufRead + Unpin,
{
    match session.parse(line)? {
        Command::Identify => {
            session.accept_identify()?;
            let body = read_identify_body(reader).await?;
            session.identify(&body)
        }
        command => {
            tracing::trace!(peer = %session.remote_addr(), command = command.name(), "command");
            session.exec(command)
        }
    }
}

/// Read the 4-byte big-endian length and the JSON body that follow IDENTIFY.
async fn read_identify_body<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = reader
        .read_u32()
        .await
        .map_err(|_| ProtocolError::bad_body("IDENTIFY failed to read body size"))?;
    if len > MAX_BODY_SIZE {
        return Err(ProtocolError::bad_body(format!(
            "IDENTIFY body too big {len} > {MAX_BODY_SIZE}"
        )));
    }

    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| ProtocolError::bad_body("IDENTIFY failed to read body"))?;
    Ok(body)
}
