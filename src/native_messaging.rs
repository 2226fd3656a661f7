
use std::io::{ErrorKind, Read, Write};

use anyhow::{bail, Context};
use serde::Serialize;

use sentence_embeddings::config;

use crate::protocol::Request;

pub fn read_message(stdin: &mut dyn Read) -> anyhow::Result<Option<Request>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match stdin.read(&mut len_buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("failed reading native message length"),
        }
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled < 4 {
        bail!("incomplete length prefix (expected 4 bytes, got {filled})");
    }

    // Native messaging uses 32-bit little-endian length.
    let msg_len = u32::from_le_bytes(len_buf);
    if msg_len > config::native_messaging::MAX_MESSAGE_SIZE_BYTES {
        bail!("message too large: {msg_len} bytes");
    }

    let mut payload = vec![0u8; msg_len as usize];
    stdin
        .read_exact(&mut payload)
        .with_context(|| format!("failed reading native message payload ({msg_len} bytes)"))?;

    let req: Request = serde_json::from_slice(&payload).context("invalid JSON request")?;
    Ok(Some(req))
}

pub fn write_message<T: Serialize>(stdout: &mut dyn Write, v: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(v).context("failed serializing JSON response")?;
    let len: u32 = bytes
        .len()
        .try_into()
        .context("response too large for u32 length")?;
    stdout.write_all(&len.to_le_bytes())?;
    stdout.write_all(&bytes)?;
    stdout.flush().context("failed flushing stdout")?;
    Ok(())
}
