//! Netstring codec: `<len>:<len bytes>,`.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::FramingError;

/// Longest accepted length prefix. Anything longer cannot fit a `usize` anyway.
const MAX_LENGTH_DIGITS: usize = 20;

/// Encode `payload` as a netstring.
pub fn format_netstring(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + MAX_LENGTH_DIGITS + 2);
    write_netstring(&mut out, payload);
    out
}

/// Append the netstring encoding of `payload` to `out`.
pub fn write_netstring(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(payload);
    out.push(b',');
}

/// Parse the `<len>:` prefix at the start of `input`.
///
/// Returns the declared payload length and the offset at which the payload
/// starts. The payload itself is not inspected.
pub fn parse_prefix(input: &[u8]) -> Result<(usize, usize), FramingError> {
    let colon = input
        .iter()
        .take(MAX_LENGTH_DIGITS + 1)
        .position(|&b| b == b':');

    let colon = match colon {
        Some(pos) => pos,
        None if input.iter().take(MAX_LENGTH_DIGITS).all(u8::is_ascii_digit) && input.len() <= MAX_LENGTH_DIGITS => {
            return Err(FramingError::MissingColon)
        }
        None => return Err(FramingError::InvalidLength),
    };

    let digits = &input[..colon];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(FramingError::InvalidLength);
    }

    // ASCII digits only, so the UTF-8 conversion cannot fail.
    let len = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(FramingError::InvalidLength)?;

    Ok((len, colon + 1))
}

/// Parse one complete netstring from the start of `input`.
///
/// Returns the payload and the bytes following the terminating `,`.
pub fn parse_netstring(input: &[u8]) -> Result<(&[u8], &[u8]), FramingError> {
    let (len, start) = parse_prefix(input)?;
    let end = checked_payload_end(input, start, len)?;
    Ok((&input[start..end], &input[end + 1..]))
}

/// Validate that `input[start..start + len]` exists and is followed by `,`.
///
/// Returns the exclusive end offset of the payload.
pub(crate) fn checked_payload_end(input: &[u8], start: usize, len: usize) -> Result<usize, FramingError> {
    let available = input.len().saturating_sub(start);
    let end = start.checked_add(len).ok_or(FramingError::InvalidLength)?;
    if end > input.len() {
        return Err(FramingError::Truncated { expected: len, available });
    }
    match input.get(end) {
        Some(b',') => Ok(end),
        Some(_) => Err(FramingError::MissingTerminator),
        None => Err(FramingError::Truncated { expected: len + 1, available }),
    }
}

/// Read one netstring from an async stream.
///
/// Returns `Ok(None)` on a clean end of stream before the first length digit.
/// Payloads longer than `max_len` are rejected with `InvalidData` so a hostile
/// peer cannot force an unbounded allocation.
pub async fn read_netstring<R>(reader: &mut R, max_len: usize) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut digits = Vec::with_capacity(MAX_LENGTH_DIGITS);
    loop {
        let mut byte = [0u8; 1];
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            if digits.is_empty() {
                return Ok(None);
            }
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        match byte[0] {
            b':' => break,
            b if b.is_ascii_digit() && digits.len() < MAX_LENGTH_DIGITS => digits.push(b),
            _ => return Err(invalid_data("bad netstring length prefix")),
        }
    }

    digits.push(b':');
    let (len, _) = parse_prefix(&digits).map_err(|e| invalid_data(&e.to_string()))?;
    if len > max_len {
        return Err(invalid_data("netstring exceeds maximum frame size"));
    }

    let mut payload = vec![0u8; len + 1];
    reader.read_exact(&mut payload).await?;
    if payload.pop() != Some(b',') {
        return Err(invalid_data("netstring is not terminated by ','"));
    }
    Ok(Some(payload))
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
