use std::io::{self, BufRead, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{MAX_DAP_HEADER_LINE_BYTES, MAX_DAP_MESSAGE_BYTES};

/// Strips user-controlled values out of a `serde_json` error message.
///
/// Quoted scalars become `"<redacted>"` and the first backticked name (an unknown field or
/// variant) becomes `` `<redacted>` ``; the rest of the message, including the list of expected
/// names, is kept.
pub fn sanitize_json_error_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut in_quote = false;
    for ch in message.chars() {
        match (ch, in_quote) {
            ('"', false) => {
                out.push('"');
                in_quote = true;
            }
            ('"', true) => {
                out.push_str("<redacted>\"");
                in_quote = false;
            }
            (_, true) => {}
            (ch, false) => out.push(ch),
        }
    }

    if let Some(open) = out.find('`') {
        if let Some(len) = out[open + 1..].find('`') {
            out.replace_range(open + 1..open + 1 + len, "<redacted>");
        }
    }
    out
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Reads one `\n`-terminated header line without ever buffering more than `limit` bytes.
///
/// Returns `None` on EOF before any byte of the line.
fn read_header_line<R: BufRead>(reader: &mut R, limit: usize) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            if line.is_empty() {
                return Ok(None);
            }
            break;
        }
        let (take, done) = match chunk.iter().position(|&b| b == b'\n') {
            Some(idx) => (idx + 1, true),
            None => (chunk.len(), false),
        };
        if line.len() + take > limit {
            return Err(invalid_data(format!(
                "DAP header line exceeds maximum size ({limit} bytes)"
            )));
        }
        line.extend_from_slice(&chunk[..take]);
        reader.consume(take);
        if done {
            break;
        }
    }
    String::from_utf8(line)
        .map(Some)
        .map_err(|_| invalid_data("DAP header line is not UTF-8"))
}

/// Reads the body of the next framed message.
///
/// ```text
/// Content-Length: 57\r\n
/// \r\n
/// {"seq":1,"type":"request","command":"initialize"}
/// ```
///
/// A clean EOF between messages yields `Ok(None)`; EOF inside the header block is
/// `UnexpectedEof`.
pub fn read_raw_message<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut content_length = None;
    let mut started = false;
    loop {
        let Some(line) = read_header_line(reader, MAX_DAP_HEADER_LINE_BYTES)? else {
            if started {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "EOF while reading DAP headers",
                ));
            }
            return Ok(None);
        };
        started = true;

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("Content-Length") {
            let value = value.trim();
            let length = value
                .parse::<usize>()
                .map_err(|err| invalid_data(format!("invalid Content-Length {value:?}: {err}")))?;
            content_length = Some(length);
        }
    }

    let length = content_length.ok_or_else(|| invalid_data("DAP message missing Content-Length header"))?;
    if length > MAX_DAP_MESSAGE_BYTES {
        return Err(invalid_data(format!(
            "DAP message Content-Length {length} exceeds maximum allowed size {MAX_DAP_MESSAGE_BYTES}"
        )));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

pub fn read_json_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> io::Result<Option<T>> {
    let Some(body) = read_raw_message(reader)? else {
        return Ok(None);
    };
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|err| invalid_data(sanitize_json_error_message(&err.to_string())))
}

pub fn write_raw_message<W: Write>(writer: &mut W, body: &[u8]) -> io::Result<()> {
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(body)?;
    writer.flush()
}

pub fn write_json_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let body = serde_json::to_vec(message)
        .map_err(|err| invalid_data(sanitize_json_error_message(&err.to_string())))?;
    write_raw_message(writer, &body)
}
