//! Server-sent events decoding for streaming providers.
//!
//! Buffers raw bytes, splits on blank lines, and yields the joined `data:`
//! payload of each frame. Frames are decoded as UTF-8 only once complete, so a
//! multi-byte character split across network chunks is never mangled.

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::providers::ProviderError;

const DONE_SIGNAL: &str = "[DONE]";

pub fn data_stream<S>(input: S) -> BoxStream<'static, Result<String, ProviderError>>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let input = input.boxed();

    stream::unfold(
        (input, Vec::<u8>::new(), false),
        |(mut input, mut buf, mut finished)| async move {
            loop {
                if let Some((frame, rest)) = split_frame(&buf) {
                    buf = rest;
                    match frame_data(&frame) {
                        Some(data) if data.trim() == DONE_SIGNAL => return None,
                        Some(data) => return Some((Ok(data), (input, buf, finished))),
                        None => continue,
                    }
                }

                if finished {
                    // Flush a trailing frame that lacked the final blank line.
                    if buf.iter().all(|b| b.is_ascii_whitespace()) {
                        return None;
                    }
                    let frame = String::from_utf8_lossy(&buf).into_owned();
                    buf.clear();
                    return match frame_data(&frame) {
                        Some(data) if data.trim() != DONE_SIGNAL => {
                            Some((Ok(data), (input, buf, finished)))
                        }
                        _ => None,
                    };
                }

                match input.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        finished = true;
                        buf.clear();
                        return Some((Err(ProviderError::from(e)), (input, buf, finished)));
                    }
                    None => finished = true,
                }
            }
        },
    )
    .boxed()
}

/// Splits off the first complete frame (terminated by a blank line).
fn split_frame(buf: &[u8]) -> Option<(String, Vec<u8>)> {
    let (end, delimiter_len) = find_delimiter(buf)?;
    let frame = String::from_utf8_lossy(&buf[..end]).into_owned();
    Some((frame, buf[end + delimiter_len..].to_vec()))
}

fn find_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Joins the `data:` lines of a frame. Comments and other fields are dropped.
fn frame_data(frame: &str) -> Option<String> {
    let lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
