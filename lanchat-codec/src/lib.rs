//! The textual line protocol and the binary image-chunk frame.
//!
//! This crate is pure parsing/formatting with no I/O and no async, the same
//! separation the teacher crate draws between its codec (`wichain-core`)
//! and its transport (`wichain-network`). A datagram is classified purely
//! by its leading bytes; textual frames are then decoded as (possibly
//! lossy) UTF-8 and tokenized on whitespace.

use std::net::Ipv4Addr;

use lanchat_types::{Handle, PeerAddress};
use thiserror::Error;

/// Reserved prefix marking a binary image frame.
const IMG_START_TAG: &str = "IMG_START";
const CHUNK_TAG: &str = "CHUNK";
const IMG_END_TAG: &str = "IMG_END";
const CHUNK_SEPARATOR: &[u8] = b"||";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty datagram")]
    Empty,
    #[error("unrecognized frame: {0:?}")]
    Unrecognized(String),
    #[error("malformed {0} frame: {1}")]
    Malformed(&'static str, String),
}

/// One decoded datagram, in either the textual or the binary family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Join { handle: Handle, port: u16 },
    Leave { handle: Handle },
    Who,
    KnownUsers(Vec<(Handle, PeerAddress)>),
    Msg { sender: Handle, text: String },
    ImgStart { sender: Handle, filename: String, total_chunks: u32 },
    Chunk { index: u32, bytes: Vec<u8> },
    ImgEnd,
}

/// Parse a raw inbound UDP payload into a [`Frame`].
///
/// Binary frames are recognized by their ASCII prefix before any UTF-8
/// decoding is attempted, since `CHUNK` bodies are arbitrary bytes that may
/// not be valid UTF-8 at all.
pub fn decode_frame(data: &[u8]) -> Result<Frame, CodecError> {
    if data.is_empty() {
        return Err(CodecError::Empty);
    }
    if data.starts_with(IMG_START_TAG.as_bytes()) {
        return decode_img_start(data);
    }
    if data.starts_with(CHUNK_TAG.as_bytes()) {
        return decode_chunk(data);
    }
    if data == IMG_END_TAG.as_bytes() {
        return Ok(Frame::ImgEnd);
    }

    let line = String::from_utf8_lossy(data);
    let line = line.trim_end_matches(['\r', '\n']);
    decode_text_frame(line)
}

fn decode_img_start(data: &[u8]) -> Result<Frame, CodecError> {
    let text = String::from_utf8_lossy(data);
    let text = text.trim_end_matches(['\r', '\n']);
    let parts: Vec<&str> = text.splitn(4, ' ').collect();
    if parts.len() != 4 {
        return Err(CodecError::Malformed("IMG_START", text.to_string()));
    }
    let sender = Handle::new(parts[1])
        .map_err(|_| CodecError::Malformed("IMG_START", text.to_string()))?;
    let filename = parts[2].to_string();
    let total_chunks: u32 = parts[3]
        .parse()
        .map_err(|_| CodecError::Malformed("IMG_START", text.to_string()))?;
    Ok(Frame::ImgStart {
        sender,
        filename,
        total_chunks,
    })
}

fn decode_chunk(data: &[u8]) -> Result<Frame, CodecError> {
    let sep_pos = data
        .windows(CHUNK_SEPARATOR.len())
        .position(|w| w == CHUNK_SEPARATOR)
        .ok_or_else(|| CodecError::Malformed("CHUNK", "missing || separator".to_string()))?;
    let header = &data[..sep_pos];
    let body = &data[sep_pos + CHUNK_SEPARATOR.len()..];

    let header_text = std::str::from_utf8(header)
        .map_err(|_| CodecError::Malformed("CHUNK", "non-utf8 header".to_string()))?;
    let mut tokens = header_text.split_whitespace();
    let tag = tokens.next().ok_or_else(|| CodecError::Malformed("CHUNK", "empty header".to_string()))?;
    if tag != CHUNK_TAG {
        return Err(CodecError::Malformed("CHUNK", header_text.to_string()));
    }
    let index_str = tokens
        .next()
        .ok_or_else(|| CodecError::Malformed("CHUNK", "missing index".to_string()))?;
    if tokens.next().is_some() {
        return Err(CodecError::Malformed("CHUNK", header_text.to_string()));
    }
    let index: u32 = index_str
        .parse()
        .map_err(|_| CodecError::Malformed("CHUNK", format!("non-integer index {index_str:?}")))?;

    Ok(Frame::Chunk {
        index,
        bytes: body.to_vec(),
    })
}

fn decode_text_frame(line: &str) -> Result<Frame, CodecError> {
    if line == "WHO" {
        return Ok(Frame::Who);
    }
    if let Some(rest) = line.strip_prefix("JOIN ") {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        if parts.len() != 2 {
            return Err(CodecError::Malformed("JOIN", line.to_string()));
        }
        let handle = Handle::new(parts[0]).map_err(|_| CodecError::Malformed("JOIN", line.to_string()))?;
        let port: u16 = parts[1]
            .parse()
            .map_err(|_| CodecError::Malformed("JOIN", line.to_string()))?;
        return Ok(Frame::Join { handle, port });
    }
    if let Some(rest) = line.strip_prefix("LEAVE ") {
        let handle = Handle::new(rest.trim())
            .map_err(|_| CodecError::Malformed("LEAVE", line.to_string()))?;
        return Ok(Frame::Leave { handle });
    }
    if let Some(rest) = line.strip_prefix("KNOWNUSERS ") {
        return decode_known_users(rest).map(Frame::KnownUsers);
    }
    if line == "KNOWNUSERS" {
        return Ok(Frame::KnownUsers(Vec::new()));
    }
    if let Some(rest) = line.strip_prefix("MSG ") {
        let parts: Vec<&str> = rest.splitn(2, ' ').collect();
        let sender = Handle::new(parts[0]).map_err(|_| CodecError::Malformed("MSG", line.to_string()))?;
        let text = parts.get(1).copied().unwrap_or("").to_string();
        return Ok(Frame::Msg { sender, text });
    }
    Err(CodecError::Unrecognized(line.to_string()))
}

fn decode_known_users(payload: &str) -> Result<Vec<(Handle, PeerAddress)>, CodecError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    payload
        .split(", ")
        .map(|entry| {
            let parts: Vec<&str> = entry.split_whitespace().collect();
            if parts.len() != 3 {
                return Err(CodecError::Malformed("KNOWNUSERS", entry.to_string()));
            }
            let handle = Handle::new(parts[0])
                .map_err(|_| CodecError::Malformed("KNOWNUSERS", entry.to_string()))?;
            let ip: Ipv4Addr = parts[1]
                .parse()
                .map_err(|_| CodecError::Malformed("KNOWNUSERS", entry.to_string()))?;
            let port: u16 = parts[2]
                .parse()
                .map_err(|_| CodecError::Malformed("KNOWNUSERS", entry.to_string()))?;
            Ok((handle, PeerAddress::new(ip, port)))
        })
        .collect()
}

/// Render a [`Frame`] back into wire bytes. Round-trips with [`decode_frame`]
/// for every variant except `Chunk`, whose header is reconstructed exactly
/// but whose body is caller-supplied raw bytes either way.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    match frame {
        Frame::Join { handle, port } => format!("JOIN {handle} {port}").into_bytes(),
        Frame::Leave { handle } => format!("LEAVE {handle}").into_bytes(),
        Frame::Who => b"WHO".to_vec(),
        Frame::KnownUsers(entries) => encode_known_users(entries).into_bytes(),
        Frame::Msg { sender, text } => format!("MSG {sender} {text}").into_bytes(),
        Frame::ImgStart {
            sender,
            filename,
            total_chunks,
        } => format!("{IMG_START_TAG} {sender} {filename} {total_chunks}").into_bytes(),
        Frame::Chunk { index, bytes } => {
            let mut out = format!("{CHUNK_TAG} {index}").into_bytes();
            out.extend_from_slice(CHUNK_SEPARATOR);
            out.extend_from_slice(bytes);
            out
        }
        Frame::ImgEnd => IMG_END_TAG.as_bytes().to_vec(),
    }
}

pub fn encode_known_users(entries: &[(Handle, PeerAddress)]) -> String {
    let body = entries
        .iter()
        .map(|(h, a)| format!("{h} {a}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("KNOWNUSERS {body}")
}

/// Recommended default chunk body size, matching the original tool's
/// constant (bytes).
pub const DEFAULT_CHUNK_SIZE: usize = 4000;

/// Number of chunks a payload of `size_bytes` splits into at `chunk_size`.
pub fn chunk_count(size_bytes: u64, chunk_size: usize) -> u32 {
    if size_bytes == 0 {
        return 0;
    }
    let chunk_size = chunk_size as u64;
    (size_bytes.div_ceil(chunk_size)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn h(s: &str) -> Handle {
        Handle::new(s).unwrap()
    }

    #[test]
    fn join_roundtrips() {
        let f = Frame::Join {
            handle: h("alice"),
            port: 5001,
        };
        let bytes = encode_frame(&f);
        assert_eq!(decode_frame(&bytes).unwrap(), f);
    }

    #[test]
    fn leave_roundtrips() {
        let f = Frame::Leave { handle: h("bob") };
        assert_eq!(decode_frame(&encode_frame(&f)).unwrap(), f);
    }

    #[test]
    fn who_roundtrips() {
        assert_eq!(decode_frame(&encode_frame(&Frame::Who)).unwrap(), Frame::Who);
    }

    #[test]
    fn msg_preserves_internal_whitespace_and_empty_body() {
        let f = Frame::Msg {
            sender: h("bob"),
            text: "hello   world".to_string(),
        };
        assert_eq!(decode_frame(&encode_frame(&f)).unwrap(), f);

        let empty = Frame::Msg {
            sender: h("bob"),
            text: String::new(),
        };
        assert_eq!(decode_frame(&encode_frame(&empty)).unwrap(), empty);
    }

    #[test]
    fn known_users_roundtrips_multiple_entries() {
        let entries = vec![
            (h("alice"), PeerAddress::new(Ipv4Addr::new(192, 168, 0, 1), 5001)),
            (h("bob"), PeerAddress::new(Ipv4Addr::new(192, 168, 0, 2), 5002)),
        ];
        let f = Frame::KnownUsers(entries);
        assert_eq!(decode_frame(&encode_frame(&f)).unwrap(), f);
    }

    #[test]
    fn img_start_roundtrips() {
        let f = Frame::ImgStart {
            sender: h("alice"),
            filename: "photo.png".to_string(),
            total_chunks: 3,
        };
        assert_eq!(decode_frame(&encode_frame(&f)).unwrap(), f);
    }

    #[test]
    fn chunk_roundtrips_with_binary_body() {
        let f = Frame::Chunk {
            index: 7,
            bytes: vec![0u8, 1, 2, 255, 254, b'|', b'|', 10],
        };
        assert_eq!(decode_frame(&encode_frame(&f)).unwrap(), f);
    }

    #[test]
    fn img_end_roundtrips() {
        assert_eq!(decode_frame(&encode_frame(&Frame::ImgEnd)).unwrap(), Frame::ImgEnd);
    }

    #[test]
    fn chunk_missing_separator_is_malformed() {
        let err = decode_frame(b"CHUNK 3 nosep").unwrap_err();
        assert!(matches!(err, CodecError::Malformed("CHUNK", _)));
    }

    #[test]
    fn chunk_non_integer_index_is_malformed() {
        let err = decode_frame(b"CHUNK abc||data").unwrap_err();
        assert!(matches!(err, CodecError::Malformed("CHUNK", _)));
    }

    #[test]
    fn unrecognized_text_is_reported_not_panicking() {
        let err = decode_frame(b"GARBAGE").unwrap_err();
        assert!(matches!(err, CodecError::Unrecognized(_)));
    }

    #[test]
    fn chunk_count_boundaries() {
        assert_eq!(chunk_count(0, 1024), 0);
        assert_eq!(chunk_count(2500, 1024), 3);
        assert_eq!(chunk_count(1024, 1024), 1);
        assert_eq!(chunk_count(1025, 1024), 2);
    }
}
