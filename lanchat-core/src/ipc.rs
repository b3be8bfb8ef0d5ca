//! Front-end IPC vocabulary: command parsing and notification formatting.
//!
//! This module is the protocol-level half of §4.7 — pure parse/format, no
//! I/O — so it is unit-testable the same way the frame codec is. The
//! concrete line-stream transport (named FIFOs, or stdio) is a process
//! wiring concern and lives in `lanchat-daemon`, which recreates the
//! endpoint on a write failure per SPEC_FULL.md §4.7/§7.

use lanchat_types::{Handle, PeerAddress};

use crate::error::EngineError;

/// A line sent from the front-end to the core.
///
/// `SetAway`/`SetAutoreply` extend SPEC_FULL.md §6's literal five-line
/// table with the "offline"/"online"/"/autoreply …" front-end commands
/// §4.6 describes as mutating presence state — they have to travel over
/// the same IPC surface since it is the core's only outward interface, but
/// §6 leaves their wire spelling unspecified. This implementation spells
/// them `OFFLINE`, `ONLINE`, and `AUTOREPLY <text>` to match the case and
/// one-line shape of the rest of the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join { handle: Handle, port: u16 },
    Leave { handle: Handle },
    Who,
    SendMsg { to: Handle, text: String },
    SendImage { to: Handle, filepath: String, size_bytes: u64 },
    SetAway(bool),
    SetAutoreply(String),
}

/// A line sent from the core to the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    KnownUsers(Vec<(Handle, PeerAddress)>),
    Join(Handle),
    Leave(Handle),
    Msg { sender: Handle, text: String },
    Img { sender: Handle, filename: String },
    LeaveAck(Handle),
}

impl Notification {
    pub fn to_line(&self) -> String {
        match self {
            Notification::KnownUsers(entries) => lanchat_codec::encode_known_users(entries),
            Notification::Join(h) => format!("JOIN {h}"),
            Notification::Leave(h) => format!("LEAVE {h}"),
            Notification::Msg { sender, text } => format!("MSG {sender} {text}"),
            Notification::Img { sender, filename } => format!("IMG {sender} {filename}"),
            Notification::LeaveAck(h) => format!("LEAVE_ACK {h}"),
        }
    }
}

/// Parse one front-end command line.
pub fn parse_command(line: &str) -> Result<Command, EngineError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line == "WHO" {
        return Ok(Command::Who);
    }
    if let Some(rest) = line.strip_prefix("JOIN ") {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        let err = || EngineError::Shared(lanchat_types::Error::FrameMalformed(line.to_string()));
        if parts.len() != 2 {
            return Err(err());
        }
        let handle = Handle::new(parts[0]).map_err(|_| err())?;
        let port: u16 = parts[1].parse().map_err(|_| err())?;
        return Ok(Command::Join { handle, port });
    }
    if let Some(rest) = line.strip_prefix("LEAVE ") {
        let handle = Handle::new(rest.trim())
            .map_err(|_| EngineError::Shared(lanchat_types::Error::FrameMalformed(line.to_string())))?;
        return Ok(Command::Leave { handle });
    }
    if let Some(rest) = line.strip_prefix("SEND_MSG ") {
        let parts: Vec<&str> = rest.splitn(2, ' ').collect();
        let err = || EngineError::Shared(lanchat_types::Error::FrameMalformed(line.to_string()));
        let to = Handle::new(parts[0]).map_err(|_| err())?;
        let text = parts.get(1).copied().unwrap_or("").to_string();
        return Ok(Command::SendMsg { to, text });
    }
    if line == "OFFLINE" {
        return Ok(Command::SetAway(true));
    }
    if line == "ONLINE" {
        return Ok(Command::SetAway(false));
    }
    if let Some(rest) = line.strip_prefix("AUTOREPLY ") {
        return Ok(Command::SetAutoreply(rest.to_string()));
    }
    if let Some(rest) = line.strip_prefix("SEND_IMAGE ") {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        let err = || EngineError::Shared(lanchat_types::Error::FrameMalformed(line.to_string()));
        if parts.len() != 3 {
            return Err(err());
        }
        let to = Handle::new(parts[0]).map_err(|_| err())?;
        let size_bytes: u64 = parts[2].parse().map_err(|_| err())?;
        return Ok(Command::SendImage {
            to,
            filepath: parts[1].to_string(),
            size_bytes,
        });
    }
    Err(EngineError::Shared(lanchat_types::Error::FrameMalformed(line.to_string())))
}
