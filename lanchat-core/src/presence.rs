//! Away flag, autoreply-sent set, and the offline-message append log.
//!
//! The away-flag file is the source of truth the original tool probes with
//! a plain `os.path.exists` check on every inbound MSG; here the same
//! probe (`tokio::fs::try_exists`) is taken under the same mutex that
//! guards the in-memory autoreply state, so a toggle initiated by this
//! process's own front-end command can never observably race its own
//! inbound-MSG handling (SPEC_FULL.md §4.6).

use std::collections::HashSet;
use std::path::PathBuf;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use lanchat_types::Handle;

use crate::error::EngineError;

struct PresenceState {
    autoreply: String,
    autoreplied_to: HashSet<Handle>,
}

/// What the Message Router should do after handing an inbound `MSG` to the
/// Presence Controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Not away: forward `MSG sender text` to the front-end.
    Deliver,
    /// Away: the line was appended to the offline log. If `send_autoreply`
    /// is set, the router must unicast `MSG own_handle <autoreply>` back to
    /// the sender and the controller has already recorded that it did so.
    Logged { send_autoreply: Option<String> },
}

pub struct PresenceController {
    state: Mutex<PresenceState>,
    away_flag_path: PathBuf,
    offline_log_path: PathBuf,
}

impl PresenceController {
    pub fn new(away_flag_path: PathBuf, offline_log_path: PathBuf, autoreply: String) -> Self {
        Self {
            state: Mutex::new(PresenceState {
                autoreply,
                autoreplied_to: HashSet::new(),
            }),
            away_flag_path,
            offline_log_path,
        }
    }

    async fn is_away(&self) -> bool {
        fs::try_exists(&self.away_flag_path).await.unwrap_or(false)
    }

    /// Ensure the on-disk flag matches `initial_away`, for startup when the
    /// configuration's `away` field says the peer should begin away.
    pub async fn sync_initial_state(&self, initial_away: bool) -> Result<(), EngineError> {
        if initial_away && !self.is_away().await {
            self.touch_flag().await?;
        }
        Ok(())
    }

    async fn touch_flag(&self) -> Result<(), EngineError> {
        if let Some(parent) = self.away_flag_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.away_flag_path, b"").await?;
        Ok(())
    }

    /// Handle the front-end "offline" command: set AWAY, create the flag
    /// file. Returns the autoreply text the router should broadcast to
    /// every other roster entry.
    pub async fn go_offline(&self) -> Result<String, EngineError> {
        let state = self.state.lock().await;
        self.touch_flag().await?;
        Ok(state.autoreply.clone())
    }

    /// Handle the front-end "online" command: clear AWAY, clear
    /// AUTOREPLIED_TO, drain and delete the offline log, returning its
    /// lines in order for the router to forward to the front-end.
    pub async fn go_online(&self) -> Result<Vec<String>, EngineError> {
        let mut state = self.state.lock().await;
        state.autoreplied_to.clear();
        if fs::try_exists(&self.away_flag_path).await.unwrap_or(false) {
            fs::remove_file(&self.away_flag_path).await.ok();
        }
        let lines = match fs::read_to_string(&self.offline_log_path).await {
            Ok(contents) => contents.lines().map(str::to_string).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(EngineError::Io(e)),
        };
        if !lines.is_empty() {
            if let Err(e) = fs::remove_file(&self.offline_log_path).await {
                warn!("failed to remove drained offline log: {e}");
            }
        }
        Ok(lines)
    }

    pub async fn set_autoreply(&self, text: String) {
        self.state.lock().await.autoreply = text;
    }

    /// Handle an inbound `MSG sender text` per SPEC_FULL.md §4.6.
    pub async fn on_inbound_msg(&self, sender: &Handle, text: &str) -> Result<InboundOutcome, EngineError> {
        if !self.is_away().await {
            return Ok(InboundOutcome::Deliver);
        }

        if let Some(parent) = self.offline_log_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let line = format!("{sender}: {text}\n");
        append_line(&self.offline_log_path, &line).await?;

        let mut state = self.state.lock().await;
        if state.autoreplied_to.contains(sender) {
            return Ok(InboundOutcome::Logged { send_autoreply: None });
        }
        state.autoreplied_to.insert(sender.clone());
        Ok(InboundOutcome::Logged {
            send_autoreply: Some(state.autoreply.clone()),
        })
    }
}

async fn append_line(path: &PathBuf, line: &str) -> Result<(), EngineError> {
    use tokio::io::AsyncWriteExt;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn h(s: &str) -> Handle {
        Handle::new(s).unwrap()
    }

    #[tokio::test]
    async fn not_away_delivers_directly() {
        let dir = tempdir().unwrap();
        let ctl = PresenceController::new(
            dir.path().join("away.flag"),
            dir.path().join("offline.txt"),
            "brb".to_string(),
        );
        let outcome = ctl.on_inbound_msg(&h("bob"), "hi").await.unwrap();
        assert_eq!(outcome, InboundOutcome::Deliver);
    }

    #[tokio::test]
    async fn away_logs_and_autoreplies_once_per_sender() {
        let dir = tempdir().unwrap();
        let ctl = PresenceController::new(
            dir.path().join("away.flag"),
            dir.path().join("offline.txt"),
            "Out of office".to_string(),
        );
        ctl.go_offline().await.unwrap();

        let first = ctl.on_inbound_msg(&h("bob"), "hi").await.unwrap();
        assert_eq!(
            first,
            InboundOutcome::Logged {
                send_autoreply: Some("Out of office".to_string())
            }
        );

        let second = ctl.on_inbound_msg(&h("bob"), "still there?").await.unwrap();
        assert_eq!(second, InboundOutcome::Logged { send_autoreply: None });

        let log = std::fs::read_to_string(dir.path().join("offline.txt")).unwrap();
        assert_eq!(log, "bob: hi\nbob: still there?\n");
    }

    #[tokio::test]
    async fn going_online_clears_state_and_drains_log() {
        let dir = tempdir().unwrap();
        let ctl = PresenceController::new(
            dir.path().join("away.flag"),
            dir.path().join("offline.txt"),
            "brb".to_string(),
        );
        ctl.go_offline().await.unwrap();
        ctl.on_inbound_msg(&h("bob"), "hi").await.unwrap();

        let drained = ctl.go_online().await.unwrap();
        assert_eq!(drained, vec!["bob: hi".to_string()]);
        assert!(!dir.path().join("away.flag").exists());
        assert!(!dir.path().join("offline.txt").exists());

        // A fresh away interval resets the autoreply suppression.
        ctl.go_offline().await.unwrap();
        let outcome = ctl.on_inbound_msg(&h("bob"), "hi again").await.unwrap();
        assert_eq!(
            outcome,
            InboundOutcome::Logged {
                send_autoreply: Some("brb".to_string())
            }
        );
    }
}
