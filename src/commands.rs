//! Inbound chat commands. The listener only forwards; the scheduler does the work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::notify::{ChatPlatform, InboundMessage};

pub const QUEUE_COMMAND: &str = "!queue";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check now and reply in `reply_room`, whatever the throttle says.
    ForceCheck {
        reply_room: String,
        requested_by: String,
    },
}

pub fn parse_command(msg: &InboundMessage) -> Option<Command> {
    (msg.content.trim() == QUEUE_COMMAND).then(|| Command::ForceCheck {
        reply_room: msg.room_id.clone(),
        requested_by: msg.author_name.clone(),
    })
}

/// Poll `room_id` for commands every `every` and queue them for the scheduler.
/// Stops when the receiver is gone or the token is rejected.
pub fn spawn_command_listener(
    chat: Arc<dyn ChatPlatform>,
    room_id: String,
    every: Duration,
    tx: mpsc::Sender<Command>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let msgs = match chat.poll_messages(&room_id).await {
                Ok(m) => m,
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "command listener stopping");
                    return;
                }
                Err(e) => {
                    tracing::debug!(error = %e, room = %room_id, "command poll failed");
                    continue;
                }
            };
            for cmd in msgs.iter().filter_map(parse_command) {
                tracing::info!(?cmd, "command received");
                if tx.send(cmd).await.is_err() {
                    return;
                }
            }
        }
    })
}
