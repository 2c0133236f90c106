//! Chat command dispatcher
//!
//! Matches inbound text against the bot's fixed command set and replies in the
//! same chat. Anything that is not a command is ignored.

use crate::session::{GroupSummary, InboundMessage, Session};
use crate::utils::truncate_str;

pub const STATUS_BROADCAST: &str = "status@broadcast";

const GROUP_LIST_HEADER: &str = "Daftar Grup yang diikuti bot:\n\n";
const GROUP_LIST_SEPARATOR: &str = "------------------------------";
const GROUP_LIST_FAILED: &str = "Maaf, terjadi kesalahan saat mencoba mendapatkan daftar grup.";
const GROUP_ONLY: &str = "Perintah ini hanya bisa digunakan di dalam grup.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// `/idgrup`: list every group the bot is in
    ListGroups,
    /// `/dapatkanidgrup`: tell a group its own id
    CurrentGroupId,
}

impl BotCommand {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "/idgrup" | "/listgrup" => Some(BotCommand::ListGroups),
            "/dapatkanidgrup" => Some(BotCommand::CurrentGroupId),
            _ => None,
        }
    }
}

pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with("@g.us")
}

/// One block per group, in the order given.
pub fn format_group_list(groups: &[GroupSummary]) -> String {
    let mut out = String::from(GROUP_LIST_HEADER);
    for group in groups {
        out.push_str(&format!(
            "*Nama:* {}\n*ID:* {}\n{}\n",
            group.name, group.id, GROUP_LIST_SEPARATOR
        ));
    }
    out
}

/// Reply text for `/dapatkanidgrup` sent from `chat_jid`.
pub fn current_group_reply(chat_jid: &str) -> String {
    if is_group_jid(chat_jid) {
        format!("ID grup ini adalah: {}", chat_jid)
    } else {
        GROUP_ONLY.to_string()
    }
}

/// Handle one inbound message. Returns the command that was answered, if any.
pub async fn dispatch(session: &dyn Session, message: &InboundMessage) -> Option<BotCommand> {
    if message.from_me || message.chat_jid == STATUS_BROADCAST {
        return None;
    }
    let text = message.text.as_deref()?;

    tracing::debug!(
        "Message from {} in {}: {}",
        message.sender_jid,
        message.chat_jid,
        truncate_str(text, 50)
    );

    let command = BotCommand::parse(text)?;
    tracing::info!("Command {:?} from {}", command, message.chat_jid);

    let reply = match command {
        BotCommand::ListGroups => match session.participating_groups().await {
            Ok(groups) => format_group_list(&groups),
            Err(e) => {
                tracing::error!("Failed to fetch groups for {:?}: {}", command, e);
                GROUP_LIST_FAILED.to_string()
            }
        },
        BotCommand::CurrentGroupId => current_group_reply(&message.chat_jid),
    };

    if let Err(e) = session.send_text(&message.chat_jid, &reply).await {
        tracing::error!("Failed to reply to {}: {}", message.chat_jid, e);
    }
    Some(command)
}
