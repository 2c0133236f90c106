//! Inbound message conversion.

use wacore::types::message::MessageInfo;
use waproto::whatsapp::Message;

use crate::session::InboundMessage;

/// Strip device-sync, ephemeral and view-once wrappers down to the real content.
fn unwrap_message(msg: &Message) -> &Message {
    if let Some(ref dsm) = msg.device_sent_message
        && let Some(ref inner) = dsm.message
    {
        return unwrap_message(inner);
    }
    if let Some(ref eph) = msg.ephemeral_message
        && let Some(ref inner) = eph.message
    {
        return unwrap_message(inner);
    }
    if let Some(ref vo) = msg.view_once_message
        && let Some(ref inner) = vo.message
    {
        return unwrap_message(inner);
    }
    msg
}

/// Plain text body: a simple conversation or an extended text message.
pub fn extract_text(msg: &Message) -> Option<String> {
    let msg = unwrap_message(msg);
    if let Some(ref conv) = msg.conversation
        && !conv.is_empty()
    {
        return Some(conv.clone());
    }
    if let Some(ref ext) = msg.extended_text_message
        && let Some(ref text) = ext.text
    {
        return Some(text.clone());
    }
    None
}

pub fn to_inbound(msg: &Message, info: &MessageInfo) -> InboundMessage {
    InboundMessage {
        chat_jid: info.source.chat.to_string(),
        sender_jid: info.source.sender.to_string(),
        from_me: info.source.is_from_me,
        text: extract_text(msg),
    }
}
