//! Domain <-> wire conversions.

use consultchat_domain::{ChatMessage, MessageId, MessageRole, PollingCursor};
use consultchat_shared::{CursorDto, FetchMessagesQuery, MessageDto, MessageRoleData};

pub fn message_dto(message: &ChatMessage) -> MessageDto {
    MessageDto {
        id: message.id.to_uuid(),
        client_message_id: message.client_id.map(MessageId::to_uuid),
        session_id: message.session_id.to_uuid(),
        role: role_data(message.role),
        content: message.content.clone(),
        created_at: message.created_at,
    }
}

pub fn cursor_dto(cursor: &PollingCursor) -> CursorDto {
    CursorDto {
        last_seen_message_id: cursor.last_seen_message_id.map(MessageId::to_uuid),
        last_seen_timestamp: cursor.last_seen_timestamp,
    }
}

pub fn cursor_from_query(query: FetchMessagesQuery) -> PollingCursor {
    PollingCursor {
        last_seen_message_id: query.after_id.map(MessageId::from_uuid),
        last_seen_timestamp: query.after_ts,
    }
}

fn role_data(role: MessageRole) -> MessageRoleData {
    match role {
        MessageRole::User => MessageRoleData::User,
        MessageRole::Assistant => MessageRoleData::Assistant,
        MessageRole::System => MessageRoleData::System,
    }
}
