//! Translates wire DTOs and frames to the domain types the application uses
//!
//! The application layer only sees [`ChatMessage`], [`PollingCursor`],
//! [`InboundFrame`] and [`OutboundFrame`]; protocol types stop here.

use consultchat_domain::{ChatMessage, MessageId, MessageRole, PollingCursor, SessionId};
use consultchat_shared::{
    ClientFrame, CursorDto, FetchMessagesQuery, FetchMessagesResponse, MessageDto,
    MessageRoleData, SendMessageResponse, ServerFrame,
};

use crate::ports::outbound::{FetchPage, InboundFrame, OutboundFrame, SendAck};

/// Roles this client does not know are shown as system messages.
pub fn translate_role(role: MessageRoleData) -> MessageRole {
    match role {
        MessageRoleData::User => MessageRole::User,
        MessageRoleData::Assistant => MessageRole::Assistant,
        MessageRoleData::System | MessageRoleData::Unknown => MessageRole::System,
    }
}

pub fn translate_message(dto: MessageDto) -> ChatMessage {
    ChatMessage::from_server(
        MessageId::from_uuid(dto.id),
        dto.client_message_id.map(MessageId::from_uuid),
        SessionId::from_uuid(dto.session_id),
        translate_role(dto.role),
        dto.content,
        dto.created_at,
    )
}

pub fn translate_cursor(dto: CursorDto) -> PollingCursor {
    PollingCursor {
        last_seen_message_id: dto.last_seen_message_id.map(MessageId::from_uuid),
        last_seen_timestamp: dto.last_seen_timestamp,
    }
}

pub fn cursor_query(cursor: &PollingCursor) -> FetchMessagesQuery {
    FetchMessagesQuery {
        after_id: cursor.last_seen_message_id.map(MessageId::to_uuid),
        after_ts: cursor.last_seen_timestamp,
    }
}

pub fn translate_page(response: FetchMessagesResponse) -> FetchPage {
    FetchPage {
        messages: response
            .messages
            .into_iter()
            .map(translate_message)
            .collect(),
        next_cursor: translate_cursor(response.next_cursor),
    }
}

pub fn translate_send_response(response: SendMessageResponse) -> SendAck {
    SendAck {
        server_message_id: MessageId::from_uuid(response.server_message_id),
        echoed_client_message_id: response
            .echoed_client_message_id
            .map(MessageId::from_uuid),
        created_at: response.created_at,
        inline_reply: response.inline_reply.map(translate_message),
    }
}

/// `None` for frames this client does not understand.
pub fn translate_server_frame(frame: ServerFrame) -> Option<InboundFrame> {
    match frame {
        ServerFrame::Ack {
            client_message_id,
            server_message_id,
            created_at,
        } => Some(InboundFrame::Ack {
            client_message_id: MessageId::from_uuid(client_message_id),
            server_message_id: MessageId::from_uuid(server_message_id),
            created_at,
        }),
        ServerFrame::Message { message } => Some(InboundFrame::Message(translate_message(message))),
        ServerFrame::Pong => Some(InboundFrame::Pong),
        ServerFrame::Error { code, message } => Some(InboundFrame::Error { code, message }),
        ServerFrame::Unknown => None,
    }
}

pub fn client_frame(frame: OutboundFrame) -> ClientFrame {
    match frame {
        OutboundFrame::SendMessage {
            client_message_id,
            content,
        } => ClientFrame::SendMessage {
            client_message_id: client_message_id.to_uuid(),
            content,
        },
        OutboundFrame::Ping => ClientFrame::Ping,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use consultchat_domain::DeliveryStatus;

    fn dto(role: MessageRoleData, echo: Option<Uuid>) -> MessageDto {
        MessageDto {
            id: Uuid::new_v4(),
            client_message_id: echo,
            session_id: Uuid::new_v4(),
            role,
            content: "Hi, how can I help?".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn server_messages_arrive_delivered_with_echo() {
        let echo = Uuid::new_v4();
        let message = translate_message(dto(MessageRoleData::User, Some(echo)));
        assert_eq!(message.delivery_status, DeliveryStatus::Delivered);
        assert_eq!(message.client_id, Some(MessageId::from_uuid(echo)));
    }

    #[test]
    fn unknown_roles_become_system_messages() {
        let message = translate_message(dto(MessageRoleData::Unknown, None));
        assert_eq!(message.role, MessageRole::System);
    }

    #[test]
    fn inline_reply_is_carried_into_the_ack() {
        let reply = dto(MessageRoleData::Assistant, None);
        let ack = translate_send_response(SendMessageResponse {
            server_message_id: Uuid::new_v4(),
            echoed_client_message_id: Some(Uuid::new_v4()),
            created_at: Utc::now(),
            inline_reply: Some(reply.clone()),
        });
        let inline = ack.inline_reply.expect("inline reply kept");
        assert_eq!(inline.content, reply.content);
        assert_eq!(inline.role, MessageRole::Assistant);
    }

    #[test]
    fn unknown_frames_are_dropped() {
        assert_eq!(translate_server_frame(ServerFrame::Unknown), None);
        assert_eq!(
            translate_server_frame(ServerFrame::Pong),
            Some(InboundFrame::Pong)
        );
    }

    #[test]
    fn cursor_becomes_query_parameters() {
        let id = MessageId::new();
        let at = Utc::now();
        let query = cursor_query(&PollingCursor {
            last_seen_message_id: Some(id),
            last_seen_timestamp: Some(at),
        });
        assert_eq!(query.after_id, Some(id.to_uuid()));
        assert_eq!(query.after_ts, Some(at));
    }
}
