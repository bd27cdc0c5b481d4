use crate::{database::get_db, error::ApiError, utils::{from_bson_date, parse_date, to_bson_date}};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::{role::AccessScope, Actor};

const COLLECTION: &str = "chatmessages";
pub const GENERAL_ROOM: &str = "general";
const MAX_CONTENT_CHARS: usize = 2000;
const DEFAULT_PAGE: i64 = 50;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub room: String,
    pub sender: Actor,
    pub content: String,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
    pub deleted_at: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}
#[derive(Debug, Deserialize)]
pub struct ChatMessageRequest {
    pub room: Option<String>,
    pub content: String,
}
#[derive(Debug, Default, Deserialize)]
pub struct ChatMessageQuery {
    pub room: Option<String>,
    pub before: Option<String>,
    pub limit: Option<i64>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub room: String,
    pub sender: Actor,
    pub content: String,
    pub read_by: Vec<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePage {
    pub room: String,
    pub messages: Vec<ChatMessageResponse>,
    pub has_more: bool,
    /// Cursor for the next (older) page.
    pub next_before: Option<DateTime<Utc>>,
}
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub room: String,
    pub unread_count: u64,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(message: ChatMessage) -> Self {
        Self {
            _id: message._id.map(|id| id.to_hex()).unwrap_or_default(),
            room: message.room,
            sender: message.sender,
            // Deleted messages keep their place in the history but lose their text.
            content: if message.deleted { String::new() } else { message.content },
            read_by: message.read_by,
            deleted: message.deleted,
            created_at: from_bson_date(message.created_at),
        }
    }
}

/// `general` is open to everyone; department rooms only to their members.
pub fn can_access(scope: &AccessScope, room: &str) -> bool {
    room == GENERAL_ROOM || scope.is_unrestricted() || scope.department.as_deref() == Some(room)
}

fn normalize_room(room: Option<&str>) -> String {
    room.map(str::trim)
        .filter(|room| !room.is_empty())
        .unwrap_or(GENERAL_ROOM)
        .to_string()
}

fn collection() -> Result<Collection<ChatMessage>, ApiError> {
    Ok(get_db()?.collection::<ChatMessage>(COLLECTION))
}

impl ChatMessage {
    pub fn new(payload: ChatMessageRequest, sender: Actor, scope: &AccessScope) -> Result<Self, ApiError> {
        let room = normalize_room(payload.room.as_deref());
        if !can_access(scope, &room) {
            return Err(ApiError::forbidden("ROOM_NOT_ACCESSIBLE"));
        }
        let content = payload.content.trim().to_string();
        let length = content.chars().count();
        if length == 0 || length > MAX_CONTENT_CHARS {
            return Err(ApiError::validation(format!(
                "content must be between 1 and {MAX_CONTENT_CHARS} characters"
            )));
        }
        let now = BsonDateTime::now();
        Ok(Self {
            _id: None,
            room,
            read_by: vec![sender.id.clone()],
            sender,
            content,
            deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn can_delete(&self, scope: &AccessScope) -> bool {
        self.sender.id == scope.user_id || scope.role.is_admin()
    }

    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        self._id = Some(ObjectId::new());
        collection()?.insert_one(&*self, None).await?;
        self._id.ok_or_else(|| ApiError::internal("INSERTING_FAILED"))
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<ChatMessage>, ApiError> {
        Ok(collection()?
            .find_one(doc! { "_id": _id, "deleted": false }, None)
            .await?)
    }

    pub async fn soft_delete(&mut self) -> Result<(), ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("MESSAGE_WITHOUT_ID"))?;
        let now = BsonDateTime::now();
        collection()?
            .update_one(
                doc! { "_id": _id },
                doc! { "$set": { "deleted": true, "deletedAt": now, "updatedAt": now } },
                None,
            )
            .await?;
        self.deleted = true;
        self.deleted_at = Some(now);
        Ok(())
    }

    pub async fn mark_read(&mut self, user_id: &str) -> Result<(), ApiError> {
        let _id = self._id.ok_or_else(|| ApiError::internal("MESSAGE_WITHOUT_ID"))?;
        collection()?
            .update_one(
                doc! { "_id": _id },
                doc! { "$addToSet": { "readBy": user_id } },
                None,
            )
            .await?;
        if !self.read_by.iter().any(|reader| reader == user_id) {
            self.read_by.push(user_id.to_string());
        }
        Ok(())
    }

    /// Newest first, `limit` messages older than the `before` cursor.
    pub async fn find_page(query: &ChatMessageQuery, scope: &AccessScope) -> Result<ChatMessagePage, ApiError> {
        let room = normalize_room(query.room.as_deref());
        if !can_access(scope, &room) {
            return Err(ApiError::forbidden("ROOM_NOT_ACCESSIBLE"));
        }
        let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, 100);
        let mut filter = doc! { "room": &room };
        if let Some(before) = query.before.as_deref().filter(|v| !v.trim().is_empty()) {
            filter.insert("createdAt", doc! { "$lt": to_bson_date(parse_date(before)?) });
        }
        // One extra row tells whether an older page exists.
        let mut messages = crate::database::find_capped(
            &collection()?,
            filter,
            doc! { "createdAt": -1, "_id": -1 },
            limit + 1,
        )
        .await?;
        let has_more = messages.len() as i64 > limit;
        messages.truncate(limit as usize);
        let next_before = if has_more {
            messages.last().map(|message| from_bson_date(message.created_at))
        } else {
            None
        };
        Ok(ChatMessagePage {
            room,
            messages: messages.into_iter().map(ChatMessageResponse::from).collect(),
            has_more,
            next_before,
        })
    }

    pub async fn rooms(scope: &AccessScope) -> Result<Vec<ChatRoom>, ApiError> {
        let collection = collection()?;
        let mut names = vec![GENERAL_ROOM.to_string()];
        if scope.is_unrestricted() {
            let present = collection.distinct("room", doc! { "deleted": false }, None).await?;
            names.extend(present.into_iter().filter_map(|room| match room {
                Bson::String(room) => Some(room),
                _ => None,
            }));
        } else if let Some(department) = &scope.department {
            names.push(department.clone());
        }
        names.sort();
        names.dedup();

        let mut rooms = Vec::with_capacity(names.len());
        for room in names {
            let unread_count = collection.count_documents(unread_filter(&room, &scope.user_id), None).await?;
            rooms.push(ChatRoom { room, unread_count });
        }
        Ok(rooms)
    }
}

fn unread_filter(room: &str, user_id: &str) -> Document {
    doc! {
        "room": room,
        "deleted": false,
        "sender.id": { "$ne": user_id },
        "readBy": { "$ne": user_id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::UserRole;

    fn scope(role: UserRole) -> AccessScope {
        AccessScope {
            role,
            department: Some("Ops".to_string()),
            user_id: "u1".to_string(),
            employee_id: None,
        }
    }

    fn sender() -> Actor {
        Actor {
            id: "u1".to_string(),
            name: "Kim".to_string(),
        }
    }

    #[test]
    fn rooms_are_limited_to_general_and_own_department() {
        let user = scope(UserRole::NormalUser);
        assert!(can_access(&user, "general"));
        assert!(can_access(&user, "Ops"));
        assert!(!can_access(&user, "Finance"));
        assert!(can_access(&scope(UserRole::SuperAdmin), "Finance"));
    }

    #[test]
    fn content_is_trimmed_and_bounded() {
        let message = ChatMessage::new(
            ChatMessageRequest {
                room: None,
                content: "  pump 3 is back online  ".to_string(),
            },
            sender(),
            &scope(UserRole::NormalUser),
        )
        .unwrap();
        assert_eq!(message.room, GENERAL_ROOM);
        assert_eq!(message.content, "pump 3 is back online");
        assert_eq!(message.read_by, vec!["u1".to_string()]);

        let blank = ChatMessage::new(
            ChatMessageRequest {
                room: None,
                content: "   ".to_string(),
            },
            sender(),
            &scope(UserRole::NormalUser),
        );
        assert!(blank.is_err());
        let long = ChatMessage::new(
            ChatMessageRequest {
                room: None,
                content: "x".repeat(2001),
            },
            sender(),
            &scope(UserRole::NormalUser),
        );
        assert!(long.is_err());
    }

    #[test]
    fn posting_to_foreign_room_is_forbidden() {
        let result = ChatMessage::new(
            ChatMessageRequest {
                room: Some("Finance".to_string()),
                content: "hello".to_string(),
            },
            sender(),
            &scope(UserRole::Manager),
        );
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn deleted_messages_hide_content() {
        let mut message = ChatMessage::new(
            ChatMessageRequest {
                room: None,
                content: "typo".to_string(),
            },
            sender(),
            &scope(UserRole::NormalUser),
        )
        .unwrap();
        message.deleted = true;
        assert_eq!(ChatMessageResponse::from(message).content, "");
    }
}
