use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};

use crate::{
    error::ApiError,
    models::{
        chat::{can_access, ChatMessage, ChatMessageQuery, ChatMessageRequest, ChatMessageResponse},
        role::AccessScope,
        user::current_user,
    },
    response::{created, ok},
    utils::parse_id,
};

async fn find_accessible(message_id: &str, scope: &AccessScope) -> Result<ChatMessage, ApiError> {
    let message_id = parse_id(message_id)?;
    let message = ChatMessage::find_by_id(&message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("MESSAGE_NOT_FOUND"))?;
    if !can_access(scope, &message.room) {
        return Err(ApiError::forbidden("ROOM_NOT_ACCESSIBLE"));
    }
    Ok(message)
}

#[get("/chat/rooms")]
pub async fn get_chat_rooms(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let rooms = ChatMessage::rooms(&AccessScope::of(&issuer)).await?;
    Ok(ok("Chat rooms retrieved", rooms))
}

#[get("/chat/messages")]
pub async fn get_chat_messages(query: web::Query<ChatMessageQuery>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let messages = ChatMessage::find_page(&query, &AccessScope::of(&issuer)).await?;
    Ok(ok("Messages retrieved", messages))
}

#[post("/chat/messages")]
pub async fn create_chat_message(
    payload: web::Json<ChatMessageRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut message = ChatMessage::new(payload.into_inner(), issuer.actor(), &AccessScope::of(&issuer))?;
    message.save().await?;
    Ok(created("Message sent", ChatMessageResponse::from(message)))
}

#[post("/chat/messages/{message_id}/read")]
pub async fn read_chat_message(message_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let mut message = find_accessible(&message_id, &scope).await?;
    message.mark_read(&scope.user_id).await?;
    Ok(ok("Message marked as read", ChatMessageResponse::from(message)))
}

#[delete("/chat/messages/{message_id}")]
pub async fn delete_chat_message(message_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let mut message = find_accessible(&message_id, &scope).await?;
    if !message.can_delete(&scope) {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    message.soft_delete().await?;
    tracing::info!(message_id = %message_id, by = %issuer.id, "chat message deleted");
    Ok(ok("Message deleted", ChatMessageResponse::from(message)))
}
