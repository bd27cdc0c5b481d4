use actix_web::{delete, get, patch, post, put, web, HttpRequest, HttpResponse};
use serde::Serialize;

use crate::{
    error::ApiError,
    models::{
        performance::Performance,
        role::AccessScope,
        ticket::{
            StatusChangeOutcome, Ticket, TicketCommentRequest, TicketQuery, TicketRequest, TicketResponse,
            TicketStatus, TicketStatusRequest,
        },
        user::current_user,
    },
    response::{created, ok, page, PageQuery},
    utils::parse_id,
};

#[derive(Debug, Serialize)]
pub struct TicketStatusChange {
    #[serde(flatten)]
    pub outcome: StatusChangeOutcome,
    pub ticket: TicketResponse,
}

async fn find_in_scope(ticket_id: &str, scope: &AccessScope) -> Result<Ticket, ApiError> {
    let ticket_id = parse_id(ticket_id)?;
    let ticket = Ticket::find_by_id(&ticket_id)
        .await?
        .ok_or_else(|| ApiError::not_found("TICKET_NOT_FOUND"))?;
    scope.ensure(ticket.department.as_deref(), &ticket.owners())?;
    Ok(ticket)
}

#[get("/tickets")]
pub async fn get_tickets(
    query: web::Query<TicketQuery>,
    page_query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let (tickets, pagination) = Ticket::find_many(&query, &page_query, &AccessScope::of(&issuer)).await?;
    Ok(page("Tickets retrieved", tickets, pagination))
}

#[post("/tickets")]
pub async fn create_ticket(payload: web::Json<TicketRequest>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut payload = payload.into_inner();
    let department = AccessScope::of(&issuer).resolve_department(payload.department.take());
    let ticket = Ticket::new(payload, issuer.actor(), department)?;
    ticket.save().await?;
    tracing::info!(ticket = %ticket.ticket_id, reporter = %issuer.id, "ticket created");
    Ok(created("Ticket created", TicketResponse::from(ticket)))
}

#[get("/tickets/{ticket_id}")]
pub async fn get_ticket(ticket_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let ticket = find_in_scope(&ticket_id, &AccessScope::of(&issuer)).await?;
    Ok(ok("Ticket retrieved", TicketResponse::from(ticket)))
}

#[put("/tickets/{ticket_id}")]
pub async fn update_ticket(
    ticket_id: web::Path<String>,
    payload: web::Json<TicketRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let scope = AccessScope::of(&issuer);
    let mut ticket = find_in_scope(&ticket_id, &scope).await?;
    if !issuer.role.is_privileged() && ticket.reported_by.id != scope.user_id {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let mut payload = payload.into_inner();
    let department = payload
        .department
        .take()
        .and_then(|department| scope.resolve_department(Some(department)));
    ticket.apply_update(payload, department)?;
    ticket.update().await?;
    Ok(ok("Ticket updated", TicketResponse::from(ticket)))
}

#[delete("/tickets/{ticket_id}")]
pub async fn delete_ticket(ticket_id: web::Path<String>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    if !issuer.role.is_admin() {
        return Err(ApiError::forbidden("FORBIDDEN"));
    }
    let ticket = find_in_scope(&ticket_id, &AccessScope::of(&issuer)).await?;
    ticket.delete().await?;
    tracing::info!(ticket = %ticket.ticket_id, by = %issuer.id, "ticket deleted");
    Ok(ok("Ticket deleted", TicketResponse::from(ticket)))
}

#[post("/tickets/{ticket_id}/comments")]
pub async fn add_ticket_comment(
    ticket_id: web::Path<String>,
    payload: web::Json<TicketCommentRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut ticket = find_in_scope(&ticket_id, &AccessScope::of(&issuer)).await?;
    ticket.add_comment(issuer.actor(), &payload.message)?;
    ticket.update().await?;
    Ok(created("Comment added", TicketResponse::from(ticket)))
}

/// Non-privileged callers file a request; privileged callers decide it or
/// change the status directly.
#[patch("/tickets/{ticket_id}/status")]
pub async fn change_ticket_status(
    ticket_id: web::Path<String>,
    payload: web::Json<TicketStatusRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let issuer = current_user(&req)?;
    let mut ticket = find_in_scope(&ticket_id, &AccessScope::of(&issuer)).await?;
    let outcome = ticket.change_status(&payload, issuer.role, issuer.actor())?;
    ticket.update().await?;
    tracing::info!(ticket = %ticket.ticket_id, ?outcome, by = %issuer.id, "ticket status changed");

    if let Some(entry) = ticket.activity_entry(&outcome, issuer.actor()) {
        entry.record_detached();
    }
    if let StatusChangeOutcome::Applied { to: TicketStatus::Completed, .. }
    | StatusChangeOutcome::Approved { to: TicketStatus::Completed, .. } = outcome
    {
        if let Some(assignee) = ticket.assigned_to.clone() {
            Performance::record_task_completion_detached(
                ticket.assigned_to_id.clone(),
                assignee,
                ticket.department.clone(),
            );
        }
    }

    let message = match outcome {
        StatusChangeOutcome::Requested { .. } => "Status change requested",
        StatusChangeOutcome::Applied { .. } => "Status updated",
        StatusChangeOutcome::Approved { .. } => "Status change approved",
        StatusChangeOutcome::Rejected { .. } => "Status change rejected",
    };
    Ok(ok(
        message,
        TicketStatusChange {
            outcome,
            ticket: TicketResponse::from(ticket),
        },
    ))
}
