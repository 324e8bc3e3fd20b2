//! Poll endpoints
//!
//! Poll storage lives elsewhere; these handlers stand behind the permission
//! policies so the access-control layer can be exercised end to end.

use crate::api::{MessageResponse, SuccessResponse};
use crate::error::Result;
use crate::middleware::Authenticated;
use axum::{extract::Path, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSummary {
    pub id: Uuid,
    pub title: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePollInput {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(max = 1500))]
    pub summary: Option<String>,
}

/// GET /api/v1/polls (requires `polls:read`)
pub async fn list_polls(
    Authenticated(credential): Authenticated,
) -> Json<SuccessResponse<Vec<PollSummary>>> {
    tracing::debug!(subject = %credential.subject(), "Listing polls");
    Json(SuccessResponse::new(Vec::new()))
}

/// POST /api/v1/polls (requires `polls:create`)
pub async fn create_poll(
    Authenticated(credential): Authenticated,
    Json(input): Json<CreatePollInput>,
) -> Result<(StatusCode, Json<SuccessResponse<PollSummary>>)> {
    input.validate()?;

    let poll = PollSummary {
        id: Uuid::new_v4(),
        title: input.title,
        created_by: credential.subject().to_string(),
    };
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(poll))))
}

/// DELETE /api/v1/polls/{id} (requires `polls:delete`)
pub async fn delete_poll(
    Authenticated(credential): Authenticated,
    Path(id): Path<Uuid>,
) -> Json<MessageResponse> {
    tracing::info!(subject = %credential.subject(), poll_id = %id, "Poll delete authorized");
    Json(MessageResponse::new("Poll deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_poll_input_validation() {
        let valid = CreatePollInput {
            title: "Lunch options".to_string(),
            summary: None,
        };
        assert!(valid.validate().is_ok());

        let empty = CreatePollInput {
            title: String::new(),
            summary: None,
        };
        assert!(empty.validate().is_err());

        let long = CreatePollInput {
            title: "x".repeat(101),
            summary: None,
        };
        assert!(long.validate().is_err());
    }
}
