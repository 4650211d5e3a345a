use serde::Deserialize;

use bearmemori_core::Actor;
use bearmemori_store::events::NewEvent;
use bearmemori_store::Store;

use super::{HandlerOutput, Notification};
use crate::error::HandlerError;
use crate::llm::{parse_json_reply, LlmClient};

const PROMPT: &str = "Extract calendar-worthy events from this email. Reply as JSON: \
{\"events\": [{\"description\": string, \"event_time\": string (RFC3339), \"confidence\": number between 0 and 1}]}";

/// Events below this confidence are dropped rather than proposed to the
/// user, matching the `task_match` handler's threshold.
const CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Deserialize)]
struct Payload {
    email_id: String,
    subject: String,
    body: String,
}

#[derive(Deserialize)]
struct ExtractedEvent {
    description: String,
    event_time: String,
    confidence: f64,
}

#[derive(Deserialize)]
struct EmailOutput {
    events: Vec<ExtractedEvent>,
}

pub async fn handle(llm: &LlmClient, store: &Store, user_id: Option<i64>, payload: &serde_json::Value) -> Result<HandlerOutput, HandlerError> {
    let input: Payload = serde_json::from_value(payload.clone())
        .map_err(|e| HandlerError::InvalidResponse(format!("malformed email_extract payload: {e}")))?;
    let owner_user_id = user_id.ok_or_else(|| HandlerError::InvalidResponse("email_extract job missing user_id".into()))?;

    let user_message = format!("Subject: {}\n\n{}", input.subject, input.body);
    let raw = llm.complete("gpt-4o-mini", PROMPT, &user_message).await?;
    let parsed: EmailOutput = parse_json_reply(&raw)?;

    let mut created_ids = Vec::new();
    for event in parsed.events.iter().filter(|e| e.confidence > CONFIDENCE_THRESHOLD) {
        let created = store.with_conn(|conn| {
            bearmemori_store::events::create(
                conn,
                &Actor::LlmWorker,
                NewEvent {
                    memory_id: None,
                    owner_user_id,
                    description: &event.description,
                    event_time: &event.event_time,
                    source_type: "email",
                    source_detail: Some(&input.email_id),
                },
            )
        })?;
        created_ids.push(created.id);
    }

    let job_result = serde_json::json!({
        "events": parsed.events.iter().map(|e| serde_json::json!({
            "description": e.description,
            "event_time": e.event_time,
            "confidence": e.confidence,
        })).collect::<Vec<_>>(),
        "created_event_ids": created_ids,
    });

    let notification = if created_ids.is_empty() {
        None
    } else {
        Some(Notification { message_type: "event_confirmation", content: job_result.clone() })
    };

    Ok(HandlerOutput { job_result, notification })
}
