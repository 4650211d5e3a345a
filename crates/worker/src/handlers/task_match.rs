use serde::Deserialize;

use bearmemori_store::Store;

use super::{HandlerOutput, Notification};
use crate::error::HandlerError;
use crate::llm::{parse_json_reply, LlmClient};

const PROMPT_PREFIX: &str = "Given a new note and a list of the user's open tasks, decide whether the note \
refers to one of them. Reply as JSON: {\"task_id\"?: string, \"confidence\": number between 0 and 1}.\n\nOpen tasks:\n";

/// Below this confidence, the match is treated as noise, not worth
/// surfacing to the user.
const CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Deserialize)]
struct Payload {
    #[allow(dead_code)]
    memory_id: String,
    content: String,
}

#[derive(Deserialize)]
struct MatchOutput {
    task_id: Option<String>,
    confidence: f64,
}

pub async fn handle(llm: &LlmClient, store: &Store, user_id: Option<i64>, payload: &serde_json::Value) -> Result<HandlerOutput, HandlerError> {
    let input: Payload = serde_json::from_value(payload.clone())
        .map_err(|e| HandlerError::InvalidResponse(format!("malformed task_match payload: {e}")))?;
    let owner_user_id = user_id.ok_or_else(|| HandlerError::InvalidResponse("task_match job missing user_id".into()))?;

    let open_tasks = store.with_conn(|conn| bearmemori_store::tasks::list_for_owner(conn, owner_user_id, Some("NOT_DONE")))?;

    let mut prompt = String::from(PROMPT_PREFIX);
    for task in &open_tasks {
        prompt.push_str(&format!("- {}: {}\n", task.id, task.description));
    }

    let user_message = format!("{prompt}\nNote: {}", input.content);
    let raw = llm.complete("gpt-4o-mini", "You match notes to open tasks.", &user_message).await?;
    let parsed: MatchOutput = parse_json_reply(&raw)?;

    let job_result = serde_json::json!({
        "task_id": parsed.task_id,
        "confidence": parsed.confidence,
    });

    let notification = if parsed.confidence > CONFIDENCE_THRESHOLD {
        Some(Notification { message_type: "llm_task_match_result", content: job_result.clone() })
    } else {
        None
    };

    Ok(HandlerOutput { job_result, notification })
}
