use serde::Deserialize;

use bearmemori_store::Store;

use super::{HandlerOutput, Notification};
use crate::error::HandlerError;
use crate::llm::{parse_json_reply, LlmClient};

const PROMPT: &str = "The user's message was ambiguous. Write one short clarifying question. \
Reply as JSON: {\"question\": string}";

#[derive(Deserialize)]
struct Payload {
    original_text: String,
    context: Option<String>,
}

#[derive(Deserialize)]
struct FollowupOutput {
    question: String,
}

pub async fn handle(llm: &LlmClient, _store: &Store, _user_id: Option<i64>, payload: &serde_json::Value) -> Result<HandlerOutput, HandlerError> {
    let input: Payload = serde_json::from_value(payload.clone())
        .map_err(|e| HandlerError::InvalidResponse(format!("malformed followup payload: {e}")))?;

    let user = match &input.context {
        Some(ctx) => format!("{}\n\ncontext: {}", input.original_text, ctx),
        None => input.original_text.clone(),
    };

    let raw = llm.complete("gpt-4o-mini", PROMPT, &user).await?;
    let parsed: FollowupOutput = parse_json_reply(&raw)?;

    let job_result = serde_json::json!({ "question": parsed.question });

    Ok(HandlerOutput {
        job_result: job_result.clone(),
        notification: Some(Notification { message_type: "llm_followup_result", content: job_result }),
    })
}
