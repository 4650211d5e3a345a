use chrono::{DateTime, Utc};
use serde::Deserialize;

use bearmemori_store::Store;

use super::{HandlerOutput, Notification};
use crate::error::HandlerError;
use crate::llm::{parse_json_reply, LlmClient};

const PROMPT: &str = "Classify the user's message intent. Reply as JSON: \
{\"intent\": \"reminder\"|\"task\"|\"search\"|\"general_note\"|\"ambiguous\", \
\"extracted\"?: {\"when\"?: string, \"subject\"?: string, \"query_terms\"?: [string]}, \
\"tags\"?: [string]}";

#[derive(Deserialize)]
struct Payload {
    #[allow(dead_code)]
    memory_id: String,
    text: String,
    timestamp: String,
}

#[derive(Deserialize)]
struct Extracted {
    when: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Value,
}

#[derive(Deserialize)]
struct IntentOutput {
    intent: String,
    extracted: Option<Extracted>,
    tags: Option<Vec<String>>,
}

pub async fn handle(llm: &LlmClient, _store: &Store, _user_id: Option<i64>, payload: &serde_json::Value) -> Result<HandlerOutput, HandlerError> {
    let input: Payload = serde_json::from_value(payload.clone())
        .map_err(|e| HandlerError::InvalidResponse(format!("malformed intent_classify payload: {e}")))?;

    let raw = llm.complete("gpt-4o-mini", PROMPT, &input.text).await?;
    let parsed: IntentOutput = parse_json_reply(&raw)?;

    let reference_time: DateTime<Utc> = DateTime::parse_from_rfc3339(&input.timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    let stale = parsed
        .extracted
        .as_ref()
        .and_then(|e| e.when.as_deref())
        .and_then(|w| DateTime::parse_from_rfc3339(w).ok())
        .map(|w| w.with_timezone(&Utc) < reference_time)
        .unwrap_or(false);

    let extracted = parsed.extracted.as_ref().map(|e| {
        let mut obj = e.rest.clone();
        if let Some(map) = obj.as_object_mut() {
            map.insert("when".to_string(), serde_json::json!(e.when));
        }
        obj
    });

    let job_result = serde_json::json!({
        "intent": parsed.intent,
        "extracted": extracted,
        "tags": parsed.tags,
    });

    let mut content = job_result.clone();
    if stale {
        content["stale"] = serde_json::json!(true);
    }

    let message_type = if stale { "stale_message" } else { "llm_intent_result" };

    Ok(HandlerOutput {
        job_result,
        notification: Some(Notification { message_type, content }),
    })
}
