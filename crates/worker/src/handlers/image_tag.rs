use base64::Engine;
use serde::Deserialize;

use bearmemori_core::Actor;
use bearmemori_store::Store;

use super::{HandlerOutput, Notification};
use crate::error::HandlerError;
use crate::llm::{parse_json_reply, LlmClient};

const TAG_PROMPT: &str = "Describe this image in one sentence and suggest up to 8 short lowercase tags. \
Reply as JSON: {\"description\": string, \"tags\": [string], \"location\"?: string}";

#[derive(Deserialize)]
struct Payload {
    memory_id: String,
    image_ref: String,
    caption: Option<String>,
}

#[derive(Deserialize)]
struct VisionOutput {
    description: String,
    tags: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    location: Option<String>,
}

pub async fn handle(llm: &LlmClient, store: &Store, _user_id: Option<i64>, payload: &serde_json::Value) -> Result<HandlerOutput, HandlerError> {
    let input: Payload = serde_json::from_value(payload.clone())
        .map_err(|e| HandlerError::InvalidResponse(format!("malformed image_tag payload: {e}")))?;

    let bytes = tokio::fs::read(&input.image_ref)
        .await
        .map_err(|e| HandlerError::Unavailable(format!("could not read image at {}: {e}", input.image_ref)))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    let mime_type = mime_type_for(&input.image_ref);

    let raw = llm.complete_vision("gpt-4o-mini", TAG_PROMPT, &encoded, mime_type).await?;
    let parsed: VisionOutput = parse_json_reply(&raw)?;

    store.with_conn(|conn| {
        for tag in &parsed.tags {
            bearmemori_store::memories::add_tag(conn, &input.memory_id, tag, false, &Actor::LlmWorker)?;
        }
        if input.caption.is_none() {
            bearmemori_store::memories::set_content(conn, &input.memory_id, &parsed.description, &Actor::LlmWorker)?;
        }
        Ok(())
    })?;

    let job_result = serde_json::json!({
        "description": parsed.description,
        "tags": parsed.tags,
    });

    Ok(HandlerOutput {
        job_result: job_result.clone(),
        notification: Some(Notification { message_type: "llm_image_tag_result", content: job_result }),
    })
}

fn mime_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("").to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_falls_back_to_jpeg() {
        assert_eq!(mime_type_for("photo.PNG"), "image/png");
        assert_eq!(mime_type_for("photo.jpg"), "image/jpeg");
        assert_eq!(mime_type_for("photo"), "image/jpeg");
    }
}
