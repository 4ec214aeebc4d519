use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{CONFIG, ID_PHOTO_SYSTEM_PROMPT, PORTRAIT_ANALYSIS_SYSTEM_PROMPT};
use crate::engine::request::GenerationRequest;
use crate::llm::media::{truncate_for_log, Portrait};
use crate::llm::service::{
    GeneratedImage, GenerationOutcome, PhotoService, PortraitAnalysis, ServiceFuture,
};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

const GEMINI_MAX_RETRY_ATTEMPTS: usize = 2;
const GEMINI_RETRY_BASE_DELAY_MS: u64 = 900;

/// [`PhotoService`] backed by the Gemini `generateContent` API.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiPhotoService;

impl GeminiPhotoService {
    pub fn from_config() -> Result<Self> {
        if CONFIG.gemini_api_key.trim().is_empty() {
            return Err(anyhow!("GEMINI_API_KEY is required to contact the image service"));
        }
        Ok(Self)
    }
}

impl PhotoService for GeminiPhotoService {
    fn analyze_portrait<'a>(&'a self, portrait: &'a Portrait) -> ServiceFuture<'a, PortraitAnalysis> {
        Box::pin(analyze_portrait(portrait))
    }

    fn generate_id_photo<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> ServiceFuture<'a, GenerationOutcome> {
        Box::pin(generate_id_photo(request))
    }
}

fn redact_gemini_api_key(text: &str) -> String {
    let key = CONFIG.gemini_api_key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn gemini_should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn gemini_should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn gemini_retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(GEMINI_RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn build_safety_settings() -> Vec<Value> {
    let threshold = match CONFIG.gemini_safety_settings.as_str() {
        "permissive" => "OFF",
        _ => "BLOCK_MEDIUM_AND_ABOVE",
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

/// Native aspect ratio Gemini can render directly for a catalog ratio id.
/// Ratios without one (and `original`) are left to the prompt.
fn native_aspect_ratio(aspect_ratio_id: &str) -> Option<&'static str> {
    match aspect_ratio_id {
        "3x4" => Some("3:4"),
        "2x3" | "4x6" => Some("2:3"),
        "2x2" => Some("1:1"),
        _ => None,
    }
}

fn build_image_config(request: &GenerationRequest) -> Option<Value> {
    let aspect_ratio = native_aspect_ratio(&request.aspect_ratio_id)?;
    let mut map = Map::new();
    map.insert("aspectRatio".to_string(), json!(aspect_ratio));
    Some(Value::Object(map))
}

pub fn build_generation_prompt(request: &GenerationRequest) -> String {
    let mut lines = vec![
        "Turn this portrait into a standard ID photo with these requirements:".to_string(),
        format!("- Background colour: {}", request.background),
        format!("- Gender of the subject: {}", request.gender),
        format!("- Outfit: {}", request.outfit),
    ];

    if request.hairstyle_is_unchanged() {
        lines.push("- Hairstyle: keep the current hairstyle, only tidy it.".to_string());
    } else {
        lines.push(format!("- Hairstyle: {}", request.hairstyle));
    }

    if request.keep_original_ratio {
        lines.push("- Framing: keep the original aspect ratio of the photo.".to_string());
    } else {
        lines.push(format!("- Framing: crop to a {} ID photo.", request.aspect_ratio));
    }

    lines.push(format!("- Skin retouch strength: {}", request.retouch));
    lines.push(format!("- Studio lighting correction: {}", request.lighting));

    let custom = request.custom_prompt.trim();
    if !custom.is_empty() {
        lines.push(format!("- Additional request from the customer: {custom}"));
    }

    lines.join("\n")
}

fn summarize_gemini_payload(payload: &Value, system_prompt_label: &str) -> Value {
    let mut summary = Map::new();
    summary.insert(
        "systemInstruction".to_string(),
        Value::String(system_prompt_label.to_string()),
    );

    if let Some(parts) = payload
        .pointer("/contents/0/parts")
        .and_then(|value| value.as_array())
    {
        let summarized: Vec<Value> = parts
            .iter()
            .map(|part| {
                if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                    json!({ "text": truncate_for_log(text, 200) })
                } else if let Some(inline_data) = part.get("inlineData") {
                    let mime_type = inline_data
                        .get("mimeType")
                        .and_then(|value| value.as_str())
                        .unwrap_or("unknown");
                    let data_len = inline_data
                        .get("data")
                        .and_then(|value| value.as_str())
                        .map(|value| value.len())
                        .unwrap_or(0);
                    json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                } else {
                    json!({ "unknownPart": true })
                }
            })
            .collect();
        summary.insert("parts".to_string(), Value::Array(summarized));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for part in candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .filter_map(|content| content.parts.as_ref())
        .flatten()
    {
        match part {
            GeminiPart::Text { text } => {
                text_parts += 1;
                if text_preview.is_none() && !text.trim().is_empty() {
                    text_preview = Some(truncate_for_log(text, 200));
                }
            }
            GeminiPart::InlineData { inline_data } => {
                if inline_data.mime_type.starts_with("image/") {
                    image_parts += 1;
                }
            }
        }
    }

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview,
        "finishReasons": candidates.iter().filter_map(|c| c.finish_reason.clone()).collect::<Vec<_>>(),
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn portrait_part(portrait: &Portrait) -> Value {
    json!({
        "inlineData": {
            "mimeType": portrait.mime_type(),
            "data": general_purpose::STANDARD.encode(portrait.bytes())
        }
    })
}

fn extract_text_from_response(response: &GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for candidate in response.candidates.as_deref().unwrap_or(&[]) {
        let Some(parts) = candidate.content.as_ref().and_then(|c| c.parts.as_ref()) else {
            continue;
        };
        for part in parts {
            if let GeminiPart::Text { text } = part {
                if !text.trim().is_empty() {
                    text_parts.push(text.trim().to_string());
                }
            }
        }
    }
    text_parts.join("\n")
}

fn extract_first_image(response: &GeminiResponse) -> Option<GeneratedImage> {
    for candidate in response.candidates.as_deref().unwrap_or(&[]) {
        let Some(parts) = candidate.content.as_ref().and_then(|c| c.parts.as_ref()) else {
            continue;
        };
        for part in parts {
            let GeminiPart::InlineData { inline_data } = part else {
                continue;
            };
            if !inline_data.mime_type.starts_with("image/") {
                continue;
            }
            match general_purpose::STANDARD.decode(&inline_data.data) {
                Ok(bytes) if !bytes.is_empty() => {
                    return Some(GeneratedImage {
                        bytes,
                        mime_type: inline_data.mime_type.clone(),
                    });
                }
                Ok(_) => warn!("Gemini returned an empty inline image"),
                Err(err) => warn!("Gemini returned undecodable image data: {err}"),
            }
        }
    }
    None
}

/// Explanation shown when Gemini answers without an image.
fn decline_reason(response: &GeminiResponse) -> Option<String> {
    let text = extract_text_from_response(response);
    if !text.is_empty() {
        return Some(text);
    }
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Some(format!("Yêu cầu bị từ chối bởi bộ lọc an toàn ({reason})."));
    }
    None
}

/// Pulls the JSON object out of a model reply that may be wrapped in a
/// markdown code fence.
fn parse_analysis_json(text: &str) -> Result<PortraitAnalysis> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|inner| inner.trim_end().trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced).map_err(|err| {
        anyhow!(
            "Portrait analysis returned invalid JSON ({err}): {}",
            truncate_for_log(unfenced, 300)
        )
    })
}

async fn call_gemini_api(
    model: &str,
    payload: Value,
    system_prompt_label: &str,
) -> Result<GeminiResponse> {
    let client = get_http_client();
    let url = format!(
        "{}/models/{}:generateContent",
        CONFIG.gemini_base_url, model
    );

    if tracing::enabled!(tracing::Level::DEBUG) {
        let payload_summary = summarize_gemini_payload(&payload, system_prompt_label);
        debug!(target: "llm.gemini", model = model, payload = %payload_summary);
    }

    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let response = match client
            .post(&url)
            .header("x-goog-api-key", &CONFIG.gemini_api_key)
            .timeout(Duration::from_secs(CONFIG.gemini_request_timeout_seconds))
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = redact_gemini_api_key(&err.to_string());
                let should_retry =
                    gemini_should_retry_error(&err) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, status={:?}, retrying={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    err.status(),
                    should_retry
                );
                if should_retry {
                    tokio::time::sleep(gemini_retry_delay(attempt)).await;
                    continue;
                }
                return Err(anyhow!("Gemini request failed: {}", err_text));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            let should_retry =
                gemini_should_retry_status(status) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
            warn!(
                "Gemini API error: status={}, body={}, retrying={}",
                status,
                redact_gemini_api_key(&body_summary),
                should_retry
            );
            if should_retry {
                tokio::time::sleep(gemini_retry_delay(attempt)).await;
                continue;
            }
            let detail = redact_gemini_api_key(&message.unwrap_or(body_summary));
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                detail
            ));
        }

        let value = response.json::<GeminiResponse>().await?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_gemini_response(&value);
            debug!(target: "llm.gemini", model = model, response = %response_summary);
        }
        return Ok(value);
    }
}

pub async fn analyze_portrait(portrait: &Portrait) -> Result<PortraitAnalysis> {
    let payload = json!({
        "systemInstruction": { "parts": [{ "text": PORTRAIT_ANALYSIS_SYSTEM_PROMPT }] },
        "contents": [{
            "role": "user",
            "parts": [
                portrait_part(portrait),
                { "text": "Analyze this portrait." }
            ]
        }],
        "generationConfig": {
            "temperature": 0.0,
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "gender": { "type": "STRING", "enum": ["Nữ", "Nam"] },
                    "isFrontFacing": { "type": "BOOLEAN" },
                    "wearingGlasses": { "type": "BOOLEAN" },
                    "lightingQuality": { "type": "STRING" },
                    "notes": { "type": "ARRAY", "items": { "type": "STRING" } }
                }
            }
        },
        "safetySettings": build_safety_settings(),
    });

    let model = CONFIG.gemini_analysis_model.as_str();
    log_llm_timing("gemini", model, "analyze_portrait", None, || async {
        let response = call_gemini_api(model, payload, "portrait_analysis_system_prompt").await?;
        let text = extract_text_from_response(&response);
        if text.is_empty() {
            return Err(anyhow!("Portrait analysis returned no text"));
        }
        parse_analysis_json(&text)
    })
    .await
}

pub async fn generate_id_photo(request: &GenerationRequest) -> Result<GenerationOutcome> {
    let prompt = build_generation_prompt(request);
    let mut generation_config = json!({
        "temperature": CONFIG.gemini_temperature,
        "responseModalities": ["TEXT", "IMAGE"]
    });
    if let Some(image_config) = build_image_config(request) {
        if let Some(config_object) = generation_config.as_object_mut() {
            config_object.insert("imageConfig".to_string(), image_config);
        }
    }

    let payload = json!({
        "systemInstruction": { "parts": [{ "text": ID_PHOTO_SYSTEM_PROMPT }] },
        "contents": [{
            "role": "user",
            "parts": [portrait_part(&request.portrait), { "text": prompt }]
        }],
        "generationConfig": generation_config,
        "safetySettings": build_safety_settings(),
    });

    let model = CONFIG.gemini_image_model.as_str();
    let metadata = json!({
        "background": request.background,
        "aspectRatio": request.aspect_ratio_id,
        "portraitBytes": request.portrait.bytes().len(),
    });
    log_llm_timing("gemini", model, "generate_id_photo", Some(metadata), || async {
        let response = call_gemini_api(model, payload, "id_photo_system_prompt").await?;
        let image = extract_first_image(&response);
        let text = if image.is_some() {
            let text = extract_text_from_response(&response);
            (!text.is_empty()).then_some(text)
        } else {
            decline_reason(&response)
        };
        Ok(GenerationOutcome { image, text })
    })
    .await
}
