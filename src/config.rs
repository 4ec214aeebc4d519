use std::env;
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub database_url: String,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_image_model: String,
    pub gemini_analysis_model: String,
    pub gemini_temperature: f32,
    pub gemini_safety_settings: String,
    pub gemini_request_timeout_seconds: u64,
    pub default_username: String,
    pub default_password: String,
    pub min_password_length: usize,
    pub output_file_stem: String,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let database_url = env_string("DATABASE_URL", "sqlite://id_photo_studio.db?mode=rwc");
        if database_url.trim().is_empty() {
            return Err(anyhow::anyhow!("DATABASE_URL must not be empty"));
        }

        let min_password_length = env_usize("MIN_PASSWORD_LENGTH", 8).max(1);
        let default_password = env_string("DEFAULT_PASSWORD", "changeme-now");
        if default_password.chars().count() < min_password_length {
            return Err(anyhow::anyhow!(
                "DEFAULT_PASSWORD must be at least {min_password_length} characters"
            ));
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(env_string("LOG_DIR", "logs")),
            database_url,
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_base_url: env_string(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            )
            .trim_end_matches('/')
            .to_string(),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            gemini_analysis_model: env_string("GEMINI_ANALYSIS_MODEL", "gemini-2.5-flash"),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.4),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            gemini_request_timeout_seconds: env_u64("GEMINI_REQUEST_TIMEOUT_SECONDS", 120),
            default_username: env_string("DEFAULT_USERNAME", "admin").trim().to_string(),
            default_password,
            min_password_length,
            output_file_stem: env_string("OUTPUT_FILE_STEM", "anh-the-ai"),
        })
    }
}

pub const ID_PHOTO_SYSTEM_PROMPT: &str = "You are a professional ID-photo retoucher. You receive one portrait photo and a list of requirements. Produce exactly one edited photo of the SAME person that satisfies an official identity-document standard.\n\nRules:\n1. Preserve the person's identity: face shape, facial features, skin tone, eye colour and age must stay recognisably the same.\n2. Head and shoulders, facing the camera, centred, neutral expression, eyes open, both ears visible where possible.\n3. Replace the background with a single flat, evenly lit colour with no shadows, gradients or objects.\n4. Replace the clothing with the requested outfit so it fits naturally at the neck and shoulders.\n5. Apply the requested hairstyle only when asked; otherwise keep the hair as it is, tidied.\n6. Never add accessories, text, watermarks or borders.\n7. CRITICAL: respond with an IMAGE. Only reply with text if the request cannot be fulfilled, and explain why in Vietnamese.";

pub const PORTRAIT_ANALYSIS_SYSTEM_PROMPT: &str = "You inspect portrait photos before they are turned into ID photos. Look at the single person in the image and report what you observe as a JSON object with these fields:\n- gender: \"Nữ\" for a woman, \"Nam\" for a man, omit if unsure\n- isFrontFacing: true when the face looks straight at the camera\n- wearingGlasses: true when the person wears glasses\n- lightingQuality: one of \"good\", \"uneven\", \"too dark\", \"too bright\"\n- notes: short Vietnamese tips that would improve the photo, may be empty\nReturn ONLY the JSON object.";
