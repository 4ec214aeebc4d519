use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::catalog::Gender;
use crate::engine::request::GenerationRequest;
use crate::llm::media::Portrait;

/// Boxed future returned by [`PhotoService`] calls.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// The remote image service that analyses portraits and renders ID photos.
pub trait PhotoService: Send + Sync {
    fn analyze_portrait<'a>(&'a self, portrait: &'a Portrait) -> ServiceFuture<'a, PortraitAnalysis>;

    fn generate_id_photo<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> ServiceFuture<'a, GenerationOutcome>;
}

/// Advisory attributes detected in an uploaded portrait. Only the gender
/// feeds back into the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortraitAnalysis {
    pub gender: Option<String>,
    pub is_front_facing: Option<bool>,
    pub wearing_glasses: Option<bool>,
    pub lighting_quality: Option<String>,
    pub notes: Vec<String>,
}

impl PortraitAnalysis {
    pub fn detected_gender(&self) -> Option<Gender> {
        self.gender.as_deref().and_then(Gender::from_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// What the service returned for a generation call. A missing image means
/// the service declined, usually with an explanation in `text`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub image: Option<GeneratedImage>,
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_parses_partial_json() {
        let analysis: PortraitAnalysis =
            serde_json::from_str(r#"{"gender":"Nam","isFrontFacing":true}"#).expect("valid json");
        assert_eq!(analysis.detected_gender(), Some(Gender::Male));
        assert_eq!(analysis.is_front_facing, Some(true));
        assert!(analysis.notes.is_empty());
    }

    #[test]
    fn unknown_gender_is_not_detected() {
        let analysis = PortraitAnalysis {
            gender: Some("female".to_string()),
            ..Default::default()
        };
        assert_eq!(analysis.detected_gender(), None);
    }
}
