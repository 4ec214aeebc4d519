use std::fmt;

use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, Gender};
use crate::engine::request::{build_request, GenerationRequest, RequestError};
use crate::engine::selection::{reduce, SelectionAction, SelectionError, SelectionState};
use crate::llm::media::Portrait;
use crate::llm::service::{GeneratedImage, GenerationOutcome, PortraitAnalysis};

pub const DECLINED_MESSAGE: &str = "Không thể tạo ảnh. Yêu cầu của bạn có thể đã bị AI từ chối.";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "Đã xảy ra lỗi không mong muốn.";

/// Identifies one asynchronous call to the image service. Results carrying
/// a token other than the one the session is waiting for are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    pub token: RequestToken,
    pub portrait: Portrait,
}

#[derive(Debug, Clone)]
pub struct GenerationTicket {
    pub token: RequestToken,
    pub request: GenerationRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// The result belonged to the current upload. `gender` is set when it
    /// was routed into the selection.
    Applied { gender: Option<Gender> },
    Failed,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Completed,
    Declined,
    Failed,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateBlocked {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("Đang xử lý, vui lòng chờ ảnh hiện tại hoàn tất.")]
    InFlight,
    #[error("Đang phân tích ảnh, vui lòng chờ trong giây lát.")]
    Analyzing,
}

/// One user's working session: the selection plus everything that comes and
/// goes with uploads and generation calls.
#[derive(Debug, Clone)]
pub struct Session {
    catalog: Catalog,
    selection: SelectionState,
    portrait: Option<Portrait>,
    analysis: Option<PortraitAnalysis>,
    generated: Option<GeneratedImage>,
    error: Option<String>,
    pending_analysis: Option<RequestToken>,
    pending_generation: Option<RequestToken>,
    next_token: u64,
}

impl Session {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            selection: SelectionState::initial(&catalog),
            catalog,
            portrait: None,
            analysis: None,
            generated: None,
            error: None,
            pending_analysis: None,
            pending_generation: None,
            next_token: 0,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn portrait(&self) -> Option<&Portrait> {
        self.portrait.as_ref()
    }

    pub fn analysis(&self) -> Option<&PortraitAnalysis> {
        self.analysis.as_ref()
    }

    pub fn generated(&self) -> Option<&GeneratedImage> {
        self.generated.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_analyzing(&self) -> bool {
        self.pending_analysis.is_some()
    }

    pub fn is_generating(&self) -> bool {
        self.pending_generation.is_some()
    }

    pub fn can_generate(&self) -> bool {
        self.portrait.is_some() && !self.is_generating() && !self.is_analyzing()
    }

    pub fn build_request(&self) -> Result<GenerationRequest, RequestError> {
        build_request(&self.selection, self.portrait.as_ref())
    }

    /// Runs one selection action through the reducer. A rejected action
    /// leaves the session unchanged.
    pub fn apply(&mut self, action: SelectionAction) -> Result<(), SelectionError> {
        self.selection = reduce(&self.catalog, &self.selection, action)?;
        Ok(())
    }

    /// Stores a new portrait and issues the token its analysis must answer
    /// with. Any earlier analysis or generation still in flight becomes
    /// stale, since it was started for the previous portrait.
    pub fn upload_portrait(&mut self, portrait: Portrait) -> AnalysisTicket {
        let token = self.issue_token();
        info!(
            token = %token,
            name = portrait.display_name().unwrap_or("-"),
            mime_type = portrait.mime_type(),
            size = portrait.bytes().len(),
            "Portrait uploaded"
        );
        self.portrait = Some(portrait.clone());
        self.analysis = None;
        self.generated = None;
        self.error = None;
        self.pending_analysis = Some(token);
        self.pending_generation = None;
        AnalysisTicket { token, portrait }
    }

    pub fn complete_analysis(
        &mut self,
        token: RequestToken,
        result: anyhow::Result<PortraitAnalysis>,
    ) -> AnalysisOutcome {
        if self.pending_analysis != Some(token) {
            debug!(token = %token, "Discarding stale portrait analysis");
            return AnalysisOutcome::Stale;
        }
        self.pending_analysis = None;

        let analysis = match result {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(token = %token, "Image analysis failed: {err:#}");
                return AnalysisOutcome::Failed;
            }
        };

        let detected = analysis
            .detected_gender()
            .filter(|gender| self.catalog.genders.contains(gender));
        self.analysis = Some(analysis);

        let Some(gender) = detected else {
            return AnalysisOutcome::Applied { gender: None };
        };
        match self.apply(SelectionAction::Gender(gender.id().to_string())) {
            Ok(()) => {
                info!(token = %token, gender = %gender, "Applied detected gender");
                AnalysisOutcome::Applied {
                    gender: Some(gender),
                }
            }
            Err(err) => {
                warn!(token = %token, "Detected gender could not be applied: {err}");
                AnalysisOutcome::Applied { gender: None }
            }
        }
    }

    /// Assembles the request for the current selection and marks a
    /// generation as in flight. A missing portrait is also recorded as the
    /// session error so the user sees it.
    pub fn begin_generation(&mut self) -> Result<GenerationTicket, GenerateBlocked> {
        if !self.can_generate() {
            if self.is_generating() {
                return Err(GenerateBlocked::InFlight);
            }
            if self.is_analyzing() {
                return Err(GenerateBlocked::Analyzing);
            }
        }
        let request = match self.build_request() {
            Ok(request) => request,
            Err(err) => {
                self.error = Some(err.to_string());
                return Err(err.into());
            }
        };

        let token = self.issue_token();
        self.pending_generation = Some(token);
        self.error = None;
        self.generated = None;
        Ok(GenerationTicket { token, request })
    }

    pub fn complete_generation(
        &mut self,
        token: RequestToken,
        result: anyhow::Result<GenerationOutcome>,
    ) -> GenerationStatus {
        if self.pending_generation != Some(token) {
            debug!(token = %token, "Discarding stale generation result");
            return GenerationStatus::Stale;
        }
        self.pending_generation = None;

        match result {
            Ok(GenerationOutcome {
                image: Some(image),
                ..
            }) => {
                info!(token = %token, mime_type = %image.mime_type, size = image.bytes.len(), "ID photo generated");
                self.generated = Some(image);
                GenerationStatus::Completed
            }
            Ok(GenerationOutcome { image: None, text }) => {
                let message = text
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| DECLINED_MESSAGE.to_string());
                warn!(token = %token, "Image service returned no image: {message}");
                self.error = Some(message);
                GenerationStatus::Declined
            }
            Err(err) => {
                error!(token = %token, "ID photo generation failed: {err:#}");
                self.error = Some(UNEXPECTED_ERROR_MESSAGE.to_string());
                GenerationStatus::Failed
            }
        }
    }

    /// Back to session-start defaults. Tokens keep counting, so results of
    /// calls started before the reset are recognised as stale.
    pub fn reset(&mut self) {
        info!("Session reset");
        self.selection = SelectionState::initial(&self.catalog);
        self.portrait = None;
        self.analysis = None;
        self.generated = None;
        self.error = None;
        self.pending_analysis = None;
        self.pending_generation = None;
    }

    fn issue_token(&mut self) -> RequestToken {
        self.next_token += 1;
        RequestToken(self.next_token)
    }
}
