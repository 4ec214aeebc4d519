use tokio::task::JoinHandle;
use tracing::info;

use crate::engine::session::{AnalysisOutcome, GenerateBlocked, GenerationStatus};
use crate::llm::media::Portrait;
use crate::state::AppState;

/// Stores the portrait right away and runs its analysis in the background.
/// The session lock is only taken between awaits.
pub fn start_analysis(state: &AppState, portrait: Portrait) -> JoinHandle<AnalysisOutcome> {
    let ticket = state.session.lock().upload_portrait(portrait);
    let state = state.clone();
    tokio::spawn(async move {
        let result = state.service.analyze_portrait(&ticket.portrait).await;
        let mut session = state.session.lock();
        session.complete_analysis(ticket.token, result)
    })
}

pub async fn generate(state: &AppState) -> Result<GenerationStatus, GenerateBlocked> {
    let ticket = state.session.lock().begin_generation()?;
    info!(
        token = %ticket.token,
        portrait = ticket.request.portrait.display_name().unwrap_or("-"),
        "Requesting ID photo"
    );
    let result = state.service.generate_id_photo(&ticket.request).await;
    Ok(state.session.lock().complete_generation(ticket.token, result))
}
