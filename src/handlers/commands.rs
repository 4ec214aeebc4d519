use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use url::Url;

use crate::auth::{CredentialStore, User};
use crate::catalog::Catalog;
use crate::config::CONFIG;
use crate::engine::session::{GenerationStatus, Session, UNEXPECTED_ERROR_MESSAGE};
use crate::handlers::cli::{options_json, render_options, AccountArgs, GenerateArgs, OptionsArgs};
use crate::handlers::download::{export_image, resolve_output_path};
use crate::handlers::photo::{generate, start_analysis};
use crate::llm::media::{download_media, Portrait};
use crate::state::AppState;
use crate::utils::timing::{complete_command_timer, start_command_timer};

#[derive(Debug, Clone)]
pub struct GenerateSummary {
    pub output: PathBuf,
    pub notes: Vec<String>,
}

pub fn run_options(catalog: &Catalog, args: &OptionsArgs) -> Result<String> {
    let mut session = Session::new(*catalog);
    for action in args.selection.actions() {
        session.apply(action)?;
    }
    if args.json {
        let mut text = options_json(session.catalog(), session.selection())?;
        text.push('\n');
        Ok(text)
    } else {
        Ok(render_options(session.catalog(), session.selection()))
    }
}

fn remote_url(source: &str) -> Option<Url> {
    Url::parse(source)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

fn display_name(source: &str) -> String {
    let name = match remote_url(source) {
        Some(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string),
        None => Path::new(source)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
    };
    name.unwrap_or_else(|| source.to_string())
}

async fn load_portrait(source: &str) -> Result<Portrait> {
    let bytes = match remote_url(source) {
        Some(url) => download_media(url.as_str())
            .await
            .ok_or_else(|| anyhow!("Không thể tải ảnh từ {source}"))?,
        None => tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read portrait {source}"))?,
    };
    Ok(Portrait::from_bytes(bytes, Some(display_name(source)))?)
}

pub async fn run_generate(
    args: GenerateArgs,
    credentials: &CredentialStore,
    state: &AppState,
) -> Result<GenerateSummary> {
    let mut timer = start_command_timer("generate", Some(format!("image={}", args.image)));
    let result = generate_photo(args, credentials, state).await;
    match &result {
        Ok(summary) => complete_command_timer(
            &mut timer,
            "success",
            Some(summary.output.display().to_string()),
        ),
        Err(err) => complete_command_timer(&mut timer, "error", Some(err.to_string())),
    }
    result
}

async fn generate_photo(
    args: GenerateArgs,
    credentials: &CredentialStore,
    state: &AppState,
) -> Result<GenerateSummary> {
    let user = credentials.login(&args.username, &args.password).await?;
    info!(username = %user.username, "Logged in");

    state.session.lock().reset();
    let portrait = load_portrait(&args.image).await?;
    match start_analysis(state, portrait).await {
        Ok(outcome) => {
            let session = state.session.lock();
            let name = session.portrait().and_then(Portrait::display_name);
            info!(portrait = name.unwrap_or("-"), "Portrait analysis finished: {outcome:?}");
        }
        Err(err) => warn!("Portrait analysis task failed: {err}"),
    }

    // Explicit flags go in after analysis so they win over detected values.
    for action in args.selection.actions() {
        state.session.lock().apply(action)?;
    }

    let status = generate(state).await?;
    let (image, notes) = {
        let session = state.session.lock();
        let image = match status {
            GenerationStatus::Completed => session
                .generated()
                .cloned()
                .ok_or_else(|| anyhow!(UNEXPECTED_ERROR_MESSAGE))?,
            GenerationStatus::Declined | GenerationStatus::Failed => {
                let message = session.error().unwrap_or(UNEXPECTED_ERROR_MESSAGE);
                return Err(anyhow!(message.to_string()));
            }
            GenerationStatus::Stale => return Err(anyhow!("Generation result was discarded")),
        };
        let notes = session
            .analysis()
            .map(|analysis| analysis.notes.clone())
            .unwrap_or_default();
        (image, notes)
    };

    let exported = export_image(&image, args.format)?;
    let output = resolve_output_path(args.output.as_deref(), &exported, &CONFIG.output_file_stem);
    tokio::fs::write(&output, &exported.bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(path = %output.display(), size = exported.bytes.len(), "Saved ID photo");

    Ok(GenerateSummary { output, notes })
}

/// Account settings save. The caller has to be logged in, which on the
/// command line means presenting the current username and password.
pub async fn run_account(args: AccountArgs, credentials: &CredentialStore) -> Result<User> {
    let mut timer = start_command_timer("account", Some(format!("username={}", args.username)));
    let result: Result<User> = async {
        let update = args.update();
        credentials
            .login(&args.username, &update.current_password)
            .await?;
        Ok(credentials.update_account(update).await?)
    }
    .await;
    match &result {
        Ok(user) => complete_command_timer(&mut timer, "success", Some(user.username.clone())),
        Err(err) => complete_command_timer(&mut timer, "error", Some(format!("{err}"))),
    }
    result
}
