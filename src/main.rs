use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};

mod auth;
mod catalog;
mod config;
mod db;
mod engine;
mod handlers;
mod llm;
mod state;
mod utils;

use auth::CredentialStore;
use catalog::Catalog;
use config::CONFIG;
use db::database::Database;
use handlers::cli::{Cli, Command};
use handlers::commands::{run_account, run_generate, run_options};
use llm::gemini::GeminiPhotoService;
use state::AppState;
use utils::logging::init_logging;

async fn open_credentials() -> anyhow::Result<CredentialStore> {
    let db = Database::init(&CONFIG.database_url).await?;
    let credentials = CredentialStore::new(db, CONFIG.min_password_length);
    credentials
        .ensure_default_credentials(&CONFIG.default_username, &CONFIG.default_password)
        .await?;
    Ok(credentials)
}

async fn run(command: Command) -> anyhow::Result<()> {
    let catalog = Catalog::builtin();

    match command {
        Command::Options(args) => {
            print!("{}", run_options(&catalog, &args)?);
        }
        Command::Generate(args) => {
            let credentials = open_credentials().await?;
            let service = GeminiPhotoService::from_config()?;
            let state = AppState::new(catalog, Arc::new(service));
            let summary = run_generate(args, &credentials, &state).await?;
            for note in &summary.notes {
                println!("Gợi ý: {note}");
            }
            println!("Đã lưu ảnh thẻ: {}", summary.output.display());
        }
        Command::Account(args) => {
            let credentials = open_credentials().await?;
            let user = run_account(args, &credentials).await?;
            println!(
                "Thông tin tài khoản đã được cập nhật thành công! Tên đăng nhập: {}",
                user.username
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let command = Cli::parse().command;

    let _guards = init_logging();
    info!(command = command.name(), "Starting id-photo-studio");

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Command failed: {err:#}");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
