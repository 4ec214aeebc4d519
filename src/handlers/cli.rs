use std::fmt::Write as _;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use crate::auth::AccountUpdate;
use crate::catalog::{Catalog, CatalogEntry};
use crate::engine::selection::{SelectionAction, SelectionState};
use crate::handlers::download::ExportFormat;

#[derive(Parser, Debug)]
#[command(name = "id-photo-studio", version, about = "Tạo ảnh thẻ từ ảnh chân dung")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show every option for a selection, with recommendations and locks.
    Options(OptionsArgs),
    /// Turn a portrait into an ID photo and save it.
    Generate(GenerateArgs),
    /// Change the login name or password.
    Account(AccountArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Options(_) => "options",
            Command::Generate(_) => "generate",
            Command::Account(_) => "account",
        }
    }
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionArgs {
    /// Country template id; locks background and aspect ratio unless `custom`.
    #[arg(long)]
    pub template: Option<String>,
    #[arg(long)]
    pub background: Option<String>,
    /// `#rrggbb`, used with the `custom-color` background.
    #[arg(long)]
    pub custom_color: Option<String>,
    #[arg(long)]
    pub aspect_ratio: Option<String>,
    /// `Nữ` or `Nam`.
    #[arg(long)]
    pub gender: Option<String>,
    #[arg(long)]
    pub document_type: Option<String>,
    #[arg(long)]
    pub outfit: Option<String>,
    #[arg(long)]
    pub hairstyle: Option<String>,
    #[arg(long)]
    pub retouch: Option<String>,
    #[arg(long)]
    pub lighting: Option<String>,
    /// Extra free-text instructions.
    #[arg(long)]
    pub prompt: Option<String>,
}

impl SelectionArgs {
    /// Actions in an order where no later flag is undone by an earlier one:
    /// the template before what it locks, gender and document type before
    /// the outfit and hairstyle they filter.
    pub fn actions(&self) -> Vec<SelectionAction> {
        let steps: [(&Option<String>, fn(String) -> SelectionAction); 11] = [
            (&self.template, SelectionAction::CountryTemplate),
            (&self.background, SelectionAction::Background),
            (&self.custom_color, SelectionAction::CustomColor),
            (&self.aspect_ratio, SelectionAction::AspectRatio),
            (&self.gender, SelectionAction::Gender),
            (&self.document_type, SelectionAction::DocumentType),
            (&self.outfit, SelectionAction::Outfit),
            (&self.hairstyle, SelectionAction::Hairstyle),
            (&self.retouch, SelectionAction::Retouch),
            (&self.lighting, SelectionAction::Lighting),
            (&self.prompt, SelectionAction::CustomPrompt),
        ];
        steps
            .into_iter()
            .filter_map(|(value, action)| value.clone().map(action))
            .collect()
    }
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Print the selection and option lists as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct GenerateArgs {
    #[arg(long)]
    pub username: String,
    #[arg(long)]
    pub password: String,

    /// Portrait file path or http(s) URL.
    #[arg(long)]
    pub image: String,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Output file. Defaults to the configured stem in the working directory.
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, ignore_case = true, default_value_t)]
    pub format: ExportFormat,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AccountArgs {
    #[arg(long)]
    pub username: String,
    #[arg(long)]
    pub current_password: String,
    #[arg(long)]
    pub new_username: Option<String>,
    #[arg(long, requires = "confirm_password")]
    pub new_password: Option<String>,
    #[arg(long)]
    pub confirm_password: Option<String>,
}

impl AccountArgs {
    pub fn update(&self) -> AccountUpdate {
        AccountUpdate {
            current_password: self.current_password.clone(),
            new_username: self.new_username.clone(),
            new_password: self.new_password.clone().unwrap_or_default(),
            confirm_password: self.confirm_password.clone().unwrap_or_default(),
        }
    }
}

fn marker(selected: bool) -> &'static str {
    if selected {
        "[x]"
    } else {
        "[ ]"
    }
}

fn push_entries<'a, T: CatalogEntry + 'a>(
    out: &mut String,
    entries: impl IntoIterator<Item = &'a T>,
    selected_id: &str,
) {
    for entry in entries {
        let _ = writeln!(
            out,
            "  {} {:<24} {}",
            marker(entry.id() == selected_id),
            entry.id(),
            entry.name()
        );
    }
}

/// Text rendering of every control for the given selection, using the same
/// derived lists and lock flags a graphical front end would.
pub fn render_options(catalog: &Catalog, state: &SelectionState) -> String {
    let mut out = String::new();
    let locked = state.is_template_locked();
    let lock_note = if locked {
        format!(" (khóa theo mẫu {})", state.country_template.name)
    } else {
        String::new()
    };

    out.push_str("Mẫu quốc gia:\n");
    push_entries(&mut out, catalog.country_templates, state.country_template.id);

    let _ = writeln!(out, "Màu nền{lock_note}:");
    push_entries(&mut out, catalog.backgrounds, state.background.id);
    if state.background.is_custom_color() {
        let editable = if state.is_custom_color_editable() {
            ""
        } else {
            " (khóa)"
        };
        let _ = writeln!(out, "  Mã màu: {}{editable}", state.custom_color);
    }

    let _ = writeln!(out, "Kích thước ảnh{lock_note}:");
    push_entries(&mut out, catalog.aspect_ratios, state.aspect_ratio.id);

    out.push_str("Giới tính:\n");
    for gender in catalog.genders {
        let _ = writeln!(
            out,
            "  {} {}",
            marker(*gender == state.gender),
            gender.name()
        );
    }

    out.push_str("Loại giấy tờ:\n");
    push_entries(&mut out, catalog.document_types, state.document_type.id);

    let _ = writeln!(out, "Trang phục ({}):", state.document_type.name);
    for choice in state.outfits(catalog) {
        let _ = writeln!(
            out,
            "  {} {:<24} {}{}",
            marker(choice.outfit.id == state.outfit.id),
            choice.outfit.id,
            choice.outfit.name,
            if choice.recommended { "  (Gợi ý)" } else { "" }
        );
    }

    out.push_str("Kiểu tóc:\n");
    push_entries(&mut out, state.hairstyles(catalog), state.hairstyle.id);

    out.push_str("Làm mịn da:\n");
    for option in catalog.retouch_options {
        let _ = writeln!(
            out,
            "  {} {:<24} {} - {}",
            marker(option.id == state.retouch.id),
            option.id,
            option.name,
            option.description
        );
    }

    out.push_str("Chỉnh ánh sáng:\n");
    push_entries(&mut out, catalog.lighting_options, state.lighting.id);

    if !state.custom_prompt.is_empty() {
        let _ = writeln!(out, "Yêu cầu thêm: {}", state.custom_prompt);
    }

    out
}

/// Machine-readable counterpart of [`render_options`].
pub fn options_json(catalog: &Catalog, state: &SelectionState) -> serde_json::Result<String> {
    let value = json!({
        "selection": state,
        "templateLocked": state.is_template_locked(),
        "customColorEditable": state.is_custom_color_editable(),
        "countryTemplates": catalog.country_templates,
        "backgrounds": catalog.backgrounds,
        "aspectRatios": catalog.aspect_ratios,
        "genders": catalog.genders,
        "documentTypes": catalog.document_types,
        "outfits": state.outfits(catalog),
        "hairstyles": state.hairstyles(catalog),
        "retouchOptions": catalog.retouch_options,
        "lightingOptions": catalog.lighting_options,
    });
    serde_json::to_string_pretty(&value)
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;
    use crate::engine::selection::reduce;

    fn parse(parts: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("id-photo-studio").chain(parts.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn selection_flags_are_ordered_by_dependency() {
        let command = parse(&[
            "options",
            "--outfit",
            "mens-suit-black",
            "--prompt",
            "xóa kính",
            "--gender",
            "Nam",
            "--template",
            "custom",
        ])
        .expect("parses");
        let Command::Options(args) = command else {
            panic!("expected options command");
        };
        assert!(!args.json);
        assert_eq!(
            args.selection.actions(),
            vec![
                SelectionAction::CountryTemplate("custom".into()),
                SelectionAction::Gender("Nam".into()),
                SelectionAction::Outfit("mens-suit-black".into()),
                SelectionAction::CustomPrompt("xóa kính".into()),
            ]
        );
    }

    #[test]
    fn ordered_actions_reach_the_requested_outfit() {
        let catalog = Catalog::builtin();
        let selection = SelectionArgs {
            outfit: Some("mens-suit-black".into()),
            document_type: Some("passport-visa".into()),
            gender: Some("Nam".into()),
            ..Default::default()
        };
        let mut state = SelectionState::initial(&catalog);
        for action in selection.actions() {
            state = reduce(&catalog, &state, action).expect("action applies");
        }
        assert_eq!(state.outfit.id, "mens-suit-black");
    }

    #[test]
    fn generate_requires_credentials_and_image() {
        let err = parse(&["generate", "--image", "me.jpg"]).expect_err("missing user");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let command = parse(&[
            "generate",
            "--username",
            "admin",
            "--password",
            "secret",
            "--image",
            "https://example.com/me.jpg",
            "--format",
            "PNG",
            "--background",
            "light-gray",
        ])
        .expect("parses");
        let Command::Generate(args) = command else {
            panic!("expected generate command");
        };
        assert_eq!(args.format, ExportFormat::Png);
        assert_eq!(args.selection.background.as_deref(), Some("light-gray"));
        assert!(args.output.is_none());
    }

    #[test]
    fn format_defaults_to_jpeg_and_accepts_jpg() {
        let base = ["generate", "--username", "a", "--password", "b", "--image", "me.png"];
        let Command::Generate(args) = parse(&base).expect("parses") else {
            panic!("expected generate command");
        };
        assert_eq!(args.format, ExportFormat::Jpeg);

        let with_alias: Vec<&str> = base.iter().copied().chain(["--format", "jpg"]).collect();
        let Command::Generate(args) = parse(&with_alias).expect("parses") else {
            panic!("expected generate command");
        };
        assert_eq!(args.format, ExportFormat::Jpeg);

        let unknown: Vec<&str> = base.iter().copied().chain(["--format", "gif"]).collect();
        assert_eq!(
            parse(&unknown).expect_err("gif").kind(),
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn missing_values_and_unknown_flags_are_errors() {
        assert!(parse(&["options", "--gender"]).is_err());
        let err = parse(&["options", "--size", "3x4"]).expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn account_collects_update() {
        let command = parse(&[
            "account",
            "--username",
            "admin",
            "--current-password",
            "old",
            "--new-password",
            "new-password",
            "--confirm-password",
            "new-password",
        ])
        .expect("parses");
        let Command::Account(args) = command else {
            panic!("expected account command");
        };
        assert_eq!(args.username, "admin");
        let update = args.update();
        assert_eq!(update.current_password, "old");
        assert_eq!(update.new_password, "new-password");
        assert_eq!(update.confirm_password, "new-password");
        assert!(update.new_username.is_none());

        let err = parse(&[
            "account",
            "--username",
            "admin",
            "--current-password",
            "old",
            "--new-password",
            "new-password",
        ])
        .expect_err("confirmation required");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn render_marks_recommendations_and_locks() {
        let catalog = Catalog::builtin();
        let state = SelectionState::initial(&catalog);
        let state = reduce(
            &catalog,
            &state,
            SelectionAction::DocumentType("passport-visa".into()),
        )
        .expect("document type applies");
        let text = render_options(&catalog, &state);
        assert!(text.contains("Trang phục (Hộ chiếu & Visa):"));
        assert!(text.contains("[x] womens-blouse-white"));
        assert!(text.contains("Áo blazer đen  (Gợi ý)"));
        assert!(!text.contains("Áo dài trắng  (Gợi ý)"));
        assert!(text.contains("Áo dài trắng"));
        assert!(!text.contains("mens-side-part"));

        let state = reduce(&catalog, &state, SelectionAction::CountryTemplate("us-passport".into()))
            .expect("template applies");
        let text = render_options(&catalog, &state);
        assert!(text.contains("Màu nền (khóa theo mẫu Mỹ (Hộ chiếu/Visa)):"));
    }

    #[test]
    fn json_lists_derived_options_and_locks() {
        let catalog = Catalog::builtin();
        let state = SelectionState::initial(&catalog);
        let state = reduce(&catalog, &state, SelectionAction::Gender("Nam".into()))
            .expect("gender applies");
        let state = reduce(&catalog, &state, SelectionAction::CountryTemplate("vn-cccd".into()))
            .expect("template applies");

        let text = options_json(&catalog, &state).expect("serializes");
        let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");

        assert_eq!(value["templateLocked"], true);
        assert_eq!(value["customColorEditable"], false);
        assert_eq!(value["selection"]["gender"], "Nam");
        assert_eq!(value["selection"]["countryTemplate"]["id"], "vn-cccd");
        assert_eq!(value["selection"]["background"]["id"], "light-blue");
        assert_eq!(value["selection"]["aspectRatio"]["id"], "4x6");

        let outfits = value["outfits"].as_array().expect("outfit list");
        assert!(outfits.iter().all(|outfit| outfit["gender"] == "Nam"));
        assert!(outfits
            .iter()
            .all(|outfit| outfit["recommended"].is_boolean() && outfit["previewUrl"].is_string()));
        let hairstyles = value["hairstyles"].as_array().expect("hairstyle list");
        assert!(hairstyles
            .iter()
            .all(|style| style["gender"] == "Nam" || style["gender"].is_null()));
        assert_eq!(
            value["countryTemplates"].as_array().map(Vec::len),
            Some(catalog.country_templates.len())
        );
    }
}
