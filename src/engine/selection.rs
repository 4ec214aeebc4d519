use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::catalog::{
    AspectRatio, Background, Catalog, CountryTemplate, DocumentType, Gender, Hairstyle,
    LightingOption, Outfit, RetouchOption, DEFAULT_CUSTOM_COLOR, UNCHANGED_HAIRSTYLE_ID,
};
use crate::engine::derive::{derive_hairstyles, derive_outfits, OutfitChoice};

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid hex colour pattern"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Không tìm thấy {kind} '{id}'.")]
    UnknownOption { kind: &'static str, id: String },
    #[error("{kind} '{id}' không phù hợp với lựa chọn hiện tại.")]
    Unavailable { kind: &'static str, id: String },
    #[error("{kind} đang bị khóa theo mẫu quốc gia '{template}'. Chọn 'Tùy chỉnh' để thay đổi.")]
    LockedByTemplate {
        kind: &'static str,
        template: &'static str,
    },
    #[error("Chỉ có thể chọn màu tùy chọn khi dùng nền 'Tùy chọn' và mẫu 'Tùy chỉnh'.")]
    CustomColorLocked,
    #[error("Màu '{0}' không hợp lệ, cần dạng #RRGGBB.")]
    InvalidColor(String),
}

/// One user interaction against the selection controls. Ids are the raw
/// catalog ids the presentation layer submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionAction {
    CountryTemplate(String),
    Background(String),
    CustomColor(String),
    AspectRatio(String),
    Gender(String),
    DocumentType(String),
    Outfit(String),
    Hairstyle(String),
    Lighting(String),
    Retouch(String),
    CustomPrompt(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub country_template: &'static CountryTemplate,
    pub background: &'static Background,
    pub custom_color: String,
    pub aspect_ratio: &'static AspectRatio,
    pub gender: Gender,
    pub document_type: &'static DocumentType,
    pub outfit: &'static Outfit,
    pub hairstyle: &'static Hairstyle,
    pub lighting: &'static LightingOption,
    pub retouch: &'static RetouchOption,
    pub custom_prompt: String,
}

impl SelectionState {
    /// Session-start defaults. The catalog is expected to have passed
    /// [`Catalog::validated`].
    pub fn initial(catalog: &Catalog) -> Self {
        let gender = catalog.genders[0];
        let document_type = &catalog.document_types[0];
        let outfit = derive_outfits(catalog, gender, document_type)[0].outfit;

        let state = SelectionState {
            country_template: &catalog.country_templates[0],
            background: &catalog.backgrounds[0],
            custom_color: DEFAULT_CUSTOM_COLOR.to_string(),
            aspect_ratio: &catalog.aspect_ratios[0],
            gender,
            document_type,
            outfit,
            hairstyle: &catalog.hairstyles[0],
            lighting: &catalog.lighting_options[0],
            retouch: catalog.default_retouch(),
            custom_prompt: String::new(),
        };
        enforce_valid_selection(catalog, state)
    }

    pub fn outfits(&self, catalog: &Catalog) -> Vec<OutfitChoice> {
        derive_outfits(catalog, self.gender, self.document_type)
    }

    pub fn hairstyles(&self, catalog: &Catalog) -> Vec<&'static Hairstyle> {
        derive_hairstyles(catalog, self.gender)
    }

    /// Background and aspect ratio follow the template unless it is `custom`.
    pub fn is_template_locked(&self) -> bool {
        !self.country_template.is_custom()
    }

    pub fn is_custom_color_editable(&self) -> bool {
        self.background.is_custom_color() && self.country_template.is_custom()
    }

    pub fn is_consistent(&self, catalog: &Catalog) -> bool {
        self.outfits(catalog)
            .iter()
            .any(|choice| choice.outfit.id == self.outfit.id)
            && self
                .hairstyles(catalog)
                .iter()
                .any(|style| style.id == self.hairstyle.id)
    }
}

/// Applies one action and returns the next state with outfit and hairstyle
/// re-validated against the freshly derived lists. The input state is left
/// untouched, including when the action is rejected.
pub fn reduce(
    catalog: &Catalog,
    state: &SelectionState,
    action: SelectionAction,
) -> Result<SelectionState, SelectionError> {
    let mut next = state.clone();

    match action {
        SelectionAction::CountryTemplate(id) => {
            let template = catalog
                .country_template(&id)
                .ok_or_else(|| unknown("mẫu quốc gia", &id))?;
            next.country_template = template;
            apply_country_template(catalog, &mut next);
        }
        SelectionAction::Background(id) => {
            ensure_unlocked(&next, "Màu nền")?;
            next.background = catalog
                .background(&id)
                .ok_or_else(|| unknown("màu nền", &id))?;
        }
        SelectionAction::CustomColor(value) => {
            if !next.is_custom_color_editable() {
                return Err(SelectionError::CustomColorLocked);
            }
            let value = value.trim();
            if !HEX_COLOR.is_match(value) {
                return Err(SelectionError::InvalidColor(value.to_string()));
            }
            next.custom_color = value.to_ascii_lowercase();
        }
        SelectionAction::AspectRatio(id) => {
            ensure_unlocked(&next, "Tỷ lệ ảnh")?;
            next.aspect_ratio = catalog
                .aspect_ratio(&id)
                .ok_or_else(|| unknown("tỷ lệ ảnh", &id))?;
        }
        SelectionAction::Gender(id) => {
            next.gender = catalog.gender(&id).ok_or_else(|| unknown("giới tính", &id))?;
        }
        SelectionAction::DocumentType(id) => {
            next.document_type = catalog
                .document_type(&id)
                .ok_or_else(|| unknown("loại giấy tờ", &id))?;
        }
        SelectionAction::Outfit(id) => {
            let outfit = catalog.outfit(&id).ok_or_else(|| unknown("trang phục", &id))?;
            if !next.outfits(catalog).iter().any(|choice| choice.outfit.id == outfit.id) {
                return Err(SelectionError::Unavailable {
                    kind: "Trang phục",
                    id,
                });
            }
            next.outfit = outfit;
        }
        SelectionAction::Hairstyle(id) => {
            let hairstyle = catalog
                .hairstyle(&id)
                .ok_or_else(|| unknown("kiểu tóc", &id))?;
            if !hairstyle.available_for(next.gender) {
                return Err(SelectionError::Unavailable {
                    kind: "Kiểu tóc",
                    id,
                });
            }
            next.hairstyle = hairstyle;
        }
        SelectionAction::Lighting(id) => {
            next.lighting = catalog
                .lighting(&id)
                .ok_or_else(|| unknown("chế độ ánh sáng", &id))?;
        }
        SelectionAction::Retouch(id) => {
            next.retouch = catalog
                .retouch(&id)
                .ok_or_else(|| unknown("mức chỉnh da", &id))?;
        }
        SelectionAction::CustomPrompt(text) => {
            next.custom_prompt = text;
        }
    }

    Ok(enforce_valid_selection(catalog, next))
}

/// Copies the template's background and aspect ratio into the state. The
/// `custom` template leaves the current choices alone.
pub fn apply_country_template(catalog: &Catalog, state: &mut SelectionState) {
    let template = state.country_template;
    if template.is_custom() {
        return;
    }
    if let Some(background) = catalog.background(template.background_id) {
        state.background = background;
    }
    if let Some(aspect_ratio) = catalog.aspect_ratio(template.aspect_ratio_id) {
        state.aspect_ratio = aspect_ratio;
    }
}

/// Replaces an outfit or hairstyle that the current gender and document type
/// no longer offer, repeating until nothing changes.
pub fn enforce_valid_selection(catalog: &Catalog, mut state: SelectionState) -> SelectionState {
    loop {
        if state.is_consistent(catalog) {
            return state;
        }
        let mut changed = false;

        let outfits = state.outfits(catalog);
        if !outfits.iter().any(|choice| choice.outfit.id == state.outfit.id) {
            if let Some(first) = outfits.first() {
                debug!(
                    from = state.outfit.id,
                    to = first.outfit.id,
                    gender = %state.gender,
                    "Replacing outfit no longer offered"
                );
                state.outfit = first.outfit;
                changed = true;
            }
        }

        let hairstyles = state.hairstyles(catalog);
        if !hairstyles.iter().any(|style| style.id == state.hairstyle.id) {
            let fallback = hairstyles
                .iter()
                .find(|style| style.id == UNCHANGED_HAIRSTYLE_ID)
                .or_else(|| hairstyles.first());
            if let Some(&fallback) = fallback {
                debug!(
                    from = state.hairstyle.id,
                    to = fallback.id,
                    gender = %state.gender,
                    "Replacing hairstyle no longer offered"
                );
                state.hairstyle = fallback;
                changed = true;
            }
        }

        if !changed {
            return state;
        }
    }
}

fn ensure_unlocked(state: &SelectionState, kind: &'static str) -> Result<(), SelectionError> {
    if state.is_template_locked() {
        return Err(SelectionError::LockedByTemplate {
            kind,
            template: state.country_template.id,
        });
    }
    Ok(())
}

fn unknown(kind: &'static str, id: &str) -> SelectionError {
    SelectionError::UnknownOption {
        kind,
        id: id.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(state: &SelectionState, action: SelectionAction) -> SelectionState {
        reduce(&Catalog::builtin(), state, action).expect("action should be accepted")
    }

    fn gender(id: &str) -> SelectionAction {
        SelectionAction::Gender(id.to_string())
    }

    fn template(id: &str) -> SelectionAction {
        SelectionAction::CountryTemplate(id.to_string())
    }

    #[test]
    fn initial_state_uses_documented_defaults() {
        let catalog = Catalog::builtin();
        let state = SelectionState::initial(&catalog);

        assert_eq!(state.country_template.id, "custom");
        assert_eq!(state.background.id, "white");
        assert_eq!(state.custom_color, "#4a90e2");
        assert_eq!(state.aspect_ratio.id, "3x4");
        assert_eq!(state.gender, Gender::Female);
        assert_eq!(state.document_type.id, "all");
        assert_eq!(state.outfit.id, "womens-blouse-white");
        assert_eq!(state.hairstyle.id, "none");
        assert_eq!(state.lighting.id, "on");
        assert_eq!(state.retouch.id, "gentle");
        assert!(state.custom_prompt.is_empty());
        assert!(state.is_consistent(&catalog));
    }

    #[test]
    fn switching_gender_replaces_outfit_with_first_for_new_gender() {
        let state = SelectionState::initial(&Catalog::builtin());
        let state = apply(&state, SelectionAction::Outfit("womens-suit-navy".into()));
        let state = apply(&state, gender("Nam"));

        assert_eq!(state.gender, Gender::Male);
        assert_eq!(state.outfit.id, "mens-shirt-white");
    }

    #[test]
    fn switching_gender_falls_back_to_unchanged_hairstyle() {
        let state = SelectionState::initial(&Catalog::builtin());
        let state = apply(&state, SelectionAction::Hairstyle("womens-wolf-cut".into()));
        let state = apply(&state, gender("Nam"));
        assert_eq!(state.hairstyle.id, "none");
    }

    #[test]
    fn switching_gender_keeps_unchanged_hairstyle() {
        let state = SelectionState::initial(&Catalog::builtin());
        let state = apply(&state, gender("Nam"));
        let state = apply(&state, SelectionAction::Hairstyle("mens-buzz-cut".into()));
        let state = apply(&state, gender("Nam"));
        assert_eq!(state.hairstyle.id, "mens-buzz-cut");
    }

    #[test]
    fn document_type_change_keeps_still_offered_outfit() {
        let state = SelectionState::initial(&Catalog::builtin());
        let state = apply(&state, SelectionAction::Outfit("womens-turtleneck-black".into()));
        let state = apply(&state, SelectionAction::DocumentType("passport-visa".into()));
        assert_eq!(state.outfit.id, "womens-turtleneck-black");
    }

    #[test]
    fn us_passport_template_overrides_background_and_aspect_ratio() {
        let state = SelectionState::initial(&Catalog::builtin());
        let state = apply(&state, SelectionAction::Background("light-blue".into()));
        let state = apply(&state, SelectionAction::AspectRatio("4x6".into()));

        let state = apply(&state, template("us-passport"));
        assert_eq!(state.background.id, "white");
        assert_eq!(state.aspect_ratio.id, "2x2");
        assert!(state.is_template_locked());

        let state = apply(&state, template("custom"));
        assert_eq!(state.background.id, "white");
        assert_eq!(state.aspect_ratio.id, "2x2");
        assert!(!state.is_template_locked());

        let state = apply(&state, SelectionAction::Background("off-white".into()));
        assert_eq!(state.background.id, "off-white");
    }

    #[test]
    fn locked_template_rejects_manual_background() {
        let catalog = Catalog::builtin();
        let state = apply(&SelectionState::initial(&catalog), template("vn-cccd"));

        let err = reduce(&catalog, &state, SelectionAction::Background("white".into()))
            .unwrap_err();
        assert_eq!(
            err,
            SelectionError::LockedByTemplate {
                kind: "Màu nền",
                template: "vn-cccd",
            }
        );
        let err = reduce(&catalog, &state, SelectionAction::AspectRatio("3x4".into()))
            .unwrap_err();
        assert!(matches!(err, SelectionError::LockedByTemplate { .. }));
    }

    #[test]
    fn custom_color_requires_custom_background_and_template() {
        let catalog = Catalog::builtin();
        let state = SelectionState::initial(&catalog);

        let err = reduce(&catalog, &state, SelectionAction::CustomColor("#112233".into()))
            .unwrap_err();
        assert_eq!(err, SelectionError::CustomColorLocked);

        let state = apply(&state, SelectionAction::Background("custom-color".into()));
        let state = apply(&state, SelectionAction::CustomColor(" #AABBCC ".into()));
        assert_eq!(state.custom_color, "#aabbcc");

        let err = reduce(&catalog, &state, SelectionAction::CustomColor("blue".into()))
            .unwrap_err();
        assert_eq!(err, SelectionError::InvalidColor("blue".into()));
    }

    #[test]
    fn outfit_of_other_gender_is_rejected() {
        let catalog = Catalog::builtin();
        let state = SelectionState::initial(&catalog);
        let err = reduce(&catalog, &state, SelectionAction::Outfit("mens-suit-black".into()))
            .unwrap_err();
        assert!(matches!(err, SelectionError::Unavailable { .. }));
        let err = reduce(&catalog, &state, SelectionAction::Hairstyle("mens-short".into()))
            .unwrap_err();
        assert!(matches!(err, SelectionError::Unavailable { .. }));
    }

    #[test]
    fn unknown_ids_are_reported() {
        let catalog = Catalog::builtin();
        let state = SelectionState::initial(&catalog);
        let err = reduce(&catalog, &state, gender("Other")).unwrap_err();
        assert_eq!(
            err,
            SelectionError::UnknownOption {
                kind: "giới tính",
                id: "Other".into(),
            }
        );
    }

    #[test]
    fn invariant_holds_after_every_top_level_mutation() {
        let catalog = Catalog::builtin();
        let mut actions = Vec::new();
        for round in 0..3 {
            for document_type in catalog.document_types {
                for template in catalog.country_templates {
                    for &g in catalog.genders {
                        actions.push(SelectionAction::DocumentType(document_type.id.into()));
                        actions.push(SelectionAction::CountryTemplate(template.id.into()));
                        actions.push(SelectionAction::Gender(g.id().into()));
                    }
                }
            }
            if round == 1 {
                actions.push(SelectionAction::Outfit("womens-ao-dai-white".into()));
            }
        }

        let mut state = SelectionState::initial(&catalog);
        for action in actions {
            match reduce(&catalog, &state, action) {
                Ok(next) => state = next,
                Err(err) => assert!(matches!(err, SelectionError::Unavailable { .. })),
            }
            assert!(state.is_consistent(&catalog));
        }
    }

    #[test]
    fn enforcement_is_a_fixed_point() {
        let catalog = Catalog::builtin();
        let mut state = SelectionState::initial(&catalog);
        state.gender = Gender::Male;
        let once = enforce_valid_selection(&catalog, state);
        let twice = enforce_valid_selection(&catalog, once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.outfit.id, "mens-shirt-white");
    }
}
