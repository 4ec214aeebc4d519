use crate::catalog::UNCHANGED_HAIRSTYLE_ID;
use crate::engine::selection::SelectionState;
use crate::llm::media::Portrait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Vui lòng tải ảnh lên trước.")]
    NoImage,
}

/// Everything the image service needs for one generation, already resolved
/// to the display values it is prompted with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub portrait: Portrait,
    pub background: String,
    pub outfit: String,
    pub gender: String,
    pub hairstyle: String,
    pub hairstyle_id: String,
    pub aspect_ratio: String,
    pub aspect_ratio_id: String,
    pub keep_original_ratio: bool,
    pub retouch: String,
    pub lighting: String,
    pub custom_prompt: String,
}

impl GenerationRequest {
    pub fn hairstyle_is_unchanged(&self) -> bool {
        self.hairstyle_id == UNCHANGED_HAIRSTYLE_ID
    }
}

pub fn build_request(
    state: &SelectionState,
    portrait: Option<&Portrait>,
) -> Result<GenerationRequest, RequestError> {
    let portrait = portrait.ok_or(RequestError::NoImage)?;

    let background = if state.background.is_custom_color() {
        state.custom_color.clone()
    } else {
        state.background.name.to_string()
    };

    Ok(GenerationRequest {
        portrait: portrait.clone(),
        background,
        outfit: state.outfit.name.to_string(),
        gender: state.gender.name().to_string(),
        hairstyle: state.hairstyle.name.to_string(),
        hairstyle_id: state.hairstyle.id.to_string(),
        aspect_ratio: state.aspect_ratio.name.to_string(),
        aspect_ratio_id: state.aspect_ratio.id.to_string(),
        keep_original_ratio: state.aspect_ratio.keeps_original(),
        retouch: state.retouch.name.to_string(),
        lighting: state.lighting.name.to_string(),
        custom_prompt: state.custom_prompt.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::engine::selection::{reduce, SelectionAction};
    use crate::llm::media::tests::sample_portrait;

    #[test]
    fn missing_portrait_is_rejected_for_any_selection() {
        let catalog = Catalog::builtin();
        let mut state = SelectionState::initial(&catalog);
        assert_eq!(build_request(&state, None), Err(RequestError::NoImage));

        state = reduce(&catalog, &state, SelectionAction::CountryTemplate("schengen-visa".into()))
            .expect("template applies");
        state = reduce(&catalog, &state, SelectionAction::CustomPrompt("xóa kính".into()))
            .expect("prompt applies");
        assert_eq!(build_request(&state, None), Err(RequestError::NoImage));
    }

    #[test]
    fn display_names_pass_through() {
        let catalog = Catalog::builtin();
        let state = SelectionState::initial(&catalog);
        let state = reduce(&catalog, &state, SelectionAction::CustomPrompt("làm gọn tóc".into()))
            .expect("prompt applies");

        let request = build_request(&state, Some(&sample_portrait())).expect("portrait present");
        assert_eq!(request.background, "Trắng");
        assert_eq!(request.outfit, "Áo sơ mi trắng");
        assert_eq!(request.gender, "Nữ");
        assert_eq!(request.hairstyle, "Giữ nguyên");
        assert!(request.hairstyle_is_unchanged());
        assert_eq!(request.aspect_ratio, "3x4");
        assert_eq!(request.aspect_ratio_id, "3x4");
        assert!(!request.keep_original_ratio);
        assert_eq!(request.retouch, "Nhẹ nhàng");
        assert_eq!(request.lighting, "Bật");
        assert_eq!(request.custom_prompt, "làm gọn tóc");
    }

    #[test]
    fn custom_color_replaces_background_name_only_when_selected() {
        let catalog = Catalog::builtin();
        let portrait = sample_portrait();
        let state = SelectionState::initial(&catalog);
        let state = reduce(&catalog, &state, SelectionAction::Background("custom-color".into()))
            .expect("background applies");
        let state = reduce(&catalog, &state, SelectionAction::CustomColor("#123abc".into()))
            .expect("colour applies");

        let request = build_request(&state, Some(&portrait)).expect("portrait present");
        assert_eq!(request.background, "#123abc");

        let state = reduce(&catalog, &state, SelectionAction::Background("light-gray".into()))
            .expect("background applies");
        let request = build_request(&state, Some(&portrait)).expect("portrait present");
        assert_eq!(request.background, "Xám nhạt");
    }
}
