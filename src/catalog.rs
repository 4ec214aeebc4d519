use std::fmt;

use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};

pub const CUSTOM_COLOR_BACKGROUND_ID: &str = "custom-color";
pub const ALL_DOCUMENT_TYPES_ID: &str = "all";
pub const CUSTOM_TEMPLATE_ID: &str = "custom";
pub const ORIGINAL_ASPECT_RATIO_ID: &str = "original";
pub const UNCHANGED_HAIRSTYLE_ID: &str = "none";
pub const DEFAULT_CUSTOM_COLOR: &str = "#4a90e2";

const ASSET_BASE_URL: &str = "https://storage.googleapis.com/aistudio-hosting/ai-id-photo-assets";

/// Preview images are stored as paths relative to the asset host.
fn serialize_asset_url<S: Serializer>(path: &&'static str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{ASSET_BASE_URL}/{path}"))
}

/// Common accessors shared by every catalog record.
pub trait CatalogEntry: 'static {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
}

macro_rules! catalog_entry {
    ($ty:ty) => {
        impl CatalogEntry for $ty {
            fn id(&self) -> &'static str {
                self.id
            }

            fn name(&self) -> &'static str {
                self.name
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Gender {
    #[serde(rename = "Nữ")]
    Female,
    #[serde(rename = "Nam")]
    Male,
}

impl Gender {
    pub fn id(self) -> &'static str {
        match self {
            Gender::Female => "Nữ",
            Gender::Male => "Nam",
        }
    }

    pub fn name(self) -> &'static str {
        self.id()
    }

    pub fn from_id(id: &str) -> Option<Gender> {
        match id.trim() {
            "Nữ" => Some(Gender::Female),
            "Nam" => Some(Gender::Male),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Background {
    pub id: &'static str,
    pub name: &'static str,
    /// Swatch token for renderers; empty for the custom-colour sentinel.
    pub fill: &'static str,
}

impl Background {
    pub fn is_custom_color(&self) -> bool {
        self.id == CUSTOM_COLOR_BACKGROUND_ID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outfit {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(rename = "previewUrl", serialize_with = "serialize_asset_url")]
    pub preview: &'static str,
    pub gender: Gender,
    /// Document types this outfit is recommended for. Empty means none.
    pub document_types: &'static [&'static str],
}

impl Outfit {
    pub fn suits(&self, document_type_id: &str) -> bool {
        self.document_types.contains(&document_type_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hairstyle {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(rename = "previewUrl", serialize_with = "serialize_asset_url")]
    pub preview: &'static str,
    /// `None` means the hairstyle is offered regardless of gender.
    pub gender: Option<Gender>,
}

impl Hairstyle {
    pub fn available_for(&self, gender: Gender) -> bool {
        self.gender.map_or(true, |affinity| affinity == gender)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentType {
    pub id: &'static str,
    pub name: &'static str,
}

impl DocumentType {
    pub fn is_all(&self) -> bool {
        self.id == ALL_DOCUMENT_TYPES_ID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AspectRatio {
    pub id: &'static str,
    pub name: &'static str,
}

impl AspectRatio {
    pub fn keeps_original(&self) -> bool {
        self.id == ORIGINAL_ASPECT_RATIO_ID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightingOption {
    pub id: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetouchOption {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub background_id: &'static str,
    pub aspect_ratio_id: &'static str,
}

impl CountryTemplate {
    pub fn is_custom(&self) -> bool {
        self.id == CUSTOM_TEMPLATE_ID
    }
}

catalog_entry!(Background);
catalog_entry!(Outfit);
catalog_entry!(Hairstyle);
catalog_entry!(DocumentType);
catalog_entry!(AspectRatio);
catalog_entry!(LightingOption);
catalog_entry!(RetouchOption);
catalog_entry!(CountryTemplate);

pub fn find_by_id<T: CatalogEntry>(entries: &'static [T], id: &str) -> Option<&'static T> {
    let id = id.trim();
    entries.iter().find(|entry| entry.id() == id)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog list '{0}' is empty")]
    Empty(&'static str),
    #[error("duplicate id '{id}' in catalog list '{list}'")]
    DuplicateId { list: &'static str, id: &'static str },
    #[error("no outfit is available for gender {0}")]
    NoOutfitForGender(Gender),
    #[error("no hairstyle is available for gender {0}")]
    NoHairstyleForGender(Gender),
    #[error("country template '{template}' references unknown {kind} '{id}'")]
    DanglingReference {
        template: &'static str,
        kind: &'static str,
        id: &'static str,
    },
}

/// The full set of option lists a session selects from.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    pub backgrounds: &'static [Background],
    pub outfits: &'static [Outfit],
    pub genders: &'static [Gender],
    pub hairstyles: &'static [Hairstyle],
    pub retouch_options: &'static [RetouchOption],
    pub aspect_ratios: &'static [AspectRatio],
    pub country_templates: &'static [CountryTemplate],
    pub document_types: &'static [DocumentType],
    pub lighting_options: &'static [LightingOption],
}

static BUILTIN_CATALOG: Lazy<Catalog> = Lazy::new(|| {
    Catalog {
        backgrounds: BACKGROUNDS,
        outfits: OUTFITS,
        genders: GENDERS,
        hairstyles: HAIRSTYLES,
        retouch_options: RETOUCH_OPTIONS,
        aspect_ratios: ASPECT_RATIOS,
        country_templates: COUNTRY_TEMPLATES,
        document_types: DOCUMENT_TYPES,
        lighting_options: LIGHTING_OPTIONS,
    }
    .validated()
    .expect("Built-in catalog is inconsistent")
});

impl Catalog {
    pub fn builtin() -> Catalog {
        *BUILTIN_CATALOG
    }

    /// Checks the structural guarantees the selection engine relies on:
    /// every list is non-empty with unique ids, every gender has at least
    /// one outfit and hairstyle, and template references resolve.
    pub fn validated(self) -> Result<Catalog, CatalogError> {
        check_list("backgrounds", self.backgrounds)?;
        check_list("outfits", self.outfits)?;
        check_list("hairstyles", self.hairstyles)?;
        check_list("retouch_options", self.retouch_options)?;
        check_list("aspect_ratios", self.aspect_ratios)?;
        check_list("country_templates", self.country_templates)?;
        check_list("document_types", self.document_types)?;
        check_list("lighting_options", self.lighting_options)?;
        if self.genders.is_empty() {
            return Err(CatalogError::Empty("genders"));
        }

        for &gender in self.genders {
            if !self.outfits.iter().any(|outfit| outfit.gender == gender) {
                return Err(CatalogError::NoOutfitForGender(gender));
            }
            if !self.hairstyles.iter().any(|style| style.available_for(gender)) {
                return Err(CatalogError::NoHairstyleForGender(gender));
            }
        }

        for template in self.country_templates.iter().filter(|t| !t.is_custom()) {
            if self.background(template.background_id).is_none() {
                return Err(CatalogError::DanglingReference {
                    template: template.id,
                    kind: "background",
                    id: template.background_id,
                });
            }
            if self.aspect_ratio(template.aspect_ratio_id).is_none() {
                return Err(CatalogError::DanglingReference {
                    template: template.id,
                    kind: "aspect ratio",
                    id: template.aspect_ratio_id,
                });
            }
        }

        Ok(self)
    }

    pub fn background(&self, id: &str) -> Option<&'static Background> {
        find_by_id(self.backgrounds, id)
    }

    pub fn outfit(&self, id: &str) -> Option<&'static Outfit> {
        find_by_id(self.outfits, id)
    }

    pub fn hairstyle(&self, id: &str) -> Option<&'static Hairstyle> {
        find_by_id(self.hairstyles, id)
    }

    pub fn gender(&self, id: &str) -> Option<Gender> {
        Gender::from_id(id).filter(|gender| self.genders.contains(gender))
    }

    pub fn retouch(&self, id: &str) -> Option<&'static RetouchOption> {
        find_by_id(self.retouch_options, id)
    }

    pub fn aspect_ratio(&self, id: &str) -> Option<&'static AspectRatio> {
        find_by_id(self.aspect_ratios, id)
    }

    pub fn country_template(&self, id: &str) -> Option<&'static CountryTemplate> {
        find_by_id(self.country_templates, id)
    }

    pub fn document_type(&self, id: &str) -> Option<&'static DocumentType> {
        find_by_id(self.document_types, id)
    }

    pub fn lighting(&self, id: &str) -> Option<&'static LightingOption> {
        find_by_id(self.lighting_options, id)
    }

    /// Middle entry of the weakest-to-strongest retouch list.
    pub fn default_retouch(&self) -> &'static RetouchOption {
        &self.retouch_options[self.retouch_options.len() / 2]
    }
}

fn check_list<T: CatalogEntry>(list: &'static str, entries: &'static [T]) -> Result<(), CatalogError> {
    if entries.is_empty() {
        return Err(CatalogError::Empty(list));
    }
    for (index, entry) in entries.iter().enumerate() {
        if entries[..index].iter().any(|earlier| earlier.id() == entry.id()) {
            return Err(CatalogError::DuplicateId {
                list,
                id: entry.id(),
            });
        }
    }
    Ok(())
}

pub static BACKGROUNDS: &[Background] = &[
    Background { id: "white", name: "Trắng", fill: "#ffffff" },
    Background { id: "light-gray", name: "Xám nhạt", fill: "#e2e8f0" },
    Background { id: "light-blue", name: "Xanh nhạt", fill: "#dbeafe" },
    Background { id: "off-white", name: "Trắng ngà", fill: "#f8fafc" },
    Background { id: CUSTOM_COLOR_BACKGROUND_ID, name: "Tùy chọn", fill: "" },
];

const EVERY_DOCUMENT: &[&str] = &["passport-visa", "cccd", "student", "professional"];
const STUDENT_AND_CCCD: &[&str] = &["student", "cccd"];
const FORMAL: &[&str] = &["passport-visa", "professional"];

pub static OUTFITS: &[Outfit] = &[
    Outfit { id: "womens-blouse-white", name: "Áo sơ mi trắng", preview: "outfits/womens-blouse-white.png", gender: Gender::Female, document_types: EVERY_DOCUMENT },
    Outfit { id: "womens-blouse-blue", name: "Sơ mi xanh pastel", preview: "outfits/womens-blouse-blue.png", gender: Gender::Female, document_types: STUDENT_AND_CCCD },
    Outfit { id: "womens-blazer-black", name: "Áo blazer đen", preview: "outfits/womens-blazer-black.png", gender: Gender::Female, document_types: FORMAL },
    Outfit { id: "womens-suit-gray", name: "Vest xám", preview: "outfits/womens-suit-gray.png", gender: Gender::Female, document_types: FORMAL },
    Outfit { id: "womens-suit-navy", name: "Vest xanh navy", preview: "outfits/womens-suit-navy.png", gender: Gender::Female, document_types: FORMAL },
    Outfit { id: "womens-dress-black", name: "Váy công sở đen", preview: "outfits/womens-dress-black.png", gender: Gender::Female, document_types: &["professional"] },
    Outfit { id: "womens-turtleneck-black", name: "Áo len cổ lọ", preview: "outfits/womens-turtleneck-black.png", gender: Gender::Female, document_types: &[] },
    Outfit { id: "womens-ao-dai-white", name: "Áo dài trắng", preview: "outfits/womens-ao-dai-white.png", gender: Gender::Female, document_types: &["student"] },
    Outfit { id: "mens-shirt-white", name: "Áo sơ mi trắng", preview: "outfits/mens-shirt-white.png", gender: Gender::Male, document_types: EVERY_DOCUMENT },
    Outfit { id: "mens-polo-white", name: "Áo polo trắng", preview: "outfits/mens-polo-white.png", gender: Gender::Male, document_types: STUDENT_AND_CCCD },
    Outfit { id: "mens-suit-black", name: "Vest đen", preview: "outfits/mens-suit-black.png", gender: Gender::Male, document_types: FORMAL },
    Outfit { id: "mens-suit-navy", name: "Vest xanh navy", preview: "outfits/mens-suit-navy.png", gender: Gender::Male, document_types: FORMAL },
    Outfit { id: "mens-suit-gray", name: "Vest xám", preview: "outfits/mens-suit-gray.png", gender: Gender::Male, document_types: FORMAL },
    Outfit { id: "mens-suit-beige", name: "Vest màu be", preview: "outfits/mens-suit-beige.png", gender: Gender::Male, document_types: &["professional"] },
    Outfit { id: "mens-sweater-vest", name: "Vest gile len", preview: "outfits/mens-sweater-vest.png", gender: Gender::Male, document_types: &["student"] },
    Outfit { id: "mens-sweater-gray", name: "Áo len xám", preview: "outfits/mens-sweater-gray.png", gender: Gender::Male, document_types: &[] },
];

pub static GENDERS: &[Gender] = &[Gender::Female, Gender::Male];

pub static HAIRSTYLES: &[Hairstyle] = &[
    Hairstyle { id: UNCHANGED_HAIRSTYLE_ID, name: "Giữ nguyên", preview: "hairstyles/none.png", gender: None },
    Hairstyle { id: "womens-long-wavy", name: "Tóc dài gợn sóng", preview: "hairstyles/womens-long-wavy.png", gender: Some(Gender::Female) },
    Hairstyle { id: "womens-long-straight", name: "Tóc dài thẳng", preview: "hairstyles/womens-long-straight.png", gender: Some(Gender::Female) },
    Hairstyle { id: "womens-short-bob", name: "Tóc bob ngắn", preview: "hairstyles/womens-short-bob.png", gender: Some(Gender::Female) },
    Hairstyle { id: "womens-pixie-edgy", name: "Tóc tém pixie cá tính", preview: "hairstyles/womens-pixie-edgy.png", gender: Some(Gender::Female) },
    Hairstyle { id: "womens-curly-layers", name: "Tóc layer uốn xoăn", preview: "hairstyles/womens-curly-layers.png", gender: Some(Gender::Female) },
    Hairstyle { id: "womens-french-bob", name: "Tóc bob kiểu Pháp", preview: "hairstyles/womens-french-bob.png", gender: Some(Gender::Female) },
    Hairstyle { id: "womens-wolf-cut", name: "Tóc wolf-cut hiện đại", preview: "hairstyles/womens-wolf-cut.png", gender: Some(Gender::Female) },
    Hairstyle { id: "mens-short", name: "Tóc ngắn gọn gàng", preview: "hairstyles/mens-short.png", gender: Some(Gender::Male) },
    Hairstyle { id: "mens-side-part", name: "Tóc rẽ ngôi", preview: "hairstyles/mens-side-part.png", gender: Some(Gender::Male) },
    Hairstyle { id: "mens-light-perm", name: "Tóc uốn xoăn nhẹ", preview: "hairstyles/mens-light-perm.png", gender: Some(Gender::Male) },
    Hairstyle { id: "mens-two-block", name: "Tóc two-block layer", preview: "hairstyles/mens-two-block.png", gender: Some(Gender::Male) },
    Hairstyle { id: "mens-eboy-curtain", name: "Tóc E-boy vuốt rủ", preview: "hairstyles/mens-eboy-curtain.png", gender: Some(Gender::Male) },
    Hairstyle { id: "mens-buzz-cut", name: "Tóc buzz cut", preview: "hairstyles/mens-buzz-cut.png", gender: Some(Gender::Male) },
];

pub static RETOUCH_OPTIONS: &[RetouchOption] = &[
    RetouchOption { id: "none", name: "Không", description: "Giữ nguyên làn da như ảnh gốc." },
    RetouchOption { id: "gentle", name: "Nhẹ nhàng", description: "Làm mịn da nhẹ và đều màu, giữ lại kết cấu da tự nhiên." },
    RetouchOption { id: "professional", name: "Chuyên nghiệp", description: "Làm mịn da, tạo khối và bắt sáng để làm nổi bật đường nét." },
];

pub static ASPECT_RATIOS: &[AspectRatio] = &[
    AspectRatio { id: "3x4", name: "3x4" },
    AspectRatio { id: "4x6", name: "4x6" },
    AspectRatio { id: "2x3", name: "2x3" },
    AspectRatio { id: "2x2", name: "2x2 (Hộ chiếu Mỹ)" },
    AspectRatio { id: "3.5x4.5cm", name: "3.5cm x 4.5cm (Schengen)" },
    AspectRatio { id: ORIGINAL_ASPECT_RATIO_ID, name: "Ảnh gốc" },
];

pub static COUNTRY_TEMPLATES: &[CountryTemplate] = &[
    CountryTemplate { id: CUSTOM_TEMPLATE_ID, name: "Tùy chỉnh", background_id: "", aspect_ratio_id: "" },
    CountryTemplate { id: "vn-cccd", name: "Việt Nam (CCCD/Hộ chiếu)", background_id: "light-blue", aspect_ratio_id: "4x6" },
    CountryTemplate { id: "us-passport", name: "Mỹ (Hộ chiếu/Visa)", background_id: "white", aspect_ratio_id: "2x2" },
    CountryTemplate { id: "schengen-visa", name: "Châu Âu (Visa Schengen)", background_id: "light-gray", aspect_ratio_id: "3.5x4.5cm" },
];

pub static DOCUMENT_TYPES: &[DocumentType] = &[
    DocumentType { id: ALL_DOCUMENT_TYPES_ID, name: "Tất cả trang phục" },
    DocumentType { id: "passport-visa", name: "Hộ chiếu & Visa" },
    DocumentType { id: "cccd", name: "CCCD/CMND" },
    DocumentType { id: "student", name: "Thẻ sinh viên" },
    DocumentType { id: "professional", name: "Hồ sơ chuyên nghiệp" },
];

pub static LIGHTING_OPTIONS: &[LightingOption] = &[
    LightingOption { id: "on", name: "Bật" },
    LightingOption { id: "off", name: "Tắt" },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_passes_validation() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.outfits.len(), 16);
        assert_eq!(catalog.hairstyles.len(), 14);
        assert_eq!(catalog.default_retouch().id, "gentle");
    }

    #[test]
    fn exactly_one_hairstyle_has_no_gender_affinity() {
        let unchanged: Vec<_> = HAIRSTYLES.iter().filter(|style| style.gender.is_none()).collect();
        assert_eq!(unchanged.len(), 1);
        assert_eq!(unchanged[0].id, UNCHANGED_HAIRSTYLE_ID);
    }

    #[test]
    fn lookups_trim_and_match_ids() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.background(" white ").map(|bg| bg.name), Some("Trắng"));
        assert_eq!(catalog.gender("Nam"), Some(Gender::Male));
        assert!(catalog.gender("male").is_none());
        assert!(catalog.country_template("fr-passport").is_none());
    }

    #[test]
    fn dangling_template_reference_is_rejected() {
        static BROKEN_TEMPLATES: &[CountryTemplate] = &[CountryTemplate {
            id: "jp-passport",
            name: "Nhật Bản",
            background_id: "pink",
            aspect_ratio_id: "3x4",
        }];
        let catalog = Catalog {
            country_templates: BROKEN_TEMPLATES,
            ..Catalog::builtin()
        };
        assert_eq!(
            catalog.validated().unwrap_err(),
            CatalogError::DanglingReference {
                template: "jp-passport",
                kind: "background",
                id: "pink",
            }
        );
    }

    #[test]
    fn gender_without_outfits_is_rejected() {
        static FEMALE_ONLY: &[Outfit] = &[Outfit {
            id: "only",
            name: "Only",
            preview: "outfits/only.png",
            gender: Gender::Female,
            document_types: &[],
        }];
        let catalog = Catalog {
            outfits: FEMALE_ONLY,
            ..Catalog::builtin()
        };
        assert_eq!(
            catalog.validated().unwrap_err(),
            CatalogError::NoOutfitForGender(Gender::Male)
        );
    }

    #[test]
    fn previews_serialize_as_asset_urls() {
        let outfit = serde_json::to_value(OUTFITS[0]).expect("outfit serializes");
        assert_eq!(
            outfit["previewUrl"],
            format!("{ASSET_BASE_URL}/outfits/womens-blouse-white.png")
        );
        assert_eq!(outfit["gender"], "Nữ");
        assert!(outfit["documentTypes"].is_array());

        let hairstyle = serde_json::to_value(HAIRSTYLES[0]).expect("hairstyle serializes");
        assert!(hairstyle["previewUrl"]
            .as_str()
            .is_some_and(|url| url.ends_with("/hairstyles/none.png")));
        assert!(hairstyle["gender"].is_null());
    }
}
