use serde::Serialize;

use crate::catalog::{Catalog, DocumentType, Gender, Hairstyle, Outfit};

/// An outfit as offered for the current gender and document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutfitChoice {
    #[serde(flatten)]
    pub outfit: &'static Outfit,
    pub recommended: bool,
}

/// Outfits offered for `gender`, recommended entries for `document_type`
/// first. Catalog order is kept inside both groups. The `all` document type
/// recommends nothing and keeps plain catalog order.
pub fn derive_outfits(
    catalog: &Catalog,
    gender: Gender,
    document_type: &DocumentType,
) -> Vec<OutfitChoice> {
    let matching = catalog.outfits.iter().filter(|outfit| outfit.gender == gender);

    if document_type.is_all() {
        return matching
            .map(|outfit| OutfitChoice {
                outfit,
                recommended: false,
            })
            .collect();
    }

    let (recommended, others): (Vec<&'static Outfit>, Vec<&'static Outfit>) =
        matching.partition(|outfit| outfit.suits(document_type.id));

    recommended
        .into_iter()
        .map(|outfit| OutfitChoice {
            outfit,
            recommended: true,
        })
        .chain(others.into_iter().map(|outfit| OutfitChoice {
            outfit,
            recommended: false,
        }))
        .collect()
}

/// Hairstyles offered for `gender`, in catalog order.
pub fn derive_hairstyles(catalog: &Catalog, gender: Gender) -> Vec<&'static Hairstyle> {
    catalog
        .hairstyles
        .iter()
        .filter(|style| style.available_for(gender))
        .collect()
}
