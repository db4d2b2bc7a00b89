//! Object key contract between pipeline stages.
//!
//! Keys are the sole integration surface between stages. The templates here
//! are resolved against workflow bindings; the free functions build the same
//! keys directly for call sites outside a workflow (catalog queries, CLI).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Template for the input photo, bound to a per-request folder id.
pub const IMAGE_KEY: &str = "images/{id}{ext}";
/// Template for the pose keypoints a stage derives from the photo.
pub const KEYPOINTS_KEY: &str = "keypoints/{id}_keypoints.json";
/// Template for the fitted body mesh.
pub const MODEL_KEY: &str = "output/{id}.obj";
/// Template for the smoothed body mesh.
pub const SMOOTH_MODEL_KEY: &str = "output/{id}_smooth.obj";
/// Template for a garment blend file in the catalog bucket.
pub const GARMENT_KEY: &str = "{clothing}/{gender}/{size}_{garment}.blend";
/// Template for a garment preview render.
pub const PREVIEW_KEY: &str = "previews/{clothing}/{gender}.png";
/// Template for an avatar with a fitted garment.
pub const FIT_KEY: &str = "fits/{size}_{garment}.obj";

/// Error raised when a gender string is not one of the supported values.
#[derive(Debug, Error)]
#[error("invalid gender '{0}': must be 'male' or 'female'")]
pub struct InvalidGender(String);

/// Body model gender, as encoded in catalog paths and stage arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// The lowercase form used in object keys and container arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Gender {
    type Err = InvalidGender;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(InvalidGender(other.to_string())),
        }
    }
}

/// Builds the input photo key. `ext` carries its leading dot (".jpg").
pub fn image_key(id: &str, ext: &str) -> String {
    format!("images/{id}{ext}")
}

/// Builds the keypoints key for a folder id.
pub fn keypoints_key(id: &str) -> String {
    format!("keypoints/{id}_keypoints.json")
}

/// Builds the fitted mesh key for a folder id.
pub fn model_key(id: &str) -> String {
    format!("output/{id}.obj")
}

/// Builds the smoothed mesh key for a folder id.
pub fn smooth_model_key(id: &str) -> String {
    format!("output/{id}_smooth.obj")
}

/// Builds the catalog key for a garment blend file.
pub fn garment_key(clothing: &str, gender: Gender, size: &str) -> String {
    format!(
        "{clothing}/{gender}/{size}_{}.blend",
        garment_display_name(clothing)
    )
}

/// Builds the preview key for a garment.
pub fn preview_key(clothing: &str, gender: Gender) -> String {
    format!("previews/{clothing}/{gender}.png")
}

/// Builds the fitted-garment output key.
pub fn fit_key(clothing: &str, size: &str) -> String {
    format!("fits/{size}_{}.obj", garment_display_name(clothing))
}

/// Converts a garment slug into the Title-Case form used in blend file
/// names: "summer-dress" → "Summer-Dress".
pub fn garment_display_name(clothing: &str) -> String {
    clothing
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_round_trip() {
        assert_eq!("male".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("female".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!(Gender::Male.to_string(), "male");
        assert!("other".parse::<Gender>().is_err());
    }

    #[test]
    fn test_model_keys() {
        assert_eq!(image_key("abc", ".jpg"), "images/abc.jpg");
        assert_eq!(keypoints_key("abc"), "keypoints/abc_keypoints.json");
        assert_eq!(model_key("abc"), "output/abc.obj");
        assert_eq!(smooth_model_key("abc"), "output/abc_smooth.obj");
    }

    #[test]
    fn test_garment_keys() {
        assert_eq!(
            garment_key("summer-dress", Gender::Female, "L"),
            "summer-dress/female/L_Summer-Dress.blend"
        );
        assert_eq!(
            preview_key("summer-dress", Gender::Female),
            "previews/summer-dress/female.png"
        );
        assert_eq!(fit_key("summer-dress", "L"), "fits/L_Summer-Dress.obj");
    }

    #[test]
    fn test_garment_display_name() {
        assert_eq!(garment_display_name("summer-dress"), "Summer-Dress");
        assert_eq!(garment_display_name("shirt"), "Shirt");
        assert_eq!(garment_display_name("t-shirt-v2"), "T-Shirt-V2");
    }

    #[test]
    fn test_two_ids_never_alias() {
        // Key naming for a workflow run derives from one unique folder id,
        // so distinct ids yield disjoint keys at every stage.
        for (a, b) in [
            (image_key("a", ".jpg"), image_key("b", ".jpg")),
            (keypoints_key("a"), keypoints_key("b")),
            (model_key("a"), model_key("b")),
            (smooth_model_key("a"), smooth_model_key("b")),
        ] {
            assert_ne!(a, b);
        }
    }
}
