use super::MediaTarget;

pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-2.0-generate-001";
pub const DEFAULT_VALIDATION_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub display_name: &'static str,
    pub target: MediaTarget,
    /// Accepts a seed image (edit for images, image-to-video for videos).
    pub accepts_seed_image: bool,
    pub accepts_seed_video: bool,
}

pub const CATALOG: &[ModelInfo] = &[
    ModelInfo {
        id: DEFAULT_IMAGE_MODEL,
        display_name: "Imagen 4",
        target: MediaTarget::Image,
        accepts_seed_image: false,
        accepts_seed_video: false,
    },
    ModelInfo {
        id: DEFAULT_EDIT_MODEL,
        display_name: "Gemini 2.5 Flash Image",
        target: MediaTarget::Image,
        accepts_seed_image: true,
        accepts_seed_video: false,
    },
    ModelInfo {
        id: DEFAULT_VIDEO_MODEL,
        display_name: "Veo 2",
        target: MediaTarget::Video,
        accepts_seed_image: true,
        accepts_seed_video: true,
    },
    ModelInfo {
        id: "veo-3.0-generate-preview",
        display_name: "Veo 3 Preview",
        target: MediaTarget::Video,
        accepts_seed_image: true,
        accepts_seed_video: false,
    },
    ModelInfo {
        id: "veo-3.0-fast-generate-preview",
        display_name: "Veo 3 Fast Preview",
        target: MediaTarget::Video,
        accepts_seed_image: true,
        accepts_seed_video: false,
    },
];

pub fn find(id: &str) -> Option<&'static ModelInfo> {
    let id = id.trim().strip_prefix("models/").unwrap_or(id.trim());
    CATALOG.iter().find(|info| info.id == id)
}

pub fn for_target(target: MediaTarget) -> impl Iterator<Item = &'static ModelInfo> {
    CATALOG.iter().filter(move |info| info.target == target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_models_with_or_without_prefix() {
        assert_eq!(find("models/veo-2.0-generate-001").map(|m| m.display_name), Some("Veo 2"));
        assert!(find("veo-9").is_none());
    }

    #[test]
    fn catalog_lists_video_models() {
        assert_eq!(for_target(MediaTarget::Video).count(), 3);
    }
}
