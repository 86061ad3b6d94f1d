use serde::{Deserialize, Serialize};

/// The kind of content a node carries. Used for diagnostics and branching,
/// never for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Text shown on the overlay (subtitles, captions).
    Text,
    /// A 2D image shown on the overlay.
    Image,
    /// A renderer-placed scene resource.
    Entity,
    /// A one-shot event.
    Event,
    /// A group whose children are active together.
    Concurrent,
    /// A group whose children are revealed at time offsets.
    Timelined,
    /// A group driven by a media clock.
    Media,
}

impl ContentKind {
    /// Whether nodes of this kind own child nodes.
    pub fn is_group(&self) -> bool {
        matches!(
            self,
            ContentKind::Concurrent | ContentKind::Timelined | ContentKind::Media
        )
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Text => write!(f, "text"),
            ContentKind::Image => write!(f, "image"),
            ContentKind::Entity => write!(f, "entity"),
            ContentKind::Event => write!(f, "event"),
            ContentKind::Concurrent => write!(f, "concurrent"),
            ContentKind::Timelined => write!(f, "timelined"),
            ContentKind::Media => write!(f, "media"),
        }
    }
}

/// The kind of a bundle resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A 3D scene resource (USDZ, reality, glTF).
    Model,
    Image,
    Video,
    Audio,
    Other,
}

impl ResourceKind {
    /// Guess the kind from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "usdz" | "usda" | "usdc" | "reality" | "gltf" | "glb" => ResourceKind::Model,
            "png" | "jpg" | "jpeg" | "heic" | "webp" => ResourceKind::Image,
            "mp4" | "mov" | "m4v" | "webm" => ResourceKind::Video,
            "m4a" | "mp3" | "wav" | "aac" => ResourceKind::Audio,
            _ => ResourceKind::Other,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Model => write!(f, "model"),
            ResourceKind::Image => write!(f, "image"),
            ResourceKind::Video => write!(f, "video"),
            ResourceKind::Audio => write!(f, "audio"),
            ResourceKind::Other => write!(f, "other"),
        }
    }
}
