use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One entry of the content catalog. Read-only after load; repeats of the
/// same descriptor in the feed are told apart by their slot key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub id: u32,
    pub src: String,
    pub author: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub likes: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub sends: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub caption: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,
}

pub trait CatalogProvider: Send + Sync {
    fn items(&self) -> &[ItemDescriptor];
}

pub struct StaticCatalog {
    items: Vec<ItemDescriptor>,
}

impl StaticCatalog {
    pub fn new(items: Vec<ItemDescriptor>) -> Result<Self, CatalogError> {
        if items.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { items })
    }
}

impl CatalogProvider for StaticCatalog {
    fn items(&self) -> &[ItemDescriptor] {
        &self.items
    }
}

/// Loads a catalog from a YAML file. The file holds a plain list of
/// descriptors; an empty list is reported through `CatalogError::Empty`
/// at the provider seam, not here.
pub fn load_file(path: &Path) -> Result<Vec<ItemDescriptor>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("catalog: read file {}", path.display()))?;
    let items: Vec<ItemDescriptor> = serde_yaml::from_str(&data)
        .with_context(|| format!("catalog: parse file {}", path.display()))?;
    Ok(items)
}

const CTA_LABELS: [&str; 6] = [
    "Learn more",
    "Shop now",
    "Get offer",
    "Sign up",
    "Shop the deal",
    "Claim offer",
];

pub const CTA_ACCENT_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallToAction {
    pub label: &'static str,
    /// Index into the render layer's accent palette.
    pub accent: usize,
}

/// Roughly 70% of items carry a call-to-action; label and accent cycle by
/// item id so the same item always renders the same button.
pub fn call_to_action(item: &ItemDescriptor) -> Option<CallToAction> {
    if item.id % 10 >= 7 {
        return None;
    }
    Some(CallToAction {
        label: CTA_LABELS[item.id as usize % CTA_LABELS.len()],
        accent: item.id as usize % CTA_ACCENT_COUNT,
    })
}

pub fn builtin() -> Vec<ItemDescriptor> {
    vec![
        sample_item(
            1,
            "https://media.reel-tui.dev/clips/alpine-ridge.mp4",
            "@trailcartographer",
            true,
            ("12.4K", "318", "1.2K"),
            "Sunrise over the ridge line. Sound on for the wind.",
        ),
        sample_item(
            2,
            "https://media.reel-tui.dev/clips/night-market.mp4",
            "@streetfoodatlas",
            false,
            ("8.1K", "204", "890"),
            "Three stalls, one alley, zero regrets.",
        ),
        sample_item(
            3,
            "https://media.reel-tui.dev/clips/studio-loop.mp4",
            "@vinylafternoons",
            true,
            ("22K", "1.1K", "3.4K"),
            "Looping this break until the neighbors complain.",
        ),
        sample_item(
            4,
            "https://media.reel-tui.dev/clips/harbor-fog.mp4",
            "@northpierfilms",
            false,
            ("5.6K", "97", "402"),
            "The fog rolled in faster than the ferry.",
        ),
        sample_item(
            5,
            "https://media.reel-tui.dev/clips/clay-wheel.mp4",
            "@slowthrown",
            false,
            ("15.9K", "642", "2.1K"),
            "Second attempt at the tall cylinder. It survived.",
        ),
        sample_item(
            6,
            "https://media.reel-tui.dev/clips/paper-planes.mp4",
            "@foldcount",
            true,
            ("31K", "2.3K", "5.8K"),
            "Testing the distance record design off the roof.",
        ),
        sample_item(
            7,
            "https://media.reel-tui.dev/clips/tidepool-macro.mp4",
            "@lowtidelens",
            false,
            ("9.7K", "311", "1.5K"),
            "Anemone opening up, 4x speed.",
        ),
        sample_item(
            8,
            "https://media.reel-tui.dev/clips/midnight-ramen.mp4",
            "@lasttrainkitchen",
            true,
            ("18.2K", "760", "2.9K"),
            "Broth has been going since Tuesday.",
        ),
    ]
}

fn sample_item(
    id: u32,
    src: &str,
    author: &str,
    verified: bool,
    counters: (&str, &str, &str),
    caption: &str,
) -> ItemDescriptor {
    ItemDescriptor {
        id,
        src: src.to_string(),
        author: author.to_string(),
        verified,
        likes: counters.0.to_string(),
        comments: counters.1.to_string(),
        sends: counters.2.to_string(),
        avatar: format!("avatar-{id}"),
        caption: caption.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_not_empty() {
        let items = builtin();
        assert!(!items.is_empty());
        let catalog = StaticCatalog::new(items).unwrap();
        assert!(catalog.items().iter().all(|item| !item.src.is_empty()));
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert!(matches!(
            StaticCatalog::new(Vec::new()),
            Err(CatalogError::Empty)
        ));
    }

    #[test]
    fn call_to_action_is_deterministic() {
        let mut with_button = sample_item(3, "s", "a", false, ("", "", ""), "");
        let first = call_to_action(&with_button);
        let second = call_to_action(&with_button);
        assert_eq!(first, second);
        assert!(first.is_some());

        with_button.id = 17;
        assert!(call_to_action(&with_button).is_none());
    }

    #[test]
    fn load_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        let items = builtin();
        std::fs::write(&path, serde_yaml::to_string(&items).unwrap()).unwrap();
        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded, items);
    }
}
