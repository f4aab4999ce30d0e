//! Encode profiles and the fallback picker that chooses among them.

mod picker;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::is_safe_segment;

pub use picker::{pick_quality, QualityFallbackPicker, NEUTRAL_QUALITY, ORIGINAL_QUALITY};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QualityError {
    #[error("quality catalog must contain at least one profile")]
    Empty,
    #[error("duplicate quality profile name: {0}")]
    DuplicateName(String),
    #[error("quality profile name {0:?} cannot be used in file names or quality lists")]
    InvalidName(String),
    #[error("quality profiles {first} and {second} share height {height}")]
    DuplicateHeight {
        first: String,
        second: String,
        height: u32,
    },
    #[error("quality profile {name} has invalid geometry {width}x{height}")]
    InvalidGeometry { name: String, width: u32, height: u32 },
    #[error("quality profile {0} has a zero target bitrate")]
    ZeroBitrate(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QualityProfile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub target_bitrate_kbps: u32,
}

impl QualityProfile {
    pub fn new(name: impl Into<String>, width: u32, height: u32, target_bitrate_kbps: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            target_bitrate_kbps,
        }
    }
}

/// Immutable, height-ordered set of target encodes.
///
/// Built once from configuration and handed to whoever needs it; there is no
/// process-wide instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityProfileCatalog {
    profiles: Vec<QualityProfile>,
}

impl QualityProfileCatalog {
    pub fn new(mut profiles: Vec<QualityProfile>) -> Result<Self, QualityError> {
        if profiles.is_empty() {
            return Err(QualityError::Empty);
        }
        let mut seen = HashSet::new();
        for profile in &profiles {
            if !is_safe_segment(&profile.name) || profile.name.contains([',', ' ']) {
                return Err(QualityError::InvalidName(profile.name.clone()));
            }
            if !seen.insert(profile.name.clone()) {
                return Err(QualityError::DuplicateName(profile.name.clone()));
            }
            if profile.width == 0 || profile.height == 0 {
                return Err(QualityError::InvalidGeometry {
                    name: profile.name.clone(),
                    width: profile.width,
                    height: profile.height,
                });
            }
            if profile.target_bitrate_kbps == 0 {
                return Err(QualityError::ZeroBitrate(profile.name.clone()));
            }
        }
        profiles.sort_by_key(|profile| profile.height);
        if let Some(pair) = profiles.windows(2).find(|pair| pair[0].height == pair[1].height) {
            return Err(QualityError::DuplicateHeight {
                first: pair[0].name.clone(),
                second: pair[1].name.clone(),
                height: pair[0].height,
            });
        }
        Ok(Self { profiles })
    }

    pub fn iter(&self) -> impl Iterator<Item = &QualityProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&QualityProfile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn highest(&self) -> Option<&QualityProfile> {
        self.profiles.last()
    }

    /// Profiles whose height does not exceed the named cap. Unknown caps
    /// yield nothing.
    pub fn at_or_below(&self, cap: &str) -> Vec<&QualityProfile> {
        match self.get(cap) {
            Some(limit) => self
                .profiles
                .iter()
                .filter(|profile| profile.height <= limit.height)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Names ordered best first, the order the fallback picker walks.
    pub fn preference_order(&self) -> Vec<String> {
        self.profiles
            .iter()
            .rev()
            .map(|profile| profile.name.clone())
            .collect()
    }
}

impl Default for QualityProfileCatalog {
    fn default() -> Self {
        Self {
            profiles: vec![
                QualityProfile::new("360p", 640, 360, 800),
                QualityProfile::new("720p", 1280, 720, 2500),
                QualityProfile::new("1080p", 1920, 1080, 5000),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_sorts_by_height() {
        let catalog = QualityProfileCatalog::new(vec![
            QualityProfile::new("1080p", 1920, 1080, 5000),
            QualityProfile::new("360p", 640, 360, 800),
            QualityProfile::new("480p", 854, 480, 1200),
        ])
        .unwrap();
        assert_eq!(catalog.names(), vec!["360p", "480p", "1080p"]);
        assert_eq!(catalog.highest().unwrap().name, "1080p");
        assert_eq!(catalog.preference_order(), vec!["1080p", "480p", "360p"]);
    }

    #[test]
    fn catalog_rejects_bad_profiles() {
        assert_eq!(QualityProfileCatalog::new(vec![]), Err(QualityError::Empty));
        let zero = QualityProfileCatalog::new(vec![QualityProfile::new("0p", 0, 0, 100)]);
        assert!(matches!(zero, Err(QualityError::InvalidGeometry { .. })));
        let no_rate = QualityProfileCatalog::new(vec![QualityProfile::new("720p", 1280, 720, 0)]);
        assert_eq!(no_rate, Err(QualityError::ZeroBitrate("720p".into())));
    }

    #[test]
    fn catalog_requires_a_strict_height_order() {
        let tied = QualityProfileCatalog::new(vec![
            QualityProfile::new("720p", 1280, 720, 2500),
            QualityProfile::new("720p-hq", 1280, 720, 4000),
        ]);
        assert_eq!(
            tied,
            Err(QualityError::DuplicateHeight {
                first: "720p".into(),
                second: "720p-hq".into(),
                height: 720,
            })
        );
    }

    #[test]
    fn catalog_rejects_names_unfit_for_paths() {
        for name in ["hd/1080p", "..", "", "720p,1080p", "high def"] {
            let result = QualityProfileCatalog::new(vec![QualityProfile::new(name, 1280, 720, 2500)]);
            assert_eq!(result, Err(QualityError::InvalidName(name.into())), "{name}");
        }
        assert!(QualityProfileCatalog::new(vec![QualityProfile::new("720p_hq", 1280, 720, 2500)]).is_ok());
    }

    #[test]
    fn at_or_below_caps_by_height() {
        let catalog = QualityProfileCatalog::default();
        let names: Vec<_> = catalog
            .at_or_below("720p")
            .into_iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["360p", "720p"]);
        assert!(catalog.at_or_below("4k").is_empty());
    }
}
