//! # Color Mapping
//!
//! Reduces an arbitrary palette to the small voiced vocabulary plus
//! modifiers. Every palette index has exactly one mapping; auto-derived
//! mappings can be overridden per index by the user.

use serde::{Deserialize, Serialize};

use crate::color::{Color, EMPTY, SKIP};
use crate::vocabulary::{
    voiced_color, Brightness, Finish, Language, ModifierWord, Saturation, Transparency,
    VOICED_COLORS,
};
use crate::{PatternError, PatternResult};

/// Luminance gap past which a color is announced as light or dark.
const BRIGHTNESS_THRESHOLD: f32 = 0.15;

/// Optional qualifiers announced before the base color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    /// Light or dark.
    #[serde(default)]
    pub brightness: Option<Brightness>,
    /// Surface finish.
    #[serde(default)]
    pub finish: Option<Finish>,
    /// Transparency.
    #[serde(default)]
    pub transparency: Option<Transparency>,
    /// Saturation.
    #[serde(default)]
    pub saturation: Option<Saturation>,
}

impl Modifiers {
    /// No modifiers.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            brightness: None,
            finish: None,
            transparency: None,
            saturation: None,
        }
    }

    /// Active modifiers in announce order: brightness, finish, transparency, saturation.
    #[must_use]
    pub fn words(&self) -> Vec<&dyn ModifierWord> {
        let mut words: Vec<&dyn ModifierWord> = Vec::new();
        if let Some(b) = &self.brightness {
            words.push(b);
        }
        if let Some(f) = &self.finish {
            words.push(f);
        }
        if let Some(t) = &self.transparency {
            words.push(t);
        }
        if let Some(s) = &self.saturation {
            words.push(s);
        }
        words
    }
}

/// Keys of the active modifiers in announce order.
#[must_use]
pub fn active_modifier_keys(modifiers: &Modifiers) -> Vec<&'static str> {
    modifiers.words().iter().map(|w| w.key()).collect()
}

/// Mapping of one palette entry to the voiced vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorMapping {
    /// Palette index this mapping belongs to.
    pub original_index: u8,
    /// Palette color at mapping time.
    pub original_color: Color,
    /// Index into [`VOICED_COLORS`]; out of range means unmapped.
    pub mapped_color_index: usize,
    /// Qualifiers.
    #[serde(default)]
    pub modifiers: Modifiers,
    /// `false` once the user has overridden it.
    pub is_auto_mapped: bool,
}

impl ColorMapping {
    /// Derive a mapping by nearest voiced color and luminance/alpha heuristics.
    #[must_use]
    pub fn auto(original_index: u8, color: &Color) -> Self {
        let (mapped_color_index, base) = VOICED_COLORS
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.color().distance_sq(color))
            .map_or((0, Color::default()), |(i, v)| (i, v.color()));

        let delta = color.luminance() - base.luminance();
        let brightness = if delta > BRIGHTNESS_THRESHOLD {
            Some(Brightness::Light)
        } else if delta < -BRIGHTNESS_THRESHOLD {
            Some(Brightness::Dark)
        } else {
            None
        };
        let transparency = color.is_translucent().then_some(Transparency::Transparent);

        Self {
            original_index,
            original_color: color.clone(),
            mapped_color_index,
            modifiers: Modifiers {
                brightness,
                transparency,
                ..Modifiers::none()
            },
            is_auto_mapped: true,
        }
    }

    /// Whether the mapping resolves to a known voice.
    #[must_use]
    pub fn is_voiced(&self) -> bool {
        self.mapped_color_index < VOICED_COLORS.len()
    }

    /// The voice token, `None` if unmapped.
    #[must_use]
    pub fn token(&self) -> Option<VoiceToken> {
        self.is_voiced().then_some(VoiceToken {
            color: self.mapped_color_index,
            modifiers: self.modifiers,
        })
    }
}

/// Auto mappings for a whole palette.
#[must_use]
pub fn create_auto_mappings(palette: &[Color]) -> Vec<ColorMapping> {
    palette
        .iter()
        .zip(0..=u8::MAX)
        .map(|(color, i)| ColorMapping::auto(i, color))
        .collect()
}

/// `true` iff every mapping resolves to a voiced color.
#[must_use]
pub fn are_all_mappings_voiced(mappings: &[ColorMapping]) -> bool {
    mappings.iter().all(ColorMapping::is_voiced)
}

/// Number of mappings that do not resolve to a voice.
#[must_use]
pub fn unmapped_count(mappings: &[ColorMapping]) -> usize {
    mappings.iter().filter(|m| !m.is_voiced()).count()
}

/// What the voice says for one bead. Equal tokens group together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceToken {
    /// Index into [`VOICED_COLORS`].
    pub color: usize,
    /// Qualifiers.
    pub modifiers: Modifiers,
}

impl VoiceToken {
    /// Spoken phrase, e.g. "dark matte blue".
    #[must_use]
    pub fn phrase(&self, language: Language, with_modifiers: bool) -> String {
        let mut words: Vec<&str> = Vec::new();
        if with_modifiers {
            words.extend(self.modifiers.words().iter().map(|w| w.word(language)));
        }
        if let Some(color) = voiced_color(self.color) {
            words.push(color.name(language));
        }
        words.join(" ")
    }
}

/// How a cell value resolves for playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Announce this token.
    Voiced(VoiceToken),
    /// Structural gap: advance silently.
    Skip,
    /// No voice available; advance and count it.
    Unvoiced,
}

/// Per-pattern set of mappings, one per palette index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMappingStore {
    mappings: Vec<ColorMapping>,
}

impl ColorMappingStore {
    /// Auto-map a palette.
    #[must_use]
    pub fn from_palette(palette: &[Color]) -> Self {
        Self {
            mappings: create_auto_mappings(palette),
        }
    }

    /// All mappings in palette order.
    #[must_use]
    pub fn mappings(&self) -> &[ColorMapping] {
        &self.mappings
    }

    /// Mapping for a palette index.
    #[must_use]
    pub fn get(&self, index: u8) -> Option<&ColorMapping> {
        self.mappings.get(usize::from(index))
    }

    /// Follow a palette change: user overrides survive where the color at
    /// that index is unchanged, everything else is re-derived.
    pub fn sync_palette(&mut self, palette: &[Color]) {
        let previous = std::mem::take(&mut self.mappings);
        self.mappings = palette
            .iter()
            .zip(0..=u8::MAX)
            .map(|(color, i)| {
                previous
                    .get(usize::from(i))
                    .filter(|m| !m.is_auto_mapped && m.original_color == *color)
                    .cloned()
                    .unwrap_or_else(|| ColorMapping::auto(i, color))
            })
            .collect();
    }

    /// User override for one palette index. Applying the same override twice
    /// leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidColorIndex`] for an index outside the palette.
    pub fn update_mapping(
        &mut self,
        index: u8,
        mapped_color_index: usize,
        modifiers: Modifiers,
    ) -> PatternResult<()> {
        let palette_len = self.mappings.len();
        let mapping = self
            .mappings
            .get_mut(usize::from(index))
            .ok_or(PatternError::InvalidColorIndex { index, palette_len })?;
        mapping.mapped_color_index = mapped_color_index;
        mapping.modifiers = modifiers;
        mapping.is_auto_mapped = false;
        tracing::debug!("Color {index} mapped to voice {mapped_color_index}");
        Ok(())
    }

    /// Drop a user override and re-derive the mapping.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidColorIndex`] for an index outside the palette.
    pub fn reset_mapping(&mut self, index: u8) -> PatternResult<()> {
        let palette_len = self.mappings.len();
        let mapping = self
            .mappings
            .get_mut(usize::from(index))
            .ok_or(PatternError::InvalidColorIndex { index, palette_len })?;
        *mapping = ColorMapping::auto(index, &mapping.original_color);
        Ok(())
    }

    /// Mappings the user has overridden.
    pub fn overrides(&self) -> impl Iterator<Item = &ColorMapping> {
        self.mappings.iter().filter(|m| !m.is_auto_mapped)
    }

    /// Re-apply persisted overrides; entries whose index or color no longer
    /// match the palette are ignored.
    pub fn apply_overrides<'a>(&mut self, overrides: impl IntoIterator<Item = &'a ColorMapping>) {
        for o in overrides {
            if let Some(slot) = self.mappings.get_mut(usize::from(o.original_index)) {
                if slot.original_color == o.original_color {
                    *slot = ColorMapping {
                        is_auto_mapped: false,
                        ..o.clone()
                    };
                }
            }
        }
    }

    /// `true` iff every palette entry is voiced.
    #[must_use]
    pub fn all_voiced(&self) -> bool {
        are_all_mappings_voiced(&self.mappings)
    }

    /// Number of palette entries without a voice.
    #[must_use]
    pub fn unmapped_count(&self) -> usize {
        unmapped_count(&self.mappings)
    }

    /// Resolve a cell value for playback.
    #[must_use]
    pub fn resolve(&self, cell: u8) -> Resolution {
        match cell {
            SKIP => Resolution::Skip,
            EMPTY => Resolution::Unvoiced,
            index => self
                .get(index)
                .and_then(ColorMapping::token)
                .map_or(Resolution::Unvoiced, Resolution::Voiced),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_maps_to_nearest() {
        let m = ColorMapping::auto(0, &Color::rgb(200, 10, 10));
        assert_eq!(VOICED_COLORS[m.mapped_color_index].key, "red");
        assert!(m.is_auto_mapped);
        assert_eq!(m.modifiers, Modifiers::none());
    }

    #[test]
    fn test_auto_translucent() {
        let m = ColorMapping::auto(0, &Color::rgba(30, 60, 220, 120));
        assert_eq!(VOICED_COLORS[m.mapped_color_index].key, "blue");
        assert_eq!(m.modifiers.transparency, Some(Transparency::Transparent));
    }

    #[test]
    fn test_auto_brightness() {
        let forest = ColorMapping::auto(0, &Color::rgb(20, 80, 25));
        assert_eq!(VOICED_COLORS[forest.mapped_color_index].key, "green");
        assert_eq!(forest.modifiers.brightness, Some(Brightness::Dark));

        let wine = ColorMapping::auto(1, &Color::rgb(100, 0, 0));
        assert_eq!(VOICED_COLORS[wine.mapped_color_index].key, "maroon");
        assert_eq!(wine.modifiers.brightness, None);
    }

    #[test]
    fn test_create_auto_mappings_one_per_index() {
        let palette = vec![Color::rgb(255, 255, 255), Color::rgb(0, 0, 0)];
        let mappings = create_auto_mappings(&palette);
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[1].original_index, 1);
        assert!(are_all_mappings_voiced(&mappings));
    }

    #[test]
    fn test_update_mapping_is_idempotent() {
        let mut store = ColorMappingStore::from_palette(&[Color::rgb(10, 10, 10)]);
        let modifiers = Modifiers {
            finish: Some(Finish::Matte),
            ..Modifiers::none()
        };
        store.update_mapping(0, 3, modifiers).expect("update");
        let once = store.clone();
        store.update_mapping(0, 3, modifiers).expect("update");
        assert_eq!(store, once);
        assert!(!store.get(0).expect("mapping").is_auto_mapped);
        assert!(store.update_mapping(1, 3, modifiers).is_err());
    }

    #[test]
    fn test_unvoiced_mapping_is_counted() {
        let mut store = ColorMappingStore::from_palette(&[Color::rgb(1, 2, 3), Color::rgb(4, 5, 6)]);
        store
            .update_mapping(1, VOICED_COLORS.len(), Modifiers::none())
            .expect("update");
        assert!(!store.all_voiced());
        assert_eq!(store.unmapped_count(), 1);
        assert_eq!(store.resolve(1), Resolution::Unvoiced);
    }

    #[test]
    fn test_resolve_reserved() {
        let store = ColorMappingStore::from_palette(&[Color::rgb(255, 255, 255)]);
        assert_eq!(store.resolve(SKIP), Resolution::Skip);
        assert_eq!(store.resolve(EMPTY), Resolution::Unvoiced);
        assert_eq!(store.resolve(9), Resolution::Unvoiced);
        assert!(matches!(store.resolve(0), Resolution::Voiced(t) if t.color == 0));
    }

    #[test]
    fn test_active_modifier_keys_order() {
        let modifiers = Modifiers {
            saturation: Some(Saturation::Vivid),
            transparency: Some(Transparency::Translucent),
            finish: Some(Finish::Pearl),
            brightness: Some(Brightness::Dark),
        };
        assert_eq!(
            active_modifier_keys(&modifiers),
            vec!["dark", "pearl", "translucent", "vivid"]
        );
        assert!(active_modifier_keys(&Modifiers::none()).is_empty());
    }

    #[test]
    fn test_phrase() {
        let token = VoiceToken {
            color: 3,
            modifiers: Modifiers {
                brightness: Some(Brightness::Dark),
                finish: Some(Finish::Matte),
                ..Modifiers::none()
            },
        };
        assert_eq!(token.phrase(Language::En, true), "dark matte blue");
        assert_eq!(token.phrase(Language::En, false), "blue");
        assert_eq!(token.phrase(Language::Ru, true), "тёмный матовый синий");
    }

    #[test]
    fn test_sync_palette_keeps_matching_overrides() {
        let palette = vec![Color::rgb(255, 0, 0), Color::rgb(0, 0, 255)];
        let mut store = ColorMappingStore::from_palette(&palette);
        store.update_mapping(0, 8, Modifiers::none()).expect("update");
        store.update_mapping(1, 8, Modifiers::none()).expect("update");

        let changed = vec![Color::rgb(255, 0, 0), Color::rgb(0, 255, 0), Color::rgb(0, 0, 0)];
        store.sync_palette(&changed);
        assert_eq!(store.mappings().len(), 3);
        assert_eq!(store.get(0).expect("kept").mapped_color_index, 8);
        assert!(store.get(1).expect("redone").is_auto_mapped);
    }

    #[test]
    fn test_apply_overrides() {
        let palette = vec![Color::rgb(255, 0, 0)];
        let mut edited = ColorMappingStore::from_palette(&palette);
        edited.update_mapping(0, 6, Modifiers::none()).expect("update");
        let saved: Vec<ColorMapping> = edited.overrides().cloned().collect();

        let mut fresh = ColorMappingStore::from_palette(&palette);
        fresh.apply_overrides(&saved);
        assert_eq!(fresh, edited);
    }

    #[test]
    fn test_mapping_json_shape() {
        let m = ColorMapping::auto(2, &Color::rgb(0, 0, 0));
        let json = serde_json::to_value(&m).expect("serialize");
        assert_eq!(json["originalIndex"], 2);
        assert_eq!(json["isAutoMapped"], true);
        assert!(json["modifiers"]["brightness"].is_null());
    }
}
