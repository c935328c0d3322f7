//! Spoken vocabulary: voiced base colors, modifier words and clip layout.
//!
//! Pre-recorded clips live under
//! `tts/{language}/{voice-folder}/{color}.mp3`, with counts for grouped
//! announcements under `tts/{language}/{voice-folder}/numbers/{n}.mp3`.

use serde::{Deserialize, Serialize};

use crate::Color;

/// Largest count with a pre-recorded number clip.
pub const MAX_NUMBER_CLIP: usize = 20;

/// Default voice folder for pre-recorded clips.
pub const DEFAULT_VOICE_FOLDER: &str = "female-default";

/// Announcement language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Russian.
    #[default]
    Ru,
    /// Ukrainian.
    Uk,
    /// English.
    En,
}

impl Language {
    /// Directory code used in clip paths.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ru => "ru",
            Self::Uk => "uk",
            Self::En => "en",
        }
    }

    const fn slot(self) -> usize {
        match self {
            Self::Ru => 0,
            Self::Uk => 1,
            Self::En => 2,
        }
    }
}

/// A base color the voice can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicedColor {
    /// Stable key, also the clip file stem.
    pub key: &'static str,
    /// Reference color used for nearest matching.
    pub rgb: (u8, u8, u8),
    names: [&'static str; 3],
}

impl VoicedColor {
    /// Reference color as a palette entry.
    #[must_use]
    pub const fn color(&self) -> Color {
        Color::rgb(self.rgb.0, self.rgb.1, self.rgb.2)
    }

    /// Localized spoken name.
    #[must_use]
    pub const fn name(&self, language: Language) -> &'static str {
        self.names[language.slot()]
    }
}

const fn voiced(key: &'static str, rgb: (u8, u8, u8), names: [&'static str; 3]) -> VoicedColor {
    VoicedColor { key, rgb, names }
}

/// The audio vocabulary, in table order.
pub const VOICED_COLORS: [VoicedColor; 16] = [
    voiced("white", (255, 255, 255), ["белый", "білий", "white"]),
    voiced("black", (0, 0, 0), ["чёрный", "чорний", "black"]),
    voiced("red", (220, 20, 20), ["красный", "червоний", "red"]),
    voiced("blue", (30, 60, 220), ["синий", "синій", "blue"]),
    voiced("green", (30, 160, 50), ["зелёный", "зелений", "green"]),
    voiced("yellow", (250, 220, 30), ["жёлтый", "жовтий", "yellow"]),
    voiced("orange", (250, 140, 20), ["оранжевый", "помаранчевий", "orange"]),
    voiced("purple", (130, 40, 160), ["фиолетовый", "фіолетовий", "purple"]),
    voiced("pink", (250, 150, 190), ["розовый", "рожевий", "pink"]),
    voiced("cyan", (60, 200, 230), ["голубой", "блакитний", "cyan"]),
    voiced("brown", (120, 70, 30), ["коричневый", "коричневий", "brown"]),
    voiced("gray", (128, 128, 128), ["серый", "сірий", "gray"]),
    voiced("silver", (192, 192, 200), ["серебряный", "срібний", "silver"]),
    voiced("gold", (212, 175, 55), ["золотой", "золотий", "gold"]),
    voiced("navy", (20, 30, 100), ["тёмно-синий", "темно-синій", "navy"]),
    voiced("maroon", (120, 20, 40), ["бордовый", "бордовий", "maroon"]),
];

/// Voiced color by table index.
#[must_use]
pub fn voiced_color(index: usize) -> Option<&'static VoicedColor> {
    VOICED_COLORS.get(index)
}

/// Lightness relative to the base color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brightness {
    /// Lighter than the base.
    Light,
    /// Darker than the base.
    Dark,
}

/// Surface finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finish {
    /// Frosted.
    Matte,
    /// Shiny.
    Glossy,
    /// Metal-lined.
    Metallic,
    /// Pearl coated.
    Pearl,
}

/// Light transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transparency {
    /// Clear glass.
    Transparent,
    /// Partly see-through.
    Translucent,
}

/// Color intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Saturation {
    /// Greyed out.
    Muted,
    /// Intense.
    Vivid,
}

/// A modifier word with its localized forms.
pub trait ModifierWord {
    /// Stable key.
    fn key(&self) -> &'static str;
    /// Localized spoken word.
    fn word(&self, language: Language) -> &'static str;
}

macro_rules! modifier_words {
    ($ty:ty { $($variant:ident => $key:literal, [$ru:literal, $uk:literal, $en:literal]),+ $(,)? }) => {
        impl ModifierWord for $ty {
            fn key(&self) -> &'static str {
                match self {
                    $(Self::$variant => $key,)+
                }
            }

            fn word(&self, language: Language) -> &'static str {
                let words = match self {
                    $(Self::$variant => [$ru, $uk, $en],)+
                };
                words[language.slot()]
            }
        }
    };
}

modifier_words!(Brightness {
    Light => "light", ["светлый", "світлий", "light"],
    Dark => "dark", ["тёмный", "темний", "dark"],
});

modifier_words!(Finish {
    Matte => "matte", ["матовый", "матовий", "matte"],
    Glossy => "glossy", ["глянцевый", "глянцевий", "glossy"],
    Metallic => "metallic", ["металлик", "металік", "metallic"],
    Pearl => "pearl", ["перламутровый", "перламутровий", "pearl"],
});

modifier_words!(Transparency {
    Transparent => "transparent", ["прозрачный", "прозорий", "transparent"],
    Translucent => "translucent", ["полупрозрачный", "напівпрозорий", "translucent"],
});

modifier_words!(Saturation {
    Muted => "muted", ["приглушённый", "приглушений", "muted"],
    Vivid => "vivid", ["яркий", "яскравий", "vivid"],
});

/// Clip path for a voiced color.
#[must_use]
pub fn color_clip_path(language: Language, voice_folder: &str, color: &VoicedColor) -> String {
    format!("tts/{}/{voice_folder}/{}.mp3", language.code(), color.key)
}

/// Clip path for a count, `None` outside `[1, 20]`.
#[must_use]
pub fn number_clip_path(language: Language, voice_folder: &str, n: usize) -> Option<String> {
    (1..=MAX_NUMBER_CLIP)
        .contains(&n)
        .then(|| format!("tts/{}/{voice_folder}/numbers/{n}.mp3", language.code()))
}
