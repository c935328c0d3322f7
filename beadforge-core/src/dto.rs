//! Portable, JSON-safe pattern document used for save/load.
//!
//! The field buffer travels as base64. Loading a saved document reproduces
//! the pattern exactly, reserved cell values included.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pattern::{PatternId, PatternMeta, Shape};
use crate::{BallGeometry, Color, GridStore, Pattern, PatternError, PatternResult};

/// Discriminator for the two pattern kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Flat rope pattern.
    #[default]
    Rope,
    /// Wedge-based ball pattern.
    Ball,
}

impl PatternKind {
    #[allow(clippy::trivially_copy_pass_by_ref)]
    fn is_rope(&self) -> bool {
        *self == Self::Rope
    }
}

/// Serialized pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternDto {
    /// Pattern identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Author credit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Grid width.
    pub width: usize,
    /// Grid height.
    pub height: usize,
    /// Base64 of the row-major cell bytes.
    pub field: String,
    /// Palette.
    pub colors: Vec<Color>,
    /// Creation time, ISO 8601.
    pub created_at: DateTime<Utc>,
    /// Last edit time, ISO 8601.
    pub updated_at: DateTime<Utc>,
    /// Listed publicly.
    #[serde(default)]
    pub is_public: bool,
    /// Asking price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Preview image location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Kind; omitted for ropes.
    #[serde(rename = "type", default, skip_serializing_if = "PatternKind::is_rope")]
    pub kind: PatternKind,
    /// Ball diameter in centimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<u8>,
    /// Ball circumference in columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circumference: Option<usize>,
    /// Ball wedge base in columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wedge_base: Option<usize>,
    /// Ball wedge height in rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wedge_height: Option<usize>,
}

impl From<&Pattern> for PatternDto {
    fn from(pattern: &Pattern) -> Self {
        let meta = &pattern.meta;
        let (kind, diameter, geometry) = match pattern.shape() {
            Shape::Rope => (PatternKind::Rope, None, None),
            Shape::Ball { diameter, geometry } => (PatternKind::Ball, Some(*diameter), Some(*geometry)),
        };
        Self {
            id: meta.id.to_string(),
            name: meta.name.clone(),
            author: meta.author.clone(),
            notes: meta.notes.clone(),
            width: pattern.width(),
            height: pattern.height(),
            field: BASE64.encode(pattern.grid().field()),
            colors: pattern.colors().to_vec(),
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            is_public: meta.is_public,
            price: meta.price,
            preview_url: meta.preview_url.clone(),
            kind,
            diameter,
            circumference: geometry.map(|g| g.circumference()),
            wedge_base: geometry.map(|g| g.wedge_base()),
            wedge_height: geometry.map(|g| g.wedge_height()),
        }
    }
}

impl PatternDto {
    /// Materialize the pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::MalformedInterchange`] for a bad id, bad base64
    /// or missing ball fields, and the usual dimension/palette errors when the
    /// document violates the pattern invariants.
    pub fn into_pattern(self) -> PatternResult<Pattern> {
        let id = PatternId::parse(&self.id)
            .map_err(|e| PatternError::malformed(format!("pattern id {:?}: {e}", self.id)))?;
        let field = BASE64
            .decode(self.field.as_bytes())
            .map_err(|e| PatternError::malformed(format!("field is not valid base64: {e}")))?;
        let shape = match self.kind {
            PatternKind::Rope => Shape::Rope,
            PatternKind::Ball => {
                let (Some(diameter), Some(circumference), Some(wedge_base), Some(wedge_height)) = (
                    self.diameter,
                    self.circumference,
                    self.wedge_base,
                    self.wedge_height,
                ) else {
                    return Err(PatternError::malformed(
                        "ball document needs diameter, circumference, wedgeBase and wedgeHeight",
                    ));
                };
                Shape::Ball {
                    diameter,
                    geometry: BallGeometry::new(circumference, wedge_base, wedge_height)?,
                }
            }
        };
        let grid = GridStore::from_field(self.width, self.height, field)?;
        let meta = PatternMeta {
            id,
            name: self.name,
            author: self.author,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_public: self.is_public,
            price: self.price,
            preview_url: self.preview_url,
        };
        Pattern::from_parts(meta, shape, grid, self.colors)
    }

    /// Serialize to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a pattern document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Convert a pattern to its document form.
#[must_use]
pub fn pattern_to_dto(pattern: &Pattern) -> PatternDto {
    PatternDto::from(pattern)
}

/// Convert a document back into a pattern.
///
/// # Errors
///
/// See [`PatternDto::into_pattern`].
pub fn dto_to_pattern(dto: PatternDto) -> PatternResult<Pattern> {
    dto.into_pattern()
}
