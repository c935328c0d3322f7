//! # JBB Interchange
//!
//! JBB is an S-expression text format written by third-party bead design
//! tools:
//!
//! ```text
//! (jbb
//!   (version 1)
//!   (author "Ann")
//!   (notes "")
//!   (colors
//!     (rgb 255 255 255)
//!     (rgb 0 0 0))
//!   (view (draw-colors true))
//!   (model
//!     (row 0 1 0 1)
//!     (row 1 0 1 0)))
//! ```
//!
//! Rows are listed first-strung-first. Ball files add
//! `(ball (diameter 4) (circumference 86) (wedge-base 14) (wedge-height 25))`;
//! the declared geometry must agree with the model or the import fails.
//! Import never mutates anything: it either yields a complete pattern or an
//! error.

use std::fmt::Write as _;

use crate::color::{is_reserved, Color};
use crate::geometry::{BallGeometry, BallSizeTable, WEDGES_PER_HEMISPHERE};
use crate::pattern::{PatternMeta, Shape};
use crate::{GridStore, Pattern, PatternError, PatternResult};

/// Columns per centimetre of ball diameter, for sizes missing from the table.
const COLUMNS_PER_CM: f64 = 21.5;

/// Parsed S-expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexp {
    /// Bare word or number.
    Atom(String),
    /// Quoted string.
    Str(String),
    /// Parenthesized list.
    List(Vec<Sexp>),
}

impl Sexp {
    fn head(&self) -> Option<&str> {
        match self {
            Self::List(items) => match items.first() {
                Some(Self::Atom(a)) => Some(a.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    fn tail(&self) -> &[Sexp] {
        match self {
            Self::List(items) if !items.is_empty() => &items[1..],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open(usize),
    Close(usize),
    Atom(String),
    Str(String),
}

fn tokenize(input: &str) -> PatternResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '(' => tokens.push(Token::Open(line)),
            ')' => tokens.push(Token::Close(line)),
            '"' => {
                let start = line;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some(escaped) => s.push(escaped),
                            None => {
                                return Err(PatternError::malformed(format!(
                                    "unterminated string starting on line {start}"
                                )))
                            }
                        },
                        Some(ch) => {
                            if ch == '\n' {
                                line += 1;
                            }
                            s.push(ch);
                        }
                        None => {
                            return Err(PatternError::malformed(format!(
                                "unterminated string starting on line {start}"
                            )))
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c => {
                let mut atom = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == '(' || next == ')' || next == '"' {
                        break;
                    }
                    atom.push(next);
                    chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }
    Ok(tokens)
}

/// Parse one S-expression; trailing content is an error.
///
/// # Errors
///
/// Returns [`PatternError::MalformedInterchange`] on unbalanced parentheses,
/// unterminated strings or trailing tokens.
pub fn parse_sexp(input: &str) -> PatternResult<Sexp> {
    let tokens = tokenize(input)?;
    let mut stack: Vec<Vec<Sexp>> = Vec::new();
    let mut root = None;
    for token in tokens {
        if root.is_some() {
            return Err(PatternError::malformed("unexpected content after the root list"));
        }
        let node = match token {
            Token::Open(_) => {
                stack.push(Vec::new());
                continue;
            }
            Token::Close(line) => {
                let items = stack.pop().ok_or_else(|| {
                    PatternError::malformed(format!("unbalanced ')' on line {line}"))
                })?;
                Sexp::List(items)
            }
            Token::Atom(a) => Sexp::Atom(a),
            Token::Str(s) => Sexp::Str(s),
        };
        match stack.last_mut() {
            Some(parent) => parent.push(node),
            None => root = Some(node),
        }
    }
    if !stack.is_empty() {
        return Err(PatternError::malformed("unbalanced '(': input ended inside a list"));
    }
    root.ok_or_else(|| PatternError::malformed("empty input"))
}

/// Sphere section of a JBB file; every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JbbBall {
    /// Declared diameter in centimetres.
    pub diameter: Option<u8>,
    /// Declared circumference.
    pub circumference: Option<usize>,
    /// Declared wedge base.
    pub wedge_base: Option<usize>,
    /// Declared wedge height.
    pub wedge_height: Option<usize>,
}

/// Content of a JBB file before it is mapped onto a pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JbbDocument {
    /// Format version.
    pub version: u32,
    /// Author.
    pub author: Option<String>,
    /// Organization.
    pub organization: Option<String>,
    /// Notes.
    pub notes: Option<String>,
    /// Palette.
    pub colors: Vec<Color>,
    /// Model rows, first-strung first.
    pub rows: Vec<Vec<u8>>,
    /// Sphere section.
    pub ball: Option<JbbBall>,
}

fn atom_number<T: std::str::FromStr>(node: &Sexp, what: &str) -> PatternResult<T> {
    match node {
        Sexp::Atom(a) => a
            .parse()
            .map_err(|_| PatternError::malformed(format!("{what}: {a:?} is not a valid number"))),
        _ => Err(PatternError::malformed(format!("{what}: expected a number"))),
    }
}

fn single<'a>(section: &'a Sexp, what: &str) -> PatternResult<&'a Sexp> {
    match section.tail() {
        [value] => Ok(value),
        _ => Err(PatternError::malformed(format!("({what} ...) takes exactly one value"))),
    }
}

fn string_value(section: &Sexp, what: &str) -> PatternResult<String> {
    match single(section, what)? {
        Sexp::Str(s) | Sexp::Atom(s) => Ok(s.clone()),
        Sexp::List(_) => Err(PatternError::malformed(format!("({what} ...) expects a string"))),
    }
}

fn parse_color(node: &Sexp) -> PatternResult<Color> {
    if node.head() != Some("rgb") {
        return Err(PatternError::malformed("colors must be (rgb r g b [a]) entries"));
    }
    let channels = node
        .tail()
        .iter()
        .map(|c| atom_number::<u8>(c, "color channel"))
        .collect::<PatternResult<Vec<u8>>>()?;
    match channels.as_slice() {
        [r, g, b] => Ok(Color::rgb(*r, *g, *b)),
        [r, g, b, a] => Ok(Color::rgba(*r, *g, *b, *a)),
        _ => Err(PatternError::malformed(format!(
            "(rgb ...) needs 3 or 4 channels, got {}",
            channels.len()
        ))),
    }
}

fn parse_ball(section: &Sexp) -> PatternResult<JbbBall> {
    let mut ball = JbbBall::default();
    for field in section.tail() {
        match field.head() {
            Some("diameter") => ball.diameter = Some(atom_number(single(field, "diameter")?, "diameter")?),
            Some("circumference") => {
                ball.circumference = Some(atom_number(single(field, "circumference")?, "circumference")?);
            }
            Some("wedge-base") => {
                ball.wedge_base = Some(atom_number(single(field, "wedge-base")?, "wedge-base")?);
            }
            Some("wedge-height") => {
                ball.wedge_height = Some(atom_number(single(field, "wedge-height")?, "wedge-height")?);
            }
            other => {
                tracing::debug!("Ignoring unknown JBB ball field {other:?}");
            }
        }
    }
    Ok(ball)
}

impl JbbDocument {
    /// Parse JBB text.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::MalformedInterchange`] for syntax errors, a
    /// missing `model`, ragged rows or out-of-range numbers.
    pub fn parse(input: &str) -> PatternResult<Self> {
        let root = parse_sexp(input)?;
        if root.head() != Some("jbb") {
            return Err(PatternError::malformed("root list must start with 'jbb'"));
        }
        let mut doc = Self {
            version: 1,
            ..Self::default()
        };
        let mut saw_model = false;
        for section in root.tail() {
            match section.head() {
                Some("version") => doc.version = atom_number(single(section, "version")?, "version")?,
                Some("author") => doc.author = Some(string_value(section, "author")?),
                Some("organization") => {
                    doc.organization = Some(string_value(section, "organization")?);
                }
                Some("notes") => doc.notes = Some(string_value(section, "notes")?),
                Some("colors") => {
                    doc.colors = section
                        .tail()
                        .iter()
                        .map(parse_color)
                        .collect::<PatternResult<_>>()?;
                }
                Some("model") => {
                    saw_model = true;
                    for row in section.tail() {
                        if row.head() != Some("row") {
                            return Err(PatternError::malformed("model must contain (row ...) entries"));
                        }
                        doc.rows.push(
                            row.tail()
                                .iter()
                                .map(|c| atom_number::<u8>(c, "cell"))
                                .collect::<PatternResult<_>>()?,
                        );
                    }
                }
                Some("ball") => doc.ball = Some(parse_ball(section)?),
                other => tracing::debug!("Skipping JBB section {other:?}"),
            }
        }
        if !saw_model || doc.rows.is_empty() {
            return Err(PatternError::malformed("missing or empty (model ...) section"));
        }
        let width = doc.rows[0].len();
        if let Some((i, row)) = doc.rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(PatternError::malformed(format!(
                "row {i} has {} cells, expected {width}",
                row.len()
            )));
        }
        Ok(doc)
    }

    /// Model width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Model height.
    #[must_use]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    fn ball_shape(&self, ball: JbbBall, sizes: &BallSizeTable) -> PatternResult<Shape> {
        let (width, height) = (self.width(), self.height());
        let circumference = ball.circumference.unwrap_or(width);
        if circumference != width {
            return Err(PatternError::malformed(format!(
                "declared circumference {circumference} does not match model width {width}"
            )));
        }
        let wedge_height = match ball.wedge_height {
            Some(h) => h,
            None if height % 2 == 0 => height / 2,
            None => {
                return Err(PatternError::malformed(format!(
                    "ball model height {height} is odd; two hemispheres need an even height"
                )))
            }
        };
        if 2 * wedge_height != height {
            return Err(PatternError::malformed(format!(
                "declared wedge height {wedge_height} does not match model height {height}"
            )));
        }
        let wedge_base = match ball.wedge_base {
            Some(b) => b,
            None if width % WEDGES_PER_HEMISPHERE == 0 => width / WEDGES_PER_HEMISPHERE,
            None => {
                return Err(PatternError::malformed(format!(
                    "ball model width {width} is not divisible into six wedges"
                )))
            }
        };
        let geometry = BallGeometry::new(circumference, wedge_base, wedge_height)
            .map_err(|e| PatternError::malformed(e.to_string()))?;
        let diameter = ball
            .diameter
            .or_else(|| sizes.find_geometry(&geometry).map(|s| s.diameter))
            .unwrap_or_else(|| estimate_diameter(circumference));
        Ok(Shape::Ball { diameter, geometry })
    }

    /// Map onto a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::MalformedInterchange`] when the declared geometry
    /// is inconsistent, the dimensions are out of range, or a cell references a
    /// color the palette does not have.
    pub fn into_pattern(self, name: &str, sizes: &BallSizeTable) -> PatternResult<Pattern> {
        let shape = match self.ball {
            Some(ball) => self.ball_shape(ball, sizes)?,
            None => Shape::Rope,
        };
        if let Some(&bad) = self
            .rows
            .iter()
            .flatten()
            .find(|&&v| !is_reserved(v) && usize::from(v) >= self.colors.len())
        {
            return Err(PatternError::malformed(format!(
                "cell value {bad} is outside the {}-color palette",
                self.colors.len()
            )));
        }
        let (width, height) = (self.width(), self.height());
        let field: Vec<u8> = self.rows.into_iter().flatten().collect();
        let grid = GridStore::from_field(width, height, field)?;
        let mut meta = PatternMeta::new(name);
        meta.author = self.author;
        meta.notes = self.notes;
        Pattern::from_parts(meta, shape, grid, self.colors)
            .map_err(|e| PatternError::malformed(e.to_string()))
    }

    /// Capture a pattern for writing.
    #[must_use]
    pub fn from_pattern(pattern: &Pattern) -> Self {
        let width = pattern.width().max(1);
        let ball = match pattern.shape() {
            Shape::Rope => None,
            Shape::Ball { diameter, geometry } => Some(JbbBall {
                diameter: Some(*diameter),
                circumference: Some(geometry.circumference()),
                wedge_base: Some(geometry.wedge_base()),
                wedge_height: Some(geometry.wedge_height()),
            }),
        };
        Self {
            version: 1,
            author: pattern.meta.author.clone(),
            organization: None,
            notes: pattern.meta.notes.clone(),
            colors: pattern.colors().to_vec(),
            rows: pattern.grid().field().chunks(width).map(<[u8]>::to_vec).collect(),
            ball,
        }
    }

    /// Render as JBB text.
    #[must_use]
    pub fn write(&self) -> String {
        let mut out = String::from("(jbb\n");
        let _ = writeln!(out, "  (version {})", self.version);
        for (key, value) in [
            ("author", &self.author),
            ("organization", &self.organization),
            ("notes", &self.notes),
        ] {
            if let Some(value) = value {
                let _ = writeln!(out, "  ({key} {})", quote(value));
            }
        }
        out.push_str("  (colors");
        for c in &self.colors {
            match c.a {
                Some(a) => {
                    let _ = write!(out, "\n    (rgb {} {} {} {a})", c.r, c.g, c.b);
                }
                None => {
                    let _ = write!(out, "\n    (rgb {} {} {})", c.r, c.g, c.b);
                }
            }
        }
        out.push_str(")\n");
        if let Some(ball) = &self.ball {
            out.push_str("  (ball");
            if let Some(d) = ball.diameter {
                let _ = write!(out, " (diameter {d})");
            }
            if let Some(c) = ball.circumference {
                let _ = write!(out, " (circumference {c})");
            }
            if let Some(b) = ball.wedge_base {
                let _ = write!(out, " (wedge-base {b})");
            }
            if let Some(h) = ball.wedge_height {
                let _ = write!(out, " (wedge-height {h})");
            }
            out.push_str(")\n");
        }
        out.push_str("  (model");
        for row in &self.rows {
            out.push_str("\n    (row");
            for v in row {
                let _ = write!(out, " {v}");
            }
            out.push(')');
        }
        out.push_str("))\n");
        out
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn estimate_diameter(circumference: usize) -> u8 {
    (circumference as f64 / COLUMNS_PER_CM).round().clamp(1.0, f64::from(u8::MAX)) as u8
}

/// Parse JBB text into a pattern named `name`.
///
/// # Errors
///
/// Returns [`PatternError::MalformedInterchange`] for any parse or geometry failure.
pub fn import_jbb(input: &str, name: &str, sizes: &BallSizeTable) -> PatternResult<Pattern> {
    let pattern = JbbDocument::parse(input)?.into_pattern(name, sizes)?;
    tracing::info!(
        "Imported JBB pattern {name:?}: {}x{} ({})",
        pattern.width(),
        pattern.height(),
        if pattern.is_ball() { "ball" } else { "rope" }
    );
    Ok(pattern)
}

/// Parse raw JBB bytes; a leading UTF-8 byte-order mark is ignored.
///
/// # Errors
///
/// Returns [`PatternError::MalformedInterchange`] when the bytes are not
/// UTF-8, and otherwise as [`import_jbb`].
pub fn import_jbb_bytes(
    input: &[u8],
    name: &str,
    sizes: &BallSizeTable,
) -> PatternResult<Pattern> {
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
    let text = std::str::from_utf8(input).map_err(|e| {
        PatternError::malformed(format!(
            "unreadable encoding at byte {}: {e}",
            e.valid_up_to()
        ))
    })?;
    import_jbb(text, name, sizes)
}

/// Render a pattern as JBB text.
#[must_use]
pub fn export_jbb(pattern: &Pattern) -> String {
    JbbDocument::from_pattern(pattern).write()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::SKIP;

    const ROPE: &str = r#"
        ; written by a third-party editor
        (jbb
          (version 1)
          (author "Ann \"the bead\" Smith")
          (organization "")
          (notes "two colors")
          (colors (rgb 255 255 255) (rgb 0 0 0))
          (view (draw-colors true) (shift 0))
          (model
            (row 0 1 0)
            (row 1 0 1)))
    "#;

    #[test]
    fn test_parse_rope() {
        let p = import_jbb(ROPE, "imported", &BallSizeTable::default()).expect("import");
        assert!(!p.is_ball());
        assert_eq!((p.width(), p.height()), (3, 2));
        assert_eq!(p.get(1, 0).expect("cell"), 1);
        assert_eq!(p.get(0, 1).expect("cell"), 1);
        assert_eq!(p.meta.author.as_deref(), Some("Ann \"the bead\" Smith"));
        assert_eq!(p.colors().len(), 2);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let input = "(jbb (colors (rgb 0 0 0)) (model (row 0 0 0) (row 0 0)))";
        let err = import_jbb(input, "x", &BallSizeTable::default()).expect_err("ragged");
        assert!(err.to_string().contains("row 1 has 2 cells"));
    }

    #[test]
    fn test_missing_model_rejected() {
        let input = "(jbb (colors (rgb 0 0 0)))";
        assert!(matches!(
            import_jbb(input, "x", &BallSizeTable::default()),
            Err(PatternError::MalformedInterchange(_))
        ));
    }

    #[test]
    fn test_unbalanced_rejected() {
        assert!(parse_sexp("(jbb (model (row 0)").is_err());
        assert!(parse_sexp("(jbb))").is_err());
        assert!(parse_sexp("(jbb) (extra)").is_err());
        assert!(parse_sexp("(jbb (author \"open").is_err());
    }

    #[test]
    fn test_palette_overflow_rejected() {
        let input = "(jbb (colors (rgb 0 0 0)) (model (row 0 0 3)))";
        let err = import_jbb(input, "x", &BallSizeTable::default()).expect_err("bad index");
        assert!(matches!(err, PatternError::MalformedInterchange(_)));
    }

    #[test]
    fn test_rope_width_limit_is_import_error() {
        let input = "(jbb (colors (rgb 0 0 0)) (model (row 0 0)))";
        assert!(matches!(
            import_jbb(input, "x", &BallSizeTable::default()),
            Err(PatternError::MalformedInterchange(_))
        ));
    }

    fn ball_model(width: usize, height: usize, section: &str) -> String {
        let row = format!("(row{})", " 0".repeat(width));
        let rows = vec![row; height].join(" ");
        format!("(jbb (colors (rgb 255 255 255)) {section} (model {rows}))")
    }

    #[test]
    fn test_ball_inferred_geometry() {
        let input = ball_model(36, 8, "(ball)");
        let p = import_jbb(&input, "ball", &BallSizeTable::default()).expect("import");
        let g = p.ball_geometry().expect("ball");
        assert_eq!(g.wedge_base(), 6);
        assert_eq!(g.wedge_height(), 4);
    }

    #[test]
    fn test_ball_width_not_divisible_rejected() {
        let input = ball_model(35, 8, "(ball)");
        let err = import_jbb(&input, "ball", &BallSizeTable::default()).expect_err("bad width");
        assert!(err.to_string().contains("six wedges"));
    }

    #[test]
    fn test_ball_odd_height_rejected() {
        let input = ball_model(36, 7, "(ball)");
        assert!(import_jbb(&input, "ball", &BallSizeTable::default()).is_err());
    }

    #[test]
    fn test_ball_declared_seam_geometry_uses_size_table() {
        let input = ball_model(86, 50, "(ball (circumference 86) (wedge-base 14) (wedge-height 25))");
        let p = import_jbb(&input, "ball", &BallSizeTable::default()).expect("import");
        assert!(matches!(p.shape(), Shape::Ball { diameter: 4, .. }));
    }

    #[test]
    fn test_ball_declared_mismatch_rejected() {
        let input = ball_model(86, 50, "(ball (circumference 84))");
        assert!(import_jbb(&input, "ball", &BallSizeTable::default()).is_err());
        let input = ball_model(86, 50, "(ball (wedge-base 13))");
        assert!(import_jbb(&input, "ball", &BallSizeTable::default()).is_err());
        let input = ball_model(86, 50, "(ball (wedge-base 14) (wedge-height 24))");
        assert!(import_jbb(&input, "ball", &BallSizeTable::default()).is_err());
    }

    #[test]
    fn test_export_round_trip() {
        let mut p = Pattern::rope("rope", 4, 3).expect("valid");
        p.add_color(Color::rgba(1, 2, 3, 4)).expect("add");
        p.set_bead(3, 2, 1).expect("set");
        p.set_bead(0, 1, SKIP).expect("set");
        p.meta.notes = Some("line one\nline \\two\\".to_string());

        let text = export_jbb(&p);
        let back = import_jbb(&text, "rope", &BallSizeTable::default()).expect("import");
        assert_eq!(back.grid(), p.grid());
        assert_eq!(back.colors(), p.colors());
        assert_eq!(back.meta.notes, p.meta.notes);
    }

    #[test]
    fn test_export_omits_missing_metadata() {
        let mut p = Pattern::rope("rope", 2, 2).expect("valid");
        p.meta.author = Some(String::new());
        let text = export_jbb(&p);
        assert!(text.contains("(author \"\")"));
        assert!(!text.contains("(notes"));
        assert!(!text.contains("(organization"));

        let back = import_jbb(&text, "rope", &BallSizeTable::default()).expect("import");
        assert_eq!(back.meta.author, Some(String::new()));
        assert_eq!(back.meta.notes, None);
    }

    #[test]
    fn test_import_bytes_strips_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(ROPE.as_bytes());
        let p = import_jbb_bytes(&bytes, "rope", &BallSizeTable::default()).expect("import");
        assert_eq!(p.width(), 3);
        assert_eq!(p.meta.notes.as_deref(), Some("two colors"));
    }

    #[test]
    fn test_import_bytes_rejects_invalid_utf8() {
        let input = b"(jbb (version 1) \xFF\xFE)";
        let err = import_jbb_bytes(input, "bad", &BallSizeTable::default()).expect_err("not utf-8");
        assert!(matches!(err, PatternError::MalformedInterchange(_)));
    }

    #[test]
    fn test_export_round_trip_ball() {
        let g = BallGeometry::new(86, 14, 25).expect("valid");
        let mut p = Pattern::ball_with_geometry("ball", 4, g);
        p.add_color(Color::rgb(9, 9, 9)).expect("add");
        p.set_bead(20, 30, 1).expect("set");
        let back = import_jbb(&export_jbb(&p), "ball", &BallSizeTable::default()).expect("import");
        assert_eq!(back.shape(), p.shape());
        assert_eq!(back.grid(), p.grid());
    }
}
