//! Prompt interpretation.
//!
//! Turns a free-text design request into a [`ParsedIntent`]. This is keyword
//! and pattern matching over the lowercased text, not language understanding:
//! anything the patterns do not recognize is simply left unset.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

/// `120x80x25 mm`, `120 × 80 × 25mm`.
static BOX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*[x×]\s*(\d+)\s*[x×]\s*(\d+)\s*mm").expect("box pattern is valid")
});

/// `fillet 5 mm`, `fillets to all edges 3mm`.
static FILLET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"fillets?\s*(?:to\s+)?(?:all\s+edges\s+)?(\d+)\s*mm")
        .expect("fillet pattern is valid")
});

/// `8 mm fillet`. Only consulted when the forward phrasing is absent, since
/// it would otherwise claim the last box dimension in `25 mm fillet 3 mm`.
static REVERSE_FILLET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*mm\s*fillets?").expect("reverse fillet pattern is valid")
});

/// Keyword precedence for plane selection, evaluated once over the whole text.
/// The first entry whose keyword occurs wins.
const PLANE_PRECEDENCE: [(&str, Plane); 2] = [("right", Plane::Right), ("top", Plane::Top)];

/// Standard reference planes of a part document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Plane {
    #[default]
    Front,
    Top,
    Right,
}

impl Plane {
    /// Feature-tree name of the plane in the CAD application.
    pub fn feature_name(self) -> &'static str {
        match self {
            Plane::Front => "Front Plane",
            Plane::Top => "Top Plane",
            Plane::Right => "Right Plane",
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Plane::Front => "Front",
            Plane::Top => "Top",
            Plane::Right => "Right",
        };
        f.write_str(name)
    }
}

/// Box dimensions in millimeters. Only ever constructed with all three set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxDimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

/// Structured result of interpreting a prompt.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ParsedIntent {
    pub plane: Plane,
    pub box_dimensions: Option<BoxDimensions>,
    /// Fillet radius in millimeters.
    pub fillet_radius: Option<f64>,
}

/// Interprets a free-text prompt. Never fails; missing text yields the
/// default intent (front plane, nothing else).
pub fn interpret(text: Option<&str>) -> ParsedIntent {
    let text = text.unwrap_or_default().to_lowercase();

    let intent = ParsedIntent {
        plane: resolve_plane(&text),
        box_dimensions: parse_box(&text),
        fillet_radius: parse_fillet(&text),
    };

    debug!("Interpreted prompt {:?} as {:?}", text, intent);
    intent
}

fn resolve_plane(text: &str) -> Plane {
    PLANE_PRECEDENCE
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|(_, plane)| *plane)
        .unwrap_or_default()
}

fn parse_box(text: &str) -> Option<BoxDimensions> {
    let caps = BOX_PATTERN.captures(text)?;
    let length = positive_mm(caps.get(1)?.as_str())?;
    let width = positive_mm(caps.get(2)?.as_str())?;
    let height = positive_mm(caps.get(3)?.as_str())?;
    Some(BoxDimensions { length, width, height })
}

fn parse_fillet(text: &str) -> Option<f64> {
    let caps = FILLET_PATTERN
        .captures(text)
        .or_else(|| REVERSE_FILLET_PATTERN.captures(text))?;
    positive_mm(caps.get(1)?.as_str())
}

/// Digit runs always parse as f64; zero is rejected because lengths must be
/// positive.
fn positive_mm(digits: &str) -> Option<f64> {
    digits.parse::<f64>().ok().filter(|value| *value > 0.0)
}
