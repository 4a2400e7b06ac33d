//! Macro composition.
//!
//! Maps a [`ParsedIntent`] onto an ordered list of script [`Fragment`]s drawn
//! from a fixed template library. Every fragment past the sketch start is
//! optional and only emitted when the data it needs is present; a missing
//! value is reported as an advisory warning, never as an error.

use crate::intent::{ParsedIntent, Plane};
use tracing::debug;

/// Millimeters to meters, rendered with fixed 6-decimal precision.
pub fn mm_to_m(mm: f64) -> String {
    format!("{:.6}", mm / 1000.0)
}

/// One self-contained CAD operation in the generated script.
///
/// Lengths are carried as pre-rendered meter strings so the script text is
/// exactly what the plan was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    SelectPlane(Plane),
    StartSketch,
    /// Center rectangle at the origin, followed by closing the sketch.
    Rectangle { half_length_m: String, half_width_m: String },
    /// Exits an empty sketch when no rectangle closes it.
    CloseSketch,
    /// Single-direction blind boss extrusion of the last sketch.
    Extrude { depth_m: String },
    SelectAllEdges,
    Fillet { radius_m: String },
}

impl Fragment {
    /// Renders the fragment as a block of script text ending in a newline.
    pub fn render(&self) -> String {
        match self {
            Fragment::SelectPlane(plane) => format!(
                "# Select {name}\n\
                 $model.ClearSelection2($true)\n\
                 $model.Extension.SelectByID2('{name}', 'PLANE', 0, 0, 0, $false, 0, $null, 0) | Out-Null\n",
                name = plane.feature_name()
            ),
            Fragment::StartSketch => "# Start sketch\n\
                 $model.SketchManager.InsertSketch($true)\n"
                .to_string(),
            Fragment::Rectangle { half_length_m, half_width_m } => format!(
                "# Center rectangle\n\
                 $model.SketchManager.CreateCenterRectangle(0, 0, 0, {half_length_m}, {half_width_m}, 0) | Out-Null\n\
                 $model.SketchManager.InsertSketch($true)\n"
            ),
            Fragment::CloseSketch => "# Close sketch\n\
                 $model.SketchManager.InsertSketch($true)\n"
                .to_string(),
            Fragment::Extrude { depth_m } => format!(
                "# Boss extrude\n\
                 $model.FeatureManager.FeatureExtrusion2($true, $false, $false, 0, 0, {depth_m}, 0, \
                 $false, $false, $false, $false, 0, 0, $false, $false, $false, $false, \
                 $true, $true, $true, 0, 0, $false) | Out-Null\n"
            ),
            Fragment::SelectAllEdges => "# Select all edges\n\
                 $model.ClearSelection2($true)\n\
                 foreach ($body in $model.GetBodies2(0, $false)) {\n\
                 \x20   foreach ($edge in $body.GetEdges()) { $edge.Select4($true, $null) | Out-Null }\n\
                 }\n"
                .to_string(),
            Fragment::Fillet { radius_m } => format!(
                "# Fillet\n\
                 $model.FeatureManager.FeatureFillet3(195, {radius_m}, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0) | Out-Null\n"
            ),
        }
    }

    /// Short label used in logs and tests.
    pub fn label(&self) -> &'static str {
        match self {
            Fragment::SelectPlane(_) => "select-plane",
            Fragment::StartSketch => "start-sketch",
            Fragment::Rectangle { .. } => "rectangle",
            Fragment::CloseSketch => "close-sketch",
            Fragment::Extrude { .. } => "extrude",
            Fragment::SelectAllEdges => "select-all-edges",
            Fragment::Fillet { .. } => "fillet",
        }
    }
}

/// Ordered fragments plus the advisory warnings raised while composing them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Composition {
    pub fragments: Vec<Fragment>,
    pub warnings: Vec<String>,
}

pub const MISSING_BOX_WARNING: &str =
    "Box dimensions not fully detected (expected e.g. \"120x80x25 mm\"); skipping rectangle and extrude.";

pub const FILLET_WITHOUT_BODY_WARNING: &str =
    "Fillet requested without box dimensions; there is no body whose edges can be rounded.";

/// Composes the fragment list for an intent. Cannot fail.
pub fn compose(intent: &ParsedIntent) -> Composition {
    let mut fragments = vec![Fragment::SelectPlane(intent.plane), Fragment::StartSketch];
    let mut warnings = Vec::new();

    match intent.box_dimensions {
        Some(dims) => {
            fragments.push(Fragment::Rectangle {
                half_length_m: mm_to_m(dims.length / 2.0),
                half_width_m: mm_to_m(dims.width / 2.0),
            });
            fragments.push(Fragment::Extrude { depth_m: mm_to_m(dims.height) });
        }
        None => warnings.push(MISSING_BOX_WARNING.to_string()),
    }

    if let Some(radius) = intent.fillet_radius {
        if intent.box_dimensions.is_none() {
            warnings.push(FILLET_WITHOUT_BODY_WARNING.to_string());
            fragments.push(Fragment::CloseSketch);
        }
        fragments.push(Fragment::SelectAllEdges);
        fragments.push(Fragment::Fillet { radius_m: mm_to_m(radius) });
    }

    debug!(
        "Composed {} fragments ({} warnings)",
        fragments.len(),
        warnings.len()
    );

    Composition { fragments, warnings }
}
