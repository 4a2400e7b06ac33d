//! Script assembly: preamble, composed fragments, completion marker.

use crate::composer::Composition;
use crate::intent::ParsedIntent;
use serde::Serialize;

/// `swUserPreferenceStringValue_e.swDefaultTemplatePart`
pub const DEFAULT_TEMPLATE_PREFERENCE_KEY: u32 = 8;

/// Used when the application has no default part template configured.
pub const DEFAULT_TEMPLATE_FALLBACK: &str =
    r"C:\ProgramData\SOLIDWORKS\SOLIDWORKS 2024\templates\Part.prtdot";

/// `swUserPreferenceIntegerValue_e.swUnitsLinear`
const UNITS_LINEAR_PREFERENCE: u32 = 123;

/// `swLengthUnit_e.swMM`
const LENGTH_UNIT_MM: u32 = 0;

pub const COMPLETION_MARKER: &str = "Write-Output 'forgeai: macro complete'\n";

/// Values baked into the script preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSettings {
    pub template_preference_key: u32,
    pub template_fallback: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            template_preference_key: DEFAULT_TEMPLATE_PREFERENCE_KEY,
            template_fallback: DEFAULT_TEMPLATE_FALLBACK.to_string(),
        }
    }
}

/// Everything a preview returns: the plan, the script and any warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedArtifact {
    pub plan_summary: String,
    pub script_text: String,
    pub warnings: Vec<String>,
}

/// Builds the final script and plan summary for a composed intent.
pub fn assemble(
    intent: &ParsedIntent,
    composition: Composition,
    settings: &ScriptSettings,
) -> GeneratedArtifact {
    let mut script_text = preamble(settings);
    for fragment in &composition.fragments {
        script_text.push('\n');
        script_text.push_str(&fragment.render());
    }
    script_text.push('\n');
    script_text.push_str(COMPLETION_MARKER);

    GeneratedArtifact {
        plan_summary: plan_summary(intent),
        script_text,
        warnings: composition.warnings,
    }
}

fn preamble(settings: &ScriptSettings) -> String {
    // Single quotes in PowerShell literals are escaped by doubling.
    let fallback = settings.template_fallback.replace('\'', "''");
    format!(
        "$ErrorActionPreference = 'Stop'\n\
         \n\
         try {{\n\
         \x20   $swApp = [System.Runtime.InteropServices.Marshal]::GetActiveObject('SldWorks.Application')\n\
         }} catch {{\n\
         \x20   $swApp = New-Object -ComObject 'SldWorks.Application'\n\
         }}\n\
         $swApp.Visible = $true\n\
         \n\
         $template = $swApp.GetUserPreferenceStringValue({key})\n\
         if ([string]::IsNullOrEmpty($template)) {{\n\
         \x20   $template = '{fallback}'\n\
         }}\n\
         $model = $swApp.NewDocument($template, 0, 0, 0)\n\
         if ($null -eq $model) {{\n\
         \x20   throw \"Failed to create a new part from template: $template\"\n\
         }}\n\
         $model.Extension.SetUserPreferenceInteger({units}, 0, {mm}) | Out-Null\n",
        key = settings.template_preference_key,
        units = UNITS_LINEAR_PREFERENCE,
        mm = LENGTH_UNIT_MM,
    )
}

fn plan_summary(intent: &ParsedIntent) -> String {
    let box_line = match intent.box_dimensions {
        Some(dims) => format!("Box: {}×{}×{} mm", dims.length, dims.width, dims.height),
        None => "Box: not fully detected".to_string(),
    };
    let fillet_line = match intent.fillet_radius {
        Some(radius) => format!("Fillet: {} mm", radius),
        None => "Fillet: none".to_string(),
    };
    format!("Plane: {}\n{}\n{}", intent.plane, box_line, fillet_line)
}
