use anyhow::Result;
use forgeai::assembler::{GeneratedArtifact, ScriptSettings};
use forgeai::executor::ExecutorSettings;
use forgeai::pipeline::Pipeline;
use std::process::Command;

const SCENARIO_A: &str = "Create a 120x80x25 mm box on front plane. Add 8 mm fillet to all edges.";

fn preview(text: &str) -> GeneratedArtifact {
    Pipeline::with_settings(ScriptSettings::default(), ExecutorSettings::default()).preview(Some(text))
}

/// Byte offset of `needle` in the script, failing the test when absent.
fn position(script: &str, needle: &str) -> usize {
    script
        .find(needle)
        .unwrap_or_else(|| panic!("script should contain {:?}:\n{}", needle, script))
}

/// Helper to run the forge binary with an isolated home directory
fn run_forge_command(args: &[&str]) -> Result<std::process::Output> {
    let home = tempfile::tempdir()?;
    let output = Command::new(env!("CARGO_BIN_EXE_forge"))
        .args(args)
        .env("HOME", home.path())
        .env("USERPROFILE", home.path())
        .output()?;
    Ok(output)
}

#[test]
fn test_scenario_a_fragments_in_order() {
    let artifact = preview(SCENARIO_A);
    let script = &artifact.script_text;

    assert_eq!(artifact.plan_summary, "Plane: Front\nBox: 120×80×25 mm\nFillet: 8 mm");
    assert!(artifact.warnings.is_empty());

    let offsets = [
        position(script, "SelectByID2('Front Plane', 'PLANE'"),
        position(script, "# Start sketch"),
        position(script, "CreateCenterRectangle(0, 0, 0, 0.060000, 0.040000, 0)"),
        position(script, "FeatureExtrusion2($true, $false, $false, 0, 0, 0.025000, 0,"),
        position(script, "# Select all edges"),
        position(script, "FeatureFillet3(195, 0.008000,"),
    ];
    assert!(
        offsets.windows(2).all(|pair| pair[0] < pair[1]),
        "fragments out of order: {:?}",
        offsets
    );
}

#[test]
fn test_scenario_b_plane_and_sketch_only() {
    let artifact = preview("top plane, no dimensions");
    let script = &artifact.script_text;

    assert_eq!(artifact.plan_summary, "Plane: Top\nBox: not fully detected\nFillet: none");
    assert_eq!(artifact.warnings.len(), 1);
    assert!(artifact.warnings[0].contains("Box dimensions"));

    assert!(script.contains("SelectByID2('Top Plane', 'PLANE'"));
    assert!(script.contains("# Start sketch"));
    assert!(!script.contains("CreateCenterRectangle"));
    assert!(!script.contains("FeatureExtrusion2"));
    assert!(!script.contains("GetBodies2"));
    assert!(!script.contains("FeatureFillet3"));
}

#[test]
fn test_texts_without_triple_have_no_geometry() {
    for text in [
        "a box",
        "120x80 mm plate",
        "120x80x25 box",
        "-x-x- mm",
        "fillet 3 mm on the right plane",
    ] {
        let script = preview(text).script_text;
        assert!(!script.contains("CreateCenterRectangle"), "{}", text);
        assert!(!script.contains("FeatureExtrusion2"), "{}", text);
    }
}

#[test]
fn test_triples_map_to_half_extents_and_depth() {
    for (text, half_l, half_w, depth) in [
        ("10x10x10 mm", "0.005000", "0.005000", "0.010000"),
        ("1x3x7mm", "0.000500", "0.001500", "0.007000"),
        ("250 × 125 × 40 mm", "0.125000", "0.062500", "0.040000"),
    ] {
        let script = preview(text).script_text;
        assert!(
            script.contains(&format!("CreateCenterRectangle(0, 0, 0, {}, {}, 0)", half_l, half_w)),
            "{}",
            text
        );
        assert!(
            script.contains(&format!("FeatureExtrusion2($true, $false, $false, 0, 0, {}, 0,", depth)),
            "{}",
            text
        );
    }
}

#[test]
fn test_fillet_fragment_iff_pattern_matches() {
    let with_fillet = preview("12x12x12 mm cube, fillets to all edges 2 mm").script_text;
    assert!(with_fillet.contains("FeatureFillet3(195, 0.002000,"));
    assert!(position(&with_fillet, "# Select all edges") < position(&with_fillet, "# Fillet"));

    let without_fillet = preview("12x12x12 mm cube with rounded edges").script_text;
    assert!(!without_fillet.contains("FeatureFillet3"));
    assert!(!without_fillet.contains("# Select all edges"));
}

#[test]
fn test_identical_prompts_give_identical_output() {
    let first = preview(SCENARIO_A);
    let second = preview(SCENARIO_A);
    assert_eq!(first.plan_summary, second.plan_summary);
    assert_eq!(first.script_text, second.script_text);
}

#[test]
fn test_cli_preview_as_json() -> Result<()> {
    let output = run_forge_command(&["--json", "top", "plane", "40x20x5", "mm", "plate"])?;
    assert!(output.status.success(), "Preview should succeed");

    let artifact: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(
        artifact["plan_summary"],
        "Plane: Top\nBox: 40×20×5 mm\nFillet: none"
    );
    assert!(artifact["script_text"]
        .as_str()
        .is_some_and(|s| s.contains("0.020000, 0.010000")));
    assert_eq!(artifact["warnings"].as_array().map(Vec::len), Some(0));

    Ok(())
}

#[test]
fn test_cli_writes_script_to_output_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script_path = dir.path().join("macro.ps1");
    let output = run_forge_command(&[
        "--output",
        script_path.to_str().expect("temp path is UTF-8"),
        "fillet 4 mm",
    ])?;
    assert!(output.status.success());

    let script = std::fs::read_to_string(&script_path)?;
    assert!(script.contains("FeatureFillet3(195, 0.004000,"));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Box: not fully detected"));
    assert!(stdout.contains("no body whose edges can be rounded"));

    Ok(())
}

#[test]
fn test_cli_without_prompt_is_not_an_error() -> Result<()> {
    let output = run_forge_command(&[])?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No prompt provided"));
    Ok(())
}

#[cfg(unix)]
mod runs {
    use super::*;
    use forgeai::executor::{ExecutionOutcome, RunEvent, RunError};
    use tokio_util::sync::CancellationToken;

    fn sh_pipeline() -> Pipeline {
        Pipeline::with_settings(
            ScriptSettings::default(),
            ExecutorSettings {
                interpreter: "sh".to_string(),
                interpreter_args: Vec::new(),
                timeout: None,
                write_bom: false,
            },
        )
    }

    #[tokio::test]
    async fn test_scenario_c_error_then_done_then_exit_code() {
        let pipeline = sh_pipeline();
        let mut run = pipeline
            .executor()
            .run("echo 'template missing' >&2\nexit 1\n", CancellationToken::new())
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = run.next_event().await {
            events.push(event);
        }
        let outcome = run.wait().await.unwrap();

        let expected = ExecutionOutcome { exit_code: 1, cancelled: false, timed_out: false };
        assert_eq!(
            events,
            vec![
                RunEvent::Error("template missing".to_string()),
                RunEvent::Exit(expected),
            ]
        );
        assert_eq!(outcome.exit_code, 1);
    }

    #[tokio::test]
    async fn test_pipeline_run_returns_artifact_with_run() {
        // sh rejects the PowerShell preamble; the point is the wiring.
        let (artifact, run) = sh_pipeline()
            .run(Some("top plane"), CancellationToken::new())
            .await
            .unwrap();

        assert!(artifact.plan_summary.starts_with("Plane: Top"));
        let outcome = run.wait().await.unwrap();
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let pipeline = sh_pipeline();
        let first = pipeline.executor().run("echo first\n", CancellationToken::new());
        let second = pipeline.executor().run("echo second\nexit 2\n", CancellationToken::new());
        let (first, second) = tokio::join!(first, second);

        let (first, second) = tokio::join!(first.unwrap().wait(), second.unwrap().wait());
        assert_eq!(first.unwrap().exit_code, 0);
        assert_eq!(second.unwrap().exit_code, 2);
    }

    #[tokio::test]
    async fn test_launch_failure_is_distinct_from_failed_run() {
        let pipeline = Pipeline::with_settings(
            ScriptSettings::default(),
            ExecutorSettings {
                interpreter: "/nonexistent/forgeai/powershell".to_string(),
                ..ExecutorSettings::default()
            },
        );

        let result = pipeline.run(Some("top plane"), CancellationToken::new()).await;
        assert!(matches!(result, Err(RunError::InterpreterNotFound(_))));
    }
}
