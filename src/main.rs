use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::io;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use forgeai::assembler::GeneratedArtifact;
use forgeai::config::Config;
use forgeai::pipeline::Pipeline;
use forgeai::run_record::RunRecord;

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Logs go to stderr so they never mix with the streamed script log.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_artifact(artifact: &GeneratedArtifact, show_script: bool) {
    println!("📐 Plan");
    for line in artifact.plan_summary.lines() {
        println!("   {}", line);
    }
    for warning in &artifact.warnings {
        println!("⚠️  {}", warning);
    }
    if show_script {
        println!("\n📝 Script\n{}", "-".repeat(60));
        print!("{}", artifact.script_text);
        println!("{}", "-".repeat(60));
    }
}

fn print_last_run() -> Result<()> {
    match RunRecord::load()? {
        Some(record) => {
            println!("Prompt: {}", record.prompt);
            println!("Exit code: {}", record.exit_code);
            if record.cancelled {
                println!("Run was cancelled");
            }
            if record.timed_out {
                println!("Run timed out");
            }
            println!("Result: {}", if record.failed() { "failed" } else { "succeeded" });
            if let Some(stderr) = &record.stderr {
                println!("\nStandard error:\n{}", stderr);
            }
            println!("\nScript:\n{}", record.script_text);
        }
        None => println!("No run recorded yet."),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("forge")
        .about("Turns a short design request into a CAD macro and runs it")
        .long_about(
            "forge interprets a prompt such as \"120x80x25 mm box on top plane, fillet 5 mm\", \
             builds a SolidWorks automation script from it and, with --run, executes it \
             through PowerShell while streaming the output",
        )
        .arg(Arg::new("prompt")
            .help("The design request")
            .num_args(1..))
        .arg(Arg::new("run")
            .long("run")
            .help("Execute the generated script instead of only previewing it")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("json")
            .long("json")
            .help("Print the preview as JSON")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("output")
            .long("output")
            .short('o')
            .help("Also write the generated script to this file")
            .value_name("FILE")
            .num_args(1))
        .arg(Arg::new("timeout")
            .long("timeout")
            .help("Kill the interpreter after this many seconds")
            .value_name("SECS")
            .value_parser(clap::value_parser!(u64))
            .num_args(1))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Increase log verbosity (-v, -vv)")
            .action(ArgAction::Count))
        .arg(Arg::new("set-interpreter")
            .long("set-interpreter")
            .help("Set the interpreter used to run scripts")
            .value_name("PATH")
            .num_args(1))
        .arg(Arg::new("config")
            .long("config")
            .help("Show configuration information")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("last")
            .long("last")
            .help("Show the last run")
            .action(ArgAction::SetTrue))
        .get_matches();

    init_tracing(matches.get_count("verbose"));

    // Handle configuration commands
    if let Some(interpreter) = matches.get_one::<String>("set-interpreter") {
        let mut config = Config::load()?;
        config.set_interpreter(interpreter.clone())?;
        println!("✅ Interpreter saved: {}", interpreter);
        return Ok(());
    }

    if matches.get_flag("config") {
        Config::show_config_info()?;
        return Ok(());
    }

    if matches.get_flag("last") {
        return print_last_run();
    }

    let prompt = matches
        .get_many::<String>("prompt")
        .unwrap_or_default()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    if prompt.trim().is_empty() {
        eprintln!("No prompt provided. Use 'forge --help' for usage information.");
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Some(secs) = matches.get_one::<u64>("timeout") {
        config.run_timeout_secs = Some(*secs);
    }
    let pipeline = Pipeline::from_config(&config);

    info!("Processing prompt: {:?}", prompt);
    let artifact = pipeline.preview(Some(&prompt));

    if let Some(path) = matches.get_one::<String>("output") {
        std::fs::write(path, &artifact.script_text)?;
        info!("Wrote script to {}", path);
    }

    if !matches.get_flag("run") {
        if matches.get_flag("json") {
            println!("{}", serde_json::to_string_pretty(&artifact)?);
        } else {
            print_artifact(&artifact, true);
        }
        return Ok(());
    }

    print_artifact(&artifact, false);
    println!("\n🚀 Running with {}", config.interpreter);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹️  Cancelling run...");
            ctrl_c.cancel();
        }
    });

    let result = pipeline
        .executor()
        .run_to_completion(&artifact.script_text, cancel, &mut io::stdout(), &mut io::stderr())
        .await?;

    let record = RunRecord::new(&prompt, &artifact.script_text, result.stderr, &result.outcome);
    if let Err(e) = record.save() {
        tracing::error!("Failed to save run record: {}", e);
    }

    let outcome = result.outcome;
    if outcome.cancelled {
        println!("⏹️  Run cancelled");
    } else if outcome.timed_out {
        println!("⏱️  Run timed out");
    } else {
        println!("🏁 Exit code: {}", outcome.exit_code);
    }

    if !outcome.success() {
        std::process::exit(if outcome.exit_code > 0 { outcome.exit_code } else { 1 });
    }

    Ok(())
}
