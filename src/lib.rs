//! ForgeAI - prompt-to-CAD macro generation library.
//!
//! This library turns a short design request into a SolidWorks automation
//! script and runs it through an external PowerShell interpreter. It
//! supports:
//!
//! - **Prompt interpretation** into a plane, box dimensions and a fillet radius
//! - **Macro composition** from a fixed library of script fragments
//! - **Script assembly** with a fixed preamble and a readable plan summary
//! - **Streamed execution** with typed log/error events, cancellation and
//!   timeouts
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`intent`] - Free text to [`intent::ParsedIntent`]
//! - [`composer`] - Intent to ordered script fragments and warnings
//! - [`assembler`] - Fragments to the final script and plan summary
//! - [`executor`] - Runs scripts and streams their output
//! - [`pipeline`] - The preview and run calls
//! - [`config`] - Configuration management (interpreter, template, timeout)
//! - [`run_record`] - Persists the last run for inspection
//!
//! # Example
//!
//! ```no_run
//! use forgeai::config::Config;
//! use forgeai::executor::RunEvent;
//! use forgeai::pipeline::Pipeline;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::from_config(&Config::load()?);
//!
//!     // Preview: plan and script, nothing is launched
//!     let artifact = pipeline.preview(Some("120x80x25 mm box on top plane, fillet 5 mm"));
//!     println!("{}", artifact.plan_summary);
//!
//!     // Run: stream the interpreter's output until it exits
//!     let (_, mut run) = pipeline
//!         .run(Some("120x80x25 mm box"), CancellationToken::new())
//!         .await?;
//!     while let Some(event) = run.next_event().await {
//!         match event {
//!             RunEvent::Log(line) => println!("{}", line),
//!             RunEvent::Error(line) => eprintln!("{}", line),
//!             RunEvent::Exit(outcome) => println!("exit code {}", outcome.exit_code),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod composer;
pub mod config;
pub mod executor;
pub mod intent;
pub mod pipeline;
pub mod run_record;
