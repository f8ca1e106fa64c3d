//! Coursedeck - course documents in, slide presentations out
//!
//! This library turns a course directory (a content document per unit,
//! plus narration scripts) into one rendered PPTX presentation per unit,
//! driven by a JSON slide plan obtained from a remote planning
//! collaborator.
//!
//! # Stages
//!
//! - **Segmentation**: the course document is split into per-unit
//!   documents by heading tokens (`mod1_nc1`, `mod1_np1`, ...).
//! - **Tagging**: embedded images are extracted under `assets/` and
//!   replaced by textual markers the planner can reference.
//! - **Planning**: the tagged document and the narration script go to
//!   the planner, which answers with a strict-JSON slide plan.
//! - **Materialization**: slides planned with a generated image get a
//!   real file, from either a per-image provider or a deck provider.
//! - **Rendering**: the plan is rendered onto a PPTX template through a
//!   persisted layout/placeholder mapping.
//!
//! # Example - Running the pipeline
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use coursedeck::pipeline::{Collaborators, ImageProvider, RunConfig, run_pipeline};
//! use coursedeck::remote::{HttpImageGenerator, HttpPlanner};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::new("./curso", "./templates/graduacao.pptx", "...instructions...");
//! let collaborators = Collaborators {
//!     planner: Arc::new(HttpPlanner::new("https://api.example/v1/responses", "gpt-5.2", "key")),
//!     images: ImageProvider::Direct(Arc::new(HttpImageGenerator::new(
//!         "https://api.example/v1/images/generations",
//!         "gpt-image-1",
//!         "key",
//!     ))),
//! };
//! let totals = run_pipeline(config, collaborators).await?;
//! println!("{} unit(s) rendered", totals.units);
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Rendering an existing plan
//!
//! ```no_run
//! use std::path::Path;
//!
//! use coursedeck::plan::Plan;
//! use coursedeck::render::render_plan;
//! use coursedeck::slide::SlideKindRegistry;
//! use coursedeck::template::ensure_template_mapping;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = Path::new("./templates/graduacao.pptx");
//! ensure_template_mapping(template, false)?;
//! let plan = Plan::load(Path::new("./curso/mod1_nc1/slides_plan.json"))?;
//! let registry = SlideKindRegistry::with_builtin_kinds();
//! render_plan(
//!     &plan,
//!     template,
//!     Path::new("./curso/mod1_nc1/mod1_nc1.pptx"),
//!     Path::new("./curso"),
//!     None,
//!     &registry,
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cost;
pub mod logging;
pub mod ooxml;
pub mod pipeline;
pub mod plan;
pub mod remote;
pub mod render;
pub mod roteiro;
pub mod segment;
pub mod slide;
pub mod tagger;
pub mod template;
pub mod unit;

#[cfg(test)]
mod testutil;

// Re-export the run-level surface for convenience
pub use logging::setup_logging;
pub use pipeline::{Collaborators, ImageProvider, PipelineError, RunConfig, run_pipeline};
pub use plan::Plan;
pub use unit::{UnitDir, UnitId};
