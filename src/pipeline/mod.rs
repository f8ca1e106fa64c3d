/// Run orchestration: course-level pre-stages, a bounded unit worker
/// pool, and the per-unit state machine `pending -> tagging -> planning
/// -> validating -> materializing -> rendering -> done | failed`.
///
/// The first failed unit stops further submissions; units already
/// dispatched run to completion and their artifacts stay on disk.
mod materialize;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::CachePolicy;
use crate::cost::{RunCost, RunTotals, UnitCost, UsageCounters};
use crate::plan::{Plan, PlanError, plan_path};
use crate::remote::{
    Backoff, DeckGenerator, ImageGenerator, PlanRequest, Planner, RemoteError, with_backoff,
};
use crate::render::{RenderError, render_plan};
use crate::roteiro::{RoteiroError, distribute_roteiros, extract_roteiro_zips};
use crate::segment::{SegmentError, segment_course};
use crate::slide::{SlideKindRegistry, validate_plan};
use crate::tagger::{TagError, content_docx, roteiro_docx, tag_unit};
use crate::template::{TemplateError, ensure_template_mapping, validate_template};
use crate::unit::{UnitDir, discover_units};

pub use materialize::MaterializeOutcome;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Default unit worker pool size.
pub const UNIT_WORKERS: usize = 5;
/// Default inner pool size for image generation.
pub const IMAGE_WORKERS: usize = 5;
/// Default size requested from the image collaborator.
pub const IMAGE_SIZE: &str = "1024x1536";
/// Default quality requested from the image collaborator.
pub const IMAGE_QUALITY: &str = "low";

/// Directory at the course root collecting the finished presentations.
pub const DIST_DIR: &str = "dist";

const PLAN_DIRECTIVE: &str = "Gere o JSON do plano de slides conforme o contrato.";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unit_workers must be at least 1")]
    NoUnitWorkers,
    #[error("template not found: {0}")]
    TemplateNotFound(PathBuf),
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("segmentation failed: {0}")]
    Segment(#[from] SegmentError),
    #[error("roteiro intake failed: {0}")]
    Roteiro(#[from] RoteiroError),
    #[error("unit {unit} failed: {source}")]
    Unit {
        unit: String,
        #[source]
        source: UnitError,
    },
    #[error("worker panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one unit; wrapped into [`PipelineError::Unit`] with the
/// unit name by the pool.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("tagging failed: {0}")]
    Tag(#[from] TagError),
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("remote collaborator failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("plan validation failed with {} violation(s)", .0.len())]
    Validation(Vec<String>),
    #[error("image worker panicked: {0}")]
    ImageJoin(#[from] tokio::task::JoinError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything one run needs besides the collaborators.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub course_dir: PathBuf,
    pub template: PathBuf,
    /// System-level planning instructions (the prompt document).
    pub instructions: String,
    /// Restrict the run to these unit directory names.
    pub only: Option<Vec<String>>,
    pub unit_workers: usize,
    pub image_workers: usize,
    /// Rebuild cached artifacts. Assets on disk are still kept.
    pub force: bool,
    pub image_size: String,
    pub image_quality: Option<String>,
    /// Only adopt images already on disk, never call the provider.
    pub reuse_assets: bool,
    /// Title of an extra cover slide put before the plan's slides.
    pub cover_title: Option<String>,
}

impl RunConfig {
    pub fn new(
        course_dir: impl Into<PathBuf>,
        template: impl Into<PathBuf>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            course_dir: course_dir.into(),
            template: template.into(),
            instructions: instructions.into(),
            only: None,
            unit_workers: UNIT_WORKERS,
            image_workers: IMAGE_WORKERS,
            force: false,
            image_size: IMAGE_SIZE.to_string(),
            image_quality: Some(IMAGE_QUALITY.to_string()),
            reuse_assets: false,
            cover_title: None,
        }
    }
}

/// The remote collaborators of a run. Exactly one image provider is
/// active per run.
#[derive(Clone)]
pub struct Collaborators {
    pub planner: Arc<dyn Planner>,
    pub images: ImageProvider,
}

/// How generated slide images are materialized.
#[derive(Clone)]
pub enum ImageProvider {
    /// One request per image (provider A).
    Direct(Arc<dyn ImageGenerator>),
    /// One deck job per unit, images lifted from the export (provider B).
    Deck(Arc<dyn DeckGenerator>),
}

/// Lifecycle of one unit inside the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStage {
    Pending,
    Tagging,
    Planning,
    Validating,
    Materializing,
    Rendering,
    Done,
    Failed,
}

impl fmt::Display for UnitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Tagging => "tagging",
            Self::Planning => "planning",
            Self::Validating => "validating",
            Self::Materializing => "materializing",
            Self::Rendering => "rendering",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

enum UnitOutcome {
    /// Required documents missing, nothing produced.
    Skipped,
    Done(UnitCost),
}

/// Run the whole pipeline over a course directory.
///
/// Pre-stages run single-threaded: template mapping, segmentation,
/// roteiro intake. Units are then processed on a pool of
/// `unit_workers`; the first failure stops new submissions and is the
/// error returned once in-flight units drain. On success `dist/` is
/// rebuilt and the aggregate cost returned.
pub async fn run_pipeline(config: RunConfig, collaborators: Collaborators) -> Result<RunTotals> {
    if config.unit_workers == 0 {
        return Err(PipelineError::NoUnitWorkers);
    }
    if !config.template.exists() {
        return Err(PipelineError::TemplateNotFound(config.template.clone()));
    }
    ensure_template_mapping(&config.template, config.force)?;
    validate_template(&config.template)?;

    info!(course = %config.course_dir.display(), "segmenting course documents");
    segment_course(&config.course_dir, config.force)?;
    info!("importing narration scripts");
    extract_roteiro_zips(&config.course_dir, config.force)?;
    distribute_roteiros(&config.course_dir, config.force)?;

    let units = discover_units(&config.course_dir, config.only.as_deref())?;
    if units.is_empty() {
        warn!(course = %config.course_dir.display(), "no units to process");
        return Ok(RunTotals::default());
    }
    info!(
        units = units.len(),
        workers = config.unit_workers,
        "processing units"
    );

    let config = Arc::new(config);
    let registry = Arc::new(SlideKindRegistry::with_builtin_kinds());
    let run_cost = Arc::new(RunCost::new());
    let semaphore = Arc::new(Semaphore::new(config.unit_workers));
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let mut pool: JoinSet<(String, std::result::Result<UnitOutcome, UnitError>)> = JoinSet::new();
    for unit in &units {
        if *cancel_rx.borrow() {
            info!("a unit failed, not submitting further units");
            break;
        }
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let unit = unit.clone();
        let name = unit.id.to_string();
        debug!(unit = %name, stage = %UnitStage::Pending, "unit submitted");
        let config = Arc::clone(&config);
        let collaborators = collaborators.clone();
        let registry = Arc::clone(&registry);
        let run_cost = Arc::clone(&run_cost);
        let cancel_tx = cancel_tx.clone();
        pool.spawn(async move {
            let _permit = permit;
            let outcome = process_unit(&config, &collaborators, &registry, &run_cost, &unit).await;
            if outcome.is_err() {
                let _ = cancel_tx.send(true);
            }
            (name, outcome)
        });
    }

    let mut first_error: Option<PipelineError> = None;
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok((name, Ok(UnitOutcome::Done(_)))) => {
                info!(unit = %name, stage = %UnitStage::Done, "unit finished");
            }
            Ok((name, Ok(UnitOutcome::Skipped))) => {
                debug!(unit = %name, "unit skipped");
            }
            Ok((name, Err(source))) => {
                error!(unit = %name, stage = %UnitStage::Failed, error = %source, "unit failed");
                if first_error.is_none() {
                    first_error = Some(PipelineError::Unit { unit: name, source });
                }
            }
            Err(join_error) => {
                if first_error.is_none() {
                    first_error = Some(PipelineError::Join(join_error));
                }
            }
        }
    }
    if let Some(error) = first_error {
        return Err(error);
    }

    let staged = collect_dist(&config.course_dir, &units)?;
    info!(presentations = staged, "presentations staged");

    let totals = run_cost.totals();
    info!(
        units = totals.units,
        prompt_tokens = totals.usage.prompt_tokens,
        completion_tokens = totals.usage.completion_tokens,
        images = totals.images_generated,
        credits = totals.credits_deducted,
        "run complete"
    );
    Ok(totals)
}

async fn process_unit(
    config: &RunConfig,
    collaborators: &Collaborators,
    registry: &SlideKindRegistry,
    run_cost: &RunCost,
    unit: &UnitDir,
) -> std::result::Result<UnitOutcome, UnitError> {
    let policy = CachePolicy::new(config.force);
    let name = unit.id.to_string();

    let Some(_content) = content_docx(unit) else {
        info!(unit = %name, "content document missing, skipping");
        return Ok(UnitOutcome::Skipped);
    };
    let Some(narration) = roteiro_docx(&unit.dir) else {
        info!(unit = %name, "narration script missing, skipping");
        return Ok(UnitOutcome::Skipped);
    };

    info!(unit = %name, stage = %UnitStage::Tagging, "unit stage");
    let tagged = unit.dir.join(format!("{name}_tagged.docx"));
    if !policy.reuse("tagged document", &tagged) {
        let images = tag_unit(unit, &config.course_dir)?;
        debug!(unit = %name, images, "content document tagged");
    }

    info!(unit = %name, stage = %UnitStage::Planning, "unit stage");
    let plan_file = plan_path(&unit.dir);
    let mut usage = UsageCounters::default();
    let mut plan = if policy.reuse("slide plan", &plan_file) {
        Plan::load(&plan_file)?
    } else {
        let request = PlanRequest {
            instructions: config.instructions.clone(),
            content_document: tagged,
            narration_document: narration,
            directive: PLAN_DIRECTIVE.to_string(),
            schema: None,
        };
        let backoff = Backoff::default();
        let response = with_backoff(&backoff, "slide planning", || {
            collaborators.planner.plan(&request)
        })
        .await?;
        usage = response.usage.clone();
        let value = response.json_strict()?;
        let plan: Plan = serde_json::from_value(value).map_err(PlanError::from)?;
        plan.save(&plan_file)?;
        plan
    };

    info!(unit = %name, stage = %UnitStage::Validating, "unit stage");
    let violations = validate_plan(&plan, &config.course_dir, registry);
    if !violations.is_empty() {
        for violation in &violations {
            error!(unit = %name, %violation, "plan violation");
        }
        return Err(UnitError::Validation(violations));
    }

    info!(unit = %name, stage = %UnitStage::Materializing, "unit stage");
    let materialized = match &collaborators.images {
        ImageProvider::Direct(generator) => {
            materialize::direct(config, Arc::clone(generator), &mut plan, &unit.id).await?
        }
        ImageProvider::Deck(generator) => {
            materialize::deck(config, generator.as_ref(), &mut plan, &unit.id).await?
        }
    };
    plan.save(&plan_file)?;

    info!(unit = %name, stage = %UnitStage::Rendering, "unit stage");
    let output = unit.dir.join(format!("{name}.pptx"));
    render_plan(
        &plan,
        &config.template,
        &output,
        &config.course_dir,
        config.cover_title.as_deref(),
        registry,
    )?;
    debug!(unit = %name, output = %output.display(), "presentation rendered");

    let cost = UnitCost {
        unit: name,
        usage,
        images_generated: materialized.images,
        credits_deducted: materialized.credits,
    };
    run_cost.record(&cost);
    Ok(UnitOutcome::Done(cost))
}

/// Purge `dist/` of presentations and repopulate it from the units that
/// produced one. Single writer, runs after the pool drains.
fn collect_dist(course_dir: &Path, units: &[UnitDir]) -> std::io::Result<usize> {
    let dist_dir = course_dir.join(DIST_DIR);
    std::fs::create_dir_all(&dist_dir)?;
    for entry in std::fs::read_dir(&dist_dir)? {
        let path = entry?.path();
        let is_pptx = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pptx"));
        if path.is_file() && is_pptx {
            std::fs::remove_file(&path)?;
        }
    }

    let mut staged = 0usize;
    for unit in units {
        let name = unit.id.to_string();
        let rendered = unit.dir.join(format!("{name}.pptx"));
        if !rendered.is_file() {
            continue;
        }
        std::fs::copy(&rendered, dist_dir.join(format!("{name}.pptx")))?;
        staged += 1;
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};
    use std::path::Path;

    use async_trait::async_trait;
    use serde_json::json;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::remote::{ImageRequest, PlanResponse};
    use crate::testutil::template_pptx;

    fn minimal_docx() -> Vec<u8> {
        let mut data = Vec::new();
        {
            let cursor = Cursor::new(&mut data);
            let mut writer = ZipWriter::new(cursor);
            let options = SimpleFileOptions::default();

            writer.start_file("[Content_Types].xml", options).unwrap();
            writer.write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#).unwrap();

            writer
                .start_file("word/_rels/document.xml.rels", options)
                .unwrap();
            writer.write_all(br#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#).unwrap();

            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(br#"<?xml version="1.0"?><w:document xmlns:w="http://w"><w:body><w:p><w:r><w:t>conteudo</w:t></w:r></w:p></w:body></w:document>"#).unwrap();

            writer.finish().unwrap();
        }
        data
    }

    struct CannedPlanner {
        text: String,
    }

    #[async_trait]
    impl Planner for CannedPlanner {
        async fn plan(
            &self,
            _request: &PlanRequest,
        ) -> crate::remote::Result<PlanResponse> {
            Ok(PlanResponse {
                text: self.text.clone(),
                usage: UsageCounters {
                    prompt_tokens: 10,
                    prompt_cached_tokens: 0,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            })
        }
    }

    struct NoImages;

    #[async_trait]
    impl ImageGenerator for NoImages {
        async fn generate(&self, _request: &ImageRequest) -> crate::remote::Result<Vec<u8>> {
            Err(RemoteError::InvalidRequest("not expected".to_string()))
        }
    }

    fn collaborators(plan_text: String) -> Collaborators {
        Collaborators {
            planner: Arc::new(CannedPlanner { text: plan_text }),
            images: ImageProvider::Direct(Arc::new(NoImages)),
        }
    }

    fn course_with_unit(course: &Path, unit: &str) -> RunConfig {
        let unit_dir = course.join(unit);
        std::fs::create_dir_all(&unit_dir).unwrap();
        std::fs::write(unit_dir.join(format!("{unit}.docx")), minimal_docx()).unwrap();
        std::fs::write(
            unit_dir.join(format!("ROT_{}.docx", unit.to_uppercase())),
            minimal_docx(),
        )
        .unwrap();
        let template = course.join("template.pptx");
        std::fs::write(&template, template_pptx()).unwrap();
        RunConfig::new(course, &template, "instrucoes")
    }

    fn title_plan(unit: &str) -> String {
        json!({
            "module": 1,
            "nucleus": unit,
            "slides": [
                {"slide_id": "s01", "kind": "title", "title": "Abertura"}
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_run_processes_unit_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let config = course_with_unit(tmp.path(), "mod1_nc1");
        let totals = run_pipeline(config, collaborators(title_plan("mod1_nc1")))
            .await
            .unwrap();

        assert_eq!(totals.units, 1);
        assert_eq!(totals.usage.total_tokens, 15);
        let unit_dir = tmp.path().join("mod1_nc1");
        assert!(unit_dir.join("mod1_nc1_tagged.docx").exists());
        assert!(unit_dir.join("slides_plan.json").exists());
        assert!(unit_dir.join("mod1_nc1.pptx").exists());
        assert!(tmp.path().join("dist/mod1_nc1.pptx").exists());
    }

    #[tokio::test]
    async fn test_invalid_plan_fails_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let config = course_with_unit(tmp.path(), "mod1_nc1");
        let bad_plan = json!({"slides": [{"kind": "title"}]}).to_string();
        let error = run_pipeline(config, collaborators(bad_plan))
            .await
            .unwrap_err();

        match error {
            PipelineError::Unit { unit, source } => {
                assert_eq!(unit, "mod1_nc1");
                assert!(matches!(source, UnitError::Validation(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unit_without_documents_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let config = course_with_unit(tmp.path(), "mod1_nc1");
        // A second unit with no documents at all.
        std::fs::create_dir_all(tmp.path().join("mod1_np1")).unwrap();

        let totals = run_pipeline(config, collaborators(title_plan("mod1_nc1")))
            .await
            .unwrap();
        assert_eq!(totals.units, 1);
        assert!(!tmp.path().join("dist/mod1_np1.pptx").exists());
    }

    #[tokio::test]
    async fn test_only_filter_restricts_units() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = course_with_unit(tmp.path(), "mod1_nc1");
        let other = tmp.path().join("mod1_np1");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(other.join("mod1_np1.docx"), minimal_docx()).unwrap();
        std::fs::write(other.join("ROT_MOD1_NP1.docx"), minimal_docx()).unwrap();
        config.only = Some(vec!["mod1_nc1".to_string()]);

        let totals = run_pipeline(config, collaborators(title_plan("mod1_nc1")))
            .await
            .unwrap();
        assert_eq!(totals.units, 1);
        assert!(tmp.path().join("dist/mod1_nc1.pptx").exists());
        assert!(!other.join("mod1_np1.pptx").exists());
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = course_with_unit(tmp.path(), "mod1_nc1");
        config.unit_workers = 0;
        let error = run_pipeline(config, collaborators(title_plan("mod1_nc1")))
            .await
            .unwrap_err();
        assert!(matches!(error, PipelineError::NoUnitWorkers));
    }

    #[tokio::test]
    async fn test_missing_template_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = course_with_unit(tmp.path(), "mod1_nc1");
        config.template = tmp.path().join("nao_existe.pptx");
        let error = run_pipeline(config, collaborators(title_plan("mod1_nc1")))
            .await
            .unwrap_err();
        assert!(matches!(error, PipelineError::TemplateNotFound(_)));
    }

    #[test]
    fn test_collect_dist_replaces_stale_output() {
        let tmp = tempfile::tempdir().unwrap();
        let unit_dir = tmp.path().join("mod1_nc1");
        std::fs::create_dir_all(&unit_dir).unwrap();
        std::fs::write(unit_dir.join("mod1_nc1.pptx"), b"deck").unwrap();
        let dist = tmp.path().join(DIST_DIR);
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(dist.join("antigo.pptx"), b"velho").unwrap();
        std::fs::write(dist.join("notas.txt"), b"fica").unwrap();

        let units = vec![UnitDir {
            id: "mod1_nc1".parse().unwrap(),
            dir: unit_dir,
        }];
        let staged = collect_dist(tmp.path(), &units).unwrap();

        assert_eq!(staged, 1);
        assert!(dist.join("mod1_nc1.pptx").exists());
        assert!(!dist.join("antigo.pptx").exists());
        assert!(dist.join("notas.txt").exists());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(UnitStage::Materializing.to_string(), "materializing");
        assert_eq!(UnitStage::Done.to_string(), "done");
    }
}
