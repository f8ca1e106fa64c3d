/// Image materialization: slides planned with `image.source =
/// "generated"` get a real file under `assets/<unit>/` and their
/// `image.path` filled in, through one of the two providers.
///
/// Assets already on disk are always adopted instead of regenerated;
/// with `reuse_assets` set no provider is called at all.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::plan::{Plan, Slide};
use crate::remote::{
    Backoff, DeckGenerator, ImageGenerator, ImageRequest, RemoteError, cards_markdown,
    extract_slide_images, wait_for_export, with_backoff,
};
use crate::unit::UnitId;

use super::{RunConfig, UnitError};

/// Directory at the course root holding extracted and generated assets.
pub(crate) const ASSETS_DIR: &str = "assets";

const DECK_POLL_INTERVAL: Duration = Duration::from_secs(15);
const DECK_MAX_POLLS: u32 = 40;

/// What one unit's materialization produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterializeOutcome {
    /// Images generated or adopted from disk.
    pub images: u32,
    /// Credits the deck provider reported, when that provider ran.
    pub credits: Option<f64>,
}

/// Indexes of the slides whose image still needs a file: `standard`
/// slides with a generation intent and no resolvable `path`.
fn generation_targets(plan: &Plan, course_dir: &Path) -> Vec<usize> {
    let mut targets = Vec::new();
    for (index, slide) in plan.slides().iter().enumerate() {
        if slide.kind != "standard" {
            continue;
        }
        let Some(image) = slide.image.as_ref() else {
            continue;
        };
        if image.source.as_deref() != Some("generated") {
            continue;
        }
        let has_intent = image
            .intent
            .as_deref()
            .is_some_and(|intent| !intent.trim().is_empty());
        if !has_intent {
            continue;
        }
        if let Some(path) = image.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            if course_dir.join(path).exists() {
                continue;
            }
        }
        targets.push(index);
    }
    targets
}

fn slide_identifier(slide: &Slide, fallback_position: usize) -> String {
    slide
        .slide_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("s{fallback_position:02}"))
}

fn set_image_path(plan: &mut Plan, index: usize, rel: &str) {
    if let Some(image) = plan
        .slides_mut()
        .get_mut(index)
        .and_then(|slide| slide.image.as_mut())
    {
        image.path = Some(rel.to_string());
    }
}

/// The generation prompt of one slide: its visible content plus the
/// planned intent, bullets capped at six.
fn image_prompt(slide: &Slide) -> String {
    let mut lines = vec!["Crie uma ilustração de apoio para um slide de aula.".to_string()];
    let title = slide.title().trim();
    if !title.is_empty() {
        lines.push(format!("Título: {title}"));
    }
    let lead = slide.lead().trim();
    if !lead.is_empty() {
        lines.push(format!("Lead: {lead}"));
    }
    let bullets: Vec<&str> = slide
        .bullets()
        .iter()
        .map(|bullet| bullet.trim())
        .filter(|bullet| !bullet.is_empty())
        .take(6)
        .collect();
    if !bullets.is_empty() {
        lines.push("Pontos:".to_string());
        for bullet in bullets {
            lines.push(format!("- {bullet}"));
        }
    }
    let intent = slide
        .image
        .as_ref()
        .and_then(|image| image.intent.as_deref())
        .unwrap_or_default()
        .trim();
    if !intent.is_empty() {
        lines.push(format!("Intenção: {intent}"));
    }
    lines.join("\n")
}

struct ImageTask {
    index: usize,
    rel: String,
    out_path: PathBuf,
    prompt: String,
    slide_id: String,
}

/// Provider A: one request per target slide through an inner worker
/// pool; each produced PNG is written to
/// `assets/<unit>/gen_<slide_id>.png` and injected into the plan.
pub(crate) async fn direct(
    config: &RunConfig,
    generator: Arc<dyn ImageGenerator>,
    plan: &mut Plan,
    unit: &UnitId,
) -> Result<MaterializeOutcome, UnitError> {
    let targets = generation_targets(plan, &config.course_dir);
    if targets.is_empty() {
        return Ok(MaterializeOutcome::default());
    }

    let mut tasks = Vec::new();
    for index in targets {
        let slide = &plan.slides()[index];
        let slide_id = slide_identifier(slide, tasks.len() + 1);
        let rel = format!("{ASSETS_DIR}/{unit}/gen_{slide_id}.png");
        let out_path = config.course_dir.join(&rel);
        let prompt = image_prompt(slide);
        tasks.push(ImageTask {
            index,
            rel,
            out_path,
            prompt,
            slide_id,
        });
    }

    // Adopt files a previous run already wrote.
    let mut adopted = 0u32;
    tasks.retain(|task| {
        if task.out_path.exists() {
            set_image_path(plan, task.index, &task.rel);
            adopted += 1;
            false
        } else {
            true
        }
    });
    if adopted > 0 {
        debug!(unit = %unit, adopted, "existing generated images adopted");
    }
    if config.reuse_assets || tasks.is_empty() {
        return Ok(MaterializeOutcome {
            images: adopted,
            credits: None,
        });
    }

    let semaphore = Arc::new(Semaphore::new(config.image_workers.max(1)));
    let mut pool: JoinSet<Result<(usize, String), RemoteError>> = JoinSet::new();
    for task in tasks {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let generator = Arc::clone(&generator);
        let size = config.image_size.clone();
        let quality = config.image_quality.clone();
        let unit_name = unit.to_string();
        pool.spawn(async move {
            let _permit = permit;
            debug!(
                unit = %unit_name,
                slide = %task.slide_id,
                prompt_chars = task.prompt.len(),
                "requesting image"
            );
            let request = ImageRequest {
                prompt: task.prompt,
                size,
                quality,
            };
            let backoff = Backoff::default();
            let bytes =
                with_backoff(&backoff, "image generation", || generator.generate(&request))
                    .await?;
            if let Some(parent) = task.out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&task.out_path, &bytes)?;
            info!(unit = %unit_name, slide = %task.slide_id, path = %task.rel, "image generated");
            Ok((task.index, task.rel))
        });
    }

    let mut generated = adopted;
    let mut first_error: Option<UnitError> = None;
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(Ok((index, rel))) => {
                set_image_path(plan, index, &rel);
                generated += 1;
            }
            Ok(Err(error)) => {
                if first_error.is_none() {
                    first_error = Some(error.into());
                }
            }
            Err(join_error) => {
                if first_error.is_none() {
                    first_error = Some(join_error.into());
                }
            }
        }
    }
    if let Some(error) = first_error {
        return Err(error);
    }
    Ok(MaterializeOutcome {
        images: generated,
        credits: None,
    })
}

/// First `gen_<slide_id>.*` file in the unit's asset directory, by name.
fn find_generated_asset(assets_dir: &Path, slide_id: &str) -> std::io::Result<Option<String>> {
    if !assets_dir.exists() {
        return Ok(None);
    }
    let prefix = format!("gen_{slide_id}.");
    let mut matches = Vec::new();
    for entry in std::fs::read_dir(assets_dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) {
            matches.push(name);
        }
    }
    matches.sort();
    Ok(matches.into_iter().next())
}

/// Provider B: one deck job for all target slides. The cards go out,
/// the exported deck is saved under the unit's asset directory, and the
/// largest picture of each deck slide becomes that target's image.
pub(crate) async fn deck(
    config: &RunConfig,
    generator: &dyn DeckGenerator,
    plan: &mut Plan,
    unit: &UnitId,
) -> Result<MaterializeOutcome, UnitError> {
    let targets = generation_targets(plan, &config.course_dir);
    if targets.is_empty() {
        return Ok(MaterializeOutcome::default());
    }

    let assets_dir = config.course_dir.join(ASSETS_DIR).join(unit.to_string());

    // Adopt assets from a previous deck run before submitting a new job.
    let mut adopted = 0u32;
    let mut remaining = Vec::new();
    for index in targets {
        let slide = &plan.slides()[index];
        let slide_id = slide_identifier(slide, remaining.len() + 1);
        match find_generated_asset(&assets_dir, &slide_id).map_err(UnitError::Io)? {
            Some(file_name) => {
                let rel = format!("{ASSETS_DIR}/{unit}/{file_name}");
                set_image_path(plan, index, &rel);
                adopted += 1;
            }
            None => remaining.push(index),
        }
    }
    if adopted > 0 {
        debug!(unit = %unit, adopted, "existing deck images adopted");
    }
    if config.reuse_assets || remaining.is_empty() {
        return Ok(MaterializeOutcome {
            images: adopted,
            credits: None,
        });
    }

    let card_slides: Vec<Slide> = remaining
        .iter()
        .map(|&index| plan.slides()[index].clone())
        .collect();
    let (markdown, slide_ids) = cards_markdown(&card_slides);

    let backoff = Backoff::default();
    let job_id = with_backoff(&backoff, "deck submission", || generator.create(&markdown)).await?;
    info!(unit = %unit, job = %job_id, cards = slide_ids.len(), "deck job submitted");
    let job = wait_for_export(generator, &job_id, DECK_POLL_INTERVAL, DECK_MAX_POLLS).await?;
    let Some(export_url) = job.export_url.as_deref() else {
        return Err(RemoteError::MalformedResponse("export url missing".to_string()).into());
    };
    let bytes = generator.fetch_artifact(export_url).await.map_err(UnitError::Remote)?;

    std::fs::create_dir_all(&assets_dir).map_err(UnitError::Io)?;
    let export_path = assets_dir.join("deck_export.pptx");
    std::fs::write(&export_path, &bytes).map_err(UnitError::Io)?;
    debug!(unit = %unit, path = %export_path.display(), bytes = bytes.len(), "deck export saved");

    let pairs: Vec<(usize, String)> = slide_ids.into_iter().enumerate().collect();
    let saved = extract_slide_images(&export_path, &assets_dir, &pairs)
        .map_err(UnitError::Remote)?;

    let mut created = adopted;
    for (&index, out_path) in remaining.iter().zip(saved.iter()) {
        let Some(out_path) = out_path else {
            continue;
        };
        let Some(file_name) = out_path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let rel = format!("{ASSETS_DIR}/{unit}/{file_name}");
        set_image_path(plan, index, &rel);
        created += 1;
    }
    info!(
        unit = %unit,
        images = created,
        credits = job.credits_deducted,
        "deck images materialized"
    );
    Ok(MaterializeOutcome {
        images: created,
        credits: Some(job.credits_deducted as f64),
    })
}
