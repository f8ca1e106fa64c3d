/// Deck generation collaborator (provider B): the plan's slides become
/// markdown cards, the service turns them into a deck and exports it,
/// and the largest picture of each deck slide becomes a unit asset.
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::ooxml::pptx::Pptx;
use crate::plan::Slide;

use super::{RemoteError, Result, check_json, network, status_error};

/// Lifecycle of a deck generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckStatus {
    Pending,
    Completed,
    Failed,
    Canceled,
}

impl DeckStatus {
    /// Classify the service's status string. Unknown values count as
    /// still pending, the poll loop keeps waiting on them.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Pending,
        }
    }
}

/// One poll of a generation job.
#[derive(Debug, Clone)]
pub struct DeckJob {
    pub id: String,
    pub status: DeckStatus,
    pub export_url: Option<String>,
    pub credits_deducted: u64,
}

impl DeckJob {
    /// Completed and exportable.
    pub fn is_ready(&self) -> bool {
        self.status == DeckStatus::Completed && self.export_url.is_some()
    }
}

#[async_trait]
pub trait DeckGenerator: Send + Sync {
    /// Submit the cards and return the job id.
    async fn create(&self, cards_markdown: &str) -> Result<String>;
    /// Poll the job once.
    async fn status(&self, job_id: &str) -> Result<DeckJob>;
    /// Download the exported deck.
    async fn fetch_artifact(&self, export_url: &str) -> Result<Vec<u8>>;
}

/// HTTP adapter for the generations endpoint (`X-API-KEY` auth,
/// `POST <endpoint>` to create, `GET <endpoint>/<id>` to poll).
pub struct HttpDeckGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpDeckGenerator {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl DeckGenerator for HttpDeckGenerator {
    async fn create(&self, cards_markdown: &str) -> Result<String> {
        let payload = json!({
            "inputText": cards_markdown,
            "textMode": "generate",
            "format": "presentation",
            "cardSplit": "inputTextBreaks",
            "exportAs": "pptx",
        });
        debug!(endpoint = %self.endpoint, chars = cards_markdown.len(), "submitting deck cards");

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(network)?;
        let data = check_json(response).await?;
        data.get("generationId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RemoteError::MalformedResponse("generationId missing".to_string()))
    }

    async fn status(&self, job_id: &str) -> Result<DeckJob> {
        let url = format!("{}/{job_id}", self.endpoint);
        let response = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(network)?;
        let data = check_json(response).await?;

        let status = data
            .get("status")
            .and_then(Value::as_str)
            .map(DeckStatus::parse)
            .ok_or_else(|| RemoteError::MalformedResponse("status missing".to_string()))?;
        let export_url = data
            .get("exportUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string);
        let credits_deducted = data
            .get("credits")
            .and_then(|credits| credits.get("deducted"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(DeckJob {
            id: job_id.to_string(),
            status,
            export_url,
            credits_deducted,
        })
    }

    async fn fetch_artifact(&self, export_url: &str) -> Result<Vec<u8>> {
        debug!(url = %export_url, "downloading deck export");
        let response = self.client.get(export_url).send().await.map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        let bytes = response.bytes().await.map_err(network)?;
        Ok(bytes.to_vec())
    }
}

/// Poll a job until it completes with an export, fails, or the poll
/// budget runs out.
pub async fn wait_for_export(
    generator: &dyn DeckGenerator,
    job_id: &str,
    poll_interval: Duration,
    max_polls: u32,
) -> Result<DeckJob> {
    for _ in 0..max_polls {
        let job = generator.status(job_id).await?;
        match job.status {
            DeckStatus::Completed if job.export_url.is_some() => {
                info!(job = %job.id, credits = job.credits_deducted, "deck export ready");
                return Ok(job);
            }
            DeckStatus::Failed => {
                return Err(RemoteError::JobFailed(format!("job {job_id} failed")));
            }
            DeckStatus::Canceled => {
                return Err(RemoteError::JobFailed(format!("job {job_id} canceled")));
            }
            _ => tokio::time::sleep(poll_interval).await,
        }
    }
    Err(RemoteError::Timeout)
}

/// Build the cards markdown (one card per slide, separated by `---`)
/// and the parallel list of slide ids the deck slides will map back to.
pub fn cards_markdown(slides: &[Slide]) -> (String, Vec<String>) {
    let mut cards = Vec::with_capacity(slides.len());
    let mut slide_ids = Vec::with_capacity(slides.len());

    for (position, slide) in slides.iter().enumerate() {
        let slide_id = slide
            .slide_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("s{:02}", position + 1));
        slide_ids.push(slide_id);

        let title = slide.title().trim();
        let mut lines = vec![if title.is_empty() {
            "# Slide".to_string()
        } else {
            format!("# {title}")
        }];
        let lead = slide.lead().trim();
        if !lead.is_empty() {
            lines.push(String::new());
            lines.push(format!("Lead: {lead}"));
        }
        let bullets: Vec<&str> = slide
            .bullets()
            .iter()
            .map(|bullet| bullet.trim())
            .filter(|bullet| !bullet.is_empty())
            .collect();
        if !bullets.is_empty() {
            lines.push(String::new());
            lines.push("Bullets:".to_string());
            for bullet in bullets {
                lines.push(format!("- {bullet}"));
            }
        }
        if let Some(image_line) = image_line(slide) {
            lines.push(String::new());
            lines.push(image_line);
        }
        cards.push(lines.join("\n"));
    }

    (cards.join("\n\n---\n\n"), slide_ids)
}

fn image_line(slide: &Slide) -> Option<String> {
    let image = slide.image.as_ref()?;
    if image.source.as_deref() == Some("generated") {
        let intent = image.intent.as_deref().unwrap_or_default().trim();
        if intent.is_empty() {
            return None;
        }
        return Some(format!("Imagem (gerar): {intent}"));
    }
    let path = image.path.as_deref().unwrap_or_default().trim();
    if path.is_empty() {
        None
    } else {
        Some(format!("Imagem (usar): {path}"))
    }
}

/// Save the largest picture of each targeted deck slide as
/// `gen_<slide_id>.<ext>` under `out_dir`. Out-of-range indexes and
/// pictureless slides yield `None`.
pub fn extract_slide_images(
    deck_path: &Path,
    out_dir: &Path,
    targets: &[(usize, String)],
) -> Result<Vec<Option<PathBuf>>> {
    std::fs::create_dir_all(out_dir)?;
    let deck = Pptx::open(deck_path)?;
    let slides = deck.slides()?;

    let mut saved = Vec::with_capacity(targets.len());
    for (index, slide_id) in targets {
        let Some(slide) = slides.get(*index) else {
            saved.push(None);
            continue;
        };
        let Some((bytes, extension)) = deck.largest_picture(&slide.part_name)? else {
            saved.push(None);
            continue;
        };
        let out_path = out_dir.join(format!("gen_{slide_id}.{extension}"));
        std::fs::write(&out_path, bytes)?;
        saved.push(Some(out_path));
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ImageRef;
    use crate::testutil::{PNG_BYTES, template_pptx};

    #[test]
    fn test_status_parse() {
        assert_eq!(DeckStatus::parse("completed"), DeckStatus::Completed);
        assert_eq!(DeckStatus::parse("COMPLETED"), DeckStatus::Completed);
        assert_eq!(DeckStatus::parse("failed"), DeckStatus::Failed);
        assert_eq!(DeckStatus::parse("cancelled"), DeckStatus::Canceled);
        assert_eq!(DeckStatus::parse("processing"), DeckStatus::Pending);
    }

    #[test]
    fn test_cards_markdown_layout() {
        let slides = vec![
            Slide {
                slide_id: Some("s1".to_string()),
                title: Some("Introdução".to_string()),
                lead: Some("Panorama".to_string()),
                bullets: Some(vec!["um".to_string(), " ".to_string(), "dois".to_string()]),
                image: Some(ImageRef {
                    source: Some("generated".to_string()),
                    path: None,
                    intent: Some("diagrama de fluxo".to_string()),
                }),
                ..Slide::default()
            },
            Slide::default(),
        ];
        let (markdown, slide_ids) = cards_markdown(&slides);

        assert_eq!(slide_ids, vec!["s1".to_string(), "s02".to_string()]);
        let cards: Vec<&str> = markdown.split("\n\n---\n\n").collect();
        assert_eq!(cards.len(), 2);
        assert!(cards[0].starts_with("# Introdução"));
        assert!(cards[0].contains("Lead: Panorama"));
        assert!(cards[0].contains("- um\n- dois"));
        assert!(cards[0].contains("Imagem (gerar): diagrama de fluxo"));
        assert_eq!(cards[1], "# Slide");
    }

    #[test]
    fn test_cards_markdown_existing_image_path() {
        let slide = Slide {
            image: Some(ImageRef {
                source: Some("docx".to_string()),
                path: Some("mod1_nc1/img_0001.png".to_string()),
                intent: None,
            }),
            ..Slide::default()
        };
        let (markdown, _) = cards_markdown(std::slice::from_ref(&slide));
        assert!(markdown.contains("Imagem (usar): mod1_nc1/img_0001.png"));
    }

    #[test]
    fn test_extract_slide_images_picks_targets() {
        let tmp = tempfile::tempdir().unwrap();
        let deck_path = tmp.path().join("deck.pptx");
        {
            let mut deck = Pptx::from_bytes(template_pptx()).unwrap();
            let layout = deck.layout_parts().into_iter().next().unwrap();
            let slide_part = deck.add_slide_from_layout(&layout).unwrap();
            deck.insert_picture(
                &slide_part,
                PNG_BYTES.to_vec(),
                "png",
                "image/png",
                (0, 0, 914400, 914400),
            )
            .unwrap();
            deck.save(&deck_path).unwrap();
        }

        let out_dir = tmp.path().join("assets/mod1_nc1");
        let saved = extract_slide_images(
            &deck_path,
            &out_dir,
            &[(3, "s1".to_string()), (9, "s9".to_string()), (0, "s0".to_string())],
        )
        .unwrap();

        assert_eq!(saved.len(), 3);
        let generated = saved[0].as_ref().unwrap();
        assert!(generated.ends_with("gen_s1.png"));
        assert_eq!(std::fs::read(generated).unwrap(), PNG_BYTES);
        // Index past the deck and a pictureless slide both yield None.
        assert!(saved[1].is_none());
        assert!(saved[2].is_none());
    }
}
