/// Narration-script (roteiro) intake: course-root zip archives are
/// unpacked into `roteiros/`, then each script is routed into its unit
/// directory by filename.
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{info, warn};

use crate::unit::UnitId;

pub type Result<T> = std::result::Result<T, RoteiroError>;

#[derive(Debug, thiserror::Error)]
pub enum RoteiroError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Course-root directory holding extracted scripts awaiting routing.
pub const ROTEIROS_DIR: &str = "roteiros";

/// Routing pattern: `ROT_MOD<module>_NC<seq>` / `..._NP<seq>` /
/// `..._VIDINT`, with `_` or `-` separators, case-insensitive.
const ROTEIRO_PATTERN: &str = r"(?i)ROT[_-]?MOD(\d+)[_-](?:N([CP])(\d+)|VIDINT)";

/// Extract every `.docx` entry of every `*.zip` in the course root into
/// `roteiros/`, flat. Existing files are kept unless `force`. Returns
/// the files written.
pub fn extract_roteiro_zips(course_dir: &Path, force: bool) -> Result<Vec<PathBuf>> {
    let mut zips = Vec::new();
    for entry in fs::read_dir(course_dir)? {
        let path = entry?.path();
        let is_zip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if path.is_file() && is_zip {
            zips.push(path);
        }
    }
    zips.sort();
    if zips.is_empty() {
        return Ok(Vec::new());
    }

    let roteiros_dir = course_dir.join(ROTEIROS_DIR);
    fs::create_dir_all(&roteiros_dir)?;
    let mut extracted = Vec::new();

    for zip_path in &zips {
        let file = fs::File::open(zip_path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let Some(entry_path) = entry.enclosed_name() else {
                continue;
            };
            let is_docx = entry_path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"));
            let Some(file_name) = entry_path.file_name().map(ToOwned::to_owned) else {
                continue;
            };
            if !is_docx {
                continue;
            }
            let target = roteiros_dir.join(&file_name);
            if target.exists() && !force {
                continue;
            }
            let mut out = fs::File::create(&target)?;
            std::io::copy(&mut entry, &mut out)?;
            extracted.push(target);
        }
    }
    info!(
        zips = zips.len(),
        files = extracted.len(),
        "roteiro archives extracted"
    );
    Ok(extracted)
}

/// Move scripts from `roteiros/` into the unit directory their name
/// points at, creating the directory when needed. Scripts whose name
/// does not match the pattern stay behind with a warning.
pub fn distribute_roteiros(course_dir: &Path, force: bool) -> Result<()> {
    let roteiros_dir = course_dir.join(ROTEIROS_DIR);
    if !roteiros_dir.exists() {
        return Ok(());
    }
    let pattern = Regex::new(ROTEIRO_PATTERN)?;

    let mut scripts = Vec::new();
    for entry in fs::read_dir(&roteiros_dir)? {
        let path = entry?.path();
        let is_docx = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"));
        if path.is_file() && is_docx {
            scripts.push(path);
        }
    }
    scripts.sort();

    for script in scripts {
        let Some(name) = script.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(target_name) = route_name(&pattern, name) else {
            warn!(file = name, "roteiro filename outside the routing pattern");
            continue;
        };
        let target_dir = course_dir.join(&target_name);
        if !target_dir.exists() {
            fs::create_dir_all(&target_dir)?;
            info!(unit = %target_name, file = name, "unit directory created for roteiro");
        }
        let target_path = target_dir.join(name);
        if target_path.exists() && !force {
            continue;
        }
        fs::rename(&script, &target_path)?;
    }
    Ok(())
}

/// The unit directory name a script filename routes to.
fn route_name(pattern: &Regex, file_name: &str) -> Option<String> {
    let captures = pattern.captures(file_name)?;
    let module: u32 = captures[1].parse().ok()?;
    match (captures.get(2), captures.get(3)) {
        (Some(kind), Some(sequence)) => {
            let sequence: u32 = sequence.as_str().parse().ok()?;
            let unit = if kind.as_str().eq_ignore_ascii_case("c") {
                UnitId::conceptual(module, sequence)
            } else {
                UnitId::practical(module, sequence)
            };
            Some(unit.to_string())
        }
        // Whole-course scripts keep the module index of their filename.
        _ => Some(format!("mod{module}_vidint")),
    }
}
