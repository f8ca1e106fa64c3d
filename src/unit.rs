/// Unit identity and discovery.
///
/// A unit is one topical slice of a course: conceptual (`mod1_nc2`),
/// practical (`mod1_np1`) or the synthetic whole-course unit
/// (`mod0_vidint`). The directory name is the canonical rendering and
/// round-trips through [`std::fmt::Display`] / [`std::str::FromStr`].
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Directory names at the course root that never hold units.
static RESERVED_DIRS: phf::Set<&'static str> = phf::phf_set! {
    "assets",
    "roteiros",
    "dist",
    "cards",
    "output",
};

/// The flavor of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitKind {
    /// Conceptual nucleus (`nc`).
    Conceptual,
    /// Practical nucleus (`np`).
    Practical,
    /// Whole-course video unit (`vidint`).
    WholeCourse,
}

/// Identity of a unit within a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId {
    pub module: u32,
    pub kind: UnitKind,
    pub sequence: u32,
}

impl UnitId {
    pub fn conceptual(module: u32, sequence: u32) -> Self {
        Self {
            module,
            kind: UnitKind::Conceptual,
            sequence,
        }
    }

    pub fn practical(module: u32, sequence: u32) -> Self {
        Self {
            module,
            kind: UnitKind::Practical,
            sequence,
        }
    }

    /// The synthetic unit covering the entire course document.
    pub fn whole_course() -> Self {
        Self {
            module: 0,
            kind: UnitKind::WholeCourse,
            sequence: 0,
        }
    }

    /// Canonical directory name of the unit.
    pub fn dir_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            UnitKind::Conceptual => write!(f, "mod{}_nc{}", self.module, self.sequence),
            UnitKind::Practical => write!(f, "mod{}_np{}", self.module, self.sequence),
            UnitKind::WholeCourse => write!(f, "mod0_vidint"),
        }
    }
}

impl FromStr for UnitId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "mod0_vidint" {
            return Ok(Self::whole_course());
        }
        let rest = s
            .strip_prefix("mod")
            .ok_or_else(|| format!("not a unit name: {s}"))?;
        let (module, tail) = rest
            .split_once('_')
            .ok_or_else(|| format!("not a unit name: {s}"))?;
        let module: u32 = module
            .parse()
            .map_err(|_| format!("bad module number in {s}"))?;
        let (kind, sequence) = if let Some(seq) = tail.strip_prefix("nc") {
            (UnitKind::Conceptual, seq)
        } else if let Some(seq) = tail.strip_prefix("np") {
            (UnitKind::Practical, seq)
        } else {
            return Err(format!("unknown unit kind in {s}"));
        };
        let sequence: u32 = sequence
            .parse()
            .map_err(|_| format!("bad sequence number in {s}"))?;
        Ok(Self {
            module,
            kind,
            sequence,
        })
    }
}

impl Serialize for UnitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for UnitId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// A discovered unit: identity plus its directory.
#[derive(Debug, Clone)]
pub struct UnitDir {
    pub id: UnitId,
    pub dir: PathBuf,
}

/// Discover unit directories at the course root.
///
/// Immediate subdirectories only; hidden names, reserved names and
/// directories that do not parse as unit names are skipped. When
/// `include` is given, only names it contains are returned. The result
/// is sorted by directory name.
pub fn discover_units(
    course_root: &Path,
    include: Option<&[String]>,
) -> std::io::Result<Vec<UnitDir>> {
    let mut units = Vec::new();
    for entry in std::fs::read_dir(course_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || RESERVED_DIRS.contains(name.as_str()) {
            continue;
        }
        if let Some(filter) = include {
            if !filter.iter().any(|wanted| wanted == &name) {
                continue;
            }
        }
        match name.parse::<UnitId>() {
            Ok(id) => units.push(UnitDir {
                id,
                dir: entry.path(),
            }),
            Err(_) => {
                tracing::debug!(dir = %name, "skipping non-unit directory");
            }
        }
    }
    units.sort_by_key(|unit| unit.dir.clone());
    Ok(units)
}
