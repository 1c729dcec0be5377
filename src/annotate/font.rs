use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::{Face, name_id};
use usvg::fontdb;

/// Font database and family name used for overlay text.
#[derive(Clone)]
pub struct OverlayFont {
    db: Arc<fontdb::Database>,
    family: Option<String>,
}

impl std::fmt::Debug for OverlayFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayFont")
            .field("faces", &self.db.len())
            .field("family", &self.family)
            .finish()
    }
}

#[cfg(target_os = "macos")]
fn fallback_families() -> &'static [&'static str] {
    &["NotoSans", "Helvetica Neue", "Arial"]
}

#[cfg(target_os = "windows")]
fn fallback_families() -> &'static [&'static str] {
    &["NotoSans", "Segoe UI", "Arial"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn fallback_families() -> &'static [&'static str] {
    &["NotoSans", "DejaVu Sans", "Liberation Sans"]
}

impl OverlayFont {
    /// Resolves the preferred font file, then the preferred family, then
    /// platform fallbacks, then whatever face is installed. Never fails: a
    /// missing font only means text renders with usvg's defaults.
    pub fn resolve(font_path: Option<&Path>, font_family: Option<&str>) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        if let Some(path) = font_path {
            match load_font_file(&mut db, path) {
                Ok(family) => return Self::from_db(db, Some(family)),
                Err(err) => warn!("overlay font unavailable, falling back: {:#}", err),
            }
        }

        let candidates = font_family.into_iter().chain(fallback_families().iter().copied());
        for candidate in candidates {
            if has_family(&db, candidate) {
                debug!("overlay font family: {}", candidate);
                return Self::from_db(db, Some(candidate.to_string()));
            }
        }

        let any = db
            .faces()
            .find_map(|face| face.families.first().map(|(name, _)| name.clone()));
        if any.is_none() {
            warn!("no fonts installed; overlay text will not be visible");
        }
        Self::from_db(db, any)
    }

    /// An empty database, for callers that only need background patches.
    pub fn none() -> Self {
        Self::from_db(fontdb::Database::new(), None)
    }

    fn from_db(db: fontdb::Database, family: Option<String>) -> Self {
        Self {
            db: Arc::new(db),
            family,
        }
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub(crate) fn database(&self) -> Arc<fontdb::Database> {
        self.db.clone()
    }
}

fn load_font_file(db: &mut fontdb::Database, path: &Path) -> Result<String> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    let face = Face::parse(&data, 0)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))?;
    let family = extract_family_name(&face)
        .ok_or_else(|| anyhow!("font has no family name: {}", path.display()))?;
    db.load_font_data(data);
    Ok(family)
}

fn has_family(db: &fontdb::Database, family: &str) -> bool {
    let families = [fontdb::Family::Name(family)];
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    db.query(&query).is_some()
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_font_path_falls_back_without_error() {
        let font = OverlayFont::resolve(Some(Path::new("/nonexistent/font.ttf")), None);
        assert!(font.database().len() == 0 || font.family().is_some());
    }

    #[test]
    fn empty_font_has_no_family() {
        let font = OverlayFont::none();
        assert_eq!(font.family(), None);
        assert_eq!(font.database().len(), 0);
    }
}
