use std::{fs, path::PathBuf, sync::RwLock};

use anyhow::{anyhow, Context, Result};

use crate::extractor::html::canonical_location;

/// Immutable snapshot of a page: its markup and where it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub html: String,
    pub location: String,
}

impl Page {
    pub fn new(html: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            location: location.into(),
        }
    }
}

/// Something that can produce the current page on demand. Called
/// synchronously from inside a scan, so it must not block on async work.
pub trait PageSource: Send + Sync {
    fn snapshot(&self) -> Result<Page>;
}

/// In-memory page whose content can be swapped, e.g. by a host that receives
/// rendered markup from elsewhere.
pub struct StaticPage {
    current: RwLock<Page>,
}

impl StaticPage {
    pub fn new(page: Page) -> Self {
        Self {
            current: RwLock::new(page),
        }
    }

    pub fn replace(&self, page: Page) -> Result<()> {
        let mut guard = self
            .current
            .write()
            .map_err(|_| anyhow!("page lock poisoned"))?;
        *guard = page;
        Ok(())
    }

    pub fn set_html(&self, html: impl Into<String>) -> Result<()> {
        let mut guard = self
            .current
            .write()
            .map_err(|_| anyhow!("page lock poisoned"))?;
        guard.html = html.into();
        Ok(())
    }

    pub fn navigate(&self, location: impl Into<String>) -> Result<()> {
        let mut guard = self
            .current
            .write()
            .map_err(|_| anyhow!("page lock poisoned"))?;
        guard.location = location.into();
        Ok(())
    }
}

impl PageSource for StaticPage {
    fn snapshot(&self) -> Result<Page> {
        self.current
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| anyhow!("page lock poisoned"))
    }
}

/// An HTML file on disk, re-read on every snapshot.
///
/// Location resolution order: explicit override, the document's canonical
/// link, then a `file://` URL for the path.
pub struct FilePage {
    path: PathBuf,
    location_override: Option<String>,
}

impl FilePage {
    pub fn new(path: PathBuf, location_override: Option<String>) -> Self {
        Self {
            path,
            location_override,
        }
    }
}

impl PageSource for FilePage {
    fn snapshot(&self) -> Result<Page> {
        let html = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read page {}", self.path.display()))?;

        let location = match &self.location_override {
            Some(location) => location.clone(),
            None => canonical_location(&html).unwrap_or_else(|| {
                let absolute = fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
                format!("file://{}", absolute.display())
            }),
        };

        Ok(Page { html, location })
    }
}
