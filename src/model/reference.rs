//! Typed references parsed from self-links
//!
//! Links between records are stored as slash-delimited strings such as
//! `https://www.googleapis.com/compute/v1/projects/p1/global/urlMaps/map1`.
//! [`ResourceRef`] parses them once so lookups work on names.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Path segment preceding the name (e.g. `urlMaps`), if any
    pub collection: Option<String>,
    /// Last non-empty path segment
    pub name: String,
}

impl ResourceRef {
    pub fn parse(link: &str) -> Option<Self> {
        let mut segments = link.trim().rsplit('/').filter(|s| !s.is_empty());
        let name = segments.next()?.to_string();
        let collection = segments.next().map(|s| s.to_string());
        Some(Self { collection, name })
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.collection {
            Some(c) => write!(f, "{}/{}", c, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Short name of a link, or "" when the link is empty
pub fn short_name(link: &str) -> String {
    ResourceRef::parse(link).map(|r| r.name).unwrap_or_default()
}
