//! Invalidation flags.
//!
//! Flags are string tags attached to cache entries at write time; patterns
//! over flags drive bulk invalidation. Route identity is carried as an
//! ordered list of segments and only joined with `:` at the formatting
//! boundary.

use std::collections::HashSet;

/// Flag attached to every entry whose route has no name.
pub const BARE_ROUTE_FLAG: &str = "route";

/// Catch-all appended when an entry carries no content-specific flag,
/// keeping it reachable by a stable exact pattern.
pub const GENERIC_FLAG: &str = "flag";

/// Hierarchical route identity, e.g. `api.v1.users.index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteName(Vec<String>);

impl RouteName {
    /// Parse a dotted route name into ordered segments.
    pub fn new(name: &str) -> Self {
        Self(
            name.split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Format the route flag: `route:a:b:c`, or bare `route` for an
    /// empty name.
    pub fn flag(&self) -> String {
        if self.0.is_empty() {
            return BARE_ROUTE_FLAG.to_string();
        }
        format!("{BARE_ROUTE_FLAG}:{}", self.0.join(":"))
    }
}

/// Format the coarse URL flag for a short URL hash.
pub fn url_flag(url_hash: &str) -> String {
    format!("url:{url_hash}")
}

/// Assemble the final flag list for an entry.
///
/// Custom flags recorded during the request come first, then the route flag
/// (bare `route` when the route is unnamed), then the URL flag. The list is
/// deduplicated preserving order. When the entry ends up with no
/// content-specific flag at all (only the bare route fallback and the URL
/// hash), the generic catch-all is appended as well.
pub fn assemble(custom: &[String], route: Option<&RouteName>, url_hash: &str) -> Vec<String> {
    let route_flag = route.map_or_else(|| BARE_ROUTE_FLAG.to_string(), RouteName::flag);

    let mut flags: Vec<String> = custom.to_vec();
    flags.push(route_flag);
    flags.push(url_flag(url_hash));

    let mut seen = HashSet::new();
    flags.retain(|flag| seen.insert(flag.clone()));

    let content_specific = flags
        .iter()
        .any(|flag| flag != BARE_ROUTE_FLAG && !flag.starts_with("url:"));
    if !content_specific {
        flags.push(GENERIC_FLAG.to_string());
    }

    flags
}
