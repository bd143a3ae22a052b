//! Path-based dispatch between the identity-provider and resource-server
//! surfaces.
//!
//! The rule table is fixed at deploy time and immutable afterwards; lookups
//! are pure and safe to share across request handlers without locking.
//! Resolution picks the most specific matching prefix, so a `/auth` rule wins
//! over the catch-all `/` rule for `/auth/login`.

use crate::errors::RoutingError;

/// Traffic destination for a matched path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// OAuth endpoints: registration, callbacks, discovery metadata.
    IdentityProvider,
    /// The protected MCP resource server.
    ResourceServer,
}

/// A single prefix-to-surface rule.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub prefix: String,
    pub surface: Surface,
}

impl RouteRule {
    pub fn new(prefix: impl Into<String>, surface: Surface) -> Self {
        Self {
            prefix: prefix.into(),
            surface,
        }
    }
}

/// Immutable longest-prefix dispatch table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    /// Rules sorted by prefix length, longest first.
    rules: Vec<RouteRule>,
}

impl RouteTable {
    /// Build a table, rejecting ambiguous rule sets.
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, RoutingError> {
        let mut normalized: Vec<RouteRule> = Vec::with_capacity(rules.len());
        for rule in rules {
            if !rule.prefix.starts_with('/') {
                return Err(RoutingError::InvalidPrefix(rule.prefix));
            }
            let prefix = normalize_prefix(&rule.prefix);
            if normalized.iter().any(|existing| existing.prefix == prefix) {
                return Err(RoutingError::DuplicatePrefix(prefix));
            }
            normalized.push(RouteRule {
                prefix,
                surface: rule.surface,
            });
        }

        normalized.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(Self { rules: normalized })
    }

    /// The standard deployment table: OAuth traffic under `/auth` and the
    /// discovery documents go to the identity provider, everything else to
    /// the resource server.
    pub fn standard() -> Self {
        // Static rule set, construction cannot fail.
        Self::new(vec![
            RouteRule::new("/auth", Surface::IdentityProvider),
            RouteRule::new("/.well-known", Surface::IdentityProvider),
            RouteRule::new("/", Surface::ResourceServer),
        ])
        .expect("standard route table is unambiguous")
    }

    /// Resolve a request path to its surface.
    ///
    /// Matching is segment-aware: `/auth` matches `/auth` and `/auth/login`
    /// but never `/authx`.
    pub fn resolve(&self, path: &str) -> Option<Surface> {
        self.rules
            .iter()
            .find(|rule| prefix_matches(&rule.prefix, path))
            .map(|rule| rule.surface)
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}

fn normalize_prefix(prefix: &str) -> String {
    if prefix.len() > 1 {
        prefix.trim_end_matches('/').to_string()
    } else {
        prefix.to_string()
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
