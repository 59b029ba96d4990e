//! Cache key namespaces.
//!
//! Every cached read path builds its key with one of the functions below, and
//! every write path invalidates through a [`Cascade`]. Builders are pure, so the
//! write side reconstructs exactly the key the read side used.
//!
//! Namespaces overlap on purpose: a user's task list lives under
//! `tasks:user:{u}:org:{o}` and is also reachable through the per-user
//! patterns. When adding a builder, add it to the cascade of every entity it
//! takes as input.
//!
//! | Builder | Key |
//! |---------|-----|
//! | [`user`] | `user:{u}` |
//! | [`user_organizations`] | `user:{u}:orgs` |
//! | [`user_permissions`] | `user:{u}:org:{o}:permissions` |
//! | [`user_tasks`] | `tasks:user:{u}:org:{o}` |
//! | [`user_task_stats`] | `tasks:user:{u}:org:{o}:stats` |
//! | [`user_projects`] | `projects:user:{u}:org:{o}` |
//! | [`organization`] | `org:{o}` |
//! | [`organization_members`] | `org:{o}:members` |
//! | [`organization_projects`] | `projects:org:{o}` |
//! | [`organization_stats`] | `stats:org:{o}` |
//! | [`organization_billing`] | `billing:org:{o}` |
//! | [`organization_ai_providers`] | `ai:org:{o}:providers` |
//! | [`project`] | `project:{p}` |
//! | [`project_members`] | `project:{p}:members` |
//! | [`project_tasks`] | `tasks:project:{p}` |
//! | [`project_stats`] | `stats:project:{p}` |

use crate::error::KeyError;
use std::fmt::{self, Display};

const MAX_KEY_LEN: usize = 1024;
const GLOB_META: [char; 5] = ['*', '?', '[', ']', '\\'];

/// An exact cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate a caller-supplied key.
    ///
    /// Keys built by this module's functions never need this.
    pub fn parse(key: impl Into<String>) -> Result<Self, KeyError> {
        let key = key.into();
        check_common(&key)?;
        if let Some(ch) = key.chars().find(|c| GLOB_META[..4].contains(c)) {
            return Err(KeyError::InvalidCharacter { input: key, ch });
        }
        Ok(Self(key))
    }

    fn built(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A Redis glob pattern selecting keys to invalidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern(String);

impl KeyPattern {
    /// Validate a caller-supplied pattern. Patterns that match every key are
    /// rejected.
    pub fn parse(pattern: impl Into<String>) -> Result<Self, KeyError> {
        let pattern = pattern.into();
        check_common(&pattern)?;
        if pattern.chars().all(|c| c == '*') {
            return Err(KeyError::MatchesEverything(pattern));
        }
        Ok(Self(pattern))
    }

    fn built(pattern: String) -> Self {
        Self(pattern)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_common(input: &str) -> Result<(), KeyError> {
    if input.is_empty() {
        return Err(KeyError::Empty);
    }
    if input.len() > MAX_KEY_LEN {
        return Err(KeyError::TooLong {
            len: input.len(),
            max: MAX_KEY_LEN,
        });
    }
    if let Some(ch) = input.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(KeyError::InvalidCharacter {
            input: input.to_string(),
            ch,
        });
    }
    Ok(())
}

/// Escape an identifier so it matches only itself inside a pattern.
fn escape(id: impl Display) -> String {
    let raw = id.to_string();
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if GLOB_META.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

// -- users ------------------------------------------------------------------

pub fn user(user_id: impl Display) -> CacheKey {
    CacheKey::built(format!("user:{user_id}"))
}

/// Organizations a user belongs to.
pub fn user_organizations(user_id: impl Display) -> CacheKey {
    CacheKey::built(format!("user:{user_id}:orgs"))
}

pub fn user_permissions(user_id: impl Display, org_id: impl Display) -> CacheKey {
    CacheKey::built(format!("user:{user_id}:org:{org_id}:permissions"))
}

/// Tasks assigned to a user within one organization.
pub fn user_tasks(user_id: impl Display, org_id: impl Display) -> CacheKey {
    CacheKey::built(format!("tasks:user:{user_id}:org:{org_id}"))
}

pub fn user_task_stats(user_id: impl Display, org_id: impl Display) -> CacheKey {
    CacheKey::built(format!("tasks:user:{user_id}:org:{org_id}:stats"))
}

pub fn user_projects(user_id: impl Display, org_id: impl Display) -> CacheKey {
    CacheKey::built(format!("projects:user:{user_id}:org:{org_id}"))
}

// -- organizations ----------------------------------------------------------

pub fn organization(org_id: impl Display) -> CacheKey {
    CacheKey::built(format!("org:{org_id}"))
}

pub fn organization_members(org_id: impl Display) -> CacheKey {
    CacheKey::built(format!("org:{org_id}:members"))
}

pub fn organization_projects(org_id: impl Display) -> CacheKey {
    CacheKey::built(format!("projects:org:{org_id}"))
}

/// Dashboard aggregates for an organization.
pub fn organization_stats(org_id: impl Display) -> CacheKey {
    CacheKey::built(format!("stats:org:{org_id}"))
}

pub fn organization_billing(org_id: impl Display) -> CacheKey {
    CacheKey::built(format!("billing:org:{org_id}"))
}

/// AI provider configuration for an organization.
pub fn organization_ai_providers(org_id: impl Display) -> CacheKey {
    CacheKey::built(format!("ai:org:{org_id}:providers"))
}

// -- projects ---------------------------------------------------------------

pub fn project(project_id: impl Display) -> CacheKey {
    CacheKey::built(format!("project:{project_id}"))
}

pub fn project_members(project_id: impl Display) -> CacheKey {
    CacheKey::built(format!("project:{project_id}:members"))
}

pub fn project_tasks(project_id: impl Display) -> CacheKey {
    CacheKey::built(format!("tasks:project:{project_id}"))
}

pub fn project_stats(project_id: impl Display) -> CacheKey {
    CacheKey::built(format!("stats:project:{project_id}"))
}

/// Exact keys and patterns to delete when one entity changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cascade {
    pub keys: Vec<CacheKey>,
    pub patterns: Vec<KeyPattern>,
}

impl Cascade {
    /// Everything scoped to a user, including their membership in `org_id`.
    pub fn user(user_id: impl Display, org_id: impl Display) -> Self {
        let (u, o) = (user_id.to_string(), org_id.to_string());
        let eu = escape(&u);
        Self {
            keys: vec![
                user(&u),
                user_organizations(&u),
                user_permissions(&u, &o),
                user_tasks(&u, &o),
                user_task_stats(&u, &o),
                user_projects(&u, &o),
                organization_members(&o),
            ],
            patterns: vec![
                KeyPattern::built(format!("user:{eu}:*")),
                KeyPattern::built(format!("tasks:user:{eu}:*")),
                KeyPattern::built(format!("projects:user:{eu}:*")),
            ],
        }
    }

    pub fn project(project_id: impl Display) -> Self {
        let p = project_id.to_string();
        let ep = escape(&p);
        Self {
            keys: vec![
                project(&p),
                project_members(&p),
                project_tasks(&p),
                project_stats(&p),
            ],
            patterns: vec![
                KeyPattern::built(format!("project:{ep}:*")),
                KeyPattern::built(format!("tasks:project:{ep}:*")),
            ],
        }
    }

    /// Everything scoped to an organization, including every member's
    /// per-organization keys.
    pub fn organization(org_id: impl Display) -> Self {
        let o = org_id.to_string();
        let eo = escape(&o);
        Self {
            keys: vec![
                organization(&o),
                organization_members(&o),
                organization_projects(&o),
                organization_stats(&o),
                organization_billing(&o),
                organization_ai_providers(&o),
            ],
            patterns: vec![
                KeyPattern::built(format!("org:{eo}:*")),
                KeyPattern::built(format!("user:*:org:{eo}:*")),
                KeyPattern::built(format!("tasks:user:*:org:{eo}")),
                KeyPattern::built(format!("tasks:user:*:org:{eo}:*")),
                KeyPattern::built(format!("projects:user:*:org:{eo}")),
            ],
        }
    }

    pub(crate) fn key_strings(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.as_str().to_string()).collect()
    }
}
