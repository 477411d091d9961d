//! Prefix-scoped route registration.

use crate::error::RouteError;
use crate::http::handler::RouteHandler;
use crate::routing::router::Router;

/// Registrar that prefixes every pattern with a fixed path.
///
/// The prefix is non-empty, starts with `/` and has no trailing `/`, so
/// `prefix + path` never doubles the slash at the join.
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
}

impl<'r> Group<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: &str) -> Result<Self, RouteError> {
        validate_prefix(prefix)?;
        Ok(Self {
            router,
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register `prefix + path` on the parent router.
    pub fn handle(
        &mut self,
        method: &str,
        path: &str,
        handler: RouteHandler,
        name: &str,
    ) -> Result<&mut Self, RouteError> {
        if !path.starts_with('/') {
            return Err(RouteError::InvalidPath(path.to_string()));
        }
        let full = format!("{}{}", self.prefix, path);
        self.router.handle(method, &full, handler, name)?;
        Ok(self)
    }

    /// Nested group: `self.prefix + prefix`.
    pub fn group(&mut self, prefix: &str) -> Result<Group<'_>, RouteError> {
        validate_prefix(prefix)?;
        let full = format!("{}{}", self.prefix, prefix);
        Group::new(&mut *self.router, &full)
    }
}

fn validate_prefix(prefix: &str) -> Result<(), RouteError> {
    if prefix.is_empty() || !prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(RouteError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}
