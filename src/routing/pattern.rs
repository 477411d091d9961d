//! Compiled path patterns.
//!
//! # Syntax
//! - `/users/list`: literal segments only (static)
//! - `/users/:id`: `:name` captures exactly one non-empty segment
//! - `/files/*path`: `*name` captures the rest of the path (possibly empty); must be last
//!
//! # Design Decisions
//! - Patterns are split into segments once, at registration
//! - Matching walks the request path in place; nothing is allocated unless a param is captured
//! - No regex

use crate::error::RouteError;
use crate::routing::params::Params;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

/// A dynamic route pattern compiled into segments.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// True when any segment of `pattern` is a `:param` or `*wildcard`.
    pub fn is_dynamic(pattern: &str) -> bool {
        pattern
            .split('/')
            .any(|seg| seg.starts_with(':') || seg.starts_with('*'))
    }

    pub fn compile(pattern: &str) -> Result<Self, RouteError> {
        let Some(body) = pattern.strip_prefix('/') else {
            return Err(RouteError::InvalidPath(pattern.to_string()));
        };

        let invalid = |reason| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let parts: Vec<&str> = body.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid("parameter name must not be empty"));
                }
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if name.is_empty() {
                    return Err(invalid("wildcard name must not be empty"));
                }
                if i != parts.len() - 1 {
                    return Err(invalid("wildcard must be the last segment"));
                }
                Segment::Wildcard(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of params a successful match produces.
    pub fn param_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Match without capturing.
    pub fn matches(&self, path: &str) -> bool {
        self.walk(path, |_, _| {})
    }

    /// Match and append captured values to `params`. On a miss `params` is left empty.
    pub fn capture(&self, path: &str, params: &mut Params) -> bool {
        let matched = self.walk(path, |key, value| params.push(key, value));
        if !matched {
            params.clear();
        }
        matched
    }

    fn walk<'p>(&self, path: &'p str, mut on_capture: impl FnMut(&str, &'p str)) -> bool {
        let mut rest = match path.strip_prefix('/') {
            Some(rest) => Some(rest),
            None => return false,
        };

        for segment in &self.segments {
            if let Segment::Wildcard(name) = segment {
                on_capture(name, rest.unwrap_or(""));
                return true;
            }

            let Some(current) = rest else {
                return false;
            };
            let (part, tail) = match current.find('/') {
                Some(idx) => (&current[..idx], Some(&current[idx + 1..])),
                None => (current, None),
            };

            match segment {
                Segment::Literal(literal) => {
                    if part != literal {
                        return false;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return false;
                    }
                    on_capture(name, part);
                }
                Segment::Wildcard(_) => unreachable!("wildcard handled above"),
            }
            rest = tail;
        }

        rest.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::params::ParamPool;

    #[test]
    fn test_is_dynamic() {
        assert!(PathPattern::is_dynamic("/users/:id"));
        assert!(PathPattern::is_dynamic("/static/*file"));
        assert!(!PathPattern::is_dynamic("/users/list"));
        assert!(!PathPattern::is_dynamic("/"));
    }

    #[test]
    fn test_named_segments() {
        let pattern = PathPattern::compile("/users/:id/posts/:post").unwrap();
        let pool = ParamPool::new();
        let mut params = pool.acquire(pattern.param_count());

        assert!(pattern.capture("/users/42/posts/7", &mut params));
        assert_eq!(params.by_name("id"), "42");
        assert_eq!(params.by_name("post"), "7");

        assert!(!pattern.matches("/users/42/posts"));
        assert!(!pattern.matches("/users//posts/7"));
        assert!(!pattern.matches("/users/42/posts/7/"));
    }

    #[test]
    fn test_wildcard_captures_remainder() {
        let pattern = PathPattern::compile("/files/*path").unwrap();
        let pool = ParamPool::new();

        let mut params = pool.acquire(1);
        assert!(pattern.capture("/files/a/b/c.txt", &mut params));
        assert_eq!(params.by_name("path"), "a/b/c.txt");

        let mut params = pool.acquire(1);
        assert!(pattern.capture("/files", &mut params));
        assert_eq!(params.by_name("path"), "");

        let mut params = pool.acquire(1);
        assert!(pattern.capture("/files/", &mut params));
        assert_eq!(params.by_name("path"), "");

        assert!(!pattern.matches("/other/a"));
    }

    #[test]
    fn test_failed_capture_leaves_params_empty() {
        let pattern = PathPattern::compile("/a/:x/b").unwrap();
        let pool = ParamPool::new();
        let mut params = pool.acquire(1);

        assert!(!pattern.capture("/a/1/c", &mut params));
        assert!(params.is_empty());
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            PathPattern::compile("users/:id"),
            Err(RouteError::InvalidPath(_))
        ));
        assert!(matches!(
            PathPattern::compile("/files/*path/more"),
            Err(RouteError::InvalidPattern { .. })
        ));
        assert!(matches!(
            PathPattern::compile("/users/:"),
            Err(RouteError::InvalidPattern { .. })
        ));
    }
}
