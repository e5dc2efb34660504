//! HTTP conditional request evaluation (RFC 9110 section 13.2.2).
//!
//! Preconditions are evaluated strongest first:
//!
//! 1. `If-Match` (strong comparison); failing gives 412
//! 2. `If-Unmodified-Since`, only without `If-Match`; failing gives 412
//! 3. `If-None-Match` (weak comparison); matching gives 304
//! 4. `If-Modified-Since`, only without `If-None-Match`; unchanged gives 304
//!
//! Times compare at whole seconds because HTTP-dates carry no more.

use crate::backend::ObjectMetadata;
use crate::input::GetInput;

/// What a conditional GET should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Serve the object.
    Proceed,
    /// Answer 304.
    NotModified,
    /// Answer 412.
    PreconditionFailed,
}

/// Evaluates the conditional headers of `input` against an existing object.
pub fn evaluate(input: &GetInput, metadata: &ObjectMetadata) -> Outcome {
    let last_modified = metadata.last_modified.timestamp();

    if let Some(if_match) = input.if_match.as_deref() {
        if !etag_list_matches(if_match, &metadata.etag, strong_eq) {
            return Outcome::PreconditionFailed;
        }
    } else if let Some(since) = input.if_unmodified_since {
        if last_modified > since.timestamp() {
            return Outcome::PreconditionFailed;
        }
    }

    if let Some(if_none_match) = input.if_none_match.as_deref() {
        if etag_list_matches(if_none_match, &metadata.etag, weak_eq) {
            return Outcome::NotModified;
        }
    } else if let Some(since) = input.if_modified_since {
        if last_modified <= since.timestamp() {
            return Outcome::NotModified;
        }
    }

    Outcome::Proceed
}

/// `*` matches any existing object; otherwise any listed tag may match.
fn etag_list_matches(header: &str, current: &str, eq: fn(&str, &str) -> bool) -> bool {
    let header = header.trim();
    if header == "*" {
        return true;
    }
    header
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .any(|tag| eq(tag, current))
}

fn strong_eq(a: &str, b: &str) -> bool {
    !is_weak(a) && !is_weak(b) && opaque(a) == opaque(b)
}

fn weak_eq(a: &str, b: &str) -> bool {
    opaque(a) == opaque(b)
}

fn is_weak(tag: &str) -> bool {
    tag.trim_start().starts_with("W/")
}

/// The opaque tag without the weak prefix or quotes.
fn opaque(tag: &str) -> &str {
    let tag = tag.trim();
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    tag.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn object(etag: &str) -> ObjectMetadata {
        ObjectMetadata {
            last_modified: t(),
            etag: etag.to_string(),
            size: 10,
            content_type: "text/plain".to_string(),
        }
    }

    #[test]
    fn test_no_conditions_proceed() {
        assert_eq!(evaluate(&GetInput::new("a"), &object("\"abc\"")), Outcome::Proceed);
    }

    #[test]
    fn test_if_none_match() {
        let meta = object("\"abc\"");
        let hit = GetInput::new("a").with_if_none_match("\"abc\"");
        let miss = GetInput::new("a").with_if_none_match("\"xyz\"");
        assert_eq!(evaluate(&hit, &meta), Outcome::NotModified);
        assert_eq!(evaluate(&miss, &meta), Outcome::Proceed);
    }

    #[test]
    fn test_if_none_match_is_weak() {
        let meta = object("\"abc\"");
        let input = GetInput::new("a").with_if_none_match("W/\"abc\"");
        assert_eq!(evaluate(&input, &meta), Outcome::NotModified);
    }

    #[test]
    fn test_if_none_match_list_and_star() {
        let meta = object("\"abc\"");
        let list = GetInput::new("a").with_if_none_match("\"one\", \"abc\"");
        let star = GetInput::new("a").with_if_none_match("*");
        assert_eq!(evaluate(&list, &meta), Outcome::NotModified);
        assert_eq!(evaluate(&star, &meta), Outcome::NotModified);
    }

    #[test]
    fn test_if_match() {
        let meta = object("\"abc\"");
        assert_eq!(
            evaluate(&GetInput::new("a").with_if_match("\"abc\""), &meta),
            Outcome::Proceed
        );
        assert_eq!(
            evaluate(&GetInput::new("a").with_if_match("\"xyz\""), &meta),
            Outcome::PreconditionFailed
        );
        assert_eq!(
            evaluate(&GetInput::new("a").with_if_match("*"), &meta),
            Outcome::Proceed
        );
    }

    #[test]
    fn test_if_match_is_strong() {
        let meta = object("\"abc\"");
        let input = GetInput::new("a").with_if_match("W/\"abc\"");
        assert_eq!(evaluate(&input, &meta), Outcome::PreconditionFailed);

        let weak_meta = object("W/\"abc\"");
        let input = GetInput::new("a").with_if_match("\"abc\"");
        assert_eq!(evaluate(&input, &weak_meta), Outcome::PreconditionFailed);
    }

    #[test]
    fn test_if_unmodified_since() {
        let meta = object("\"abc\"");
        let before = GetInput::new("a").with_if_unmodified_since(t() - Duration::seconds(1));
        let after = GetInput::new("a").with_if_unmodified_since(t() + Duration::seconds(1));
        let same = GetInput::new("a").with_if_unmodified_since(t());
        assert_eq!(evaluate(&before, &meta), Outcome::PreconditionFailed);
        assert_eq!(evaluate(&after, &meta), Outcome::Proceed);
        assert_eq!(evaluate(&same, &meta), Outcome::Proceed);
    }

    #[test]
    fn test_if_match_overrides_if_unmodified_since() {
        let meta = object("\"abc\"");
        let input = GetInput::new("a")
            .with_if_match("\"abc\"")
            .with_if_unmodified_since(t() - Duration::seconds(60));
        assert_eq!(evaluate(&input, &meta), Outcome::Proceed);
    }

    #[test]
    fn test_if_modified_since() {
        let meta = object("\"abc\"");
        let same = GetInput::new("a").with_if_modified_since(t());
        let later = GetInput::new("a").with_if_modified_since(t() + Duration::seconds(5));
        let earlier = GetInput::new("a").with_if_modified_since(t() - Duration::seconds(5));
        assert_eq!(evaluate(&same, &meta), Outcome::NotModified);
        assert_eq!(evaluate(&later, &meta), Outcome::NotModified);
        assert_eq!(evaluate(&earlier, &meta), Outcome::Proceed);
    }

    #[test]
    fn test_if_none_match_overrides_if_modified_since() {
        let meta = object("\"abc\"");
        let input = GetInput::new("a")
            .with_if_none_match("\"xyz\"")
            .with_if_modified_since(t() + Duration::seconds(5));
        assert_eq!(evaluate(&input, &meta), Outcome::Proceed);
    }

    #[test]
    fn test_precondition_wins_over_not_modified() {
        let meta = object("\"abc\"");
        let input = GetInput::new("a")
            .with_if_match("\"xyz\"")
            .with_if_none_match("\"abc\"");
        assert_eq!(evaluate(&input, &meta), Outcome::PreconditionFailed);
    }

    #[test]
    fn test_subsecond_mtime_is_truncated() {
        let mut meta = object("\"abc\"");
        meta.last_modified = t() + Duration::milliseconds(700);
        let input = GetInput::new("a").with_if_modified_since(t());
        assert_eq!(evaluate(&input, &meta), Outcome::NotModified);
    }
}
