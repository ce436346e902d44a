//! Metric path classification.
//!
//! A path is either *plain* (`servers.web1.cpu.user`) or *tagged*
//! (`cpu.user?dc=eu&host=web1`). Tagged paths carry a metric name before the
//! `?` delimiter and `key=value` tags joined by `&` after it.
//!
//! Decomposition borrows from the path; nothing is copied.
//!
//! # Malformed tag lists
//!
//! A tagged path whose tag list has a segment without `=` (this includes an
//! empty tag list, `name?`, and empty segments such as `a=1&&b=2`) is
//! classified as [`PathKind::Malformed`]. The rule selector still treats such
//! a path as tagged, but evaluates tag-map rules against an empty tag list.

/// Delimiter between the metric name and its tags.
pub const TAG_DELIMITER: char = '?';

/// Key under which the metric name is exposed to tag-map rules.
pub const NAME_TAG: &str = "name";

/// The shape of a metric path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind<'a> {
    /// No tag delimiter.
    Plain,

    /// A well-formed tagged path.
    Tagged(TaggedPath<'a>),

    /// A tagged path whose tag list could not be decomposed.
    Malformed {
        /// The metric name before the delimiter.
        name: &'a str,
    },
}

/// A decomposed tagged path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedPath<'a> {
    /// `("name", name)` followed by the path's own tags in path order.
    labels: Vec<(&'a str, &'a str)>,
}

impl<'a> TaggedPath<'a> {
    /// The metric name before the delimiter.
    pub fn name(&self) -> &'a str {
        self.labels[0].1
    }

    /// The path's tags, in the order they appear in the path.
    pub fn tags(&self) -> &[(&'a str, &'a str)] {
        &self.labels[1..]
    }

    /// The tags prefixed with the `name` pseudo-tag, as seen by tag-map rules.
    pub fn labels(&self) -> &[(&'a str, &'a str)] {
        &self.labels
    }
}

/// Returns `true` if the path contains the tag delimiter.
pub fn is_tagged(path: &str) -> bool {
    path.contains(TAG_DELIMITER)
}

/// Classifies a path and, if tagged, decomposes it into name and tags.
///
/// # Examples
///
/// ```rust
/// use rollup::path::{classify, PathKind};
///
/// assert_eq!(classify("servers.web1.cpu"), PathKind::Plain);
///
/// let PathKind::Tagged(tagged) = classify("cpu?dc=eu&host=web1") else {
///     panic!("expected a tagged path");
/// };
/// assert_eq!(tagged.name(), "cpu");
/// assert_eq!(tagged.tags(), &[("dc", "eu"), ("host", "web1")]);
///
/// assert_eq!(classify("cpu?broken"), PathKind::Malformed { name: "cpu" });
/// ```
pub fn classify(path: &str) -> PathKind<'_> {
    let Some((name, query)) = path.split_once(TAG_DELIMITER) else {
        return PathKind::Plain;
    };

    let mut labels = Vec::with_capacity(query.matches('&').count() + 2);
    labels.push((NAME_TAG, name));

    for segment in query.split('&') {
        match segment.split_once('=') {
            Some(pair) => labels.push(pair),
            None => return PathKind::Malformed { name },
        }
    }

    PathKind::Tagged(TaggedPath { labels })
}
