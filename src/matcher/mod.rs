use regex::Regex;

/// Construction anchor for path predicates.
///
/// The root never matches anything on its own; it only hands out leaf nodes
/// which are then combined with [`Node::and`], [`Node::or`] and [`Node::not`].
///
/// ```
/// use git_phrases::matcher::Root;
///
/// let root = Root::new();
/// let node = root
///     .match_path("config/locales")
///     .and(root.match_file_extension("json"))
///     .and(root.match_path("config/locales/legacy").not());
///
/// assert!(node.matches("config/locales/en.json"));
/// assert!(!node.matches("config/locales/legacy/en.json"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Root;

impl Root {
    pub fn new() -> Self {
        Self
    }

    pub fn match_path(&self, path: impl Into<String>) -> Node {
        let path: String = path.into();
        Node::Path(path.trim_end_matches('/').to_string())
    }

    /// Accepts the extension with or without its leading dot.
    pub fn match_file_extension(&self, extension: impl Into<String>) -> Node {
        let extension: String = extension.into();
        Node::FileExtension(extension.trim_start_matches('.').to_string())
    }

    pub fn match_regex(&self, regex: Regex) -> Node {
        Node::Regex(regex)
    }
}

/// A boolean expression over repository paths.
#[derive(Debug, Clone)]
pub enum Node {
    /// Directory-scoped prefix: the path itself or anything beneath it.
    Path(String),
    FileExtension(String),
    /// Unanchored regex search.
    Regex(Regex),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
}

impl Node {
    pub fn and(self, other: Node) -> Node {
        Node::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Node) -> Node {
        Node::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Node {
        Node::Not(Box::new(self))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Node::Path(prefix) => path_has_prefix(path, prefix),
            Node::FileExtension(extension) => file_extension(path) == Some(extension.as_str()),
            Node::Regex(regex) => regex.is_match(path),
            Node::And(left, right) => left.matches(path) && right.matches(path),
            Node::Or(left, right) => left.matches(path) || right.matches(path),
            Node::Not(child) => !child.matches(path),
        }
    }
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Extension of the final path segment, without the dot.
fn file_extension(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.rfind('.').map(|pos| &file_name[pos + 1..])
}
