use crate::extractor::{
    Encoding, Extractor, ExtractorConfig, JsonExtractor, PatternExtractor, UnknownEncoding,
};
use crate::git::{GitError, GitRepo, Repo};
use crate::matcher::{Node, Root};
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("empty `{0}` expression in match")]
    EmptyExpression(&'static str),
    #[error("unknown extractor kind: {0}")]
    UnknownExtractor(String),
    #[error(transparent)]
    UnknownEncoding(#[from] UnknownEncoding),
    #[error("repository {name}: {source}")]
    Git {
        name: String,
        #[source]
        source: GitError,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// On-disk configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Store location, relative to the config file.
    pub db: Option<PathBuf>,
    #[serde(default)]
    pub repos: Vec<RepoEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoEntry {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub locales: Vec<String>,
    #[serde(default)]
    pub extractors: Vec<ExtractorEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractorEntry {
    /// `json` or `pattern`.
    pub kind: String,
    pub encoding: Option<String>,
    #[serde(rename = "match")]
    pub matcher: MatchExpr,
    /// Language tag reported in syntax errors (pattern extractors).
    /// Defaults to `source`.
    pub language: Option<String>,
    /// Translation function name for call-site extraction; defaults to `t`.
    pub function: Option<String>,
    /// Custom regex; the `key` group (or first group) is the phrase.
    pub pattern: Option<String>,
}

/// Path predicate as written in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchExpr {
    Path(String),
    Extension(String),
    Regex(String),
    And(Vec<MatchExpr>),
    Or(Vec<MatchExpr>),
    Not(Box<MatchExpr>),
}

impl MatchExpr {
    /// Build the predicate tree; n-ary `and`/`or` fold left into binary nodes.
    pub fn to_node(&self) -> Result<Node> {
        let root = Root::new();
        match self {
            MatchExpr::Path(path) => Ok(root.match_path(path.as_str())),
            MatchExpr::Extension(extension) => Ok(root.match_file_extension(extension.as_str())),
            MatchExpr::Regex(pattern) => Ok(root.match_regex(compile(pattern)?)),
            MatchExpr::And(operands) => fold(operands, "and", Node::and),
            MatchExpr::Or(operands) => fold(operands, "or", Node::or),
            MatchExpr::Not(child) => Ok(child.to_node()?.not()),
        }
    }
}

fn fold(operands: &[MatchExpr], name: &'static str, combine: fn(Node, Node) -> Node) -> Result<Node> {
    let (first, rest) = operands
        .split_first()
        .ok_or(ConfigError::EmptyExpression(name))?;
    rest.iter()
        .try_fold(first.to_node()?, |acc, expr| -> Result<Node> {
            Ok(combine(acc, expr.to_node()?))
        })
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

impl ExtractorEntry {
    pub fn to_extractor_config(&self) -> Result<ExtractorConfig> {
        let extractor: Arc<dyn Extractor> = match self.kind.as_str() {
            "json" => Arc::new(JsonExtractor),
            "pattern" => {
                let language = self.language.clone().unwrap_or_else(|| "source".to_string());
                match &self.pattern {
                    Some(pattern) => Arc::new(PatternExtractor::new(language, compile(pattern)?)),
                    None => {
                        let function = self.function.as_deref().unwrap_or("t");
                        let extractor = PatternExtractor::call_site(language, function)
                            .map_err(|source| ConfigError::InvalidRegex {
                                pattern: function.to_string(),
                                source,
                            })?;
                        Arc::new(extractor)
                    }
                }
            }
            other => return Err(ConfigError::UnknownExtractor(other.to_string())),
        };

        let encoding = match &self.encoding {
            Some(name) => name.parse::<Encoding>()?,
            None => Encoding::default(),
        };

        Ok(ExtractorConfig::new(extractor)
            .set_encoding(encoding)
            .set_matcher(self.matcher.to_node()?))
    }
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Open every repository and build its extractor configs.
    ///
    /// Relative paths are resolved against `base_dir`.
    pub fn build(&self, base_dir: &Path) -> Result<Configuration> {
        let mut repos = Vec::with_capacity(self.repos.len());
        for entry in &self.repos {
            let repo = GitRepo::open(&base_dir.join(&entry.path)).map_err(|source| {
                ConfigError::Git {
                    name: entry.name.clone(),
                    source,
                }
            })?;

            let mut config = RepoConfig::new(entry.name.clone(), Arc::new(repo))
                .set_locales(entry.locales.clone());
            for extractor in &entry.extractors {
                config = config.add_extractor(extractor.to_extractor_config()?);
            }
            repos.push(config);
        }

        Ok(Configuration {
            db_path: self.db.as_ref().map(|db| base_dir.join(db)),
            repos,
        })
    }
}

/// A configured repository: history access, locales and extractor bindings.
#[derive(Clone)]
pub struct RepoConfig {
    pub name: String,
    pub repo: Arc<dyn Repo>,
    pub locales: Vec<String>,
    pub extractor_configs: Vec<ExtractorConfig>,
}

impl RepoConfig {
    pub fn new(name: impl Into<String>, repo: Arc<dyn Repo>) -> Self {
        Self {
            name: name.into(),
            repo,
            locales: Vec::new(),
            extractor_configs: Vec::new(),
        }
    }

    pub fn set_locales(mut self, locales: Vec<String>) -> Self {
        self.locales = locales;
        self
    }

    pub fn add_extractor(mut self, config: ExtractorConfig) -> Self {
        self.extractor_configs.push(config);
        self
    }

    /// Every extractor config whose matcher accepts `path`, in declaration order.
    pub fn extractor_configs_for<'a>(
        &'a self,
        path: &str,
    ) -> impl Iterator<Item = &'a ExtractorConfig> {
        self.extractor_configs
            .iter()
            .filter(move |config| config.matches(path))
    }
}

impl fmt::Debug for RepoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoConfig")
            .field("name", &self.name)
            .field("locales", &self.locales)
            .field("extractor_configs", &self.extractor_configs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub db_path: Option<PathBuf>,
    pub repos: Vec<RepoConfig>,
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Self> {
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        ConfigFile::load(path)?.build(base_dir)
    }

    pub fn add_repo(mut self, repo: RepoConfig) -> Self {
        self.repos.push(repo);
        self
    }

    pub fn get_repo(&self, name: &str) -> Option<&RepoConfig> {
        self.repos.iter().find(|repo| repo.name == name)
    }
}
