// Graph name validation, canonicalization and resolution for ROS1 names

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

/// Errors that can occur while parsing or resolving a graph name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Name is empty
    Empty,
    /// Name contains characters outside `[A-Za-z0-9_/~]`
    InvalidCharacters(String),
    /// Name does not start with a letter, `/` or `~`
    InvalidStart(String),
    /// `~` appears somewhere other than the first position
    MisplacedTilde(String),
    /// A private name was used where only global or relative names are allowed
    PrivateName(String),
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "graph name is empty"),
            Self::InvalidCharacters(s) => write!(f, "graph name contains invalid characters: {}", s),
            Self::InvalidStart(s) => write!(f, "graph name must start with a letter, '/' or '~': {}", s),
            Self::MisplacedTilde(s) => write!(f, "'~' is only allowed as the first character: {}", s),
            Self::PrivateName(s) => write!(f, "cannot resolve private name without a node: {}", s),
        }
    }
}

impl std::error::Error for NameError {}

const SEPARATOR: char = '/';
const PRIVATE: char = '~';

fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == SEPARATOR || c == PRIVATE
}

/// Collapse duplicate separators, drop trailing ones and turn `~/x` into `~x`.
fn canonicalize(raw: &str) -> String {
    let (prefix, rest) = if let Some(rest) = raw.strip_prefix(SEPARATOR) {
        ("/", rest)
    } else if let Some(rest) = raw.strip_prefix(PRIVATE) {
        ("~", rest)
    } else {
        ("", raw)
    };
    let segments: Vec<&str> = rest.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
    format!("{}{}", prefix, segments.join("/"))
}

/// A validated, canonical ROS graph name.
///
/// Global names start with `/`, private names with `~`, and anything else is
/// relative. The only way to obtain an empty name is [`GraphName::to_relative`]
/// on the root or on a bare `~`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GraphName(String);

impl GraphName {
    /// Parse and canonicalize a raw name.
    ///
    /// # Examples
    /// ```
    /// use ros_tcp::name::GraphName;
    ///
    /// assert_eq!(GraphName::parse("/foo//bar/").unwrap().as_str(), "/foo/bar");
    /// assert_eq!(GraphName::parse("~/param").unwrap().as_str(), "~param");
    /// assert!(GraphName::parse("/~foo").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let mut chars = raw.chars();
        let first = chars.next().ok_or(NameError::Empty)?;

        if let Some(bad) = raw.chars().find(|c| !is_valid_char(*c)) {
            return Err(NameError::InvalidCharacters(format!("'{}' in {}", bad, raw)));
        }
        if !(first.is_ascii_alphabetic() || first == SEPARATOR || first == PRIVATE) {
            return Err(NameError::InvalidStart(raw.to_string()));
        }
        if chars.any(|c| c == PRIVATE) {
            return Err(NameError::MisplacedTilde(raw.to_string()));
        }

        Ok(Self(canonicalize(raw)))
    }

    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub(crate) fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn is_global(&self) -> bool {
        self.0.starts_with(SEPARATOR)
    }

    pub fn is_private(&self) -> bool {
        self.0.starts_with(PRIVATE)
    }

    pub fn is_relative(&self) -> bool {
        !self.is_global() && !self.is_private()
    }

    /// Convert a relative name to a global one by rooting it at `/`.
    ///
    /// Private names need a node to be made global and are rejected.
    pub fn to_global(&self) -> Result<GraphName, NameError> {
        if self.is_global() {
            Ok(self.clone())
        } else if self.is_private() {
            Err(NameError::PrivateName(self.0.clone()))
        } else {
            Ok(Self(format!("/{}", self.0)))
        }
    }

    /// Strip the leading `/` or `~`.
    pub fn to_relative(&self) -> GraphName {
        if self.is_global() || self.is_private() {
            Self(self.0[1..].to_string())
        } else {
            self.clone()
        }
    }

    /// The enclosing namespace. The parent of the root is the root.
    pub fn parent(&self) -> GraphName {
        if self.is_root() {
            return self.clone();
        }
        match self.0.rfind(SEPARATOR) {
            Some(0) => Self::root(),
            Some(idx) => Self(self.0[..idx].to_string()),
            None if self.is_private() && self.0.len() > 1 => Self("~".to_string()),
            None => Self::empty(),
        }
    }

    /// The last segment of the name, as a relative name.
    pub fn basename(&self) -> GraphName {
        match self.0.rfind(SEPARATOR) {
            Some(idx) => Self(self.0[idx + 1..].to_string()),
            None => self.to_relative(),
        }
    }

    /// Join `other` onto this name.
    ///
    /// A global `other` is returned unchanged; private names are joined by
    /// their relative tail.
    pub fn join(&self, other: &GraphName) -> GraphName {
        if other.is_global() {
            return other.clone();
        }
        let other = other.to_relative();
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other;
        }
        if self.is_root() || self.0 == "~" {
            Self(format!("{}{}", self.0, other.0))
        } else {
            Self(format!("{}/{}", self.0, other.0))
        }
    }

    /// Whether this name equals `namespace` or lives below it.
    pub fn is_within(&self, namespace: &GraphName) -> bool {
        if namespace.is_root() || namespace.is_empty() {
            return true;
        }
        self.0 == namespace.0
            || (self.0.starts_with(&namespace.0)
                && self.0[namespace.0.len()..].starts_with(SEPARATOR))
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GraphName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GraphName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for GraphName {
    type Error = NameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<GraphName> for String {
    fn from(value: GraphName) -> Self {
        value.0
    }
}

impl AsRef<str> for GraphName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolves names against a namespace and a remapping table.
///
/// Remappings are matched exactly against the parsed name before resolution.
/// Private names cannot be resolved here; use a [`NodeNameResolver`].
#[derive(Debug, Clone)]
pub struct NameResolver {
    namespace: GraphName,
    remappings: Arc<HashMap<GraphName, GraphName>>,
}

impl Default for NameResolver {
    fn default() -> Self {
        Self {
            namespace: GraphName::root(),
            remappings: Arc::new(HashMap::new()),
        }
    }
}

impl NameResolver {
    pub fn new(
        namespace: GraphName,
        remappings: HashMap<GraphName, GraphName>,
    ) -> Result<Self, NameError> {
        let remappings = Arc::new(remappings);
        let namespace = lookup(&remappings, &namespace).to_global()?;
        Ok(Self {
            namespace,
            remappings,
        })
    }

    pub fn namespace(&self) -> &GraphName {
        &self.namespace
    }

    pub fn remappings(&self) -> &HashMap<GraphName, GraphName> {
        &self.remappings
    }

    fn lookup(&self, name: &GraphName) -> GraphName {
        lookup(&self.remappings, name)
    }

    /// Resolve `name` inside `namespace`, applying remappings to both.
    pub fn resolve_in(
        &self,
        namespace: &GraphName,
        name: &GraphName,
    ) -> Result<GraphName, NameError> {
        let namespace = self.lookup(namespace).to_global()?;
        let name = self.lookup(name);
        if name.is_global() {
            Ok(name)
        } else if name.is_private() {
            Err(NameError::PrivateName(name.to_string()))
        } else {
            Ok(namespace.join(&name))
        }
    }

    pub fn resolve(&self, name: &GraphName) -> Result<GraphName, NameError> {
        self.resolve_in(&self.namespace, name)
    }

    pub fn resolve_str(&self, name: &str) -> Result<GraphName, NameError> {
        self.resolve(&GraphName::parse(name)?)
    }

    /// A resolver rooted at `namespace` (resolved against this one) that
    /// shares the same remappings.
    pub fn child(&self, namespace: &GraphName) -> Result<NameResolver, NameError> {
        Ok(Self {
            namespace: self.resolve(namespace)?,
            remappings: self.remappings.clone(),
        })
    }

    /// A resolver able to expand private names for the node `node_name`.
    pub fn node_resolver(&self, node_name: &GraphName) -> Result<NodeNameResolver, NameError> {
        Ok(NodeNameResolver {
            node_name: self.resolve(node_name)?,
            parent: self.clone(),
        })
    }
}

fn lookup(remappings: &HashMap<GraphName, GraphName>, name: &GraphName) -> GraphName {
    remappings.get(name).cloned().unwrap_or_else(|| name.clone())
}

/// A [`NameResolver`] scoped to one node, so `~name` expands to
/// `<node name>/name`.
#[derive(Debug, Clone)]
pub struct NodeNameResolver {
    node_name: GraphName,
    parent: NameResolver,
}

impl NodeNameResolver {
    pub fn node_name(&self) -> &GraphName {
        &self.node_name
    }

    pub fn namespace(&self) -> &GraphName {
        self.parent.namespace()
    }

    pub fn resolve(&self, name: &GraphName) -> Result<GraphName, NameError> {
        let name = self.parent.lookup(name);
        if name.is_private() {
            Ok(self.node_name.join(&name.to_relative()))
        } else {
            self.parent.resolve(&name)
        }
    }

    pub fn resolve_str(&self, name: &str) -> Result<GraphName, NameError> {
        self.resolve(&GraphName::parse(name)?)
    }
}
