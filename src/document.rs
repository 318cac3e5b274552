use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Top-level keys are emitted in this order when the document is serialized.
/// Keys not listed here keep their original position after the known ones;
/// nested mapping keys use the serializer default.
pub const SORTED_KEYS: [&str; 9] = [
    "version",
    "build",
    "sphinx",
    "python",
    "method",
    "path",
    "extra_requirements",
    "conda",
    "formats",
];

/// Errors raised while parsing or re-serializing a configuration document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration root must be a mapping")]
    NotAMapping,

    #[error("build section is malformed: {0}")]
    MalformedBuild(String),

    #[error("build section mixes the legacy image shape with the toolchain shape")]
    MixedBuildShape,

    #[error("document cannot be represented as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A Read the Docs configuration document.
///
/// The document is a semi-structured mapping; typed accessors cover the
/// fields the migrators reason about and everything else is carried through
/// untouched. All edit methods are copy-on-write: they return a new
/// `Document` and never mutate `self`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Mapping,
}

/// The `build` section across schema generations. A document is only valid
/// with exactly one of the two shapes; mixing them is a parse error.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildSection {
    /// v1-era shape: a named docker image.
    Legacy {
        image: Option<String>,
        apt_packages: Vec<String>,
    },
    /// Current shape: an OS identifier plus explicit tool versions.
    Toolchain {
        os: Option<String>,
        tools: std::collections::BTreeMap<String, String>,
        apt_packages: Vec<String>,
    },
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

/// Renders a YAML scalar as a string. Old configs sometimes carry bare
/// numbers where the schema wants strings (`python: {version: 3.8}`).
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_sequence(value: &Value) -> Option<Vec<String>> {
    value
        .as_sequence()
        .map(|seq| seq.iter().filter_map(scalar_to_string).collect())
}

impl Document {
    /// Parses raw YAML text. The root must be a mapping.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_yaml::from_str(text)?;
        match value {
            Value::Mapping(root) => Ok(Self { root }),
            _ => Err(DocumentError::NotAMapping),
        }
    }

    pub fn from_mapping(root: Mapping) -> Self {
        Self { root }
    }

    /// Schema generation of the document; absent or non-integer means 1.
    pub fn version(&self) -> u64 {
        self.root
            .get(&key("version"))
            .and_then(Value::as_u64)
            .unwrap_or(1)
    }

    /// Parses the `build` section into its tagged shape, if present.
    pub fn build(&self) -> Result<Option<BuildSection>, DocumentError> {
        match self.root.get(&key("build")) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => BuildSection::from_value(value).map(Some),
        }
    }

    /// `python.version` as a string, if set.
    pub fn python_version(&self) -> Option<String> {
        self.root
            .get(&key("python"))
            .and_then(Value::as_mapping)
            .and_then(|python| python.get(&key("version")))
            .and_then(scalar_to_string)
    }

    pub fn has_conda(&self) -> bool {
        matches!(self.root.get(&key("conda")), Some(v) if !v.is_null())
    }

    /// Returns a new document with the given `build` section.
    pub fn with_build(&self, build: BuildSection) -> Self {
        let mut root = self.root.clone();
        root.insert(key("build"), build.to_value());
        Self { root }
    }

    /// Returns a new document without `python.version`; drops the `python`
    /// mapping entirely if that leaves it empty.
    pub fn without_python_version(&self) -> Self {
        let mut root = self.root.clone();
        let now_empty = match root.get_mut(&key("python")) {
            Some(Value::Mapping(python)) => {
                python.remove(&key("version"));
                python.is_empty()
            }
            _ => false,
        };
        if now_empty {
            root.remove(&key("python"));
        }
        Self { root }
    }

    /// JSON view of the document for schema validation.
    pub fn to_json(&self) -> Result<serde_json::Value, DocumentError> {
        Ok(serde_json::to_value(&self.root)?)
    }

    /// Serializes the document with the fixed top-level key order, which
    /// keeps diffs against the original file minimal.
    pub fn to_yaml(&self) -> Result<String, DocumentError> {
        let mut ordered = Mapping::new();
        for name in SORTED_KEYS {
            if let Some(value) = self.root.get(&key(name)) {
                ordered.insert(key(name), value.clone());
            }
        }
        for (k, v) in &self.root {
            if !ordered.contains_key(k) {
                ordered.insert(k.clone(), v.clone());
            }
        }
        Ok(serde_yaml::to_string(&Value::Mapping(ordered))?)
    }
}

impl BuildSection {
    fn from_value(value: &Value) -> Result<Self, DocumentError> {
        let map = value
            .as_mapping()
            .ok_or_else(|| DocumentError::MalformedBuild("not a mapping".to_string()))?;

        let has_image = map.contains_key(&key("image"));
        let has_os = map.contains_key(&key("os"));
        let has_tools = map.contains_key(&key("tools"));

        if has_image && (has_os || has_tools) {
            return Err(DocumentError::MixedBuildShape);
        }

        let apt_packages = map
            .get(&key("apt_packages"))
            .and_then(string_sequence)
            .unwrap_or_default();

        if has_os || has_tools {
            let os = map.get(&key("os")).and_then(scalar_to_string);
            let mut tools = std::collections::BTreeMap::new();
            if let Some(raw) = map.get(&key("tools")) {
                let tools_map = raw.as_mapping().ok_or_else(|| {
                    DocumentError::MalformedBuild("tools is not a mapping".to_string())
                })?;
                for (k, v) in tools_map {
                    let name = k.as_str().ok_or_else(|| {
                        DocumentError::MalformedBuild("tool name is not a string".to_string())
                    })?;
                    let version = scalar_to_string(v).ok_or_else(|| {
                        DocumentError::MalformedBuild(format!(
                            "version of tool {name} is not a scalar"
                        ))
                    })?;
                    tools.insert(name.to_string(), version);
                }
            }
            Ok(BuildSection::Toolchain {
                os,
                tools,
                apt_packages,
            })
        } else {
            let image = map.get(&key("image")).and_then(scalar_to_string);
            Ok(BuildSection::Legacy {
                image,
                apt_packages,
            })
        }
    }

    fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        match self {
            BuildSection::Legacy {
                image,
                apt_packages,
            } => {
                if let Some(image) = image {
                    map.insert(key("image"), Value::String(image.clone()));
                }
                if !apt_packages.is_empty() {
                    map.insert(
                        key("apt_packages"),
                        Value::Sequence(
                            apt_packages
                                .iter()
                                .map(|p| Value::String(p.clone()))
                                .collect(),
                        ),
                    );
                }
            }
            BuildSection::Toolchain {
                os,
                tools,
                apt_packages,
            } => {
                if let Some(os) = os {
                    map.insert(key("os"), Value::String(os.clone()));
                }
                if !tools.is_empty() {
                    let mut tools_map = Mapping::new();
                    for (name, version) in tools {
                        tools_map.insert(key(name), Value::String(version.clone()));
                    }
                    map.insert(key("tools"), Value::Mapping(tools_map));
                }
                if !apt_packages.is_empty() {
                    map.insert(
                        key("apt_packages"),
                        Value::Sequence(
                            apt_packages
                                .iter()
                                .map(|p| Value::String(p.clone()))
                                .collect(),
                        ),
                    );
                }
            }
        }
        Value::Mapping(map)
    }

    /// Packages carried across the migration regardless of shape.
    pub fn apt_packages(&self) -> &[String] {
        match self {
            BuildSection::Legacy { apt_packages, .. } => apt_packages,
            BuildSection::Toolchain { apt_packages, .. } => apt_packages,
        }
    }
}
