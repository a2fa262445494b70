use core::fmt;

use crate::{VfsError, VfsResult};

pub const MAX_NAME_LEN: usize = 20;
pub const PATH_SEPARATOR: char = '/';

/// Checks a single entry name: 1..=20 characters from `[A-Za-z0-9_-]`.
pub fn validate_name(name: &str) -> VfsResult<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(VfsError::IncorrectName(format!(
            "{name:?}: length must be 1..={MAX_NAME_LEN}"
        )));
    }
    let valid = name
        .bytes()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == b'-' || ch == b'_');
    if !valid {
        return Err(VfsError::IncorrectName(format!(
            "{name:?}: only letters, digits, '-' and '_' are allowed"
        )));
    }
    Ok(())
}

/// Navigation token: an ordered list of validated name components.
///
/// A path carries no storage state; it is resolved against a volume on every use.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VPath {
    components: Vec<String>,
}

impl VPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a `/`-separated path. Empty segments (leading, trailing or doubled
    /// separators) are skipped; every other segment must be a valid name.
    pub fn parse(path: &str) -> VfsResult<Self> {
        let mut components = Vec::new();
        for segment in path.split(PATH_SEPARATOR) {
            if segment.is_empty() {
                continue;
            }
            validate_name(segment)?;
            components.push(segment.to_owned());
        }
        Ok(Self { components })
    }

    pub fn child(&self, name: &str) -> VfsResult<Self> {
        validate_name(name)?;
        let mut components = self.components.clone();
        components.push(name.to_owned());
        Ok(Self { components })
    }

    /// The root is its own parent.
    pub fn parent(&self) -> Self {
        let mut components = self.components.clone();
        components.pop();
        Self { components }
    }

    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }
}

impl fmt::Display for VPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "{PATH_SEPARATOR}{component}")?;
        }
        Ok(())
    }
}
