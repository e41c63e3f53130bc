use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Upstream,
    VirtualHost,
    Role,
}

/// Identifies a configuration object.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

/// An accumulated list of error messages for one object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Errors(Vec<String>);

/// The outcome of translating one configuration object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub resource: ResourceRef,
    pub errors: Errors,
}

/// The status persisted alongside a configuration object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub state: StatusState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub reported_by: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusState {
    Accepted,
    Rejected,
}

// === impl ResourceKind ===

impl ResourceKind {
    /// The directory (or collection) name that holds objects of this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Upstream => "upstreams",
            Self::VirtualHost => "virtualhosts",
            Self::Role => "roles",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => "upstream".fmt(f),
            Self::VirtualHost => "virtualhost".fmt(f),
            Self::Role => "role".fmt(f),
        }
    }
}

// === impl ResourceRef ===

impl ResourceRef {
    pub fn upstream(name: impl ToString) -> Self {
        Self {
            kind: ResourceKind::Upstream,
            name: name.to_string(),
        }
    }

    pub fn virtual_host(name: impl ToString) -> Self {
        Self {
            kind: ResourceKind::VirtualHost,
            name: name.to_string(),
        }
    }

    pub fn role(name: impl ToString) -> Self {
        Self {
            kind: ResourceKind::Role,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

// === impl Errors ===

impl Errors {
    pub fn push(&mut self, error: impl fmt::Display) {
        self.0.push(error.to_string());
    }

    pub fn extend(&mut self, other: Errors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for e in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            f.write_str(e)?;
        }
        Ok(())
    }
}

impl<S: ToString> FromIterator<S> for Errors {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(|s| s.to_string()).collect())
    }
}

// === impl Report ===

impl Report {
    pub fn new(resource: ResourceRef, errors: Errors) -> Self {
        Self { resource, errors }
    }

    pub fn is_err(&self) -> bool {
        !self.errors.is_empty()
    }
}

// === impl Status ===

impl Status {
    pub fn accepted() -> Self {
        Self {
            state: StatusState::Accepted,
            reason: None,
            reported_by: crate::CONTROLLER_NAME.to_string(),
        }
    }

    pub fn rejected(reason: impl ToString) -> Self {
        Self {
            state: StatusState::Rejected,
            reason: Some(reason.to_string()),
            reported_by: crate::CONTROLLER_NAME.to_string(),
        }
    }
}
