//! QG-015: Operation registry: the signature source the extractor reads.
//!
//! The core never introspects operations itself. A registry hands out
//! explicit signature descriptors; `descriptor` provides the static table
//! implementation loaded from a build-time descriptor file.

pub mod descriptor;

use indexmap::IndexMap;
use std::fmt;

pub use descriptor::StaticRegistry;

/// Operations that clone, decorate or introspect the registry itself.
/// They are never exposed as aggregatable operations.
pub const ADMINISTRATIVE_OPERATIONS: &[&str] =
    &["WithTx", "ExtractMethods", "GetPkg", "Clone", "Describe"];

/// Whether `name` belongs to the administrative exclusion set.
pub fn is_administrative(name: &str) -> bool {
    ADMINISTRATIVE_OPERATIONS.contains(&name)
}

/// A named composite type with ordered fields (field → type name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDescriptor {
    pub name: String,
    pub fields: IndexMap<String, String>,
}

/// Shape of a single input or output slot of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    /// The mandatory invocation context (cancellation, deadlines).
    Context,
    /// The error slot.
    Error,
    /// A non-composite value (`i64`, `String`, a driver result handle).
    Scalar(String),
    /// A composite type.
    Struct(StructDescriptor),
    /// A single-item reference.
    Ref(Box<TypeDescriptor>),
    /// A collection.
    List(Box<TypeDescriptor>),
    /// A type expression the descriptor could not make sense of.
    Unknown(String),
}

impl TypeDescriptor {
    /// The innermost named type, with references and collections stripped.
    pub fn base_name(&self) -> &str {
        match self {
            Self::Context => "ctx",
            Self::Error => "error",
            Self::Scalar(name) => name,
            Self::Struct(s) => &s.name,
            Self::Ref(inner) | Self::List(inner) => inner.base_name(),
            Self::Unknown(text) => text,
        }
    }

    /// The composite behind at most one reference, if any.
    pub fn as_struct(&self) -> Option<&StructDescriptor> {
        match self {
            Self::Struct(s) => Some(s),
            Self::Ref(inner) => match inner.as_ref() {
                Self::Struct(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => write!(f, "ctx"),
            Self::Error => write!(f, "error"),
            Self::Scalar(name) => write!(f, "{}", name),
            Self::Struct(s) => write!(f, "{}", s.name),
            Self::Ref(inner) => write!(f, "&{}", inner),
            Self::List(inner) => write!(f, "[{}]", inner),
            Self::Unknown(text) => write!(f, "?{}", text),
        }
    }
}

/// Parameter and return shape of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSignature {
    /// Inputs, the invocation context first.
    pub inputs: Vec<TypeDescriptor>,
    /// Outputs, the error slot last.
    pub outputs: Vec<TypeDescriptor>,
}

/// Source of operation signatures.
pub trait OperationRegistry {
    /// Namespace (module/package) the operations live in.
    fn namespace(&self) -> &str;

    /// Resolve one operation by name.
    fn resolve(&self, name: &str) -> Option<OperationSignature>;

    /// Every exposed operation, administrative ones excluded.
    fn list_operations(&self) -> Vec<(String, OperationSignature)>;

    /// Composite types the registry knows about, in declaration order.
    fn list_types(&self) -> Vec<StructDescriptor>;
}
