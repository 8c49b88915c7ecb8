//! Canonical type descriptors.

use serde::{Deserialize, Serialize};

/// Handle to an interned [`Type`].
///
/// Ids are dense indices into a [`crate::types::TypeInterner`]; because
/// interning deduplicates by structural equality, id equality is type
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scalar base kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
}

impl ScalarKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::UInt => "uint",
            ScalarKind::Float => "float",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ScalarKind::Bool)
    }

    /// Prefix used to form vector names (`vec`, `ivec`, ...).
    pub(crate) fn vector_prefix(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bvec",
            ScalarKind::Int => "ivec",
            ScalarKind::UInt => "uvec",
            ScalarKind::Float => "vec",
        }
    }
}

/// Opaque texture-sampler kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplerKind {
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    Sampler1DShadow,
    Sampler2DShadow,
    Sampler2DArray,
}

impl SamplerKind {
    pub fn name(&self) -> &'static str {
        match self {
            SamplerKind::Sampler1D => "sampler1D",
            SamplerKind::Sampler2D => "sampler2D",
            SamplerKind::Sampler3D => "sampler3D",
            SamplerKind::SamplerCube => "samplerCube",
            SamplerKind::Sampler1DShadow => "sampler1DShadow",
            SamplerKind::Sampler2DShadow => "sampler2DShadow",
            SamplerKind::Sampler2DArray => "sampler2DArray",
        }
    }
}

/// A named struct field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeId,
}

/// A canonical type descriptor. Never mutated after interning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Scalar(ScalarKind),
    /// 2 to 4 components of one scalar kind.
    Vector { kind: ScalarKind, size: u8 },
    /// Column-major float matrix, 2 to 4 columns and rows.
    Matrix { cols: u8, rows: u8 },
    /// `size` is `None` only for unsized declarations awaiting a size.
    Array { element: TypeId, size: Option<u32> },
    Struct {
        name: String,
        members: Vec<StructMember>,
    },
    Sampler(SamplerKind),
    /// Placeholder produced during error recovery; compares equal only
    /// to itself and converts to nothing.
    Error,
}

impl Type {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Scalar(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector { .. })
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, Type::Matrix { .. })
    }

    pub fn is_numeric(&self) -> bool {
        match self {
            Type::Scalar(k) | Type::Vector { kind: k, .. } => k.is_numeric(),
            Type::Matrix { .. } => true,
            _ => false,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Type::Sampler(_))
    }

    /// Scalar kind of a scalar, vector, or matrix type.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Type::Scalar(k) | Type::Vector { kind: k, .. } => Some(*k),
            Type::Matrix { .. } => Some(ScalarKind::Float),
            _ => None,
        }
    }

    /// Number of scalar components (1 for scalars, rows*cols for matrices).
    pub fn component_count(&self) -> Option<u32> {
        match self {
            Type::Scalar(_) => Some(1),
            Type::Vector { size, .. } => Some(*size as u32),
            Type::Matrix { cols, rows } => Some(*cols as u32 * *rows as u32),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_predicates() {
        assert!(Type::Scalar(ScalarKind::Float).is_numeric());
        assert!(!Type::Scalar(ScalarKind::Bool).is_numeric());
        assert!(Type::Matrix { cols: 2, rows: 2 }.is_numeric());
        assert!(!Type::Void.is_numeric());
    }

    #[test]
    fn test_component_count() {
        assert_eq!(Type::Scalar(ScalarKind::Int).component_count(), Some(1));
        assert_eq!(
            Type::Vector {
                kind: ScalarKind::Float,
                size: 3
            }
            .component_count(),
            Some(3)
        );
        assert_eq!(
            Type::Matrix { cols: 4, rows: 4 }.component_count(),
            Some(16)
        );
        assert_eq!(Type::Void.component_count(), None);
    }
}
