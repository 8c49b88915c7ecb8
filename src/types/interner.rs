//! The type interner.
//!
//! An explicit, injectable cache of canonical type descriptors. One interner
//! is constructed per compilation session and shared by every unit compiled
//! in it; insertion is append-only and deduplicated by structural equality,
//! so the table is safe for read-mostly concurrent use when a host compiles
//! several stages in parallel.

use super::core::{SamplerKind, ScalarKind, Type, TypeId};
use indexmap::IndexSet;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct TypeInterner {
    table: RwLock<IndexSet<Type>>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a descriptor, returning the canonical handle.
    ///
    /// Returns the existing handle when a structurally equal type was
    /// interned before.
    pub fn intern(&self, ty: Type) -> TypeId {
        let mut table = self.table.write().expect("type interner poisoned");
        let (index, _) = table.insert_full(ty);
        TypeId(index as u32)
    }

    /// Fetch a copy of the descriptor behind a handle.
    ///
    /// Panics on a handle from a different interner; handles are never
    /// fabricated outside [`TypeInterner::intern`].
    pub fn get(&self, id: TypeId) -> Type {
        let table = self.table.read().expect("type interner poisoned");
        table
            .get_index(id.index())
            .cloned()
            .unwrap_or_else(|| panic!("dangling type id {:?}", id))
    }

    pub fn len(&self) -> usize {
        self.table.read().expect("type interner poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- Convenience constructors -------------------------------------

    pub fn void(&self) -> TypeId {
        self.intern(Type::Void)
    }

    pub fn bool(&self) -> TypeId {
        self.intern(Type::Scalar(ScalarKind::Bool))
    }

    pub fn int(&self) -> TypeId {
        self.intern(Type::Scalar(ScalarKind::Int))
    }

    pub fn uint(&self) -> TypeId {
        self.intern(Type::Scalar(ScalarKind::UInt))
    }

    pub fn float(&self) -> TypeId {
        self.intern(Type::Scalar(ScalarKind::Float))
    }

    pub fn scalar(&self, kind: ScalarKind) -> TypeId {
        self.intern(Type::Scalar(kind))
    }

    pub fn vector(&self, kind: ScalarKind, size: u8) -> TypeId {
        debug_assert!((2..=4).contains(&size));
        self.intern(Type::Vector { kind, size })
    }

    pub fn matrix(&self, cols: u8, rows: u8) -> TypeId {
        debug_assert!((2..=4).contains(&cols) && (2..=4).contains(&rows));
        self.intern(Type::Matrix { cols, rows })
    }

    pub fn array(&self, element: TypeId, size: Option<u32>) -> TypeId {
        self.intern(Type::Array { element, size })
    }

    pub fn sampler(&self, kind: SamplerKind) -> TypeId {
        self.intern(Type::Sampler(kind))
    }

    pub fn error(&self) -> TypeId {
        self.intern(Type::Error)
    }

    // --- Queries ------------------------------------------------------

    pub fn is_error(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Error)
    }

    pub fn scalar_kind(&self, id: TypeId) -> Option<ScalarKind> {
        self.get(id).scalar_kind()
    }

    pub fn component_count(&self, id: TypeId) -> Option<u32> {
        self.get(id).component_count()
    }

    /// The type of one component: scalars yield themselves, vectors their
    /// scalar, matrices their column vector, arrays their element.
    pub fn component_type(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Scalar(_) => Some(id),
            Type::Vector { kind, .. } => Some(self.scalar(kind)),
            Type::Matrix { rows, .. } => Some(self.vector(ScalarKind::Float, rows)),
            Type::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// A vector (or scalar, for size 1) of the given kind.
    pub fn vector_or_scalar(&self, kind: ScalarKind, size: u8) -> TypeId {
        if size == 1 {
            self.scalar(kind)
        } else {
            self.vector(kind, size)
        }
    }

    /// Same shape as `id` but with scalar kind `kind`.
    pub fn with_scalar_kind(&self, id: TypeId, kind: ScalarKind) -> Option<TypeId> {
        match self.get(id) {
            Type::Scalar(_) => Some(self.scalar(kind)),
            Type::Vector { size, .. } => Some(self.vector(kind, size)),
            _ => None,
        }
    }

    /// Whether `from` converts to `to` by the language's implicit rules:
    /// int→uint, int→float, uint→float, applied component-wise to vectors
    /// of equal size. Identity is not an implicit conversion.
    pub fn implicitly_converts(&self, from: TypeId, to: TypeId) -> bool {
        if from == to {
            return false;
        }
        let (from_ty, to_ty) = (self.get(from), self.get(to));
        let kinds_ok = |f: ScalarKind, t: ScalarKind| {
            matches!(
                (f, t),
                (ScalarKind::Int, ScalarKind::UInt)
                    | (ScalarKind::Int, ScalarKind::Float)
                    | (ScalarKind::UInt, ScalarKind::Float)
            )
        };
        match (from_ty, to_ty) {
            (Type::Scalar(f), Type::Scalar(t)) => kinds_ok(f, t),
            (
                Type::Vector { kind: f, size: n },
                Type::Vector { kind: t, size: m },
            ) => n == m && kinds_ok(f, t),
            _ => false,
        }
    }

    /// Render a handle as source-level syntax (`vec3`, `mat2x3`,
    /// `float[8]`, a struct's name).
    pub fn format(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Void => "void".into(),
            Type::Scalar(k) => k.name().into(),
            Type::Vector { kind, size } => format!("{}{}", kind.vector_prefix(), size),
            Type::Matrix { cols, rows } => {
                if cols == rows {
                    format!("mat{cols}")
                } else {
                    format!("mat{cols}x{rows}")
                }
            }
            Type::Array { element, size } => match size {
                Some(n) => format!("{}[{}]", self.format(element), n),
                None => format!("{}[]", self.format(element)),
            },
            Type::Struct { name, .. } => name,
            Type::Sampler(kind) => kind.name().into(),
            Type::Error => "<error>".into(),
        }
    }
}
