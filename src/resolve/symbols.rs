//! Symbol table with scoped lookups.
//!
//! A stack of scopes mapping names to declarations. Scopes are ordered maps
//! so iteration follows declaration order; lookups walk outward until found
//! or exhausted. Variables, functions, and struct type names share one
//! namespace for redeclaration checks, as the language requires.

use crate::ast::ParamQualifier;
use crate::common::Span;
use crate::hir::{DeclId, FunctionId};
use crate::types::TypeId;
use indexmap::IndexMap;

/// A function signature visible to overload resolution.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub name: String,
    pub params: Vec<ParamSig>,
    pub return_type: TypeId,
    pub kind: FunctionKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSig {
    pub ty: TypeId,
    pub qualifier: ParamQualifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Host-provided built-in; calls lower to `CallBuiltin` values.
    Builtin,
    /// User function, by index into the module's function list. The body
    /// may not be lowered yet when the signature is recorded.
    User(FunctionId),
}

impl FunctionSig {
    /// Same name and parameter types (qualifiers ignored).
    pub fn matches_params(&self, other: &FunctionSig) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.ty == b.ty)
    }
}

#[derive(Debug, Default)]
struct Scope {
    variables: IndexMap<String, DeclId>,
    functions: IndexMap<String, Vec<FunctionSig>>,
    types: IndexMap<String, TypeId>,
}

impl Scope {
    fn declares(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.types.contains_key(name)
    }
}

/// Scoped name-to-declaration mapping.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    /// Starts with the outermost (built-in) scope already pushed.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the built-in scope");
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare a variable in the innermost scope. `Err` on a name already
    /// declared in that same scope.
    pub fn declare_variable(&mut self, name: &str, decl: DeclId) -> Result<(), ()> {
        let scope = self.scopes.last_mut().expect("scope stack never empty");
        if scope.declares(name) {
            return Err(());
        }
        scope.variables.insert(name.to_string(), decl);
        Ok(())
    }

    /// Declare a struct type name in the innermost scope.
    pub fn declare_type(&mut self, name: &str, ty: TypeId) -> Result<(), ()> {
        let scope = self.scopes.last_mut().expect("scope stack never empty");
        if scope.declares(name) {
            return Err(());
        }
        scope.types.insert(name.to_string(), ty);
        Ok(())
    }

    /// Add a function signature to the innermost scope's overload set.
    /// `Err` when a signature with identical parameter types already exists
    /// (a prototype being completed by its definition is handled by the
    /// caller replacing the entry via [`SymbolTable::replace_function`]).
    pub fn declare_function(&mut self, sig: FunctionSig) -> Result<(), ()> {
        let scope = self.scopes.last_mut().expect("scope stack never empty");
        if scope.variables.contains_key(&sig.name) || scope.types.contains_key(&sig.name) {
            return Err(());
        }
        let overloads = scope.functions.entry(sig.name.clone()).or_default();
        if overloads.iter().any(|s| s.matches_params(&sig)) {
            return Err(());
        }
        overloads.push(sig);
        Ok(())
    }

    /// Replace an existing signature with identical parameter types, used
    /// when a definition completes a prototype.
    pub fn replace_function(&mut self, sig: FunctionSig) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(overloads) = scope.functions.get_mut(&sig.name) {
                if let Some(slot) = overloads.iter_mut().find(|s| s.matches_params(&sig)) {
                    *slot = sig;
                    return true;
                }
            }
        }
        false
    }

    /// Innermost-first variable lookup.
    pub fn lookup_variable(&self, name: &str) -> Option<DeclId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.variables.get(name).copied())
    }

    /// Innermost-first struct type lookup.
    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.types.get(name).copied())
    }

    /// All visible overloads for a name, innermost scopes first. User
    /// declarations precede the built-in scope's this way, which is what
    /// exact-match preference needs.
    pub fn lookup_functions(&self, name: &str) -> Vec<&FunctionSig> {
        let mut out = Vec::new();
        for scope in self.scopes.iter().rev() {
            if let Some(overloads) = scope.functions.get(name) {
                out.extend(overloads.iter());
            }
        }
        out
    }

    /// Whether any declaration (of any kind) uses this name.
    pub fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| {
            s.declares(name) || s.functions.contains_key(name)
        })
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::Declaration;
    use crate::types::TypeInterner;
    use id_arena::Arena;

    fn fresh_decl(decls: &mut Arena<Declaration>, name: &str, ty: TypeId) -> DeclId {
        decls.alloc(Declaration {
            name: name.into(),
            ty,
            storage: crate::hir::Storage::Local,
            precision: None,
            init: None,
            builtin: false,
            span: Span::default(),
        })
    }

    #[test]
    fn test_scope_nesting() {
        let tys = TypeInterner::new();
        let mut decls = Arena::new();
        let mut table = SymbolTable::new();

        let x = fresh_decl(&mut decls, "x", tys.float());
        table.declare_variable("x", x).unwrap();

        table.push_scope();
        let y = fresh_decl(&mut decls, "y", tys.float());
        table.declare_variable("y", y).unwrap();

        assert!(table.lookup_variable("x").is_some());
        assert!(table.lookup_variable("y").is_some());

        table.pop_scope();
        assert!(table.lookup_variable("x").is_some());
        assert!(table.lookup_variable("y").is_none());
    }

    #[test]
    fn test_shadowing() {
        let tys = TypeInterner::new();
        let mut decls = Arena::new();
        let mut table = SymbolTable::new();

        let outer = fresh_decl(&mut decls, "x", tys.float());
        table.declare_variable("x", outer).unwrap();

        table.push_scope();
        let inner = fresh_decl(&mut decls, "x", tys.int());
        table.declare_variable("x", inner).unwrap();
        assert_eq!(table.lookup_variable("x"), Some(inner));

        table.pop_scope();
        assert_eq!(table.lookup_variable("x"), Some(outer));
    }

    #[test]
    fn test_same_scope_redeclaration() {
        let tys = TypeInterner::new();
        let mut decls = Arena::new();
        let mut table = SymbolTable::new();

        let a = fresh_decl(&mut decls, "x", tys.float());
        table.declare_variable("x", a).unwrap();
        let b = fresh_decl(&mut decls, "x", tys.float());
        assert!(table.declare_variable("x", b).is_err());
    }

    #[test]
    fn test_overloads_accumulate() {
        let tys = TypeInterner::new();
        let mut table = SymbolTable::new();
        let float = tys.float();
        let int = tys.int();

        let sig = |ty| FunctionSig {
            name: "f".into(),
            params: vec![ParamSig {
                ty,
                qualifier: ParamQualifier::In,
            }],
            return_type: float,
            kind: FunctionKind::Builtin,
            span: Span::default(),
        };
        table.declare_function(sig(float)).unwrap();
        table.declare_function(sig(int)).unwrap();
        // Same parameter types again is a redeclaration.
        assert!(table.declare_function(sig(float)).is_err());
        assert_eq!(table.lookup_functions("f").len(), 2);
    }
}
