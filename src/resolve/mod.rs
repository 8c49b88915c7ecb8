//! Name resolution: the scoped symbol table and the host-supplied
//! built-in catalog that seeds the outermost scope.

mod builtins;
mod symbols;

pub use builtins::{BuiltinCatalog, BuiltinFunction, BuiltinVariable};
pub use symbols::{FunctionKind, FunctionSig, ParamSig, SymbolTable};
