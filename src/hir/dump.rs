//! Human-readable IR dump, used by the CLI's `--dump-hir`/`--dump-lir`.

use super::{Access, Block, ConstValue, Function, Module, Stmt, ValueKind};
use crate::types::TypeInterner;
use std::fmt::Write;

/// Render a module as indented text. Value ids print as `%N`.
pub fn dump_module(module: &Module, types: &TypeInterner) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; {} shader, version {}", module.stage, module.version);

    for (_, decl) in module.decls.iter() {
        if decl.storage.is_interface() && !decl.builtin {
            let _ = writeln!(
                out,
                "{:?} {} {}",
                decl.storage,
                types.format(decl.ty),
                decl.name
            );
        }
    }

    for func in &module.functions {
        let params: Vec<String> = func
            .params
            .iter()
            .map(|&p| {
                let d = &module.decls[p];
                format!("{} {}", types.format(d.ty), d.name)
            })
            .collect();
        let _ = writeln!(
            out,
            "\nfn {}({}) -> {} {{",
            func.name,
            params.join(", "),
            types.format(func.return_type)
        );
        dump_block(&mut out, module, func, &func.body, 1);
        out.push_str("}\n");
    }
    out
}

fn dump_block(out: &mut String, module: &Module, func: &Function, block: &Block, depth: usize) {
    let pad = "  ".repeat(depth);
    for stmt in block.iter() {
        match stmt {
            Stmt::Store { target, value } => {
                let _ = writeln!(
                    out,
                    "{pad}store {}{} <- {}",
                    module.decls[target.decl].name,
                    fmt_path(func, &target.path),
                    fmt_value(func, *value)
                );
            }
            Stmt::Call {
                function,
                args,
                result,
                ..
            } => {
                let callee = &module.functions[function.index()].name;
                let args: Vec<String> = args.iter().map(|&a| fmt_value(func, a)).collect();
                match result {
                    Some(r) => {
                        let _ = writeln!(
                            out,
                            "{pad}{} = call {}({})",
                            fmt_id(func, *r),
                            callee,
                            args.join(", ")
                        );
                    }
                    None => {
                        let _ = writeln!(out, "{pad}call {}({})", callee, args.join(", "));
                    }
                }
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let _ = writeln!(out, "{pad}if {} {{", fmt_value(func, *cond));
                dump_block(out, module, func, then_block, depth + 1);
                if !else_block.is_empty() {
                    let _ = writeln!(out, "{pad}}} else {{");
                    dump_block(out, module, func, else_block, depth + 1);
                }
                let _ = writeln!(out, "{pad}}}");
            }
            Stmt::Loop { body, continuing } => {
                let _ = writeln!(out, "{pad}loop {{");
                dump_block(out, module, func, body, depth + 1);
                if !continuing.is_empty() {
                    let _ = writeln!(out, "{pad}}} continuing {{");
                    dump_block(out, module, func, continuing, depth + 1);
                }
                let _ = writeln!(out, "{pad}}}");
            }
            Stmt::Switch { value, cases } => {
                let _ = writeln!(out, "{pad}switch {} {{", fmt_value(func, *value));
                for case in cases {
                    let labels: Vec<String> = case
                        .labels
                        .iter()
                        .map(|l| match l {
                            Some(v) => format!("case {v}"),
                            None => "default".into(),
                        })
                        .collect();
                    let _ = writeln!(out, "{pad}  {}:", labels.join(", "));
                    dump_block(out, module, func, &case.body, depth + 2);
                }
                let _ = writeln!(out, "{pad}}}");
            }
            Stmt::Break => {
                let _ = writeln!(out, "{pad}break");
            }
            Stmt::Continue => {
                let _ = writeln!(out, "{pad}continue");
            }
            Stmt::Discard => {
                let _ = writeln!(out, "{pad}discard");
            }
            Stmt::Return(value) => match value {
                Some(v) => {
                    let _ = writeln!(out, "{pad}return {}", fmt_value(func, *v));
                }
                None => {
                    let _ = writeln!(out, "{pad}return");
                }
            },
        }
    }
}

fn fmt_id(func: &Function, id: super::ValueId) -> String {
    let _ = func;
    format!("%{}", id.index())
}

fn fmt_path(func: &Function, path: &[Access]) -> String {
    let mut out = String::new();
    for access in path {
        match access {
            Access::Index(v) => {
                let _ = write!(out, "[{}]", fmt_value(func, *v));
            }
            Access::Member(m) => {
                let _ = write!(out, ".{m}");
            }
            Access::Swizzle(lanes) => {
                out.push('.');
                for &lane in lanes {
                    out.push(lane_name(lane));
                }
            }
        }
    }
    out
}

/// Short inline rendering: constants and loads print directly, anything
/// else by id.
fn fmt_value(func: &Function, id: super::ValueId) -> String {
    let id = func.resolve(id);
    match &func.values[id].kind {
        ValueKind::Constant(c) => fmt_const(c),
        ValueKind::Load(_) => format!("%{}(load)", id.index()),
        _ => format!("%{}", id.index()),
    }
}

fn fmt_const(c: &ConstValue) -> String {
    match c {
        ConstValue::Bool(v) => v.to_string(),
        ConstValue::Int(v) => v.to_string(),
        ConstValue::UInt(v) => format!("{v}u"),
        ConstValue::Float(v) => format!("{v:?}"),
        ConstValue::Vector(elems) => {
            let parts: Vec<String> = elems.iter().map(fmt_const).collect();
            format!("({})", parts.join(", "))
        }
        ConstValue::Matrix { elems, .. } => {
            let parts: Vec<String> = elems.iter().map(|e| format!("{e:?}")).collect();
            format!("mat({})", parts.join(", "))
        }
    }
}

fn lane_name(lane: u8) -> char {
    match lane {
        0 => 'x',
        1 => 'y',
        2 => 'z',
        _ => 'w',
    }
}
