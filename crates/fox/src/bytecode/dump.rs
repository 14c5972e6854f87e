//! The deterministic bytecode dump format (spec §6.4), used by golden tests and the CLI's
//! `--dump-bc` flag.

use std::fmt::Write as _;

use super::{
    code::{BCFunction, BCModule, Instr},
    op::Layout,
};

/// Renders `module` in the format described by spec §6.4.
#[must_use]
pub fn dump_module(module: &BCModule) -> String {
    if module.is_empty() {
        return "[Empty BCModule]\n".to_owned();
    }

    let mut out = String::new();
    writeln!(out, "[Constants]").unwrap();
    writeln!(out, "  [Integers: {} constants]", module.consts.ints.len()).unwrap();
    for (idx, value) in module.consts.ints.iter().enumerate() {
        writeln!(out, "    {idx}\t| {value}").unwrap();
    }
    writeln!(out, "  [Floating-Point: {} constants]", module.consts.doubles.len()).unwrap();
    for (idx, value) in module.consts.doubles.iter().enumerate() {
        writeln!(out, "    {idx}\t| {}", value.0).unwrap();
    }
    writeln!(out, "  [Strings: {} constants]", module.consts.strings.len()).unwrap();
    for (idx, value) in module.consts.strings.iter().enumerate() {
        writeln!(out, "    {idx}\t| \"{}\"", escape(value)).unwrap();
    }

    writeln!(out, "[Globals: {}]", module.globals.len()).unwrap();
    for (i, func) in module.globals.iter().enumerate() {
        writeln!(out, "Initializer of Global {i}").unwrap();
        dump_function(&mut out, func);
    }

    let entry = module.entry_point.map_or("None".to_owned(), |i| format!("Function #{i}"));
    writeln!(out, "[Functions: {}][Entry Point: {entry}]", module.functions.len()).unwrap();
    for (i, func) in module.functions.iter().enumerate() {
        writeln!(out, "Function {i}").unwrap();
        dump_function(&mut out, func);
    }

    out
}

fn dump_function(out: &mut String, func: &BCFunction) {
    for (idx, instr) in func.instrs.iter().enumerate() {
        writeln!(out, "    {idx}\t| {}", instr_text(*instr)).unwrap();
    }
}

fn instr_text(instr: Instr) -> String {
    match instr.op.layout() {
        Layout::Ternary => {
            let (dest, lhs, rhs) = instr.as_ternary();
            format!("{} r{dest} r{lhs} r{rhs}", instr.op)
        }
        Layout::SmallBinary => {
            let (dest, src) = instr.as_small_binary();
            format!("{} r{dest} r{src}", instr.op)
        }
        Layout::Binary => {
            let (dest, value) = instr.as_binary();
            format!("{} r{dest} {value}", instr.op)
        }
        Layout::Unary => format!("{} {}", instr.op, instr.as_unary_offset()),
        Layout::Nullary => instr.op.to_string(),
    }
}

/// Escapes backslash, quote, `\n`, `\t`, `\r`, and `\0` for the string-constant dump (spec §6.4).
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::dump_module;
    use crate::bytecode::{BCFunction, BCModule, Instr, Opcode};

    #[test]
    fn empty_module_dumps_sentinel() {
        assert_eq!(dump_module(&BCModule::new()), "[Empty BCModule]\n");
    }

    #[test]
    fn minimal_program_dump_matches_scenario_2() {
        let mut module = BCModule::new();
        let mut f = BCFunction::new("main".to_owned());
        f.instrs.push(Instr::nullary(Opcode::RetVoid));
        f.debug_ranges.push(None);
        module.functions.push(f);
        module.entry_point = Some(0);
        let dump = dump_module(&module);
        assert!(dump.contains("[Entry Point: Function #0]"));
        assert!(dump.contains("0\t| RetVoid"));
    }
}
