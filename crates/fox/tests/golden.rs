//! Golden fixture tests (spec §6.2/§8.4): every `tests/fixtures/*.fox` file is run through the
//! full pipeline. `// expect-<severity>[@(+|-)n]: <text>` comments are checked against emitted
//! diagnostics; a sibling `.out` file is checked against the formatted VM result of running the
//! entry point; a sibling `.contains` file is checked line-by-line as substrings of the
//! bytecode dump.

use std::path::Path;

use fox::{
    ast::AstContext,
    bytecode::{compile_unit, dump_module},
    diagnostic::{render, DiagnosticEngine, DiagnosticVerifier},
    lexer::lex,
    parser::parse_unit,
    sema,
    source::SourceManager,
    vm::{format_value, Vm},
};

fn run_fixture(path: &Path) -> datatest_stable::Result<()> {
    let source = std::fs::read_to_string(path)?;
    let verifier = DiagnosticVerifier::parse(&source);

    let mut files = SourceManager::new();
    let file = files.add_buffer(&path.display().to_string(), source);
    let mut ctx = AstContext::new();
    let mut diags = DiagnosticEngine::default();

    let tokens = lex(&files, file, &mut ctx.interner, &mut diags);
    let unit = parse_unit(&tokens, &mut ctx, &mut diags);

    if let Some(unit) = unit {
        sema::analyze(&mut ctx, unit, "main", &mut diags);
    }

    let module = unit.map(|unit| compile_unit(&ctx, unit, &mut diags));

    check_diagnostics(verifier, &diags, &files)?;

    if diags.has_errors() {
        return Ok(());
    }
    let module = module.expect("a unit that compiled without errors always parsed");

    if let Some(expected) = read_sibling(path, "contains") {
        let dump = dump_module(&module);
        for line in expected.lines().map(str::trim).filter(|l| !l.is_empty()) {
            assert!(dump.contains(line), "bytecode dump for {path:?} is missing {line:?}\n---\n{dump}");
        }
    }

    if let Some(expected) = read_sibling(path, "out") {
        let mut vm = Vm::with_writer(Box::new(std::io::sink()));
        let result = vm.run_module(&module).map_err(|e| format!("runtime error: {e}"))?;
        let actual = match result {
            Some(value) => format!("= {}\n", format_value(entry_return_kind(&ctx), vm.heap(), value)),
            None => String::new(),
        };
        assert_eq!(actual.trim_end(), expected.trim_end(), "VM output mismatch for {path:?}");
    }

    Ok(())
}

fn entry_return_kind(ctx: &AstContext) -> fox::ast::PrimKind {
    use fox::ast::{DeclKind, TypeKind};
    let Some(entry) = ctx.entry_point else { return fox::ast::PrimKind::Int };
    let DeclKind::Func(f) = &ctx.decl(entry).kind else { return fox::ast::PrimKind::Int };
    match f.resolved_return_type.map(|ty| ctx.types.kind(ty).clone()) {
        Some(TypeKind::Primitive(p)) => p,
        _ => fox::ast::PrimKind::Int,
    }
}

fn check_diagnostics(
    mut verifier: DiagnosticVerifier,
    diags: &DiagnosticEngine,
    files: &SourceManager,
) -> datatest_stable::Result<()> {
    let mut unexpected = Vec::new();
    for diag in diags.diagnostics() {
        if verifier.verify(diag, files) {
            unexpected.push(render(diag, files));
        }
    }
    let missing = verifier.finish();
    if !unexpected.is_empty() || !missing.is_empty() {
        let mut message = String::new();
        for diag in &unexpected {
            message.push_str("unexpected diagnostic: ");
            message.push_str(diag);
        }
        for m in &missing {
            message.push_str(&m);
            message.push('\n');
        }
        return Err(message.into());
    }
    Ok(())
}

fn read_sibling(fox_path: &Path, ext: &str) -> Option<String> {
    std::fs::read_to_string(fox_path.with_extension(ext)).ok()
}

datatest_stable::harness!(run_fixture, "tests/fixtures", r"^.*\.fox$");
