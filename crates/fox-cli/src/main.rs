//! The Fox command-line driver (spec §6.3: "not part of the core specification... configures
//! the AST context, reads files, invokes the pipeline, and prints diagnostics or runs the VM").

use std::{env, process::ExitCode};

use fox::{
    ast::{dump_unit, AstContext, DeclKind, PrimKind, TypeKind},
    bytecode::{compile_unit, dump_module},
    diagnostic::{render, DiagnosticEngine},
    lexer::lex,
    parser::parse_unit,
    sema,
    source::SourceManager,
    vm::{format_value, Vm},
};

struct Args {
    path: String,
    dump_ast: bool,
    dump_bc: bool,
    run: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut path = None;
    let mut dump_ast = false;
    let mut dump_bc = false;
    let mut run = false;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--dump-ast" => dump_ast = true,
            "--dump-bc" => dump_bc = true,
            "--run" => run = true,
            _ if arg.starts_with("--") => return Err(format!("unknown flag: {arg}")),
            _ if path.is_none() => path = Some(arg),
            _ => return Err(format!("unexpected extra argument: {arg}")),
        }
    }

    let path = path.ok_or_else(|| "usage: fox [--dump-ast] [--dump-bc] [--run] <file.fox>".to_owned())?;
    Ok(Args { path, dump_ast, dump_bc, run })
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut files = SourceManager::new();
    let file = match files.read_file(&args.path) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("error: couldn't read {}: {err}", args.path);
            return ExitCode::FAILURE;
        }
    };
    let mut ctx = AstContext::new();
    let mut diags = DiagnosticEngine::default();

    let tokens = lex(&files, file, &mut ctx.interner, &mut diags);
    let Some(unit) = parse_unit(&tokens, &mut ctx, &mut diags) else {
        print_diagnostics(&diags, &files);
        return ExitCode::FAILURE;
    };

    sema::analyze(&mut ctx, unit, "main", &mut diags);

    if args.dump_ast {
        print!("{}", dump_unit(&ctx, unit));
    }

    if diags.has_errors() {
        print_diagnostics(&diags, &files);
        return ExitCode::FAILURE;
    }

    let module = compile_unit(&ctx, unit, &mut diags);
    print_diagnostics(&diags, &files);

    if args.dump_bc {
        print!("{}", dump_module(&module));
    }

    if args.run {
        let mut vm = Vm::new();
        match vm.run_module(&module) {
            Ok(Some(result)) => {
                let kind = entry_return_kind(&ctx).unwrap_or(PrimKind::Int);
                println!("{}", format_value(kind, vm.heap(), result));
            }
            Ok(None) => {}
            Err(err) => {
                match vm.last_fault_range() {
                    Some(range) => eprintln!("runtime error: {err} at {}", files.complete_loc(range.begin())),
                    None => eprintln!("runtime error: {err}"),
                }
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_diagnostics(diags: &DiagnosticEngine, files: &SourceManager) {
    for diag in diags.diagnostics() {
        eprint!("{}", render(diag, files));
    }
}

/// The entry function's declared return type, for formatting `--run`'s result the way `print`
/// would format the same value. `None` covers a void entry point as well as the defensive case
/// of a missing one (`run_module` already rejected that before this is ever reached).
fn entry_return_kind(ctx: &AstContext) -> Option<PrimKind> {
    let entry = ctx.entry_point?;
    let DeclKind::Func(f) = &ctx.decl(entry).kind else {
        return None;
    };
    let ty = f.resolved_return_type?;
    match ctx.types.kind(ty) {
        TypeKind::Primitive(p) => Some(*p),
        _ => None,
    }
}
