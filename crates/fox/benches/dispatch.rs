//! Measures VM dispatch throughput on a non-foldable arithmetic loop, compiled once and then
//! run repeatedly so the measured time reflects interpretation cost rather than compilation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fox::{
    ast::AstContext, bytecode::{compile_unit, BCModule}, diagnostic::DiagnosticEngine, lexer::lex, parser::parse_unit,
    sema, source::SourceManager, vm::Vm,
};

const ADD_LOOP_1000: &str = "
func main() : int {
    var total : int = 0;
    var i : int = 0;
    while i < 1000 {
        total = total + i;
        i = i + 1;
    }
    return total;
}
";

fn compile(source: &str) -> BCModule {
    let mut files = SourceManager::new();
    let file = files.add_buffer("bench.fox", source);
    let mut ctx = AstContext::new();
    let mut diags = DiagnosticEngine::default();
    let tokens = lex(&files, file, &mut ctx.interner, &mut diags);
    let unit = parse_unit(&tokens, &mut ctx, &mut diags).expect("bench source parses");
    sema::analyze(&mut ctx, unit, "main", &mut diags);
    assert!(!diags.has_errors(), "bench source must type-check cleanly");
    compile_unit(&ctx, unit, &mut diags)
}

fn criterion_benchmark(c: &mut Criterion) {
    let module = compile(ADD_LOOP_1000);

    c.bench_function("add_loop_1000__run_module", |b| {
        b.iter(|| {
            let mut vm = Vm::with_writer(Box::new(std::io::sink()));
            let result = vm.run_module(black_box(&module)).unwrap();
            black_box(result);
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
