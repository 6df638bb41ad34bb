use criterion::{black_box, criterion_group, criterion_main, Criterion};
use islet::Runner;

/// Recursive factorial, to exercise closure invocation and the
/// watermark heap's promote-on-return path through a deep call chain.
const FACTORIAL: &str = "
(defun fact (n) (if (<= n 1) 1 (* n (fact (- n 1)))))
(fact 20)
";

/// A tight `while` loop, to exercise the evaluator's dispatch overhead
/// without any call-stack depth.
const SUM_LOOP: &str = "
(defglobal total 0)
(defglobal i 0)
(while (< i 10000)
  (setq total (+ total i))
  (setq i (+ i 1)))
total
";

fn factorial_recursion(c: &mut Criterion) {
    c.bench_function("factorial_20_recursive", |b| {
        b.iter(|| {
            let mut runner = Runner::new();
            black_box(runner.run_str(FACTORIAL));
        });
    });
}

fn sum_loop(c: &mut Criterion) {
    c.bench_function("sum_loop_10000", |b| {
        b.iter(|| {
            let mut runner = Runner::new();
            black_box(runner.run_str(SUM_LOOP));
        });
    });
}

criterion_group!(benches, factorial_recursion, sum_loop);
criterion_main!(benches);
