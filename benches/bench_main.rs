//! jobsh ベンチマーク: パーサー、パイプライン検査、履歴リング、fork + exec の計測。
//!
//! `std::time::Instant` による手動計測（外部クレート不要）。
//!
//! 実行: `cargo bench`

use std::rc::Rc;
use std::time::{Duration, Instant};

use jobsh::history::{HistoryRef, HistoryRing};
use jobsh::job::JobTable;

// ── ベンチマークインフラ ──────────────────────────────────────────

struct BenchResult {
    category: &'static str,
    name: &'static str,
    avg: Duration,
    iters: u64,
}

impl BenchResult {
    fn print(&self) {
        let avg_us = self.avg.as_nanos() as f64 / 1000.0;
        println!(
            "[{:<8}] {:<40}: avg {:>10.2}µs  ({} iters)",
            self.category, self.name, avg_us, self.iters,
        );
    }
}

fn bench<F: FnMut()>(category: &'static str, name: &'static str, iters: u64, mut f: F) -> BenchResult {
    // ウォームアップ
    for _ in 0..iters.min(100) {
        f();
    }

    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    let elapsed = start.elapsed();

    BenchResult {
        category,
        name,
        avg: elapsed / iters as u32,
        iters,
    }
}

fn print_all(results: &mut Vec<BenchResult>) {
    for r in results.iter() {
        r.print();
    }
    results.clear();
}

// ── メイン ────────────────────────────────────────────────────────

fn main() {
    println!("jobsh benchmark suite");
    println!("{}", "=".repeat(80));

    let mut results = Vec::new();

    // ── パーサー ──
    println!("\n--- Parser ---");

    for line in [
        "echo hello\n",
        "ls -l | grep Cargo | head -1\n",
        "sort < /dev/null > /dev/null\n",
        "sleep 1 &\n",
    ] {
        results.push(bench("parser", line.trim_end(), 10_000, || {
            let _ = jobsh::parser::parse(line);
        }));
    }
    print_all(&mut results);

    // ── 検査 ──
    println!("\n--- Validate ---");

    let piped = jobsh::parser::parse("cat < a | tr a b | tr b c | wc > b").unwrap();
    results.push(bench("validate", "4-stage pipeline", 100_000, || {
        let _ = jobsh::pipeline::validate(&piped);
    }));
    print_all(&mut results);

    // ── 履歴リング ──
    println!("\n--- History ring ---");

    let mut ring = HistoryRing::default();
    results.push(bench("history", "push (full ring)", 100_000, || {
        ring.push("ls -l\n");
    }));
    results.push(bench("history", "resolve !7", 100_000, || {
        if let Some(Ok(r)) = HistoryRef::parse("!7") {
            let _ = ring.resolve(r);
        }
    }));
    results.push(bench("history", "iter (20 entries)", 100_000, || {
        let _ = ring.iter().count();
    }));
    print_all(&mut results);

    // ── fork + exec + wait ──
    println!("\n--- Launch (fork + execvp + waitpid) ---");

    let mut jobs = JobTable::new();
    let true_cmd = Rc::new(jobsh::parser::parse("true").unwrap());
    results.push(bench("launch", "true", 500, || {
        let _ = jobsh::executor::launch(Rc::clone(&true_cmd), &mut jobs, false);
        jobs.list();
    }));
    let piped_cmd = Rc::new(jobsh::parser::parse("true | true").unwrap());
    results.push(bench("launch", "true | true", 500, || {
        let _ = jobsh::executor::launch(Rc::clone(&piped_cmd), &mut jobs, false);
        jobs.list();
    }));
    print_all(&mut results);

    println!("\n{}", "=".repeat(80));
    println!("done.");
}
