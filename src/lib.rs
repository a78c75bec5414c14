use std::io::Read;
use std::sync::Arc;
use std::{fs, io, path, thread};

use log::{info, warn};

pub mod config;
pub mod portfolio;
pub mod sat;

use crate::config::{Options, Resolved, SearchMode};
use crate::portfolio::assumptions::{AssumptionGenerator, Strategy};
use crate::portfolio::comm;
use crate::portfolio::learnts::LearntsExchange;
use crate::portfolio::master::{Coordinator, Outcome};
use crate::portfolio::occurs;
use crate::portfolio::stats::Statistics;
use crate::portfolio::worker::{self, WorkerOptions};
use crate::sat::engine::{CancelToken, Engine, SolveResult};
use crate::sat::{bcnf, dimacs, Formula};


#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RunOutcome {
    Sat,
    Unsat,
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match *self {
            RunOutcome::Sat => 10,
            RunOutcome::Unsat => 20,
            RunOutcome::Interrupted => 1,
        }
    }
}


pub fn run(
    in_path: &path::Path,
    out_path: Option<&path::Path>,
    opts: &Options,
    cancel: &CancelToken,
) -> io::Result<RunOutcome> {
    let mut stats = Statistics::new();
    stats.start_wall();
    stats.start_measure();

    let initial_time = time::precise_time_s();
    let formula = Arc::new(parse_input(in_path)?);
    let parse_time = time::precise_time_s() - initial_time;

    info!("============================[ Problem Statistics ]=============================");
    info!("|  Number of variables:  {:12}                                         |", formula.num_vars());
    info!("|  Number of clauses:    {:12}                                         |", formula.num_clauses());
    info!("|  Parse time:           {:12.2} s                                       |", parse_time);
    info!("===============================================================================");

    let resolved = opts.resolve(num_cpus::get(), formula.num_vars())?;

    // The master's own solver doubles as the trivial-contradiction probe
    // and as the local-mode engine.
    let mut local = Engine::new(&formula, cancel.clone());
    if !local.simplify() {
        info!("Solved by top-level propagation");
        stats.set_cpus(1);
        stats.finish_measure_init();
        return finish(out_path, RunOutcome::Unsat, None, &formula, stats, false, opts, &resolved, in_path);
    }

    // A formula without variables leaves nothing to split over.
    if resolved.mode == SearchMode::Local || formula.num_vars() == 0 {
        stats.set_cpus(1);
        stats.finish_measure_init();

        let started = time::precise_time_s();
        let result = local.solve(&[]);
        stats.inc_cpu_time(0, time::precise_time_s() - started);

        let (outcome, model) = match result {
            SolveResult::Sat => (RunOutcome::Sat, Some(model_lits(&local))),
            SolveResult::Unsat => (RunOutcome::Unsat, None),
            SolveResult::Interrupted => (RunOutcome::Interrupted, None),
        };
        return finish(out_path, outcome, model, &formula, stats, false, opts, &resolved, in_path);
    }

    drop(local);
    run_parallel(formula, resolved, opts, cancel, stats, out_path, in_path)
}

fn run_parallel(
    formula: Arc<Formula>,
    resolved: Resolved,
    opts: &Options,
    cancel: &CancelToken,
    mut stats: Statistics,
    out_path: Option<&path::Path>,
    in_path: &path::Path,
) -> io::Result<RunOutcome> {
    let branch = occurs::branch_set(&formula, opts.var_selection, resolved.branch_vars);
    let strategy = match resolved.mode {
        SearchMode::Random => Strategy::Random,
        SearchMode::Sequential => Strategy::Sequential,
        SearchMode::FewFirst => Strategy::FewFirst,
        SearchMode::MoreFirst => Strategy::MoreFirst,
        SearchMode::Local => unreachable!("local mode is handled by the caller"),
    };
    let generator = AssumptionGenerator::new(strategy, &branch);
    info!(
        "search mode {:?}: {} branch variables, {} assumption vectors",
        resolved.mode,
        resolved.branch_vars,
        generator.limit()
    );

    let exchange = LearntsExchange::new(
        resolved.workers + 1,
        opts.max_learnts * (opts.learnts_max_size + 1),
    );

    let mut links = Vec::with_capacity(resolved.workers);
    let mut handles = Vec::with_capacity(resolved.workers);
    let worker_opts = WorkerOptions::from(opts);
    for id in 1..=resolved.workers {
        let (master_link, worker_link) = comm::link(id);
        links.push(master_link);

        let formula = Arc::clone(&formula);
        let cancel = cancel.clone();
        handles.push(
            thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || {
                    let engine = Engine::new(&formula, cancel);
                    worker::run(worker_link, engine, worker_opts);
                })?,
        );
    }

    stats.set_cpus(resolved.workers + 1);
    stats.finish_measure_init();

    let mut coordinator = Coordinator::new(
        links,
        generator,
        exchange,
        opts.clone(),
        stats,
        cancel.clone(),
    );
    let outcome = coordinator.run();
    let stats = std::mem::replace(&mut coordinator.stats, Statistics::new());
    drop(coordinator);

    for handle in handles {
        let _ = handle.join();
    }

    let (outcome, model) = match outcome {
        Outcome::Sat(model) => (RunOutcome::Sat, Some(model)),
        Outcome::Unsat => (RunOutcome::Unsat, None),
        Outcome::Interrupted => (RunOutcome::Interrupted, None),
    };
    finish(out_path, outcome, model, &formula, stats, true, opts, &resolved, in_path)
}

fn finish(
    out_path: Option<&path::Path>,
    outcome: RunOutcome,
    model: Option<Vec<i32>>,
    formula: &Formula,
    mut stats: Statistics,
    parallel: bool,
    opts: &Options,
    resolved: &Resolved,
    in_path: &path::Path,
) -> io::Result<RunOutcome> {
    stats.start_measure();

    match outcome {
        RunOutcome::Sat => {
            let model = model.expect("SAT outcome carries a model");
            debug_assert!(formula.satisfied_by(&model), "model self-check failed");
            println!("SATISFIABLE");
            if let Some(path) = out_path {
                dimacs::write_result(&mut fs::File::create(path)?, Some(&model))?;
            }
        }
        RunOutcome::Unsat => {
            println!("UNSATISFIABLE");
            if let Some(path) = out_path {
                dimacs::write_result(&mut fs::File::create(path)?, None)?;
            }
        }
        RunOutcome::Interrupted => {
            println!("INDETERMINATE");
        }
    }

    stats.finish_measure_final();
    stats.finish_wall();

    if opts.verbose && outcome != RunOutcome::Interrupted {
        let mut report = Vec::new();
        if stats.write_report(&mut report, parallel, opts, resolved).is_ok() {
            for line in String::from_utf8_lossy(&report).lines() {
                info!("{}", line);
            }
        }

        let report_path = stats_path(in_path);
        match fs::File::create(&report_path) {
            Ok(mut f) => {
                stats.write_xml(&mut f, parallel, opts, resolved)?;
                info!("statistics written to {}", report_path.display());
            }
            Err(e) => warn!("cannot write statistics to {}: {}", report_path.display(), e),
        }
    }

    Ok(outcome)
}

fn stats_path(in_path: &path::Path) -> path::PathBuf {
    let mut name = in_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "run".into());
    name.push(".stats.xml");
    in_path.with_file_name(name)
}

// BCNF is picked by magic; everything else goes through the DIMACS parser,
// which sniffs gzip itself.
fn parse_input(path: &path::Path) -> io::Result<Formula> {
    let mut magic = [0u8; 4];
    let n = fs::File::open(path)?.read(&mut magic)?;
    if n == 4 && &magic == b"BCNF" {
        bcnf::parse_file(path)
    } else {
        dimacs::parse_file(path, false)
    }
}

fn model_lits(engine: &Engine) -> Vec<i32> {
    engine
        .model()
        .iter()
        .enumerate()
        .filter_map(|(v, val)| val.map(|b| if b { v as i32 + 1 } else { -(v as i32 + 1) }))
        .collect()
}
