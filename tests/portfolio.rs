use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::GzEncoder;
use flate2::Compression;

use parsat::config::{Options, SearchMode};
use parsat::sat::engine::CancelToken;
use parsat::sat::dimacs;
use parsat::{run, RunOutcome};


fn write_input(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn solve(text: &str, opts: &Options) -> (RunOutcome, String) {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cnf", text);
    let output = dir.path().join("result.out");
    let outcome = run(&input, Some(&output), opts, &CancelToken::new()).unwrap();
    let written = fs::read_to_string(&output).unwrap_or_default();
    (outcome, written)
}

fn assert_model_satisfies(output: &str, cnf: &str) {
    assert!(output.starts_with("SAT\n"), "bad output: {:?}", output);
    let lits: Vec<i32> = output
        .lines()
        .nth(1)
        .expect("model line")
        .split_whitespace()
        .map(|t| t.parse().unwrap())
        .take_while(|&x| x != 0)
        .collect();
    let formula = dimacs::parse(cnf, false).unwrap();
    assert!(formula.satisfied_by(&lits), "model {:?} does not satisfy", lits);
}


#[test]
fn trivially_unsat_input_skips_the_parallel_phase() {
    let cnf = "p cnf 1 2\n1 0\n-1 0\n";
    let (outcome, written) = solve(cnf, &Options::default());
    assert_eq!(outcome, RunOutcome::Unsat);
    assert_eq!(outcome.exit_code(), 20);
    assert_eq!(written, "UNSAT\n");
}

#[test]
fn local_mode_solves_a_trivial_instance() {
    let cnf = "p cnf 2 1\n1 2 0\n";
    let mut opts = Options::default();
    opts.search_mode = Some(SearchMode::Local);
    let (outcome, written) = solve(cnf, &opts);
    assert_eq!(outcome, RunOutcome::Sat);
    assert_eq!(outcome.exit_code(), 10);
    assert_model_satisfies(&written, cnf);
}

#[test]
fn parallel_search_finds_a_model() {
    let cnf = "p cnf 4 3\n-1 -2 0\n3 4 0\n1 2 0\n";
    let mut opts = Options::default();
    opts.search_mode = Some(SearchMode::Sequential);
    opts.branch_vars = Some(2);
    opts.conflicts = true;
    let (outcome, written) = solve(cnf, &opts);
    assert_eq!(outcome, RunOutcome::Sat);
    assert_model_satisfies(&written, cnf);
}

fn pigeonhole(pigeons: usize, holes: usize) -> String {
    let var = |p: usize, h: usize| p * holes + h + 1;
    let mut clauses = Vec::new();
    for p in 0..pigeons {
        clauses.push(
            (0..holes)
                .map(|h| var(p, h).to_string())
                .collect::<Vec<_>>()
                .join(" "),
        );
    }
    for h in 0..holes {
        for p in 0..pigeons {
            for q in (p + 1)..pigeons {
                clauses.push(format!("-{} -{}", var(p, h), var(q, h)));
            }
        }
    }
    let mut text = format!("p cnf {} {}\n", pigeons * holes, clauses.len());
    for c in clauses {
        text.push_str(&c);
        text.push_str(" 0\n");
    }
    text
}

#[test]
fn parallel_search_proves_unsat_with_all_features_on() {
    let cnf = pigeonhole(4, 3);
    let mut opts = Options::default();
    opts.search_mode = Some(SearchMode::FewFirst);
    opts.branch_vars = Some(4);
    opts.conflicts = true;
    opts.share_learnts = true;
    opts.remove_learnts = true;
    let (outcome, written) = solve(&cnf, &opts);
    assert_eq!(outcome, RunOutcome::Unsat);
    assert_eq!(written, "UNSAT\n");
}

#[test]
fn sequential_enumeration_proves_unsat_with_pruning() {
    let cnf = pigeonhole(4, 3);
    let mut opts = Options::default();
    opts.search_mode = Some(SearchMode::Sequential);
    opts.branch_vars = Some(3);
    opts.conflicts = true;
    let (outcome, written) = solve(&cnf, &opts);
    assert_eq!(outcome, RunOutcome::Unsat);
    assert_eq!(written, "UNSAT\n");
}

#[test]
fn random_mode_with_auto_sizing_solves_sat() {
    let mut cnf = String::from("p cnf 12 12\n");
    for i in 1..=11 {
        cnf.push_str(&format!("{} {} 0\n", i, i + 1));
    }
    cnf.push_str("1 12 0\n");
    let (outcome, written) = solve(&cnf, &Options::default());
    assert_eq!(outcome, RunOutcome::Sat);
    assert_model_satisfies(&written, &cnf);
}

#[test]
fn gzipped_dimacs_is_transparent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.cnf.gz");
    let mut enc = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
    enc.write_all(b"p cnf 2 2\n1 2 0\n-1 2 0\n").unwrap();
    enc.finish().unwrap();

    let formula = dimacs::parse_file(&path, true).unwrap();
    assert_eq!(formula.num_vars(), 2);
    assert_eq!(formula.num_clauses(), 2);
}

#[test]
fn bcnf_input_is_recognized_by_magic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.bcnf");

    // Header, then one chunk holding (1 v 2) and (-1 v 2).
    let mut bytes = Vec::new();
    bytes.write_all(b"BCNF").unwrap();
    bytes.write_u32::<LittleEndian>(0x0102_0304).unwrap();
    bytes.write_u32::<LittleEndian>(2).unwrap();
    bytes.write_u32::<LittleEndian>(2).unwrap();
    bytes.write_u32::<LittleEndian>(6).unwrap();
    for w in &[2i32, 0, 2, 2, 1, 2] {
        bytes.write_i32::<LittleEndian>(*w).unwrap();
    }
    fs::write(&path, &bytes).unwrap();

    let output = dir.path().join("result.out");
    let mut opts = Options::default();
    opts.search_mode = Some(SearchMode::Local);
    let outcome = run(&path, Some(&output), &opts, &CancelToken::new()).unwrap();
    assert_eq!(outcome, RunOutcome::Sat);
    let written = fs::read_to_string(&output).unwrap();
    assert_model_satisfies(&written, "p cnf 2 2\n1 2 0\n-1 2 0\n");
}

#[test]
fn cancellation_maps_to_the_interrupted_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cnf", "p cnf 2 1\n1 2 0\n");
    let cancel = CancelToken::new();
    cancel.cancel();

    let mut opts = Options::default();
    opts.search_mode = Some(SearchMode::Local);
    let outcome = run(&input, None, &opts, &cancel).unwrap();
    assert_eq!(outcome, RunOutcome::Interrupted);
    assert_eq!(outcome.exit_code(), 1);
}

#[test]
fn verbose_runs_leave_an_xml_statistics_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.cnf", &pigeonhole(3, 2));
    let mut opts = Options::default();
    opts.verbose = true;
    opts.conflicts = true;
    let outcome = run(&input, None, &opts, &CancelToken::new()).unwrap();
    assert_eq!(outcome, RunOutcome::Unsat);

    let stats = fs::read_to_string(dir.path().join("input.cnf.stats.xml")).unwrap();
    assert!(stats.starts_with("<Statistics>"));
    assert!(stats.trim_end().ends_with("</Statistics>"));
}

#[test]
fn missing_input_is_an_io_error() {
    let err = run(
        Path::new("/nonexistent/definitely-missing.cnf"),
        None,
        &Options::default(),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}
