use std::io::Write;
use std::{fs, path, process};

use clap::{crate_version, App, Arg};
use log::warn;

use parsat::config::{Options, SearchMode};
use parsat::portfolio::occurs::VarSelection;
use parsat::sat::engine::CancelToken;


fn main() {
    process::exit(real_main());
}

fn real_main() -> i32 {
    let matches = App::new("parsat")
        .version(crate_version!())
        .about("Parallel portfolio SAT solver splitting the search over assumptions")

        .arg(Arg::with_name("verbose").short("v").help("Verbose mode"))
        .arg(Arg::with_name("branch-vars").short("n").takes_value(true).value_name("N")
            .help("Number of variables to assume"))
        .arg(Arg::with_name("mode").short("m").takes_value(true).value_name("MODE")
            .possible_values(&["l", "r", "s", "f", "m"])
            .help("Search mode: local, random, sequential, few-first, more-first"))
        .arg(Arg::with_name("selection").short("s").takes_value(true).value_name("SEL")
            .possible_values(&["o", "b"])
            .help("Variable selection: by occurrences / weighted by clause size"))
        .arg(Arg::with_name("conflicts").short("c")
            .help("Prune pending assumptions with returned conflicts"))
        .arg(Arg::with_name("share-learnts").short("l")
            .help("Share learnt clauses between workers"))
        .arg(Arg::with_name("learnts-size").short("z").takes_value(true).value_name("N")
            .help("Max size of a learnt clause to share"))
        .arg(Arg::with_name("learnts-amount").short("t").takes_value(true).value_name("N")
            .help("Max number of learnt clauses per batch"))
        .arg(Arg::with_name("remove-learnts").short("r")
            .help("Remove all learnt clauses after each solve"))
        .arg(Arg::with_name("ratio").short("a").takes_value(true).value_name("N")
            .help("Assumptions-per-worker ratio"))
        .arg(Arg::with_name("config").short("f").takes_value(true).value_name("PATH")
            .help("Read options from a configuration file"))
        .arg(Arg::with_name("gen-config").short("g").takes_value(true).value_name("PATH")
            .help("Write the default configuration file and exit"))
        .arg(Arg::with_name("input").required_unless("gen-config"))
        .arg(Arg::with_name("output").required(false))

        .get_matches_safe();

    let matches = match matches {
        Ok(m) => m,
        Err(e) => match e.kind {
            clap::ErrorKind::HelpDisplayed | clap::ErrorKind::VersionDisplayed => {
                println!("{}", e.message);
                return 0;
            }
            _ => {
                eprintln!("{}", e.message);
                return 2;
            }
        },
    };

    if let Some(path) = matches.value_of("gen-config") {
        return match write_default_config(path::Path::new(path)) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("ERROR! cannot write {}: {}", path, e);
                2
            }
        };
    }

    let mut opts = Options::default();
    if let Some(path) = matches.value_of("config") {
        if let Err(e) = opts.read_config_file(path::Path::new(path)) {
            eprintln!("ERROR! {}: {}", path, e);
            return 2;
        }
    }

    // Command-line flags override the configuration file.
    if matches.is_present("verbose") {
        opts.verbose = true;
    }
    if matches.is_present("conflicts") {
        opts.conflicts = true;
    }
    if matches.is_present("share-learnts") {
        opts.share_learnts = true;
    }
    if matches.is_present("remove-learnts") {
        opts.remove_learnts = true;
    }
    if let Some(v) = matches.value_of("mode") {
        // The letters are constrained by clap's possible_values.
        opts.search_mode = SearchMode::from_letter(v.chars().next().unwrap_or(' '));
    }
    if let Some(v) = matches.value_of("selection") {
        opts.var_selection = if v == "b" {
            VarSelection::BiggerClauses
        } else {
            VarSelection::MoreOccurrences
        };
    }
    match numeric_flag(&matches, "branch-vars") {
        Ok(Some(n)) => opts.branch_vars = Some(n),
        Ok(None) => {}
        Err(msg) => return usage(&msg),
    }
    match numeric_flag(&matches, "learnts-size") {
        Ok(Some(n)) => opts.learnts_max_size = n,
        Ok(None) => {}
        Err(msg) => return usage(&msg),
    }
    match numeric_flag(&matches, "learnts-amount") {
        Ok(Some(n)) => opts.max_learnts = n,
        Ok(None) => {}
        Err(msg) => return usage(&msg),
    }
    match numeric_flag(&matches, "ratio") {
        Ok(Some(n)) => opts.assumps_cpu_ratio = n,
        Ok(None) => {}
        Err(msg) => return usage(&msg),
    }

    init_logging(opts.verbose);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if ctrlc::set_handler(move || cancel.cancel()).is_err() {
            warn!("cannot install the interrupt handler");
        }
    }

    let in_path = path::Path::new(matches.value_of("input").expect("input is required"));
    let out_path = matches.value_of("output").map(path::Path::new);

    match parsat::run(in_path, out_path, &opts, &cancel) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("ERROR! {}", e);
            2
        }
    }
}

fn numeric_flag(matches: &clap::ArgMatches, name: &str) -> Result<Option<usize>, String> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| format!("-{} expects a number, got {:?}", name, v)),
    }
}

fn usage(msg: &str) -> i32 {
    eprintln!("ERROR! {}", msg);
    2
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder.format(|buf, record| writeln!(buf, "{}", record.args()));
    builder.filter(
        None,
        if verbose {
            log::LevelFilter::Info
        } else {
            log::LevelFilter::Warn
        },
    );
    let _ = builder.try_init();
}

fn write_default_config(path: &path::Path) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    Options::write_default_config(&mut file)
}
