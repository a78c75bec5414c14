use std::io::Write;
use std::{fs, io, path};

use log::warn;

use crate::portfolio::occurs::VarSelection;

pub const DEFAULT_LEARNTS_MAX_SIZE: usize = 20;
pub const DEFAULT_LEARNTS_MAX_AMOUNT: usize = 50;
pub const DEFAULT_ASSUMPS_CPU_RATIO: usize = 3;

// Enumeration strategies materialize 2^n assumption vectors up front.
const MAX_ENUMERATION_VARS: usize = 31;


#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SearchMode {
    Local,
    Random,
    Sequential,
    FewFirst,
    MoreFirst,
}

impl SearchMode {
    pub fn from_letter(c: char) -> Option<SearchMode> {
        match c {
            'l' => Some(SearchMode::Local),
            'r' => Some(SearchMode::Random),
            's' => Some(SearchMode::Sequential),
            'f' => Some(SearchMode::FewFirst),
            'm' => Some(SearchMode::MoreFirst),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match *self {
            SearchMode::Local => 'l',
            SearchMode::Random => 'r',
            SearchMode::Sequential => 's',
            SearchMode::FewFirst => 'f',
            SearchMode::MoreFirst => 'm',
        }
    }

    pub fn is_progressive(&self) -> bool {
        match *self {
            SearchMode::FewFirst | SearchMode::MoreFirst => true,
            _ => false,
        }
    }
}


// Flat run configuration: defaults, overridden by the config file,
// overridden by command-line flags.
#[derive(Clone, Debug)]
pub struct Options {
    pub assumps_cpu_ratio: usize,
    pub branch_vars: Option<usize>,
    pub max_learnts: usize,
    pub learnts_max_size: usize,
    pub conflicts: bool,
    pub share_learnts: bool,
    pub remove_learnts: bool,
    pub verbose: bool,
    pub search_mode: Option<SearchMode>,
    pub var_selection: VarSelection,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            assumps_cpu_ratio: DEFAULT_ASSUMPS_CPU_RATIO,
            branch_vars: None,
            max_learnts: DEFAULT_LEARNTS_MAX_AMOUNT,
            learnts_max_size: DEFAULT_LEARNTS_MAX_SIZE,
            conflicts: false,
            share_learnts: false,
            remove_learnts: false,
            verbose: false,
            search_mode: None,
            var_selection: VarSelection::MoreOccurrences,
        }
    }
}

impl Options {
    // KEY=VALUE lines, # starts a comment. Unknown keys and malformed
    // values are configuration errors.
    pub fn read_config_file(&mut self, path: &path::Path) -> io::Result<()> {
        let text = fs::read_to_string(path)?;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| config_error(lineno, "expected KEY=VALUE"))?;
            match key {
                "LEARNTS_MAX_SIZE" => {
                    self.learnts_max_size = parse_number(lineno, value)?;
                }
                "LEARNTS_MAX_AMOUNT" => {
                    self.max_learnts = parse_number(lineno, value)?;
                }
                "SHARE_LEARNTS" => {
                    self.share_learnts = parse_bool(lineno, value)?;
                }
                "REMOVE_LEARNTS" => {
                    self.remove_learnts = parse_bool(lineno, value)?;
                }
                "CONFLICTS" => {
                    self.conflicts = parse_bool(lineno, value)?;
                }
                "ASSUMPS_CPU_RATIO" => {
                    self.assumps_cpu_ratio = parse_number(lineno, value)?;
                }
                "VARIABLE_SELECTION" => {
                    self.var_selection = match value {
                        "more_occurrences" => VarSelection::MoreOccurrences,
                        "bigger_clauses" => VarSelection::BiggerClauses,
                        _ => return Err(config_error(lineno, "bad VARIABLE_SELECTION value")),
                    };
                }
                _ => return Err(config_error(lineno, &format!("unknown key {:?}", key))),
            }
        }
        Ok(())
    }

    pub fn write_default_config<W: Write>(stream: &mut W) -> io::Result<()> {
        let d = Options::default();
        writeln!(stream, "# parsat configuration")?;
        writeln!(stream, "# KEY=VALUE, no spaces around `=`")?;
        writeln!(stream, "LEARNTS_MAX_SIZE={}", d.learnts_max_size)?;
        writeln!(stream, "LEARNTS_MAX_AMOUNT={}", d.max_learnts)?;
        writeln!(stream, "SHARE_LEARNTS={}", d.share_learnts)?;
        writeln!(stream, "REMOVE_LEARNTS={}", d.remove_learnts)?;
        writeln!(stream, "CONFLICTS={}", d.conflicts)?;
        writeln!(stream, "ASSUMPS_CPU_RATIO={}", d.assumps_cpu_ratio)?;
        writeln!(stream, "VARIABLE_SELECTION=more_occurrences")?;
        Ok(())
    }

    // Fixes the search mode and branch-set size for this run. A single
    // cpu forces local search; several cpus exclude it. Sizes not picked
    // by the user come from the assumptions-per-worker target
    // ratio * workers: the enumeration modes want 2^n vectors around the
    // target, the progressive modes 2n.
    pub fn resolve(&self, cpus: usize, formula_vars: usize) -> io::Result<Resolved> {
        let mut mode = self.search_mode;
        if cpus <= 1 {
            if mode.is_some() && mode != Some(SearchMode::Local) {
                warn!("single cpu: switching to local search");
            }
            mode = Some(SearchMode::Local);
        } else if mode == Some(SearchMode::Local) {
            warn!("{} cpus available: switching from local to random search", cpus);
            mode = Some(SearchMode::Random);
        }

        if mode == Some(SearchMode::Local) {
            return Ok(Resolved {
                mode: SearchMode::Local,
                branch_vars: 0,
                workers: 0,
            });
        }

        let workers = cpus - 1;
        let target = self.assumps_cpu_ratio * workers;

        let (mode, requested) = match (mode, self.branch_vars) {
            (None, None) => (SearchMode::Random, ceil_log2(target)),
            (Some(m), None) => {
                let n = if m.is_progressive() {
                    (target + 1) / 2
                } else {
                    ceil_log2(target)
                };
                (m, n)
            }
            (None, Some(n)) => {
                let m = if n < 63 && (1u64 << n) <= target as u64 {
                    SearchMode::Random
                } else {
                    SearchMode::MoreFirst
                };
                (m, n)
            }
            (Some(m), Some(n)) => (m, n),
        };

        let mut branch_vars = requested.max(1);
        if branch_vars > formula_vars {
            if self.branch_vars.is_some() {
                return Err(usage_error(&format!(
                    "{} branch variables requested but the formula only has {}",
                    branch_vars, formula_vars
                )));
            }
            warn!(
                "derived branch-set size {} exceeds the {} formula variables; clamping",
                branch_vars, formula_vars
            );
            branch_vars = formula_vars.max(1);
        }
        if !mode.is_progressive() && branch_vars > MAX_ENUMERATION_VARS {
            return Err(usage_error(&format!(
                "at most {} branch variables are supported in enumeration modes",
                MAX_ENUMERATION_VARS
            )));
        }

        Ok(Resolved {
            mode,
            branch_vars,
            workers,
        })
    }
}


#[derive(Clone, Copy, Debug)]
pub struct Resolved {
    pub mode: SearchMode,
    pub branch_vars: usize,
    pub workers: usize,
}


fn ceil_log2(t: usize) -> usize {
    if t <= 1 {
        0
    } else {
        (64 - ((t - 1) as u64).leading_zeros()) as usize
    }
}

fn parse_number(lineno: usize, value: &str) -> io::Result<usize> {
    value
        .parse()
        .map_err(|_| config_error(lineno, &format!("bad number {:?}", value)))
}

fn parse_bool(lineno: usize, value: &str) -> io::Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(config_error(lineno, &format!("bad boolean {:?}", value))),
    }
}

fn config_error(lineno: usize, msg: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("config line {}: {}", lineno + 1, msg),
    )
}

fn usage_error(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trip() {
        let mut text = Vec::new();
        Options::write_default_config(&mut text).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parsat.conf");
        fs::write(&path, &text).unwrap();

        let mut opts = Options::default();
        opts.share_learnts = true; // must be reset by the file
        opts.read_config_file(&path).unwrap();
        assert!(!opts.share_learnts);
        assert_eq!(opts.learnts_max_size, DEFAULT_LEARNTS_MAX_SIZE);
        assert_eq!(opts.max_learnts, DEFAULT_LEARNTS_MAX_AMOUNT);
        assert_eq!(opts.assumps_cpu_ratio, DEFAULT_ASSUMPS_CPU_RATIO);
    }

    #[test]
    fn config_rejects_junk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.conf");

        fs::write(&path, "NO_SUCH_KEY=1\n").unwrap();
        assert!(Options::default().read_config_file(&path).is_err());

        fs::write(&path, "CONFLICTS=yes\n").unwrap();
        assert!(Options::default().read_config_file(&path).is_err());

        fs::write(&path, "# fine\n\nCONFLICTS=true\n").unwrap();
        let mut opts = Options::default();
        opts.read_config_file(&path).unwrap();
        assert!(opts.conflicts);
    }

    #[test]
    fn single_cpu_forces_local() {
        let mut opts = Options::default();
        opts.search_mode = Some(SearchMode::Random);
        let r = opts.resolve(1, 100).unwrap();
        assert_eq!(r.mode, SearchMode::Local);
        assert_eq!(r.workers, 0);
    }

    #[test]
    fn local_on_many_cpus_becomes_random() {
        let mut opts = Options::default();
        opts.search_mode = Some(SearchMode::Local);
        let r = opts.resolve(4, 100).unwrap();
        assert_eq!(r.mode, SearchMode::Random);
        assert_eq!(r.workers, 3);
    }

    #[test]
    fn auto_sizing_follows_the_family_formulas() {
        // 5 cpus -> 4 workers, ratio 3 -> target 12.
        let opts = Options::default();
        let r = opts.resolve(5, 100).unwrap();
        assert_eq!(r.mode, SearchMode::Random);
        assert_eq!(r.branch_vars, 4); // ceil(log2(12))

        let mut opts = Options::default();
        opts.search_mode = Some(SearchMode::FewFirst);
        let r = opts.resolve(5, 100).unwrap();
        assert_eq!(r.branch_vars, 6); // ceil(12 / 2)
    }

    #[test]
    fn size_only_picks_a_mode_by_coverage() {
        let mut opts = Options::default();
        opts.branch_vars = Some(3); // 2^3 = 8 <= 12
        assert_eq!(opts.resolve(5, 100).unwrap().mode, SearchMode::Random);

        opts.branch_vars = Some(5); // 2^5 = 32 > 12
        assert_eq!(opts.resolve(5, 100).unwrap().mode, SearchMode::MoreFirst);
    }

    #[test]
    fn branch_set_cannot_outgrow_the_formula() {
        let mut opts = Options::default();
        opts.branch_vars = Some(10);
        assert!(opts.resolve(5, 4).is_err());

        // Auto-derived sizes clamp instead.
        opts.branch_vars = None;
        opts.search_mode = Some(SearchMode::FewFirst);
        assert_eq!(opts.resolve(5, 4).unwrap().branch_vars, 4);
    }
}
