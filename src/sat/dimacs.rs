use std::io::Read;
use std::{fs, io, path};

use flate2::read::MultiGzDecoder;

use crate::sat::{Formula, Lit};


pub fn parse_file<P: AsRef<path::Path>>(path: P, strict: bool) -> io::Result<Formula> {
    let mut raw = Vec::new();
    fs::File::open(path)?.read_to_end(&mut raw)?;

    let text = if raw.starts_with(&[0x1f, 0x8b]) {
        let mut s = String::new();
        MultiGzDecoder::new(&raw[..]).read_to_string(&mut s)?;
        s
    } else {
        String::from_utf8(raw)
            .map_err(|_| parse_error("input is not valid utf-8"))?
    };

    parse(&text, strict)
}

pub fn parse(text: &str, strict: bool) -> io::Result<Formula> {
    let mut formula = Formula::new();
    let mut header: Option<(usize, usize)> = None;
    let mut clause: Vec<Lit> = Vec::new();
    let mut max_var = 0usize;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        // SATLIB benchmark files pad the end with a '%' line.
        if line.starts_with('%') {
            break;
        }
        if line.starts_with('p') {
            let mut it = line.split_whitespace();
            it.next();
            if it.next() != Some("cnf") {
                return Err(parse_error("expected `p cnf <vars> <clauses>` header"));
            }
            let vars = parse_count(it.next())?;
            let clauses = parse_count(it.next())?;
            header = Some((vars, clauses));
            continue;
        }

        for tok in line.split_whitespace() {
            let x: i32 = tok
                .parse()
                .map_err(|_| parse_error(&format!("unexpected token {:?}", tok)))?;
            if x == 0 {
                formula.add_clause(std::mem::replace(&mut clause, Vec::new()));
            } else {
                max_var = max_var.max(x.abs() as usize);
                clause.push(Lit::from_signed(x));
            }
        }
    }

    if !clause.is_empty() {
        if strict {
            return Err(parse_error("unterminated clause at end of input"));
        }
        formula.add_clause(clause);
    }

    match header {
        Some((vars, clauses)) => {
            formula.ensure_vars(vars);
            if strict {
                if formula.num_clauses() != clauses {
                    return Err(parse_error(&format!(
                        "header mismatch: {} clauses declared, {} found",
                        clauses,
                        formula.num_clauses()
                    )));
                }
                if max_var > vars {
                    return Err(parse_error(&format!(
                        "header mismatch: {} vars declared, {} discovered",
                        vars, max_var
                    )));
                }
            }
        }
        None => {
            if strict {
                return Err(parse_error("missing `p cnf` header"));
            }
        }
    }

    Ok(formula)
}

pub fn write_result<W: io::Write>(stream: &mut W, model: Option<&[i32]>) -> io::Result<()> {
    match model {
        None => {
            writeln!(stream, "UNSAT")?;
        }
        Some(lits) => {
            writeln!(stream, "SAT")?;
            for &x in lits {
                write!(stream, " {}", x)?;
            }
            writeln!(stream, " 0")?;
        }
    }
    Ok(())
}

fn parse_count(tok: Option<&str>) -> io::Result<usize> {
    tok.and_then(|t| t.parse().ok())
        .ok_or_else(|| parse_error("malformed header counts"))
}

fn parse_error(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("PARSE ERROR! {}", msg))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_cnf() {
        let f = parse("c comment\np cnf 3 2\n1 -2 0\n2 3 0\n", true).unwrap();
        assert_eq!(f.num_vars(), 3);
        assert_eq!(f.num_clauses(), 2);
        assert_eq!(f.clauses()[0], vec![Lit::from_signed(1), Lit::from_signed(-2)]);
    }

    #[test]
    fn clause_may_span_lines() {
        let f = parse("p cnf 2 1\n1\n-2 0\n", true).unwrap();
        assert_eq!(f.clauses()[0].len(), 2);
    }

    #[test]
    fn satlib_percent_footer_is_ignored() {
        let f = parse("p cnf 1 1\n1 0\n%\n0\n", false).unwrap();
        assert_eq!(f.num_clauses(), 1);
    }

    #[test]
    fn strict_mode_checks_header() {
        assert!(parse("p cnf 1 2\n1 0\n", true).is_err());
        assert!(parse("p cnf 1 1\n1 2 0\n", true).is_err());
        assert!(parse("1 0\n", true).is_err());
        assert!(parse("1 0\n", false).is_ok());
    }

    #[test]
    fn result_file_layout() {
        let mut sat = Vec::new();
        write_result(&mut sat, Some(&[1, -2])).unwrap();
        assert_eq!(String::from_utf8(sat).unwrap(), "SAT\n 1 -2 0\n");

        let mut unsat = Vec::new();
        write_result(&mut unsat, None).unwrap();
        assert_eq!(String::from_utf8(unsat).unwrap(), "UNSAT\n");
    }
}
