use log::debug;

use crate::config::Options;
use crate::portfolio::comm::{self, LearntBatch, Model, ResultRecord, WorkerLink};
use crate::sat::engine::{Engine, SolveResult};
use crate::sat::Lit;


#[derive(Clone, Copy, Debug)]
pub struct WorkerOptions {
    pub share_learnts: bool,
    pub remove_learnts: bool,
    pub conflicts: bool,
    pub max_learnts: usize,
    pub learnts_max_size: usize,
}

impl<'a> From<&'a Options> for WorkerOptions {
    fn from(opts: &'a Options) -> WorkerOptions {
        WorkerOptions {
            share_learnts: opts.share_learnts,
            remove_learnts: opts.remove_learnts,
            conflicts: opts.conflicts,
            max_learnts: opts.max_learnts,
            learnts_max_size: opts.learnts_max_size,
        }
    }
}


// Workers are purely reactive: block on the job channel, solve under the
// received assumptions, report, loop. Exit when the master hangs up or
// the abort token fires mid-solve.
pub fn run(link: WorkerLink, mut engine: Engine, opts: WorkerOptions) {
    loop {
        let job = match link.job_rx.recv() {
            Ok(job) => job,
            Err(_) => break,
        };

        // Ingest whatever learnt batches the master forwarded since the
        // last round.
        while let Ok(batch) = link.learnt_rx.try_recv() {
            engine.add_learnts(&batch.0);
        }

        let assumptions = translate(&job.0);
        let started = time::precise_time_s();
        let result = engine.solve(&assumptions);
        let cpu_time = time::precise_time_s() - started;

        match result {
            SolveResult::Interrupted => break,

            SolveResult::Sat => {
                if link.result_tx.send(ResultRecord::sat(cpu_time)).is_err() {
                    break;
                }
                let _ = link.model_tx.send(Model(model_lits(&engine)));
            }

            SolveResult::Unsat => {
                if opts.share_learnts {
                    let buf = engine.get_learnts(opts.max_learnts, opts.learnts_max_size);
                    if !buf.is_empty() {
                        let _ = link.learnt_tx.send(LearntBatch(buf));
                    }
                }
                if opts.remove_learnts {
                    engine.clear_learnts();
                }

                let conflicts: Vec<i32> = if opts.conflicts {
                    // The engine reports failed assumptions negated; the
                    // wire carries them in the polarity the job used.
                    engine.conflict().iter().map(|&l| (!l).to_signed()).collect()
                } else {
                    Vec::new()
                };

                debug!(
                    "worker {}: unsat, {} conflict literals",
                    link.id,
                    conflicts.len()
                );
                let mut failed = false;
                for record in comm::unsat_records(&conflicts, cpu_time) {
                    if link.result_tx.send(record).is_err() {
                        failed = true;
                        break;
                    }
                }
                if failed {
                    break;
                }
            }
        }
    }
}

// A 0 entry ends a Progressive vector early.
fn translate(job: &[i32]) -> Vec<Lit> {
    job.iter()
        .take_while(|&&x| x != 0)
        .map(|&x| Lit::from_signed(x))
        .collect()
}

fn model_lits(engine: &Engine) -> Vec<i32> {
    engine
        .model()
        .iter()
        .enumerate()
        .filter_map(|(v, val)| val.map(|b| if b { v as i32 + 1 } else { -(v as i32 + 1) }))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_truncates_the_assumption_vector() {
        let lits = translate(&[3, -1, 0, 5]);
        assert_eq!(lits, vec![Lit::from_signed(3), Lit::from_signed(-1)]);
        assert!(translate(&[0, 0, 0]).is_empty());
    }
}
