use std::io::{self, Write};

use crate::config::{Options, Resolved};


#[derive(Default, Clone, Copy, Debug)]
pub struct WorkerStats {
    pub master_time: f64,  // master time spent handling this worker's replies
    pub worker_time: f64,  // cpu time reported by the worker's solve calls
    pub solve_calls: u32,
    pub sent_db: u32,      // learnt batches this worker published
    pub received_db: u32,  // learnt batches forwarded to this worker
}


// Timing and counter collection for a run. Slot 0 tracks the local
// solver; slots 1.. track the workers.
#[derive(Default)]
pub struct Statistics {
    workers: usize,
    erased_assumps: u64,
    per_worker: Vec<WorkerStats>,
    init_time: f64,
    final_time: f64,
    measure_start: f64,
    master_start: f64,
    wall_start: f64,
    wall_end: f64,
}

impl Statistics {
    pub fn new() -> Statistics {
        Statistics::default()
    }

    pub fn set_cpus(&mut self, n: usize) {
        self.workers = n.saturating_sub(1);
        self.per_worker = vec![WorkerStats::default(); n.max(1)];
    }

    pub fn increase_erased(&mut self, n: u64) {
        self.erased_assumps += n;
    }

    pub fn erased(&self) -> u64 {
        self.erased_assumps
    }

    pub fn increase_sent(&mut self, worker: usize) {
        self.per_worker[worker].sent_db += 1;
    }

    pub fn increase_received(&mut self, worker: usize) {
        self.per_worker[worker].received_db += 1;
    }

    pub fn inc_cpu_time(&mut self, worker: usize, time: f64) {
        let w = &mut self.per_worker[worker];
        w.worker_time += time;
        w.solve_calls += 1;
    }

    pub fn worker(&self, worker: usize) -> &WorkerStats {
        &self.per_worker[worker]
    }

    pub fn start_measure(&mut self) {
        self.measure_start = time::precise_time_s();
    }

    pub fn finish_measure_init(&mut self) {
        self.init_time = time::precise_time_s() - self.measure_start;
    }

    pub fn finish_measure_final(&mut self) {
        self.final_time = time::precise_time_s() - self.measure_start;
    }

    pub fn start_master_measure(&mut self) {
        self.master_start = time::precise_time_s();
    }

    pub fn finish_master_measure(&mut self, worker: usize) {
        self.per_worker[worker].master_time += time::precise_time_s() - self.master_start;
    }

    pub fn start_wall(&mut self) {
        self.wall_start = time::precise_time_s();
    }

    pub fn finish_wall(&mut self) {
        self.wall_end = time::precise_time_s();
    }

    // Init plus finalization, plus the slowest worker (or the single
    // local solve).
    pub fn total_time(&self, parallel: bool) -> f64 {
        let mut total = self.init_time + self.final_time;
        if parallel {
            let max = self
                .per_worker
                .iter()
                .skip(1)
                .map(|w| w.worker_time + w.master_time)
                .fold(0.0, f64::max);
            total += max;
        } else if let Some(w) = self.per_worker.first() {
            total += w.worker_time;
        }
        total
    }

    pub fn write_report<W: Write>(
        &self,
        stream: &mut W,
        parallel: bool,
        opts: &Options,
        resolved: &Resolved,
    ) -> io::Result<()> {
        writeln!(stream, "Master initialization time: {:.6} secs", self.init_time)?;
        if parallel {
            writeln!(stream, "Workers: {}", self.workers)?;
            writeln!(stream, "Variables to be assumed: {}", resolved.branch_vars)?;
            writeln!(stream, "Search mode: {}", resolved.mode.letter())?;
            writeln!(stream, "Variable's selection mode: {}", opts.var_selection.letter())?;
            if opts.conflicts {
                writeln!(stream, "Erased assumptions: {}", self.erased_assumps)?;
            }
            if opts.share_learnts {
                writeln!(
                    stream,
                    "Learnts max amount: {}\nLearnts max size: {}",
                    opts.max_learnts, opts.learnts_max_size
                )?;
            }
            if opts.remove_learnts {
                writeln!(stream, "All learnts were removed after each solve call.")?;
            }
            for (i, w) in self.per_worker.iter().enumerate().skip(1) {
                writeln!(
                    stream,
                    "\nWorker {}:\nsolve was executed {} times\nTotal time spent by worker: {:.6} secs",
                    i, w.solve_calls, w.worker_time
                )?;
                writeln!(
                    stream,
                    "Total time spent by master with this worker: {:.6} secs",
                    w.master_time
                )?;
                if opts.share_learnts {
                    writeln!(
                        stream,
                        "Databases received: {}\nDatabases sent: {}",
                        w.received_db, w.sent_db
                    )?;
                }
            }
        } else if let Some(w) = self.per_worker.first() {
            writeln!(stream, "Solve time: {:.6} secs", w.worker_time)?;
        }
        writeln!(stream, "\nMaster finalization time: {:.6} secs", self.final_time)?;
        writeln!(stream, "\nTotal CPU time: {:.6} secs", self.total_time(parallel))?;
        writeln!(stream, "\nTotal wall time: {:.6} secs", self.wall_end - self.wall_start)?;
        Ok(())
    }

    pub fn write_xml<W: Write>(
        &self,
        stream: &mut W,
        parallel: bool,
        opts: &Options,
        resolved: &Resolved,
    ) -> io::Result<()> {
        writeln!(stream, "<Statistics>")?;
        writeln!(stream, "<InitializationTime>{:.6}</InitializationTime>", self.init_time)?;
        if parallel {
            writeln!(stream, "<NumberOfWorkers>{}</NumberOfWorkers>", self.workers)?;
            writeln!(
                stream,
                "<NumberOfVariables>{}</NumberOfVariables>",
                resolved.branch_vars
            )?;
            writeln!(stream, "<SearchMode>{}</SearchMode>", resolved.mode.letter())?;
            if opts.conflicts {
                writeln!(stream, "<ErasedAssumptions>{}</ErasedAssumptions>", self.erased_assumps)?;
            }
            writeln!(
                stream,
                "<RemoveLearnts>{}</RemoveLearnts>",
                opts.remove_learnts
            )?;
            for (i, w) in self.per_worker.iter().enumerate().skip(1) {
                writeln!(stream, "<Runtime worker=\"{}\">", i)?;
                writeln!(stream, "<NumberOfExecutions>{}</NumberOfExecutions>", w.solve_calls)?;
                writeln!(stream, "<MasterTime>{:.6}</MasterTime>", w.master_time)?;
                writeln!(stream, "<WorkerTime>{:.6}</WorkerTime>", w.worker_time)?;
                if opts.share_learnts {
                    writeln!(stream, "<DBSent>{}</DBSent>", w.sent_db)?;
                    writeln!(stream, "<DBReceived>{}</DBReceived>", w.received_db)?;
                }
                writeln!(stream, "</Runtime>")?;
            }
        } else if let Some(w) = self.per_worker.first() {
            writeln!(stream, "<RunTime>{:.6}</RunTime>", w.worker_time)?;
        }
        writeln!(stream, "<FinalizationTime>{:.6}</FinalizationTime>", self.final_time)?;
        writeln!(stream, "<MaxTime>{:.6}</MaxTime>", self.total_time(parallel))?;
        writeln!(stream, "<WallTime>{:.6}</WallTime>", self.wall_end - self.wall_start)?;
        writeln!(stream, "</Statistics>")?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchMode;

    fn resolved() -> Resolved {
        Resolved {
            mode: SearchMode::Random,
            branch_vars: 4,
            workers: 2,
        }
    }

    #[test]
    fn counters_accumulate_per_worker() {
        let mut s = Statistics::new();
        s.set_cpus(3);
        s.inc_cpu_time(1, 0.5);
        s.inc_cpu_time(1, 0.25);
        s.inc_cpu_time(2, 2.0);
        s.increase_sent(1);
        s.increase_received(2);
        s.increase_erased(4);

        assert_eq!(s.worker(1).solve_calls, 2);
        assert!((s.worker(1).worker_time - 0.75).abs() < 1e-9);
        assert_eq!(s.worker(1).sent_db, 1);
        assert_eq!(s.worker(2).received_db, 1);
        assert_eq!(s.erased(), 4);

        // Slowest worker dominates the parallel total.
        assert!((s.total_time(true) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn text_report_covers_the_enabled_features() {
        let mut s = Statistics::new();
        s.set_cpus(3);
        s.inc_cpu_time(1, 1.0);
        s.increase_erased(2);

        let mut opts = Options::default();
        opts.conflicts = true;
        opts.remove_learnts = true;

        let mut out = Vec::new();
        s.write_report(&mut out, true, &opts, &resolved()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Workers: 2"));
        assert!(text.contains("Variables to be assumed: 4"));
        assert!(text.contains("Search mode: r"));
        assert!(text.contains("Variable's selection mode: o"));
        assert!(text.contains("Erased assumptions: 2"));
        assert!(text.contains("All learnts were removed after each solve call."));
        assert!(text.contains("Worker 1:"));
        assert!(text.contains("Total wall time:"));
    }

    #[test]
    fn xml_report_mentions_each_worker() {
        let mut s = Statistics::new();
        s.set_cpus(3);
        s.inc_cpu_time(1, 1.0);

        let mut opts = Options::default();
        opts.share_learnts = true;
        opts.conflicts = true;

        let mut out = Vec::new();
        s.write_xml(&mut out, true, &opts, &resolved()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("<Statistics>"));
        assert!(text.contains("<NumberOfWorkers>2</NumberOfWorkers>"));
        assert!(text.contains("<NumberOfVariables>4</NumberOfVariables>"));
        assert!(text.contains("<SearchMode>r</SearchMode>"));
        assert!(text.contains("<Runtime worker=\"1\">"));
        assert!(text.contains("<Runtime worker=\"2\">"));
        assert!(text.contains("<DBSent>"));
        assert!(text.ends_with("</Statistics>\n"));
    }
}
