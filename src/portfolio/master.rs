use std::time::Duration;

use log::{debug, error, info};

use crate::config::Options;
use crate::portfolio::assumptions::AssumptionGenerator;
use crate::portfolio::comm::{self, LearntBatch, MasterLink, ResultRecord};
use crate::portfolio::learnts::LearntsExchange;
use crate::portfolio::stats::Statistics;
use crate::sat::engine::CancelToken;

const RESULT_POLL: Duration = Duration::from_millis(50);


pub enum Outcome {
    Sat(Vec<i32>),
    Unsat,
    Interrupted,
}


// The master loop. Every worker is kept at one outstanding job, and a
// pruned assumption counts against the completion limit without a reply;
// that is why the termination test reads the shrinking generator limit.
pub struct Coordinator {
    links: Vec<MasterLink>,
    generator: AssumptionGenerator,
    exchange: LearntsExchange,
    opts: Options,
    cancel: CancelToken,
    received: u64,
    pub stats: Statistics,
}

impl Coordinator {
    pub fn new(
        links: Vec<MasterLink>,
        generator: AssumptionGenerator,
        exchange: LearntsExchange,
        opts: Options,
        stats: Statistics,
        cancel: CancelToken,
    ) -> Coordinator {
        Coordinator {
            links,
            generator,
            exchange,
            opts,
            cancel,
            received: 0,
            stats,
        }
    }

    pub fn run(&mut self) -> Outcome {
        info!(
            "dispatching {} sub-problems over {} workers",
            self.generator.limit(),
            self.links.len()
        );
        self.prime();

        loop {
            if self.received >= self.generator.limit() {
                return Outcome::Unsat;
            }
            match comm::recv_result_any(&self.links, RESULT_POLL) {
                None => {
                    if self.cancel.is_canceled() {
                        return Outcome::Interrupted;
                    }
                }
                Some((idx, Ok(first))) => {
                    if let Some(outcome) = self.handle_result(idx, first) {
                        return outcome;
                    }
                }
                Some((_, Err(_))) => {
                    error!("a worker hung up; aborting the search");
                    self.cancel.cancel();
                    return Outcome::Interrupted;
                }
            }
        }
    }

    // One sub-problem per worker, until either all are busy or the stream
    // runs out.
    fn prime(&mut self) {
        for i in 0..self.links.len() {
            if !self.send_next_job(i) {
                break;
            }
        }
    }

    fn send_next_job(&mut self, idx: usize) -> bool {
        match self.generator.next() {
            Some(vector) => {
                let _ = self.links[idx].job_tx.send(comm::Job(vector));
                true
            }
            None => false,
        }
    }

    fn handle_result(&mut self, idx: usize, first: ResultRecord) -> Option<Outcome> {
        let worker = idx + 1;
        self.stats.start_master_measure();

        // Reassemble the conflict from the record streak.
        let mut conflicts: Vec<i32> = Vec::new();
        let mut record = first;
        loop {
            conflicts.extend_from_slice(record.conflict_lits());
            if record.more_msgs == 0 {
                break;
            }
            record = match self.links[idx].result_rx.recv() {
                Ok(r) => r,
                Err(_) => {
                    error!("worker {} died mid-streak", worker);
                    self.cancel.cancel();
                    return Some(Outcome::Interrupted);
                }
            };
        }

        self.stats.inc_cpu_time(worker, record.cpu_time);

        if record.result == 1 {
            let model = match self.links[idx].model_rx.recv() {
                Ok(m) => m.0,
                Err(_) => {
                    error!("worker {} reported SAT but sent no model", worker);
                    self.cancel.cancel();
                    return Some(Outcome::Interrupted);
                }
            };
            info!("worker {} found a model; aborting the others", worker);
            self.cancel.cancel();
            return Some(Outcome::Sat(model));
        }

        self.received += 1;
        self.drain_learnts();

        if self.opts.conflicts && !conflicts.is_empty() {
            let erased = self.generator.remove_conflicts(&conflicts);
            if erased > 0 {
                debug!(
                    "conflict from worker {} pruned {} pending assumptions",
                    worker, erased
                );
            }
            self.stats.increase_erased(erased);
        }

        if self.generator.has_more() {
            if self.opts.share_learnts {
                let batch = self.exchange.fetch_for(worker).map(|b| b.to_vec());
                if let Some(buf) = batch {
                    let _ = self.links[idx].learnt_tx.send(LearntBatch(buf));
                    self.stats.increase_received(worker);
                }
            }
            self.send_next_job(idx);
        }

        self.stats.finish_master_measure(worker);
        None
    }

    // Non-blocking sweep of every worker's learnt channel into the
    // exchange.
    fn drain_learnts(&mut self) {
        for (j, link) in self.links.iter().enumerate() {
            while let Ok(batch) = link.learnt_rx.try_recv() {
                self.exchange.store(j + 1, &batch.0);
                self.stats.increase_sent(j + 1);
            }
        }
    }
}
