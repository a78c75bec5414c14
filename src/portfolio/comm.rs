use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvError, Select, Sender};

// Conflict literals per result record; longer conflicts are fragmented
// across a more_msgs streak.
pub const MAX_CONFLICTS: usize = 20;


// Fixed-layout reply for one finished sub-problem. result is 1 for SAT,
// 0 for UNSAT; the final record of a streak carries the cpu time.
#[derive(Clone, Copy, Debug)]
pub struct ResultRecord {
    pub result: i32,
    pub conflict: [i32; MAX_CONFLICTS],
    pub conflict_size: i32,
    pub more_msgs: i32,
    pub cpu_time: f64,
}

impl ResultRecord {
    pub fn sat(cpu_time: f64) -> ResultRecord {
        ResultRecord {
            result: 1,
            conflict: [0; MAX_CONFLICTS],
            conflict_size: 0,
            more_msgs: 0,
            cpu_time,
        }
    }

    #[inline]
    pub fn conflict_lits(&self) -> &[i32] {
        &self.conflict[..self.conflict_size as usize]
    }
}

// An empty conflict still produces one record so the master always sees a
// reply.
pub fn unsat_records(conflicts: &[i32], cpu_time: f64) -> Vec<ResultRecord> {
    if conflicts.is_empty() {
        return vec![ResultRecord {
            result: 0,
            conflict: [0; MAX_CONFLICTS],
            conflict_size: 0,
            more_msgs: 0,
            cpu_time,
        }];
    }

    let chunks: Vec<&[i32]> = conflicts.chunks(MAX_CONFLICTS).collect();
    let last = chunks.len() - 1;
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut rec = ResultRecord {
                result: 0,
                conflict: [0; MAX_CONFLICTS],
                conflict_size: chunk.len() as i32,
                more_msgs: if i == last { 0 } else { 1 },
                cpu_time: if i == last { cpu_time } else { 0.0 },
            };
            rec.conflict[..chunk.len()].copy_from_slice(chunk);
            rec
        })
        .collect()
}


pub struct Job(pub Vec<i32>);

pub struct LearntBatch(pub Vec<i32>);

pub struct Model(pub Vec<i32>);


pub struct MasterLink {
    pub job_tx: Sender<Job>,
    pub learnt_tx: Sender<LearntBatch>,
    pub result_rx: Receiver<ResultRecord>,
    pub learnt_rx: Receiver<LearntBatch>,
    pub model_rx: Receiver<Model>,
}

pub struct WorkerLink {
    pub id: usize,
    pub job_rx: Receiver<Job>,
    pub learnt_rx: Receiver<LearntBatch>,
    pub result_tx: Sender<ResultRecord>,
    pub learnt_tx: Sender<LearntBatch>,
    pub model_tx: Sender<Model>,
}

pub fn link(id: usize) -> (MasterLink, WorkerLink) {
    let (job_tx, job_rx) = unbounded();
    let (down_learnt_tx, down_learnt_rx) = unbounded();
    let (result_tx, result_rx) = unbounded();
    let (up_learnt_tx, up_learnt_rx) = unbounded();
    let (model_tx, model_rx) = unbounded();
    (
        MasterLink {
            job_tx,
            learnt_tx: down_learnt_tx,
            result_rx,
            learnt_rx: up_learnt_rx,
            model_rx,
        },
        WorkerLink {
            id,
            job_rx,
            learnt_rx: down_learnt_rx,
            result_tx,
            learnt_tx: up_learnt_tx,
            model_tx,
        },
    )
}

// Any-source blocking receive on the result channels, bounded by timeout
// so the caller can poll for cancellation.
pub fn recv_result_any(
    links: &[MasterLink],
    timeout: Duration,
) -> Option<(usize, Result<ResultRecord, RecvError>)> {
    let mut sel = Select::new();
    for link in links {
        sel.recv(&link.result_rx);
    }
    match sel.select_timeout(timeout) {
        Ok(oper) => {
            let i = oper.index();
            Some((i, oper.recv(&links[i].result_rx)))
        }
        Err(_) => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_conflicts_fragment_into_a_streak() {
        let lits: Vec<i32> = (1..=45).collect();
        let records = unsat_records(&lits, 1.5);
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].conflict_size, 20);
        assert_eq!(records[0].more_msgs, 1);
        assert_eq!(records[1].more_msgs, 1);
        assert_eq!(records[2].conflict_size, 5);
        assert_eq!(records[2].more_msgs, 0);
        assert_eq!(records[2].cpu_time, 1.5);

        let mut reassembled = Vec::new();
        for r in &records {
            reassembled.extend_from_slice(r.conflict_lits());
        }
        assert_eq!(reassembled, lits);
    }

    #[test]
    fn empty_conflict_still_answers() {
        let records = unsat_records(&[], 0.25);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result, 0);
        assert_eq!(records[0].conflict_size, 0);
        assert_eq!(records[0].more_msgs, 0);
        assert_eq!(records[0].cpu_time, 0.25);
    }

    #[test]
    fn exact_multiple_of_the_record_size() {
        let lits: Vec<i32> = (1..=40).collect();
        let records = unsat_records(&lits, 0.0);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].conflict_size, 20);
        assert_eq!(records[1].more_msgs, 0);
    }

    #[test]
    fn any_source_receive_finds_the_ready_channel() {
        let (m1, w1) = link(1);
        let (m2, w2) = link(2);
        let links = vec![m1, m2];

        w2.result_tx.send(ResultRecord::sat(0.0)).unwrap();
        let (idx, rec) = recv_result_any(&links, Duration::from_secs(1)).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(rec.unwrap().result, 1);

        assert!(recv_result_any(&links, Duration::from_millis(10)).is_none());
        drop(w1);
    }
}
