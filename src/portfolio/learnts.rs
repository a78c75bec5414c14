use vec_map::VecMap;


struct Slot {
    buf: Vec<i32>,
    len: usize,
    receivers: VecMap<()>, // worker ids that already consumed this batch
}

impl Slot {
    fn with_capacity(capacity: usize) -> Slot {
        Slot {
            buf: Vec::with_capacity(capacity),
            len: 0,
            receivers: VecMap::new(),
        }
    }
}


// Store-and-forward database for the learnt-clause buffers workers
// publish. One slot per worker, overwritten in place on each fresh batch;
// the receivers set guarantees a worker never gets its own clauses back
// and never gets the same batch from the same producer twice.
pub struct LearntsExchange {
    cursor: usize, // next producer slot to try; 1-based, 0 is the master
    slots: Vec<Slot>,
}

impl LearntsExchange {
    // n_cpus counts the master: slots 1..n_cpus belong to workers.
    pub fn new(n_cpus: usize, buffer_capacity: usize) -> LearntsExchange {
        debug_assert!(n_cpus >= 2);
        LearntsExchange {
            cursor: 1,
            slots: (0..n_cpus)
                .map(|_| Slot::with_capacity(buffer_capacity))
                .collect(),
        }
    }

    // A fresh batch makes the slot eligible for every peer again.
    pub fn store(&mut self, from: usize, data: &[i32]) {
        let slot = &mut self.slots[from];
        slot.buf.clear();
        slot.buf.extend_from_slice(data);
        slot.len = data.len();
        slot.receivers.clear();
    }

    // Next batch to_worker has not seen, from any other producer. The
    // cursor advances past a hit, or by one on a miss.
    pub fn fetch_for(&mut self, to_worker: usize) -> Option<&[i32]> {
        let workers = self.slots.len() - 1;
        let mut i = self.cursor;
        loop {
            if i != to_worker
                && self.slots[i].len > 0
                && !self.slots[i].receivers.contains_key(to_worker)
            {
                self.slots[i].receivers.insert(to_worker, ());
                self.cursor = i % workers + 1;
                return Some(&self.slots[i].buf[..self.slots[i].len]);
            }
            i = i % workers + 1;
            if i == self.cursor {
                break;
            }
        }
        self.cursor = self.cursor % workers + 1;
        None
    }
}
