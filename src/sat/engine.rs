use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::sat::{Formula, Lit};


// Process-wide abort switch. Signal handlers and the coordinator only
// ever set it; the engine polls it between conflicts.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}


#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SolveResult {
    Sat,
    Unsat,
    Interrupted,
}


#[derive(Clone, Copy, Debug)]
pub struct Settings {
    pub var_decay: f64,
    pub restart_first: u64,  // The initial restart limit.
    pub restart_inc: f64,    // Restart limit growth factor.
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            var_decay: 0.95,
            restart_first: 100,
            restart_inc: 2.0,
        }
    }
}


#[derive(Default, Debug, Clone, Copy)]
pub struct EngineStats {
    pub solves: u64,
    pub decisions: u64,
    pub propagations: u64,
    pub conflicts: u64,
    pub restarts: u64,
}


struct Clause {
    lits: Vec<Lit>,
    learnt: bool,
}


// Conflict-driven clause-learning solver: assumption-based solving, a
// failed-assumption set on UNSAT, and import/export/removal of learnt
// clauses between solve calls.
pub struct Engine {
    ok: bool,
    settings: Settings,
    clauses: Vec<Option<Clause>>,
    num_learnts: usize,
    watches: Vec<Vec<usize>>,     // literal index -> watching clauses
    assigns: Vec<Option<bool>>,   // variable index -> value
    phase: Vec<bool>,             // last assigned value, for phase saving
    activity: Vec<f64>,
    var_inc: f64,
    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    qhead: usize,
    reason: Vec<Option<usize>>,
    level: Vec<usize>,
    seen: Vec<bool>,
    conflict: Vec<Lit>,
    model: Vec<Option<bool>>,
    cancel: CancelToken,
    pub stats: EngineStats,
}

impl Engine {
    pub fn new(formula: &Formula, cancel: CancelToken) -> Engine {
        Engine::with_settings(formula, cancel, Settings::default())
    }

    pub fn with_settings(formula: &Formula, cancel: CancelToken, settings: Settings) -> Engine {
        let n = formula.num_vars();
        let mut engine = Engine {
            ok: true,
            settings,
            clauses: Vec::with_capacity(formula.num_clauses()),
            num_learnts: 0,
            watches: vec![Vec::new(); 2 * n],
            assigns: vec![None; n],
            phase: vec![false; n],
            activity: vec![0.0; n],
            var_inc: 1.0,
            trail: Vec::with_capacity(n),
            trail_lim: Vec::new(),
            qhead: 0,
            reason: vec![None; n],
            level: vec![0; n],
            seen: vec![false; n],
            conflict: Vec::new(),
            model: Vec::new(),
            cancel,
            stats: EngineStats::default(),
        };
        for clause in formula.clauses() {
            if !engine.add_clause(clause, false) {
                break;
            }
        }
        engine
    }

    #[inline]
    pub fn num_vars(&self) -> usize {
        self.assigns.len()
    }

    #[inline]
    pub fn num_learnts(&self) -> usize {
        self.num_learnts
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    // Failed assumptions of the last UNSAT solve, negated. Empty when the
    // formula itself is UNSAT.
    #[inline]
    pub fn conflict(&self) -> &[Lit] {
        &self.conflict
    }

    #[inline]
    pub fn model(&self) -> &[Option<bool>] {
        &self.model
    }

    #[inline]
    fn decision_level(&self) -> usize {
        self.trail_lim.len()
    }

    #[inline]
    fn lit_value(&self, l: Lit) -> Option<bool> {
        self.assigns[l.var().index()].map(|b| b ^ l.sign())
    }

    // Top-level propagation; false means the instance is already
    // contradictory.
    pub fn simplify(&mut self) -> bool {
        debug_assert_eq!(self.decision_level(), 0);
        if self.ok && self.propagate().is_some() {
            self.ok = false;
        }
        self.ok
    }

    // Searches for a model extending the assumptions. Always returns with
    // the trail unwound to the root level.
    pub fn solve(&mut self, assumptions: &[Lit]) -> SolveResult {
        self.model.clear();
        self.conflict.clear();
        self.stats.solves += 1;

        if !self.simplify() {
            return SolveResult::Unsat;
        }

        let mut conflicts_here = 0u64;
        let mut restart_limit = self.settings.restart_first;

        loop {
            if let Some(confl) = self.propagate() {
                self.stats.conflicts += 1;
                conflicts_here += 1;

                if self.decision_level() == 0 {
                    self.ok = false;
                    return SolveResult::Unsat;
                }

                let (learnt, backtrack) = self.analyze(confl);
                self.cancel_until(backtrack);
                let asserting = learnt[0];
                if learnt.len() == 1 {
                    self.unchecked_enqueue(asserting, None);
                } else {
                    let ci = self.attach_clause(learnt, true);
                    self.unchecked_enqueue(asserting, Some(ci));
                }
                self.var_inc /= self.settings.var_decay;
            } else {
                if self.cancel.is_canceled() {
                    self.cancel_until(0);
                    return SolveResult::Interrupted;
                }

                if conflicts_here >= restart_limit {
                    self.stats.restarts += 1;
                    conflicts_here = 0;
                    restart_limit = (restart_limit as f64 * self.settings.restart_inc) as u64;
                    self.cancel_until(0);
                    continue;
                }

                // Establish assumptions before any free decision.
                let mut next = None;
                while self.decision_level() < assumptions.len() {
                    let a = assumptions[self.decision_level()];
                    match self.lit_value(a) {
                        Some(true) => {
                            // Already satisfied; keep a dummy level so the
                            // level index stays in step with the list.
                            self.trail_lim.push(self.trail.len());
                        }
                        Some(false) => {
                            self.analyze_final(!a);
                            self.cancel_until(0);
                            return SolveResult::Unsat;
                        }
                        None => {
                            next = Some(a);
                            break;
                        }
                    }
                }

                let decision = next.or_else(|| self.pick_branch());
                match decision {
                    None => {
                        self.model = self.assigns.clone();
                        self.cancel_until(0);
                        return SolveResult::Sat;
                    }
                    Some(p) => {
                        self.stats.decisions += 1;
                        self.trail_lim.push(self.trail.len());
                        self.unchecked_enqueue(p, None);
                    }
                }
            }
        }
    }

    // Imports shared learnt clauses: signed literals, clauses delimited
    // by 0. Must be called between solve calls.
    pub fn add_learnts(&mut self, buf: &[i32]) {
        debug_assert_eq!(self.decision_level(), 0);
        for chunk in buf.split(|&x| x == 0) {
            if chunk.is_empty() {
                continue;
            }
            let lits: Vec<Lit> = chunk.iter().map(|&x| Lit::from_signed(x)).collect();
            if !self.add_clause(&lits, true) {
                return;
            }
        }
        if self.ok && self.propagate().is_some() {
            self.ok = false;
        }
    }

    // Exports up to max_count learnt clauses of at most max_size
    // literals, most recent first, delimited by 0.
    pub fn get_learnts(&self, max_count: usize, max_size: usize) -> Vec<i32> {
        let mut out = Vec::new();
        let mut count = 0;
        for slot in self.clauses.iter().rev() {
            if count == max_count {
                break;
            }
            if let Some(c) = slot {
                if c.learnt && c.lits.len() <= max_size {
                    out.extend(c.lits.iter().map(Lit::to_signed));
                    out.push(0);
                    count += 1;
                }
            }
        }
        out
    }

    // Drops every learnt clause not locked as the reason of a top-level
    // implication.
    pub fn clear_learnts(&mut self) {
        debug_assert_eq!(self.decision_level(), 0);
        for i in 0..self.clauses.len() {
            let removable = match &self.clauses[i] {
                Some(c) if c.learnt => {
                    let l0 = c.lits[0];
                    !(self.lit_value(l0) == Some(true)
                        && self.reason[l0.var().index()] == Some(i))
                }
                _ => false,
            };
            if removable {
                self.clauses[i] = None;
                self.num_learnts -= 1;
            }
        }
        self.rebuild_watches();
    }

    fn rebuild_watches(&mut self) {
        for w in self.watches.iter_mut() {
            w.clear();
        }
        for (i, slot) in self.clauses.iter().enumerate() {
            if let Some(c) = slot {
                self.watches[c.lits[0].index()].push(i);
                self.watches[c.lits[1].index()].push(i);
            }
        }
    }

    // Adds a clause at the root level, simplifying against top-level
    // assignments. Returns false when the instance became contradictory.
    fn add_clause(&mut self, lits: &[Lit], learnt: bool) -> bool {
        debug_assert_eq!(self.decision_level(), 0);
        if !self.ok {
            return false;
        }

        let mut ps = lits.to_vec();
        ps.sort();
        ps.dedup();
        if ps.windows(2).any(|w| w[0].var() == w[1].var()) {
            return true; // tautology
        }

        let mut kept = Vec::with_capacity(ps.len());
        for &l in &ps {
            match self.lit_value(l) {
                Some(true) => return true, // satisfied at the root
                Some(false) => {}
                None => kept.push(l),
            }
        }

        match kept.len() {
            0 => {
                self.ok = false;
                false
            }
            1 => {
                self.unchecked_enqueue(kept[0], None);
                true
            }
            _ => {
                self.attach_clause(kept, learnt);
                true
            }
        }
    }

    fn attach_clause(&mut self, lits: Vec<Lit>, learnt: bool) -> usize {
        debug_assert!(lits.len() >= 2);
        let ci = self.clauses.len();
        self.watches[lits[0].index()].push(ci);
        self.watches[lits[1].index()].push(ci);
        self.clauses.push(Some(Clause { lits, learnt }));
        if learnt {
            self.num_learnts += 1;
        }
        ci
    }

    fn unchecked_enqueue(&mut self, l: Lit, from: Option<usize>) {
        let v = l.var().index();
        debug_assert!(self.assigns[v].is_none());
        self.assigns[v] = Some(!l.sign());
        self.reason[v] = from;
        self.level[v] = self.decision_level();
        self.trail.push(l);
    }

    fn propagate(&mut self) -> Option<usize> {
        let mut confl = None;
        while confl.is_none() && self.qhead < self.trail.len() {
            let p = self.trail[self.qhead];
            self.qhead += 1;
            self.stats.propagations += 1;

            let false_lit = !p;
            let watchers = std::mem::replace(&mut self.watches[false_lit.index()], Vec::new());
            let mut kept = Vec::with_capacity(watchers.len());

            for &ci in &watchers {
                if confl.is_some() {
                    kept.push(ci);
                    continue;
                }

                enum Outcome {
                    Kept,
                    Moved,
                    Enqueue(Lit),
                    Conflict,
                }

                let outcome = {
                    let clause = self.clauses[ci].as_mut().expect("watched clause is live");
                    if clause.lits[0] == false_lit {
                        clause.lits.swap(0, 1);
                    }
                    debug_assert_eq!(clause.lits[1], false_lit);

                    let first = clause.lits[0];
                    if value_of(&self.assigns, first) == Some(true) {
                        Outcome::Kept
                    } else {
                        let mut moved = false;
                        for k in 2..clause.lits.len() {
                            if value_of(&self.assigns, clause.lits[k]) != Some(false) {
                                clause.lits.swap(1, k);
                                self.watches[clause.lits[1].index()].push(ci);
                                moved = true;
                                break;
                            }
                        }
                        if moved {
                            Outcome::Moved
                        } else if value_of(&self.assigns, first) == Some(false) {
                            Outcome::Conflict
                        } else {
                            Outcome::Enqueue(first)
                        }
                    }
                };

                match outcome {
                    Outcome::Moved => {}
                    Outcome::Kept => kept.push(ci),
                    Outcome::Enqueue(first) => {
                        kept.push(ci);
                        self.unchecked_enqueue(first, Some(ci));
                    }
                    Outcome::Conflict => {
                        kept.push(ci);
                        self.qhead = self.trail.len();
                        confl = Some(ci);
                    }
                }
            }

            self.watches[false_lit.index()] = kept;
        }
        confl
    }

    // First-UIP conflict analysis. Returns the learnt clause with the
    // asserting literal first and the backtrack level; when the clause has
    // more than one literal, position 1 holds one of maximal level.
    fn analyze(&mut self, confl: usize) -> (Vec<Lit>, usize) {
        let mut below: Vec<Lit> = Vec::new();
        let mut path_c = 0usize;
        let mut index = self.trail.len();
        let mut confl = confl;
        let mut first_round = true;

        let uip = loop {
            let reason_lits: Vec<Lit> = {
                let c = self.clauses[confl].as_ref().expect("reason clause is live");
                let skip = if first_round { 0 } else { 1 };
                c.lits[skip..].to_vec()
            };
            first_round = false;

            for q in reason_lits {
                let v = q.var().index();
                if !self.seen[v] && self.level[v] > 0 {
                    self.seen[v] = true;
                    self.var_bump(v);
                    if self.level[v] >= self.decision_level() {
                        path_c += 1;
                    } else {
                        below.push(q);
                    }
                }
            }

            index -= 1;
            while !self.seen[self.trail[index].var().index()] {
                index -= 1;
            }
            let p = self.trail[index];
            self.seen[p.var().index()] = false;
            path_c -= 1;
            if path_c == 0 {
                break p;
            }
            confl = self.reason[p.var().index()]
                .expect("literal between the conflict and the UIP has a reason");
        };

        let mut learnt = Vec::with_capacity(below.len() + 1);
        learnt.push(!uip);
        learnt.extend_from_slice(&below);
        for l in &below {
            self.seen[l.var().index()] = false;
        }

        let backtrack = if learnt.len() == 1 {
            0
        } else {
            let mut max_i = 1;
            for i in 2..learnt.len() {
                if self.level[learnt[i].var().index()] > self.level[learnt[max_i].var().index()] {
                    max_i = i;
                }
            }
            learnt.swap(1, max_i);
            self.level[learnt[1].var().index()]
        };

        (learnt, backtrack)
    }

    // Computes the set of assumptions responsible for forcing `p` (the
    // negation of a falsified assumption), walking reasons down the trail.
    fn analyze_final(&mut self, p: Lit) {
        self.conflict.clear();
        self.conflict.push(p);
        if self.decision_level() == 0 {
            return;
        }

        self.seen[p.var().index()] = true;
        for i in (self.trail_lim[0]..self.trail.len()).rev() {
            let x = self.trail[i];
            let xv = x.var().index();
            if !self.seen[xv] {
                continue;
            }
            match self.reason[xv] {
                None => {
                    debug_assert!(self.level[xv] > 0);
                    self.conflict.push(!x);
                }
                Some(ci) => {
                    let lits: Vec<Lit> = {
                        let c = self.clauses[ci].as_ref().expect("reason clause is live");
                        c.lits[1..].to_vec()
                    };
                    for l in lits {
                        if self.level[l.var().index()] > 0 {
                            self.seen[l.var().index()] = true;
                        }
                    }
                }
            }
            self.seen[xv] = false;
        }
        self.seen[p.var().index()] = false;
    }

    fn cancel_until(&mut self, target: usize) {
        if self.decision_level() <= target {
            return;
        }
        for i in (self.trail_lim[target]..self.trail.len()).rev() {
            let l = self.trail[i];
            let v = l.var().index();
            self.phase[v] = self.assigns[v].expect("trail literal is assigned");
            self.assigns[v] = None;
            self.reason[v] = None;
        }
        self.trail.truncate(self.trail_lim[target]);
        self.trail_lim.truncate(target);
        self.qhead = self.trail.len();
    }

    fn pick_branch(&self) -> Option<Lit> {
        let mut best: Option<usize> = None;
        for v in 0..self.assigns.len() {
            if self.assigns[v].is_none()
                && best.map_or(true, |b| self.activity[v] > self.activity[b])
            {
                best = Some(v);
            }
        }
        best.map(|v| crate::sat::Var::new(v).lit(!self.phase[v]))
    }

    fn var_bump(&mut self, v: usize) {
        self.activity[v] += self.var_inc;
        if self.activity[v] > 1e100 {
            for a in self.activity.iter_mut() {
                *a *= 1e-100;
            }
            self.var_inc *= 1e-100;
        }
    }
}

#[inline]
fn value_of(assigns: &[Option<bool>], l: Lit) -> Option<bool> {
    assigns[l.var().index()].map(|b| b ^ l.sign())
}
