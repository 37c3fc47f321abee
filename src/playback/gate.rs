use parking_lot::{Condvar, Mutex};

/// How a [`StartGate`] was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Open,
    Aborted,
}

#[derive(Debug, Default)]
struct GateState {
    arrived: usize,
    outcome: Option<GateOutcome>,
}

/// Single-use gate that releases every waiting unit at once.
///
/// Units call [`StartGate::arrive_and_wait`]; the coordinator calls
/// [`StartGate::open_when_armed`] once all parties are parked, or
/// [`StartGate::abort`] if a unit could not be started. The first resolution
/// sticks.
#[derive(Debug)]
pub struct StartGate {
    parties: usize,
    state: Mutex<GateState>,
    cond: Condvar,
}

impl StartGate {
    pub fn new(parties: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(GateState::default()),
            cond: Condvar::new(),
        }
    }

    /// Register arrival and block until the gate is resolved.
    pub fn arrive_and_wait(&self) -> GateOutcome {
        let mut state = self.state.lock();
        state.arrived += 1;
        self.cond.notify_all();
        loop {
            if let Some(outcome) = state.outcome {
                return outcome;
            }
            self.cond.wait(&mut state);
        }
    }

    /// Block until every party has arrived, then open the gate.
    ///
    /// Returns the final outcome, which is `Aborted` if the gate was aborted
    /// while waiting.
    pub fn open_when_armed(&self) -> GateOutcome {
        let mut state = self.state.lock();
        while state.arrived < self.parties && state.outcome.is_none() {
            self.cond.wait(&mut state);
        }
        let outcome = *state.outcome.get_or_insert(GateOutcome::Open);
        self.cond.notify_all();
        outcome
    }

    pub fn abort(&self) {
        let mut state = self.state.lock();
        state.outcome.get_or_insert(GateOutcome::Aborted);
        self.cond.notify_all();
    }

    pub fn arrived(&self) -> usize {
        self.state.lock().arrived
    }
}
