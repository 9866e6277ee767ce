//! Reconfiguration state machine
//!
//! Type-safe state machine for one reconfiguration run using the state-machines crate.
//! Uses dynamic dispatch mode so the coordinator can fire events from runtime results.

// The macro expansion needs the two-parameter std `Result` in scope
use crate::error::Error;
use state_machines::state_machine;

state_machine! {
    name: ReconfigureMachine,
    dynamic: true,
    initial: Scanning,
    states: [Scanning, Stopping, Reconfiguring, Restarting, Done, Failed],
    events {
        scanned {
            transition: { from: Scanning, to: Stopping }
        }
        halted {
            transition: { from: Stopping, to: Reconfiguring }
        }
        reconfigured {
            transition: { from: Reconfiguring, to: Restarting }
        }
        resumed {
            transition: { from: Restarting, to: Done }
        }
        fail {
            transition: { from: [Scanning, Stopping, Reconfiguring], to: Failed }
        }
    }
}

/// Simple phase enum for external use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Stopping,
    Reconfiguring,
    Restarting,
    Done,
    Failed,
}

impl Phase {
    /// Map a machine state name to a phase
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "Scanning" => Some(Phase::Scanning),
            "Stopping" => Some(Phase::Stopping),
            "Reconfiguring" => Some(Phase::Reconfiguring),
            "Restarting" => Some(Phase::Restarting),
            "Done" => Some(Phase::Done),
            "Failed" => Some(Phase::Failed),
            _ => None,
        }
    }
}

/// State of a single run
pub struct RunState {
    machine: DynamicReconfigureMachine<()>,
}

impl RunState {
    pub fn new() -> Self {
        // Create typestate machine and convert to dynamic for runtime dispatch
        Self {
            machine: ReconfigureMachine::new(()).into_dynamic(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        // Every machine state has a Phase; Failed is the safe reading otherwise
        Phase::from_name(self.machine.current_state()).unwrap_or(Phase::Failed)
    }

    fn fire(&mut self, event: ReconfigureMachineEvent) -> crate::error::Result<()> {
        let from = self.phase();
        self.machine
            .handle(event)
            .map_err(|e| Error::InvalidTransition(format!("from {:?}: {:?}", from, e)))
    }

    /// Containers enumerated
    pub fn scanned(&mut self) -> crate::error::Result<()> {
        self.fire(ReconfigureMachineEvent::Scanned)
    }

    /// Every running container stopped
    pub fn halted(&mut self) -> crate::error::Result<()> {
        self.fire(ReconfigureMachineEvent::Halted)
    }

    /// Network and identity provisioning finished
    pub fn reconfigured(&mut self) -> crate::error::Result<()> {
        self.fire(ReconfigureMachineEvent::Reconfigured)
    }

    /// Restart loop finished
    pub fn resumed(&mut self) -> crate::error::Result<()> {
        self.fire(ReconfigureMachineEvent::Resumed)
    }

    /// Abort the run
    pub fn fail(&mut self) -> crate::error::Result<()> {
        self.fire(ReconfigureMachineEvent::Fail)
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
