//! Lifecycle coordinator
//!
//! Handles:
//! - Enumerating every container under the backend root
//! - Stopping the running ones, aborting on the first stop failure
//! - Bridge and identity provisioning while nothing is running
//! - Starting exactly the containers it stopped, reporting start failures
//!   without giving up on the rest
//!
//! Each phase has its own transition method so a run can be driven one
//! phase at a time.

use crate::container::{self, Container, ContainerBackend, StoppedSet};
use crate::error::{Error, Result};
use crate::lifecycle::Phase;
use crate::lifecycle::state::RunState;
use crate::network::{BridgeOutcome, BridgeStep};
use crate::provision::{IdentityRange, NetworkMapping, RequiredDirectories};
use std::io::{self, Write};

/// Collaborators run during the Reconfiguring phase, in order
pub struct ReconfigureSteps<'a> {
    pub bridge: &'a dyn BridgeStep,
    pub uid_range: &'a dyn IdentityRange,
    pub gid_range: &'a dyn IdentityRange,
    pub usernet: &'a dyn NetworkMapping,
    pub directories: &'a dyn RequiredDirectories,
}

/// Result of a run that reached Done
#[derive(Debug)]
pub struct ReconfigureReport {
    /// Containers stopped and restarted, in order
    pub stopped: Vec<String>,
    /// What happened to the bridge
    pub bridge: BridgeOutcome,
    /// Containers that did not come back
    pub restart_failures: Vec<Error>,
}

/// Drives one reconfiguration run
pub struct Coordinator<'a> {
    backend: &'a dyn ContainerBackend,
    steps: ReconfigureSteps<'a>,
    state: RunState,
    containers: Vec<Container>,
    stopped: StoppedSet,
    bridge: Option<BridgeOutcome>,
    restart_failures: Vec<Error>,
    verbose: bool,
}

fn flush() {
    // Progress dots only; nothing to do if stdout is gone
    let _ = io::stdout().flush();
}

impl<'a> Coordinator<'a> {
    pub fn new(backend: &'a dyn ContainerBackend, steps: ReconfigureSteps<'a>) -> Self {
        Self {
            backend,
            steps,
            state: RunState::new(),
            containers: Vec::new(),
            stopped: StoppedSet::new(),
            bridge: None,
            restart_failures: Vec::new(),
            verbose: false,
        }
    }

    /// Enable verbose output
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Containers this run has stopped so far
    #[cfg(test)]
    pub fn stopped(&self) -> &StoppedSet {
        &self.stopped
    }

    fn require(&self, phase: Phase) -> Result<()> {
        let current = self.phase();
        if current == phase {
            Ok(())
        } else {
            Err(Error::InvalidTransition(format!(
                "expected {:?}, run is in {:?}",
                phase, current
            )))
        }
    }

    /// Move to Failed and hand the error back
    fn abort(&mut self, err: Error) -> Error {
        // Valid from every phase that can call this
        let _ = self.state.fail();
        err
    }

    /// Scanning: enumerate every registered container
    pub fn scan(&mut self) -> Result<()> {
        self.require(Phase::Scanning)?;

        match container::scan(self.backend) {
            Ok(containers) => {
                if self.verbose {
                    for c in &containers {
                        println!("  {} is {}", c.name, c.state);
                    }
                }
                self.containers = containers;
                self.state.scanned()
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Stopping: stop everything that is not already stopped
    pub fn stop_running(&mut self) -> Result<()> {
        self.require(Phase::Stopping)?;

        println!("Stopping containers:");
        let running: Vec<Container> = self
            .containers
            .iter()
            .filter(|c| !c.state.is_stopped())
            .cloned()
            .collect();

        for container in running {
            print!("Stopping {} .....", container.name);
            flush();

            if let Err(e) = self.backend.stop(&container.name) {
                println!(" FAILED");
                let err = Error::ContainerStopFailed {
                    name: container.name.clone(),
                    message: e.to_string(),
                };
                return Err(self.abort(err));
            }

            self.stopped.push(container);
            println!(" DONE");
        }
        println!("All containers stopped.");
        if self.verbose {
            println!("  {} stopped by this run", self.stopped.len());
        }

        self.state.halted()
    }

    /// Reconfiguring: bridge, ID ranges, usernet and directories
    pub fn reconfigure(&mut self) -> Result<()> {
        self.require(Phase::Reconfiguring)?;

        match self.run_steps() {
            Ok(outcome) => {
                self.bridge = Some(outcome);
                self.state.reconfigured()
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn run_steps(&self) -> Result<BridgeOutcome> {
        println!("\nCreating default network bridge .....");
        let outcome = match self.steps.bridge.reconfigure() {
            Ok(outcome) => outcome,
            Err(e) => {
                println!(" FAILED");
                return Err(e);
            }
        };
        match &outcome {
            BridgeOutcome::Configured { subnet } => println!(" DONE ({})", subnet),
            BridgeOutcome::AlreadyConfigured => println!(" SKIPPED (already configured)"),
            BridgeOutcome::Skipped => println!(" SKIPPED"),
        }

        println!("\nGenerating default ID mappings .....");
        for range in [self.steps.uid_range, self.steps.gid_range] {
            let step = format!("{} setup", range.kind());
            match range.ensure(true) {
                Ok(map) => {
                    if self.verbose {
                        println!(
                            "  {}: host id {} -> {}",
                            range.kind(),
                            map.host_id,
                            map.subordinate
                        );
                    }
                }
                Err(e) => {
                    println!(" FAILED");
                    return Err(e.at_step(&step));
                }
            }
        }
        println!(" DONE");

        println!("\nGenerating lxc-usernet settings .....");
        if let Err(e) = self.steps.usernet.ensure() {
            println!(" FAILED");
            return Err(e.at_step("lxc-usernet setup"));
        }
        println!(" DONE");

        println!("\nSetting up directories .....");
        if let Err(e) = self.steps.directories.ensure(true) {
            println!(" FAILED");
            return Err(e.at_step("Directory setup"));
        }
        println!(" DONE");

        Ok(outcome)
    }

    /// Restarting: start every stopped container, in stop order
    ///
    /// A failed start is printed and recorded; the loop carries on.
    pub fn restart_stopped(&mut self) -> Result<()> {
        self.require(Phase::Restarting)?;

        if !self.stopped.is_empty() {
            println!("\nStarting previously stopped containers:");
        }

        for container in self.stopped.iter() {
            print!("Starting {} .....", container.name);
            flush();

            match self.backend.start(&container.name) {
                Ok(()) => println!(" DONE"),
                Err(e) => {
                    let failure = Error::ContainerStartFailed {
                        name: container.name.clone(),
                        message: e.to_string(),
                    };
                    println!(" FAILED");
                    eprintln!("{}", failure);
                    self.restart_failures.push(failure);
                }
            }
        }

        self.state.resumed()
    }

    /// Run the transition for the current phase
    pub fn step(&mut self) -> Result<Phase> {
        match self.phase() {
            Phase::Scanning => self.scan()?,
            Phase::Stopping => self.stop_running()?,
            Phase::Reconfiguring => self.reconfigure()?,
            Phase::Restarting => self.restart_stopped()?,
            finished => {
                return Err(Error::InvalidTransition(format!(
                    "run already finished in {:?}",
                    finished
                )));
            }
        }
        Ok(self.phase())
    }

    /// Drive the run to Done
    pub fn run(mut self) -> Result<ReconfigureReport> {
        while self.step()? != Phase::Done {}
        self.into_report()
    }

    fn into_report(self) -> Result<ReconfigureReport> {
        let bridge = self.bridge.ok_or_else(|| {
            Error::InvalidTransition("run finished without a bridge outcome".to_string())
        })?;

        Ok(ReconfigureReport {
            stopped: self.stopped.names(),
            bridge,
            restart_failures: self.restart_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerState;
    use crate::network::{
        AddressSource, BridgeFile, BridgeSetup, ServiceManager, SubnetAllocator, SubnetPolicy,
    };
    use crate::provision::idmap::IdRange;
    use crate::provision::{IdKind, IdMap};
    use std::cell::{Cell, RefCell};
    use std::path::{Path, PathBuf};

    /// In-memory backend recording every call
    struct FakeBackend {
        root: PathBuf,
        containers: Vec<(String, ContainerState)>,
        fail_stop: Vec<&'static str>,
        fail_start: Vec<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeBackend {
        fn new(containers: &[(&str, ContainerState)]) -> Self {
            Self {
                root: PathBuf::from("/var/lib/ocsdk/targets"),
                containers: containers
                    .iter()
                    .map(|(n, s)| (n.to_string(), *s))
                    .collect(),
                fail_stop: Vec::new(),
                fail_start: Vec::new(),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl ContainerBackend for FakeBackend {
        fn root(&self) -> &Path {
            &self.root
        }

        fn list(&self) -> Result<Vec<String>> {
            Ok(self.containers.iter().map(|(n, _)| n.clone()).collect())
        }

        fn state(&self, name: &str) -> Result<ContainerState> {
            Ok(self
                .containers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, s)| *s)
                .unwrap_or(ContainerState::Unknown))
        }

        fn stop(&self, name: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("stop {}", name));
            if self.fail_stop.contains(&name) {
                return Err(Error::CommandFailed {
                    command: format!("lxc-stop -n {}", name),
                    message: "timed out".to_string(),
                });
            }
            Ok(())
        }

        fn start(&self, name: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("start {}", name));
            if self.fail_start.contains(&name) {
                return Err(Error::CommandFailed {
                    command: format!("lxc-start -n {}", name),
                    message: "exited with exit status: 1".to_string(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeBridge {
        calls: Cell<usize>,
        fail: bool,
    }

    impl BridgeStep for FakeBridge {
        fn reconfigure(&self) -> Result<BridgeOutcome> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                Err(Error::SubnetsExhausted {
                    prefix: "10.0".to_string(),
                    max: 254,
                })
            } else {
                Ok(BridgeOutcome::Skipped)
            }
        }
    }

    struct FakeRange {
        kind: IdKind,
        calls: Cell<usize>,
        fail: bool,
    }

    impl FakeRange {
        fn new(kind: IdKind) -> Self {
            Self {
                kind,
                calls: Cell::new(0),
                fail: false,
            }
        }
    }

    impl IdentityRange for FakeRange {
        fn kind(&self) -> IdKind {
            self.kind
        }

        fn ensure(&self, _create: bool) -> Result<IdMap> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(Error::IdRange {
                    path: PathBuf::from("/etc/subgid"),
                    message: "read-only file system".to_string(),
                });
            }
            Ok(IdMap {
                host_id: 1000,
                subordinate: IdRange {
                    start: 100_000,
                    count: 65_536,
                },
            })
        }
    }

    #[derive(Default)]
    struct FakeProvision {
        calls: Cell<usize>,
    }

    impl NetworkMapping for FakeProvision {
        fn ensure(&self) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    impl RequiredDirectories for FakeProvision {
        fn ensure(&self, create: bool) -> Result<()> {
            assert!(create);
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    struct Fixture {
        bridge: FakeBridge,
        uid: FakeRange,
        gid: FakeRange,
        usernet: FakeProvision,
        dirs: FakeProvision,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                bridge: FakeBridge::default(),
                uid: FakeRange::new(IdKind::User),
                gid: FakeRange::new(IdKind::Group),
                usernet: FakeProvision::default(),
                dirs: FakeProvision::default(),
            }
        }

        fn steps(&self) -> ReconfigureSteps<'_> {
            ReconfigureSteps {
                bridge: &self.bridge,
                uid_range: &self.uid,
                gid_range: &self.gid,
                usernet: &self.usernet,
                directories: &self.dirs,
            }
        }
    }

    fn three_containers() -> FakeBackend {
        FakeBackend::new(&[
            ("armhf", ContainerState::Running),
            ("i386", ContainerState::Stopped),
            ("x86_64", ContainerState::Frozen),
        ])
    }

    #[test]
    fn test_phases_step_by_step() {
        let backend = three_containers();
        let fixture = Fixture::new();
        let mut coord = Coordinator::new(&backend, fixture.steps());

        assert_eq!(coord.phase(), Phase::Scanning);
        coord.scan().unwrap();
        assert_eq!(coord.phase(), Phase::Stopping);
        assert!(backend.calls().is_empty());

        coord.stop_running().unwrap();
        assert_eq!(coord.phase(), Phase::Reconfiguring);
        assert_eq!(coord.stopped().names(), vec!["armhf", "x86_64"]);
        assert_eq!(fixture.bridge.calls.get(), 0);

        coord.reconfigure().unwrap();
        assert_eq!(coord.phase(), Phase::Restarting);
        assert_eq!(fixture.bridge.calls.get(), 1);
        assert_eq!(fixture.uid.calls.get(), 1);
        assert_eq!(fixture.gid.calls.get(), 1);
        assert_eq!(fixture.usernet.calls.get(), 1);
        assert_eq!(fixture.dirs.calls.get(), 1);

        coord.restart_stopped().unwrap();
        assert_eq!(coord.phase(), Phase::Done);
        assert_eq!(
            backend.calls(),
            vec!["stop armhf", "stop x86_64", "start armhf", "start x86_64"]
        );
    }

    #[test]
    fn test_transitions_out_of_order_rejected() {
        let backend = three_containers();
        let fixture = Fixture::new();
        let mut coord = Coordinator::new(&backend, fixture.steps());

        assert!(matches!(
            coord.stop_running(),
            Err(Error::InvalidTransition(_))
        ));
        assert!(matches!(
            coord.reconfigure(),
            Err(Error::InvalidTransition(_))
        ));
        assert_eq!(coord.phase(), Phase::Scanning);
        assert!(backend.calls().is_empty());
        assert_eq!(fixture.bridge.calls.get(), 0);
    }

    #[test]
    fn test_restart_failure_is_not_fatal() {
        let mut backend = FakeBackend::new(&[
            ("armhf", ContainerState::Running),
            ("i386", ContainerState::Stopped),
            ("x86_64", ContainerState::Running),
        ]);
        backend.fail_start = vec!["armhf"];
        let fixture = Fixture::new();

        let report = Coordinator::new(&backend, fixture.steps()).run().unwrap();

        assert_eq!(report.stopped, vec!["armhf", "x86_64"]);
        assert_eq!(report.restart_failures.len(), 1);
        match &report.restart_failures[0] {
            Error::ContainerStartFailed { name, .. } => assert_eq!(name, "armhf"),
            other => panic!("unexpected failure {:?}", other),
        }
        // The second container was still started after the first failed
        assert_eq!(
            backend.calls(),
            vec!["stop armhf", "stop x86_64", "start armhf", "start x86_64"]
        );
        assert_eq!(report.bridge, BridgeOutcome::Skipped);
    }

    #[test]
    fn test_stop_failure_is_fatal_before_reconfigure() {
        let mut backend = FakeBackend::new(&[
            ("armhf", ContainerState::Running),
            ("i386", ContainerState::Running),
            ("x86_64", ContainerState::Running),
        ]);
        backend.fail_stop = vec!["i386"];
        let fixture = Fixture::new();
        let mut coord = Coordinator::new(&backend, fixture.steps());

        coord.scan().unwrap();
        let err = coord.stop_running().unwrap_err();

        match err {
            Error::ContainerStopFailed { name, message } => {
                assert_eq!(name, "i386");
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(coord.phase(), Phase::Failed);
        // Stopping stops at the first failure and nothing is restarted
        assert_eq!(backend.calls(), vec!["stop armhf", "stop i386"]);
        assert_eq!(coord.stopped().names(), vec!["armhf"]);
        assert_eq!(fixture.bridge.calls.get(), 0);
        assert_eq!(fixture.uid.calls.get(), 0);
        assert!(matches!(coord.step(), Err(Error::InvalidTransition(_))));
    }

    #[test]
    fn test_reconfigure_failure_names_step() {
        let backend = three_containers();
        let mut fixture = Fixture::new();
        fixture.gid.fail = true;

        let err = Coordinator::new(&backend, fixture.steps()).run().unwrap_err();

        match err {
            Error::ExternalCommand { step, message } => {
                assert_eq!(step, "subGID setup");
                assert!(message.contains("/etc/subgid"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(fixture.usernet.calls.get(), 0);
        // No restarts after a fatal reconfigure error
        assert_eq!(backend.calls(), vec!["stop armhf", "stop x86_64"]);
    }

    #[test]
    fn test_bridge_error_passes_through() {
        let backend = three_containers();
        let mut fixture = Fixture::new();
        fixture.bridge.fail = true;

        let err = Coordinator::new(&backend, fixture.steps()).run().unwrap_err();

        assert!(matches!(err, Error::SubnetsExhausted { .. }));
        assert_eq!(fixture.uid.calls.get(), 0);
    }

    #[test]
    fn test_nothing_running() {
        let backend = FakeBackend::new(&[("i386", ContainerState::Stopped)]);
        let fixture = Fixture::new();

        let report = Coordinator::new(&backend, fixture.steps()).run().unwrap();

        assert!(report.stopped.is_empty());
        assert!(report.restart_failures.is_empty());
        assert!(backend.calls().is_empty());
        assert_eq!(fixture.dirs.calls.get(), 1);
    }

    struct StaticOutput;

    impl AddressSource for StaticOutput {
        fn interface_addresses(&self) -> Result<String> {
            Ok("    inet 10.0.1.1/24 scope global eth0\n".to_string())
        }
    }

    #[derive(Default)]
    struct CountingManager {
        restarts: Cell<usize>,
    }

    impl ServiceManager for &CountingManager {
        fn enable_and_restart(&self, _unit: &str) -> Result<()> {
            self.restarts.set(self.restarts.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_stop_failure_leaves_bridge_file_and_service_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lxc-net");
        let manager = CountingManager::default();
        let bridge = BridgeSetup::new(
            SubnetAllocator::new(StaticOutput, SubnetPolicy::default()),
            BridgeFile::new(&path),
            "lxcbr0",
            &manager,
            "lxc-net",
        );

        let mut backend = three_containers();
        backend.fail_stop = vec!["x86_64"];
        let fixture = Fixture::new();
        let steps = ReconfigureSteps {
            bridge: &bridge,
            ..fixture.steps()
        };

        let err = Coordinator::new(&backend, steps).run().unwrap_err();

        assert!(matches!(err, Error::ContainerStopFailed { .. }));
        assert!(!path.exists());
        assert_eq!(manager.restarts.get(), 0);
    }

    #[test]
    fn test_full_run_with_real_bridge_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lxc-net");
        let manager = CountingManager::default();
        let bridge = BridgeSetup::new(
            SubnetAllocator::new(StaticOutput, SubnetPolicy::default()),
            BridgeFile::new(&path),
            "lxcbr0",
            &manager,
            "lxc-net",
        );

        let backend = three_containers();
        let fixture = Fixture::new();
        let steps = ReconfigureSteps {
            bridge: &bridge,
            ..fixture.steps()
        };

        let report = Coordinator::new(&backend, steps).run().unwrap();

        match report.bridge {
            BridgeOutcome::Configured { subnet } => assert_eq!(subnet.octet(), 2),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(std::fs::read_to_string(&path).unwrap().contains("LXC_ADDR=10.0.2.1\n"));
        assert_eq!(manager.restarts.get(), 1);
    }
}
