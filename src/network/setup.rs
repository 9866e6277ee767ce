//! The bridge step of a reconfiguration run
//!
//! Allocates a subnet, writes the bridge file and restarts the bridge
//! service. Skipped when the operator asks for it or when the file already
//! describes an enabled bridge, so a second run does not hand out a
//! second subnet next to the live one.

use crate::error::Result;
use crate::network::{
    AddressSource, BridgeFile, BridgeSettings, ServiceManager, SubnetAllocator, SubnetCandidate,
};

const CONFIG_STEP: &str = "Updating the LXC bridge config";

/// What the bridge step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// New settings written and service restarted
    Configured { subnet: SubnetCandidate },
    /// The bridge file already enables the bridge
    AlreadyConfigured,
    /// Bridge setup disabled by the operator
    Skipped,
}

/// Bridge reconfiguration as seen by the lifecycle coordinator
pub trait BridgeStep {
    fn reconfigure(&self) -> Result<BridgeOutcome>;
}

/// Allocator + bridge file + service restart
pub struct BridgeSetup<S, M> {
    allocator: SubnetAllocator<S>,
    file: BridgeFile,
    bridge_name: String,
    manager: M,
    service: String,
    skip: bool,
    verbose: bool,
}

impl<S: AddressSource, M: ServiceManager> BridgeSetup<S, M> {
    pub fn new(
        allocator: SubnetAllocator<S>,
        file: BridgeFile,
        bridge_name: impl Into<String>,
        manager: M,
        service: impl Into<String>,
    ) -> Self {
        Self {
            allocator,
            file,
            bridge_name: bridge_name.into(),
            manager,
            service: service.into(),
            skip: false,
            verbose: false,
        }
    }

    /// Skip the bridge entirely
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Enable verbose output
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl<S: AddressSource, M: ServiceManager> BridgeStep for BridgeSetup<S, M> {
    fn reconfigure(&self) -> Result<BridgeOutcome> {
        if self.skip {
            return Ok(BridgeOutcome::Skipped);
        }

        let configured = self
            .file
            .is_configured(&self.bridge_name)
            .map_err(|e| e.at_step(CONFIG_STEP))?;
        if configured {
            if self.verbose {
                println!(
                    "  {} already enables {}",
                    self.file.path().display(),
                    self.bridge_name
                );
            }
            return Ok(BridgeOutcome::AlreadyConfigured);
        }

        // Allocation errors already name their source
        let subnet = self.allocator.allocate()?;
        let settings = BridgeSettings::for_subnet(&subnet, &self.bridge_name);
        self.file
            .apply(&settings)
            .map_err(|e| e.at_step(CONFIG_STEP))?;

        if self.verbose {
            println!("  Wrote {}:", self.file.path().display());
            for (key, value) in settings.entries() {
                println!("    {}={}", key, value);
            }
        }

        println!("\nRestarting services:");
        if let Err(e) = self.manager.enable_and_restart(&self.service) {
            println!(" FAILED");
            return Err(e.at_step("Restarting the LXC network service"));
        }
        println!(" DONE");

        Ok(BridgeOutcome::Configured { subnet })
    }
}
