//! Transaction context
//!
//! An [`EmvContext`] owns the card command layer and every TLV list the
//! kernel works with. Configuration lists are built once; the per transaction
//! lists are cleared whenever a new transaction begins.

use nexum_emv_tlv::TlvList;
use nexum_emv_ttl::{CardTransport, Ttl};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument};

use crate::app::CandidateList;
use crate::config::KernelConfig;
use crate::error::Result;
use crate::kernel::{Discovery, Kernel};
use crate::oda::OdaContext;
use crate::tal::Tal;

/// Card session and transaction state shared by every kernel stage
#[derive(Debug)]
pub struct EmvContext<T> {
    pub(crate) tal: Tal<T>,
    pub(crate) settings: KernelConfig,
    pub(crate) config: TlvList,
    pub(crate) supported_aids: TlvList,
    pub(crate) params: TlvList,
    pub(crate) icc: TlvList,
    pub(crate) terminal: TlvList,
    pub(crate) oda: OdaContext,
    rng: StdRng,
}

impl<T: CardTransport> EmvContext<T> {
    /// Bind a card transport and a terminal configuration
    pub fn new(transport: T, settings: KernelConfig) -> Result<Self> {
        settings.validate()?;
        let config = settings.config_list()?;
        let supported_aids = settings.supported_aids_list()?;
        let ttl = Ttl::new(transport, settings.transport_mode);
        debug!(
            mode = %settings.transport_mode,
            aids = supported_aids.len(),
            keys = settings.ca_public_keys.len(),
            "EMV context created"
        );
        Ok(Self {
            tal: Tal::new(ttl),
            settings,
            config,
            supported_aids,
            params: TlvList::new(),
            icc: TlvList::new(),
            terminal: TlvList::new(),
            oda: OdaContext::new(),
            rng: StdRng::from_rng(&mut rand::rng()),
        })
    }

    /// Replace the random source used for unpredictable numbers and random
    /// transaction selection
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Seed the random source, for reproducible transactions
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    /// Clear every per transaction list, keeping the configuration
    pub fn reset(&mut self) {
        self.params.clear();
        self.icc.clear();
        self.terminal.clear();
        self.oda.clear();
    }

    /// Start a transaction with the transaction parameters `params`
    ///
    /// `params` carries the data objects the terminal supplies per
    /// transaction, such as the amounts (`81`, `9F02`, `9F03`), the
    /// transaction date (`9A`), type (`9C`) and currency (`5F2A`).
    #[instrument(skip_all, fields(params = params.len()))]
    pub fn begin(&mut self, params: TlvList) -> Kernel<'_, T, Discovery> {
        self.reset();
        self.params = params;
        Kernel::new(
            self,
            Discovery {
                candidates: CandidateList::new(),
            },
        )
    }

    /// Release every list and return the card transport
    pub fn clear(self) -> T {
        self.tal.into_inner().into_inner()
    }

    /// Card command layer
    pub const fn tal(&self) -> &Tal<T> {
        &self.tal
    }

    /// Terminal configuration
    pub const fn settings(&self) -> &KernelConfig {
        &self.settings
    }

    /// Terminal resident data objects
    pub const fn config(&self) -> &TlvList {
        &self.config
    }

    /// Terminal supported AIDs (`9F06`) with their selection indicator flags
    pub const fn supported_aids(&self) -> &TlvList {
        &self.supported_aids
    }

    /// Transaction parameters
    pub const fn params(&self) -> &TlvList {
        &self.params
    }

    /// Data objects read from the card
    pub const fn icc(&self) -> &TlvList {
        &self.icc
    }

    /// Data objects produced by the terminal during the transaction
    pub const fn terminal(&self) -> &TlvList {
        &self.terminal
    }

    /// Offline data authentication state
    pub const fn oda(&self) -> &OdaContext {
        &self.oda
    }

    pub(crate) fn random_bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.rng.fill(&mut bytes);
        bytes
    }

    /// Uniform value in `0..upper`
    pub(crate) fn random_below(&mut self, upper: u32) -> u32 {
        self.rng.random_range(0..upper)
    }
}
