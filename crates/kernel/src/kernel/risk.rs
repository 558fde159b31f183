//! Terminal risk management (EMV Book 3 section 10.6)
//!
//! Performed for every transaction, whatever the AIP says. The caller owns
//! the transaction log and passes it in, oldest entry first.

use nexum_emv_tlv::{TlvList, format, tags};
use nexum_emv_ttl::CardTransport;
use tracing::{debug, info, instrument};

use super::{Kernel, RestrictionsChecked, RiskManaged, set_tsi, set_tvr};
use crate::context::EmvContext;
use crate::error::{Error, Termination};
use crate::fields::{tsi, tvr};
use crate::tal::TalFailure;
use crate::txn_log::TxnLogEntry;

/// GET DATA reference of the Application Transaction Counter
const GET_DATA_ATC: u16 = 0x9F36;
/// GET DATA reference of the Last Online ATC Register
const GET_DATA_LAST_ONLINE_ATC: u16 = 0x9F13;

impl<'c, T: CardTransport> Kernel<'c, T, RestrictionsChecked> {
    /// Floor limit, exception file, random selection and velocity checks
    ///
    /// `log` holds earlier transactions, oldest first. It supplies the
    /// amount of the last transaction with the same card for the floor limit
    /// check, and the offline transaction count when the card cannot report
    /// its counters.
    #[instrument(skip_all, fields(log = log.len()))]
    pub fn manage_risk(
        self,
        log: &[TxnLogEntry],
    ) -> Result<Kernel<'c, T, RiskManaged>, Termination> {
        let ctx = &mut *self.ctx;
        let amount = transaction_amount(&ctx.params)?;
        let floor_limit = config_number(&ctx.config, tags::TERMINAL_FLOOR_LIMIT)?;
        let pan = ctx
            .icc
            .value(tags::PAN)
            .ok_or(Error::Internal("PAN not available"))?
            .to_vec();
        let sequence = ctx
            .icc
            .value(tags::PAN_SEQUENCE_NUMBER)
            .and_then(|v| v.first().copied());

        if ctx.settings.exception_file.iter().any(|entry| *entry == pan) {
            info!("Card appears on the exception file");
            set_tvr(&mut ctx.terminal, tvr::CARD_ON_EXCEPTION_FILE)?;
        }

        let previous = log
            .iter()
            .rev()
            .find(|entry| entry.matches_pan(&pan))
            .map_or(0, |entry| u64::from(entry.amount()));
        if amount.saturating_add(previous) >= floor_limit {
            debug!(amount, previous, floor_limit, "Floor limit exceeded");
            set_tvr(&mut ctx.terminal, tvr::FLOOR_LIMIT_EXCEEDED)?;
        } else if select_randomly(ctx, amount, floor_limit)? {
            debug!(amount, "Transaction selected randomly for online processing");
            set_tvr(&mut ctx.terminal, tvr::RANDOMLY_SELECTED)?;
        }

        check_velocity(ctx, log, &pan, sequence)?;

        set_tsi(&mut ctx.terminal, tsi::TERMINAL_RISK_MANAGEMENT_PERFORMED)?;
        info!("Terminal risk management performed");
        let application = self.state.application;
        Ok(Kernel::new(self.ctx, RiskManaged { application }))
    }
}

/// Amount, Authorised in binary (`81`) or else numeric (`9F02`) form
fn transaction_amount(params: &TlvList) -> Result<u64, Error> {
    if let Some(binary) = params.value(tags::AMOUNT_AUTHORISED_BINARY) {
        return format::binary_to_u64(binary).map_err(|_| Error::InvalidParameter);
    }
    let numeric = params
        .value(tags::AMOUNT_AUTHORISED_NUMERIC)
        .ok_or(Error::InvalidParameter)?;
    format::bcd_to_u64(numeric).map_err(|_| Error::InvalidParameter)
}

fn config_number(config: &TlvList, tag: u32) -> Result<u64, Error> {
    let value = config
        .value(tag)
        .ok_or(Error::InvalidConfig("terminal risk management parameter missing"))?;
    Ok(format::binary_to_u64(value)?)
}

/// Biased random transaction selection for amounts below the floor limit
///
/// Below the threshold the target percentage applies. From the threshold
/// up to the floor limit the percentage rises linearly towards the maximum
/// target percentage.
fn select_randomly<T: CardTransport>(
    ctx: &mut EmvContext<T>,
    amount: u64,
    floor_limit: u64,
) -> Result<bool, Error> {
    use tags::proprietary::*;
    let threshold = config_number(&ctx.config, RANDOM_SELECTION_THRESHOLD)?;
    let target = config_number(&ctx.config, RANDOM_SELECTION_TARGET_PERCENTAGE)?;
    let max_target = config_number(&ctx.config, RANDOM_SELECTION_MAX_TARGET_PERCENTAGE)?;

    let percentage = if amount < threshold {
        target
    } else {
        // amount < floor_limit, so floor_limit > threshold
        let span = u128::from(floor_limit - threshold);
        let rise =
            u128::from(max_target.saturating_sub(target)) * u128::from(amount - threshold) / span;
        target.saturating_add(u64::try_from(rise).unwrap_or(u64::MAX))
    };
    let random = u64::from(ctx.random_below(99)) + 1;
    debug!(percentage, random, "Random transaction selection");
    Ok(random <= percentage)
}

/// Consecutive offline transaction limits
///
/// Only applies when the card provides both limits. The count is the
/// difference between the ATC and the Last Online ATC Register. A card that
/// was never online is a new card and, like a card that does not report its
/// ATC, is counted from the transaction log.
fn check_velocity<T: CardTransport>(
    ctx: &mut EmvContext<T>,
    log: &[TxnLogEntry],
    pan: &[u8],
    sequence: Option<u8>,
) -> Result<(), Termination> {
    let limit = |tag| {
        ctx.icc
            .value(tag)
            .and_then(|v: &[u8]| v.first().copied())
            .map(u64::from)
    };
    let (Some(lower), Some(upper)) = (
        limit(tags::LOWER_CONSECUTIVE_OFFLINE_LIMIT),
        limit(tags::UPPER_CONSECUTIVE_OFFLINE_LIMIT),
    ) else {
        debug!("Card has no consecutive offline limits");
        return Ok(());
    };

    let logged = || {
        log.iter()
            .filter(|entry| entry.matches_card(pan, sequence))
            .count() as u64
    };
    let atc = read_counter(ctx, GET_DATA_ATC)?;
    let count = match atc {
        Some(atc) => match read_counter(ctx, GET_DATA_LAST_ONLINE_ATC)? {
            Some(last_online) if last_online != 0 => u64::from(atc.saturating_sub(last_online)),
            _ => {
                info!(atc, "New card");
                set_tvr(&mut ctx.terminal, tvr::NEW_CARD)?;
                logged()
            }
        },
        None => logged(),
    };

    debug!(count, lower, upper, "Consecutive offline transactions");
    if count > lower {
        set_tvr(&mut ctx.terminal, tvr::LOWER_LIMIT_EXCEEDED)?;
    }
    if count > upper {
        set_tvr(&mut ctx.terminal, tvr::UPPER_LIMIT_EXCEEDED)?;
    }
    Ok(())
}

/// GET DATA of a two byte counter; `None` when the card does not provide it
///
/// The value is kept out of `icc` so a later GENERATE AC may still return
/// the same data object.
fn read_counter<T: CardTransport>(
    ctx: &mut EmvContext<T>,
    tag: u16,
) -> Result<Option<u16>, Termination> {
    let mut data = TlvList::new();
    match ctx.tal.get_data(tag, &mut data) {
        Ok(()) => {}
        Err(TalFailure::Error(error)) => return Err(error.into()),
        Err(TalFailure::Result(result)) => {
            debug!(tag = format_args!("{tag:04X}"), %result, "Counter not available");
            return Ok(None);
        }
    }
    Ok(data
        .value(u32::from(tag))
        .and_then(|v| <[u8; 2]>::try_from(v).ok())
        .map(u16::from_be_bytes))
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use nexum_emv_tlv::{TlvFlags, TlvList, format::EmvDate, tags};

    use super::super::{Kernel, RestrictionsChecked};
    use crate::config::{KernelConfig, RandomSelection};
    use crate::context::EmvContext;
    use crate::error::{Error, Termination};
    use crate::test_utils::{self, ScriptedCard, candidate, terminal_registers};
    use crate::txn_log::TxnLogEntry;

    const PAN: [u8; 8] = hex!("4761739001010010");
    const GET_ATC: &[u8] = &hex!("80CA9F3600");
    const GET_LAST_ONLINE_ATC: &[u8] = &hex!("80CA9F1300");
    const NO_DATA: &[u8] = &hex!("6A88");

    /// Never selects randomly
    fn settings() -> KernelConfig {
        KernelConfig::new()
            .with_floor_limit(10_000)
            .with_random_selection(RandomSelection {
                threshold: 0,
                target_percentage: 0,
                max_target_percentage: 0,
            })
    }

    fn run(
        script: &[(&[u8], &[u8])],
        settings: KernelConfig,
        amount: u64,
        icc: &[(u32, &[u8])],
        log: &[TxnLogEntry],
    ) -> (EmvContext<ScriptedCard>, Result<(), Termination>) {
        let mut ctx = test_utils::context(script, settings);
        ctx.params
            .push(tags::AMOUNT_AUTHORISED_BINARY, (amount as u32).to_be_bytes(), TlvFlags::NONE)
            .unwrap();
        let mut card = TlvList::new();
        card.push(tags::PAN, PAN, TlvFlags::NONE).unwrap();
        for (tag, value) in icc {
            card.push(*tag, *value, TlvFlags::NONE).unwrap();
        }
        ctx.icc = card;
        ctx.terminal = terminal_registers();

        let state = RestrictionsChecked {
            application: candidate(&hex!("A0000000031010")),
        };
        let result = Kernel::new(&mut ctx, state).manage_risk(log).map(|_| ());
        (ctx, result)
    }

    fn tvr(ctx: &EmvContext<ScriptedCard>) -> Vec<u8> {
        ctx.terminal().value(tags::TVR).unwrap().to_vec()
    }

    fn log_entry(pan: &[u8], amount: u32) -> TxnLogEntry {
        TxnLogEntry::new(pan, 1, EmvDate::new(2025, 6, 1).unwrap(), amount).unwrap()
    }

    #[test]
    fn test_floor_limit() {
        let (ctx, result) = run(&[], settings(), 9_999, &[], &[]);
        result.unwrap();
        assert_eq!(tvr(&ctx), hex!("0000000000"));
        assert_eq!(ctx.terminal().value(tags::TSI), Some(&hex!("0800")[..]));

        // Exceeded with an empty log and with a log of other cards
        let (ctx, _) = run(&[], settings(), 10_000, &[], &[]);
        assert_eq!(tvr(&ctx), hex!("0000008000"));
        let log = [log_entry(&hex!("5413330089020011"), 1)];
        let (ctx, _) = run(&[], settings(), 12_000, &[], &log);
        assert_eq!(tvr(&ctx), hex!("0000008000"));

        // Split sale: the last amount with the same card counts
        let log = [log_entry(&PAN, 9_000), log_entry(&PAN, 4_000)];
        let (ctx, _) = run(&[], settings(), 6_000, &[], &log);
        assert_eq!(tvr(&ctx), hex!("0000008000"));
    }

    #[test]
    fn test_exception_file() {
        let settings = settings().with_exception_file_entry(PAN);
        let (ctx, _) = run(&[], settings, 100, &[], &[]);
        assert_eq!(tvr(&ctx), hex!("1000000000"));
    }

    #[test]
    fn test_random_selection() {
        let always = settings().with_random_selection(RandomSelection {
            threshold: 5_000,
            target_percentage: 99,
            max_target_percentage: 99,
        });
        let (ctx, _) = run(&[], always.clone(), 100, &[], &[]);
        assert_eq!(tvr(&ctx), hex!("0000001000"));
        let (ctx, _) = run(&[], always.clone(), 7_500, &[], &[]);
        assert_eq!(tvr(&ctx), hex!("0000001000"));
        // Never above the floor limit
        let (ctx, _) = run(&[], always, 10_000, &[], &[]);
        assert_eq!(tvr(&ctx), hex!("0000008000"));

        // Target zero, rising to 99 from the threshold
        let biased = settings().with_random_selection(RandomSelection {
            threshold: 5_000,
            target_percentage: 0,
            max_target_percentage: 99,
        });
        let (ctx, _) = run(&[], biased, 4_999, &[], &[]);
        assert_eq!(tvr(&ctx), hex!("0000000000"));
    }

    #[test]
    fn test_velocity_from_counters() {
        let limits: [(u32, &[u8]); 2] = [
            (tags::LOWER_CONSECUTIVE_OFFLINE_LIMIT, &[0x02]),
            (tags::UPPER_CONSECUTIVE_OFFLINE_LIMIT, &[0x05]),
        ];
        let script: [(&[u8], &[u8]); 2] = [
            (GET_ATC, &hex!("9F36020010 9000")),
            (GET_LAST_ONLINE_ATC, &hex!("9F1302000C 9000")),
        ];
        let (ctx, result) = run(&script, settings(), 100, &limits, &[]);
        result.unwrap();
        assert_eq!(tvr(&ctx), hex!("0000004000"));
        // Counters stay out of the card data
        assert!(!ctx.icc().contains(tags::ATC));

        let script: [(&[u8], &[u8]); 2] = [
            (GET_ATC, &hex!("9F36020020 9000")),
            (GET_LAST_ONLINE_ATC, &hex!("9F1302000C 9000")),
        ];
        let (ctx, _) = run(&script, settings(), 100, &limits, &[]);
        assert_eq!(tvr(&ctx), hex!("0000006000"));
    }

    #[test]
    fn test_new_card_is_not_a_velocity_failure() {
        let limits: [(u32, &[u8]); 2] = [
            (tags::LOWER_CONSECUTIVE_OFFLINE_LIMIT, &[0x02]),
            (tags::UPPER_CONSECUTIVE_OFFLINE_LIMIT, &[0x05]),
        ];
        let script: [(&[u8], &[u8]); 2] = [
            (GET_ATC, &hex!("9F36020005 9000")),
            (GET_LAST_ONLINE_ATC, NO_DATA),
        ];
        let (ctx, result) = run(&script, settings(), 100, &limits, &[]);
        result.unwrap();
        assert_eq!(tvr(&ctx), hex!("0008000000"));

        let script: [(&[u8], &[u8]); 2] = [
            (GET_ATC, &hex!("9F36020005 9000")),
            (GET_LAST_ONLINE_ATC, &hex!("9F13020000 9000")),
        ];
        let (ctx, _) = run(&script, settings(), 100, &limits, &[]);
        assert_eq!(tvr(&ctx), hex!("0008000000"));
    }

    #[test]
    fn test_velocity_from_log() {
        let limits: [(u32, &[u8]); 2] = [
            (tags::LOWER_CONSECUTIVE_OFFLINE_LIMIT, &[0x02]),
            (tags::UPPER_CONSECUTIVE_OFFLINE_LIMIT, &[0x05]),
        ];
        let log = [
            log_entry(&PAN, 10),
            log_entry(&hex!("5413330089020011"), 10),
            log_entry(&PAN, 10),
            log_entry(&PAN, 10),
        ];
        let script: [(&[u8], &[u8]); 1] = [(GET_ATC, NO_DATA)];
        let (ctx, result) = run(&script, settings(), 100, &limits, &log);
        result.unwrap();
        assert_eq!(tvr(&ctx), hex!("0000004000"));
        assert!(ctx.tal().ttl().transport().is_exhausted());
    }

    #[test]
    fn test_eight_byte_amounts_saturate() {
        let mut ctx = test_utils::context(&[], settings());
        ctx.params
            .push(tags::AMOUNT_AUTHORISED_BINARY, u64::MAX.to_be_bytes(), TlvFlags::NONE)
            .unwrap();
        ctx.icc.push(tags::PAN, PAN, TlvFlags::NONE).unwrap();
        ctx.terminal = terminal_registers();
        let state = RestrictionsChecked {
            application: candidate(&hex!("A0000000031010")),
        };
        Kernel::new(&mut ctx, state)
            .manage_risk(&[log_entry(&PAN, 4_000)])
            .unwrap();
        assert_eq!(tvr(&ctx), hex!("0000008000"));
    }

    #[test]
    fn test_random_selection_with_wide_parameters() {
        use tags::proprietary::*;
        let mut ctx = test_utils::context(&[], settings());
        let wide = [
            (tags::TERMINAL_FLOOR_LIMIT, u64::MAX),
            (RANDOM_SELECTION_THRESHOLD, 0),
            (RANDOM_SELECTION_MAX_TARGET_PERCENTAGE, u64::MAX / 2),
        ];
        let mut config = TlvList::new();
        for entry in ctx.config.iter() {
            if !wide.iter().any(|(tag, _)| *tag == entry.tag()) {
                config.push_entry(entry.clone());
            }
        }
        for (tag, value) in wide {
            config.push(tag, value.to_be_bytes(), TlvFlags::NONE).unwrap();
        }
        ctx.config = config;
        ctx.params
            .push(tags::AMOUNT_AUTHORISED_BINARY, (u64::MAX - 1).to_be_bytes(), TlvFlags::NONE)
            .unwrap();
        ctx.icc.push(tags::PAN, PAN, TlvFlags::NONE).unwrap();
        ctx.terminal = terminal_registers();
        let state = RestrictionsChecked {
            application: candidate(&hex!("A0000000031010")),
        };
        Kernel::new(&mut ctx, state).manage_risk(&[]).unwrap();
        assert_eq!(tvr(&ctx), hex!("0000001000"));
    }

    #[test]
    fn test_amount_required() {
        let mut ctx = test_utils::context(&[], settings());
        ctx.icc.push(tags::PAN, PAN, TlvFlags::NONE).unwrap();
        ctx.terminal = terminal_registers();
        let state = RestrictionsChecked {
            application: candidate(&hex!("A0000000031010")),
        };
        assert!(matches!(
            Kernel::new(&mut ctx, state).manage_risk(&[]),
            Err(Termination::Error(Error::InvalidParameter))
        ));
    }
}
