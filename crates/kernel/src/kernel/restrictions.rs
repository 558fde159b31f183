//! Processing restrictions (EMV Book 3 section 10.4)

use nexum_emv_tlv::{TlvList, format::EmvDate, tags};
use nexum_emv_ttl::CardTransport;
use tracing::{debug, info, instrument, warn};

use super::{Authenticated, Kernel, RestrictionsChecked, set_tvr, terminal_data, transaction_date};
use crate::error::{Error, Outcome, Termination};
use crate::fields::{Bit, TransactionType, additional_capabilities, auc, tvr};

impl<'c, T: CardTransport> Kernel<'c, T, Authenticated> {
    /// Check application version, usage control and dates
    ///
    /// Every failed check sets its TVR bit and processing continues. A card
    /// date that cannot be decoded is [`Outcome::CardError`].
    #[instrument(skip_all)]
    pub fn check_restrictions(self) -> Result<Kernel<'c, T, RestrictionsChecked>, Termination> {
        let ctx = &mut *self.ctx;
        let today = transaction_date(&ctx.params)?;

        let card_version = ctx.icc.value(tags::APPLICATION_VERSION_NUMBER_ICC);
        let terminal_version = ctx.config.value(tags::APPLICATION_VERSION_NUMBER_TERMINAL);
        if let (Some(card), Some(terminal)) = (card_version, terminal_version) {
            if card != terminal {
                debug!(
                    card = %hex::encode_upper(card),
                    terminal = %hex::encode_upper(terminal),
                    "Application versions differ"
                );
                set_tvr(&mut ctx.terminal, tvr::DIFFERENT_VERSIONS)?;
            }
        }

        if let Some(usage) = ctx.icc.value(tags::APPLICATION_USAGE_CONTROL) {
            if !usage_allowed(usage, &ctx.config, &ctx.icc, &ctx.params)? {
                debug!(auc = %hex::encode_upper(usage), "Service not allowed");
                set_tvr(&mut ctx.terminal, tvr::SERVICE_NOT_ALLOWED)?;
            }
        }

        if let Some(effective) = card_date(&ctx.icc, tags::APPLICATION_EFFECTIVE_DATE)? {
            if effective > today {
                debug!(%effective, "Application not yet effective");
                set_tvr(&mut ctx.terminal, tvr::NOT_YET_EFFECTIVE)?;
            }
        }
        if let Some(expiration) = card_date(&ctx.icc, tags::APPLICATION_EXPIRATION_DATE)? {
            if today > expiration {
                debug!(%expiration, "Application expired");
                set_tvr(&mut ctx.terminal, tvr::EXPIRED_APPLICATION)?;
            }
        }

        info!("Processing restrictions checked");
        let application = self.state.application;
        Ok(Kernel::new(self.ctx, RestrictionsChecked { application }))
    }
}

fn card_date(icc: &TlvList, tag: u32) -> Result<Option<EmvDate>, Termination> {
    let Some(value) = icc.value(tag) else {
        return Ok(None);
    };
    match EmvDate::from_yymmdd(value) {
        Ok(date) => Ok(Some(date)),
        Err(error) => {
            warn!(tag = format_args!("{tag:02X}"), %error, "Invalid card date");
            Err(Outcome::CardError.into())
        }
    }
}

/// Application Usage Control against the terminal environment and the
/// transaction type
///
/// Domestic and international restrictions only apply when the card
/// provides its Issuer Country Code.
fn usage_allowed(
    usage: &[u8],
    config: &TlvList,
    icc: &TlvList,
    params: &TlvList,
) -> Result<bool, Error> {
    let [terminal_type] = terminal_data(config, tags::TERMINAL_TYPE)?;
    let additional: [u8; 5] = terminal_data(config, tags::ADDITIONAL_TERMINAL_CAPABILITIES)?;
    let atm = matches!(terminal_type & 0x0F, 0x04..=0x06)
        && additional_capabilities::CASH.is_set(&additional);
    let environment = if atm { auc::ATM } else { auc::NON_ATM };
    if !environment.is_set(usage) {
        return Ok(false);
    }

    let Some(country) = icc.value(tags::ISSUER_COUNTRY_CODE) else {
        return Ok(true);
    };
    let terminal_country: [u8; 2] = terminal_data(config, tags::TERMINAL_COUNTRY_CODE)?;
    let domestic = country == terminal_country;
    let allowed = |domestic_bit: Bit, international_bit: Bit| {
        let bit = if domestic { domestic_bit } else { international_bit };
        bit.is_set(usage)
    };

    let transaction_type = params
        .value(tags::TRANSACTION_TYPE)
        .and_then(|v| v.first().copied())
        .map_or(TransactionType::Purchase, TransactionType::from);
    Ok(match transaction_type {
        TransactionType::Cash => allowed(auc::DOMESTIC_CASH, auc::INTERNATIONAL_CASH),
        TransactionType::Purchase => {
            allowed(auc::DOMESTIC_GOODS, auc::INTERNATIONAL_GOODS)
                || allowed(auc::DOMESTIC_SERVICES, auc::INTERNATIONAL_SERVICES)
        }
        TransactionType::Cashback => {
            allowed(auc::DOMESTIC_CASHBACK, auc::INTERNATIONAL_CASHBACK)
        }
        TransactionType::Other(_) => true,
    })
}
