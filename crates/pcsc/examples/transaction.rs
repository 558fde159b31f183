//! Example running an EMV purchase against the card in the first reader,
//! up to the first GENERATE AC
//!
//! Set `RUST_LOG=debug` to follow each stage, or `trace` for the raw APDUs.

use nexum_emv_kernel::prelude::*;
use nexum_emv_tlv::format::{self, EmvDate};
use nexum_emv_transport_pcsc::{PcscConfig, PcscDeviceManager};

const SUPPORTED_AIDS: [&str; 3] = ["A0000000031010", "A0000000041010", "A0000000651010"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let manager = PcscDeviceManager::new()?;
    let transport = manager.open_first_card(PcscConfig::default())?;
    println!("Using reader {}", transport.reader_name());

    let mut config = KernelConfig::new().with_floor_limit(10_000);
    for aid in SUPPORTED_AIDS {
        config = config.with_supported_aid(hex::decode(aid)?, false);
    }
    let mut ctx = EmvContext::new(transport, config)?;

    // Purchase of 1.00 on 15 June 2025
    let mut params = TlvList::new();
    params.push(tags::TRANSACTION_DATE, EmvDate::new(2025, 6, 15)?.to_yymmdd(), TlvFlags::NONE)?;
    params.push(tags::TRANSACTION_TYPE, [0x00], TlvFlags::NONE)?;
    params.push(tags::AMOUNT_AUTHORISED_BINARY, 100u32.to_be_bytes(), TlvFlags::NONE)?;
    params.push(tags::AMOUNT_AUTHORISED_NUMERIC, format::u64_to_bcd(100, 6), TlvFlags::NONE)?;
    params.push(tags::TRANSACTION_CURRENCY_CODE, [0x08, 0x40], TlvFlags::NONE)?;

    match run(&mut ctx, params) {
        Ok(outcome) => println!("Outcome: {outcome}"),
        Err(reason) => println!("Transaction stopped: {reason}"),
    }

    let terminal = ctx.terminal();
    for (name, tag) in [("TVR", tags::TVR), ("TSI", tags::TSI)] {
        if let Some(value) = terminal.value(tag) {
            println!("{name}: {}", hex::encode_upper(value));
        }
    }
    Ok(())
}

fn run<T: CardTransport>(ctx: &mut EmvContext<T>, params: TlvList) -> Result<Outcome, Termination> {
    let mut kernel = ctx.begin(params);
    kernel.build_candidate_list()?;
    for (i, candidate) in kernel.candidates().iter().enumerate() {
        println!("{i}: {} ({})", candidate.display_name(), hex::encode_upper(candidate.aid()));
    }

    let mut selected = kernel.select_application(0);
    let initiated = loop {
        let retry = match selected {
            Ok(kernel) => match kernel.initiate() {
                Ok(kernel) => break kernel,
                Err(retry) => retry,
            },
            Err(retry) => retry,
        };
        if !retry.is_retryable() {
            return Err(retry.into());
        }
        println!("Trying next application: {}", retry.reason());
        selected = retry.into_kernel().select_application(0);
    };

    let kernel = initiated
        .read_application_data()?
        .authenticate()?
        .check_restrictions()?
        .manage_risk(&[])?
        .analyze_card_action()?;
    Ok(kernel.state().outcome())
}
