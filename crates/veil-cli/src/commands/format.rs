// Value formatting

use anyhow::{bail, Result};
use clap::Args;
use veil_core::{format_fixed, FieldKind, ValueFormatter, VeilConfig};

#[derive(Args, Debug)]
pub struct FormatArgs {
    /// Raw integer with an implicit 18-decimal scale
    pub raw: u128,

    /// Fraction digits; overrides the configured precision
    #[arg(short, long)]
    pub precision: Option<u32>,

    /// Field kind whose configured precision to use
    #[arg(short, long, default_value = "balance")]
    pub kind: FieldKind,
}

pub fn run(args: &FormatArgs, config: &VeilConfig) -> Result<String> {
    let precision = match args.precision {
        Some(precision) if precision > veil_core::format::VALUE_DECIMALS => {
            bail!(
                "precision {precision} exceeds {} decimals",
                veil_core::format::VALUE_DECIMALS
            )
        }
        Some(precision) => precision,
        None => ValueFormatter::from_config(&config.display).precision_for(args.kind),
    };
    Ok(format!("{}\n", format_fixed(args.raw, precision)))
}
