//! Implementation of `rawbak check` subcommand.

use anyhow::Context;
use chrono::Local;
use clap::Args;

use super::{status::OutputFormat, GlobalArgs};
use crate::{
    precheck::BackupPlan,
    runner::{BackupRunner, Phase},
    signal::CancelFlag,
    Result,
};

#[derive(Debug, Clone, Args, Default)]
pub struct CheckArgs {
    /// Output format for the plan.
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub fn execute(global: &GlobalArgs, args: CheckArgs) -> Result<()> {
    let config = global.resolve_config().context(Phase::Precheck)?;
    let plan = BackupRunner::new(config, CancelFlag::new()).precheck(Local::now().date_naive())?;

    let value = plan_json(&plan);
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
        OutputFormat::Text => print!("{}", format_text(&value)),
    }
    Ok(())
}

pub fn plan_json(plan: &BackupPlan) -> serde_json::Value {
    serde_json::json!({
        "device": plan.source.path,
        "device_size": plan.source.size,
        "backup_dir": plan.backup_dir,
        "artifact": plan.final_path(),
        "engine": plan.options.engine,
        "block_size": plan.options.block_size,
        "required_space": plan.space.required,
        "available_space": plan.space.available,
    })
}

fn format_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut out = String::new();
            for k in keys {
                out.push_str(&format!("{k}={}\n", map[&k]));
            }
            out
        }
        other => other.to_string(),
    }
}
