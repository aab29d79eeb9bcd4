use clap::Subcommand;
use fastwatch_core::fasting::PresetPatch;

use super::{engine, print_json, CmdResult};

#[derive(Subcommand)]
pub enum PresetAction {
    /// List presets
    List,
    /// Add a custom preset
    Add {
        name: String,
        /// Fasting duration in minutes
        #[arg(long)]
        minutes: u32,
    },
    /// Rename or retime a preset
    Edit {
        /// Preset id or name
        preset: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Delete a preset; past fasts keep their copy
    Remove {
        /// Preset id or name
        preset: String,
    },
}

pub async fn run(action: PresetAction) -> CmdResult {
    let (_, engine) = engine().await?;

    match action {
        PresetAction::List => {
            let presets = engine.presets().await?;
            print_json(&presets)?;
        }
        PresetAction::Add { name, minutes } => {
            let preset = engine.create_preset(&name, minutes).await?;
            print_json(&preset)?;
        }
        PresetAction::Edit {
            preset,
            name,
            minutes,
        } => {
            if name.is_none() && minutes.is_none() {
                return Err("nothing to change: pass --name and/or --minutes".into());
            }
            let id = engine.resolve_preset(&preset).await?.id;
            let updated = engine
                .update_preset(
                    &id,
                    PresetPatch {
                        name,
                        duration_minutes: minutes,
                    },
                )
                .await?;
            print_json(&updated)?;
        }
        PresetAction::Remove { preset } => {
            let preset = engine.resolve_preset(&preset).await?;
            engine.delete_preset(&preset.id).await?;
            println!("removed {}", preset.name);
        }
    }
    Ok(())
}
