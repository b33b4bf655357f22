use bevy_terrain_deform::prelude::*;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, time::Duration};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StrategyArg {
    Gpu,
    Cpu,
}

impl From<StrategyArg> for ClassifierStrategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::Gpu => ClassifierStrategy::Gpu,
            StrategyArg::Cpu => ClassifierStrategy::Cpu,
        }
    }
}

/// Walks a player across a field of deformable terrain tiles and reports what the pipeline does.
#[derive(Parser, Debug)]
#[command(name = "dtprobe", author, version, about)]
pub struct Cli {
    /// A RON deformation config, the defaults are used otherwise.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Overrides the classifier strategy of the config.
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Number of tiles along each side of the field.
    #[arg(long, default_value_t = 5)]
    pub tiles: u32,
    /// Quads along each side of a tile.
    #[arg(long, default_value_t = 32)]
    pub tile_resolution: u32,
    /// World units along each side of a tile.
    #[arg(long, default_value_t = 16.0)]
    pub tile_size: f32,

    /// Number of simulated frames.
    #[arg(long, default_value_t = 600)]
    pub steps: u32,
    /// Distance the player moves per frame.
    #[arg(long, default_value_t = 0.25)]
    pub stride: f32,
    /// Prints the partition statistics every n frames.
    #[arg(long, default_value_t = 60)]
    pub report_every: u32,

    /// Writes the final trace heightmap as a png.
    #[arg(short, long)]
    pub export: Option<PathBuf>,
}

pub(crate) struct ProbeBar {
    name: String,
    bar: ProgressBar,
}

impl ProbeBar {
    pub(crate) fn new(name: &str, length: u64) -> Self {
        let bar = ProgressBar::new(length).with_style(
            ProgressStyle::with_template(&format!(
                "{name}: {{wide_bar}} {{pos}}/{{len}} [{{elapsed}}/{{duration}}]"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            name: name.to_string(),
            bar,
        }
    }

    pub(crate) fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
        println!("{} took: {:?}", self.name, self.bar.elapsed());
    }
}
