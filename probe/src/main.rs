use bevy_terrain_deform_probe::prelude::*;
use clap::Parser;
use std::env::set_var;

fn main() -> anyhow::Result<()> {
    set_var("RAYON_NUM_THREADS", "0");

    run(Cli::parse())
}
