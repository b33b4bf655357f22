mod cli;
mod simulation;
mod terrain;

pub mod prelude {
    pub use crate::{
        cli::{Cli, StrategyArg},
        simulation::run,
    };
}
