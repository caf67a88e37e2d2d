//! Command line program for running `nasch` traffic simulations.

#[macro_use]
extern crate log;

extern crate anyhow;
extern crate clap;
extern crate colored;

pub mod bench;
pub mod cli;
pub mod render;

use colored::*;

fn main() {
    // Run the program based on user input
    match cli::start(cli::app_matches()) {
        Ok(_) => (),
        Err(e) => {
            println!("{}{}", "error: ".red(), e);
            if e.root_cause().to_string() != e.to_string() {
                println!("Caused by:\n{}", e.root_cause())
            }
            std::process::exit(1);
        }
    }
}
