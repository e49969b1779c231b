//! Locus Node - location proofs with ambient beacons

mod cli;
mod command;
mod demo;

fn main() -> command::Result<()> {
    command::run()
}
