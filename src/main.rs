mod actions;
mod cli;
mod config;
mod error;
mod gestures;
mod input;
mod ipc;
mod landmarks;
mod logging;
mod trigger;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
