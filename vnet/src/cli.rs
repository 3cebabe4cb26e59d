//! Command line arguments for the smoke run.

use clap::{Parser, ValueEnum};
use std::sync::Arc;
use vnet_core::{
    channel::{Delayed, Lossy},
    Internet,
};

/// Command line arguments.
#[derive(Parser)]
pub struct Args {
    /// Print internal state transitions. Off by default.
    #[arg(short, long)]
    pub verbose: bool,
    /// Route packets through a simulated unreliable channel.
    #[arg(long, value_enum)]
    pub channel: Option<ChannelKind>,
}

/// The selectable routing policies.
#[derive(Clone, Copy, ValueEnum)]
pub enum ChannelKind {
    /// Drop roughly one packet in ten.
    Lossy,
    /// Hold every packet for up to seven seconds.
    Delayed,
}

impl Args {
    /// Turns on tracing output when `--verbose` is given.
    pub fn init_logging(&self) {
        if self.verbose {
            let subscriber = tracing_subscriber::FmtSubscriber::builder()
                .with_max_level(tracing::Level::DEBUG)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("setting default subscriber failed");
        }
    }

    /// Installs the selected channel on the fabric, if any.
    pub fn install_channel(&self, internet: &Internet) {
        match self.channel {
            None => {}
            Some(ChannelKind::Lossy) => internet.set_channel(Arc::new(Lossy::default())),
            Some(ChannelKind::Delayed) => internet.set_channel(Arc::new(Delayed::default())),
        }
    }
}
