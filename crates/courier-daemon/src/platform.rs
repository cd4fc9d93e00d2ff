//! Platform adapter registry for this build.
//!
//! The real client adapter for the remote messaging platform is linked in by
//! the deployment; this open tree ships only the `dry-run` adapter, which
//! accepts every operation and logs what it would have sent. Useful for local
//! development and for exercising the scheduler/executor path in CI.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use courier_channels::{ChannelError, Destination, Messenger, MessengerFactory};
use courier_core::config::PlatformConfig;

pub fn messenger_factory(config: &PlatformConfig) -> anyhow::Result<Arc<dyn MessengerFactory>> {
    match config.adapter.as_str() {
        "dry-run" => Ok(Arc::new(DryRunFactory)),
        other => anyhow::bail!("unknown platform adapter '{other}' (this build ships: dry-run)"),
    }
}

struct DryRunFactory;

impl MessengerFactory for DryRunFactory {
    fn create(&self, _credential: &str) -> Result<Box<dyn Messenger>, ChannelError> {
        Ok(Box::new(DryRunMessenger))
    }
}

struct DryRunMessenger;

#[async_trait]
impl Messenger for DryRunMessenger {
    async fn connect(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn is_authorized(&mut self) -> Result<bool, ChannelError> {
        Ok(true)
    }

    async fn send_text(&mut self, dest: i64, text: &str) -> Result<(), ChannelError> {
        info!(dest, chars = text.len(), "dry-run: would send text");
        Ok(())
    }

    async fn send_files(
        &mut self,
        dest: i64,
        paths: &[String],
        _caption: &str,
    ) -> Result<(), ChannelError> {
        info!(dest, files = paths.len(), "dry-run: would send files");
        Ok(())
    }

    async fn list_destinations(&mut self) -> Result<Vec<Destination>, ChannelError> {
        Ok(Vec::new())
    }
}
