//! Keeps the gate's ADK proof slots in step with the TOTP clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use ospa_common::{
    ConfigTable, CONFIG_MAP_IDX_ADK_PROOF_FIRST, CONFIG_MAP_IDX_ADK_PROOF_LAST,
    CONFIG_MAP_IDX_OPENSPA_SERVER_PORT,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::proof::ProofGenerator;

/// Write side of the gate configuration table.
pub trait ConfigWriter: Send {
    fn put(&mut self, index: u32, value: u32) -> Result<()>;
}

impl ConfigWriter for ConfigTable {
    fn put(&mut self, index: u32, value: u32) -> Result<()> {
        if !self.set(index, value) {
            bail!("config index {} out of range", index);
        }
        Ok(())
    }
}

pub fn set_server_port<W: ConfigWriter + ?Sized>(w: &mut W, port: u16) -> Result<()> {
    w.put(CONFIG_MAP_IDX_OPENSPA_SERVER_PORT, u32::from(port))
        .context("server port")
}

/// Install the current proof in the first slot and the next one in the last.
/// A zero proof is refused, it would never match anyway.
pub fn install_proofs<W: ConfigWriter + ?Sized>(w: &mut W, gen: &dyn ProofGenerator) -> Result<()> {
    let proof0 = gen.proof_now();
    if proof0 == 0 {
        bail!("current ADK proof unavailable");
    }
    w.put(CONFIG_MAP_IDX_ADK_PROOF_FIRST, proof0).context("proof0 put")?;

    let proof1 = gen.proof_next();
    if proof1 == 0 {
        bail!("next ADK proof unavailable");
    }
    w.put(CONFIG_MAP_IDX_ADK_PROOF_LAST, proof1).context("proof1 put")?;

    Ok(())
}

/// Periodic proof installer running on the tokio runtime.
pub struct ProofSync<W: ConfigWriter + 'static> {
    writer: Arc<Mutex<W>>,
    generator: Arc<dyn ProofGenerator>,
    period: Duration,
    running: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl<W: ConfigWriter + 'static> ProofSync<W> {
    pub fn new(
        writer: Arc<Mutex<W>>,
        generator: Arc<dyn ProofGenerator>,
        period: Duration,
    ) -> Self {
        Self { writer, generator, period, running: None }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Install proofs now and then every period. No-op when already running.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let writer = Arc::clone(&self.writer);
        let generator = Arc::clone(&self.generator);
        let period = self.period;

        let handle = tokio::spawn(async move {
            // First tick fires immediately
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = sync_once(&writer, generator.as_ref()) {
                            log::error!("Failed to set ADK proof in XDP: {:#}", e);
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
            log::debug!("ADK proof synchronizer stopped");
        });

        self.running = Some((stop_tx, handle));
    }

    pub async fn stop(&mut self) {
        if let Some((stop_tx, handle)) = self.running.take() {
            let _ = stop_tx.send(());
            if let Err(e) = handle.await {
                log::warn!("ADK proof synchronizer task failed: {}", e);
            }
        }
    }
}

fn sync_once<W: ConfigWriter>(writer: &Mutex<W>, gen: &dyn ProofGenerator) -> Result<()> {
    let mut w = writer.lock().map_err(|_| anyhow!("config writer lock poisoned"))?;
    install_proofs(&mut *w, gen)?;
    log::debug!("ADK proofs synchronized");
    Ok(())
}
