use crate::mqtt::{publish_with_retry, MqttError, Publisher, RetryPolicy};
use crate::p1::Telegram;
use crate::pipeline::Pipeline;
use log::{debug, error, info};
use std::future::Future;
use tokio::sync::mpsc::Receiver;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub telegrams: u64,
    pub discarded: u64,
    pub published: u64,
}

/// Consumes telegrams one at a time until the source closes or `shutdown`
/// completes. Publishing errors that survive the retry policy end the run.
pub struct Bridge<'a, P: Publisher> {
    pipeline: Pipeline,
    publisher: &'a P,
    retry: RetryPolicy,
    verify_checksum: bool,
    stats: BridgeStats,
}

impl<'a, P: Publisher> Bridge<'a, P> {
    pub fn new(pipeline: Pipeline, publisher: &'a P, retry: RetryPolicy) -> Self {
        let verify_checksum = pipeline.config().p1.verify_checksum;
        Bridge {
            pipeline,
            publisher,
            retry,
            verify_checksum,
            stats: BridgeStats::default(),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn run<F: Future>(&mut self, mut telegrams: Receiver<Telegram>, shutdown: F) -> Result<BridgeStats, MqttError> {
        tokio::pin!(shutdown);

        loop {
            let telegram = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping");
                    break;
                }
                telegram = telegrams.recv() => match telegram {
                    Some(telegram) => telegram,
                    None => {
                        debug!("Telegram channel closed");
                        break;
                    }
                },
            };

            self.handle(&telegram).await?;
        }

        info!("Processed {} telegrams, published {} messages, discarded {} telegrams",
              self.stats.telegrams, self.stats.published, self.stats.discarded);
        Ok(self.stats.clone())
    }

    async fn handle(&mut self, telegram: &Telegram) -> Result<(), MqttError> {
        self.stats.telegrams += 1;

        if self.verify_checksum {
            if let Err(e) = telegram.verify_checksum() {
                error!("Dropping telegram: {}", e);
                self.stats.discarded += 1;
                return Ok(());
            }
        }

        let readings = match telegram.parse() {
            Ok(readings) => readings,
            Err(e) => {
                error!("Dropping telegram: {}", e);
                self.stats.discarded += 1;
                return Ok(());
            }
        };

        for publication in self.pipeline.process(&readings) {
            publish_with_retry(self.publisher, &publication, &self.retry).await?;
            self.stats.published += 1;
        }
        Ok(())
    }
}

/// Resolves once `signal` fires. If the signal handler cannot be installed
/// this never resolves, so the run only ends with its source.
pub async fn shutdown_on<F: Future<Output = std::io::Result<()>>>(signal: F) {
    match signal.await {
        Ok(()) => info!("Interrupt received"),
        Err(e) => {
            error!("Unable to listen for interrupts: {}", e);
            std::future::pending::<()>().await
        }
    }
}
