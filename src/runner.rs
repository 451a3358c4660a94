//! The worker pool that drains an input channel of target URLs into the
//! driver, then fans each result out to every configured writer. A fixed
//! number of workers share one receiver; a fatal driver error trips a
//! cancellation token that every worker observes at its next select point.

use crate::config::Options;
use crate::driver::Driver;
use crate::error::ProbeError;
use crate::utils::validate_url;
use crate::writer::SharedWriter;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct Runner {
    driver: Arc<dyn Driver>,
    writers: Vec<SharedWriter>,
    options: Arc<Options>,
    cancellation: CancellationToken,
}

impl Runner {
    pub fn new(driver: Arc<dyn Driver>, writers: Vec<SharedWriter>, options: Arc<Options>) -> Self {
        Self {
            driver,
            writers,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// Consume `targets` until the channel closes or a fatal driver error
    /// trips cancellation. Does not close `targets` itself — the caller
    /// owns that channel.
    pub async fn run(&self, targets: mpsc::Receiver<String>) {
        let targets = Arc::new(Mutex::new(targets));
        let worker_count = self.options.scan.workers;

        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let targets = targets.clone();
            let driver = self.driver.clone();
            let writers = self.writers.clone();
            let options = self.options.clone();
            let cancellation = self.cancellation.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(id, targets, driver, writers, options, cancellation).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        self.driver.close().await;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}

async fn worker_loop(
    id: usize,
    targets: Arc<Mutex<mpsc::Receiver<String>>>,
    driver: Arc<dyn Driver>,
    writers: Vec<SharedWriter>,
    options: Arc<Options>,
    cancellation: CancellationToken,
) {
    loop {
        let target = tokio::select! {
            _ = cancellation.cancelled() => {
                debug!("worker {id} exiting: cancellation tripped");
                return;
            }
            target = async {
                let mut rx = targets.lock().await;
                rx.recv().await
            } => target,
        };

        let Some(target) = target else {
            debug!("worker {id} exiting: input channel closed");
            return;
        };

        if let Err(reason) = validate_url(&target, &options.scan.allowed_schemes) {
            if options.logging.log_scan_errors {
                warn!("worker {id} skipping {target}: {reason}");
            }
            continue;
        }

        match driver.witness(target.clone()).await {
            Ok(result) => {
                if result.response_code == 0 {
                    if options.logging.log_scan_errors {
                        debug!("worker {id} dropping {target}: no response");
                    }
                    continue;
                }

                for writer in &writers {
                    if let Err(e) = writer.write(&result).await {
                        error!("worker {id} writer failed for {target}: {e}");
                    }
                }

                info!(
                    "worker {id} probed {target} status={} title={:?} have_screenshot={}",
                    result.response_code,
                    result.title,
                    !result.failed
                );
            }
            Err(e) if e.is_fatal() => {
                error!("worker {id} hit fatal driver error on {target}: {e}");
                cancellation.cancel();
                return;
            }
            Err(e) => {
                if options.logging.log_scan_errors {
                    warn!("worker {id} failed on {target}: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use crate::result::ProbeResult;
    use crate::writer::{NullWriter, Writer};
    use async_trait::async_trait;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how many times it was written to. Used to verify fan-out
    /// reaches every writer exactly once per successful result.
    struct CountingWriter {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Writer for CountingWriter {
        async fn write(&self, _result: &ProbeResult) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_options(workers: usize) -> Arc<Options> {
        let mut options = Options::default();
        options.scan.workers = workers;
        options.logging.log_scan_errors = false;
        Arc::new(options)
    }

    #[tokio::test]
    async fn invalid_scheme_never_reaches_driver() {
        let mut mock = MockDriver::new();
        mock.expect_witness().times(0);
        mock.expect_close().returning(|| ());

        let runner = Runner::new(Arc::new(mock), vec![Arc::new(NullWriter)], test_options(1));
        let (tx, rx) = mpsc::channel(4);
        tx.send("file:///etc/passwd".to_string()).await.unwrap();
        drop(tx);

        runner.run(rx).await;
    }

    #[tokio::test]
    async fn zero_response_code_is_dropped_silently() {
        let mut mock = MockDriver::new();
        mock.expect_witness()
            .with(eq("https://example.com".to_string()))
            .returning(|url| Ok(ProbeResult::new(url)));
        mock.expect_close().returning(|| ());

        let runner = Runner::new(Arc::new(mock), vec![Arc::new(NullWriter)], test_options(1));
        let (tx, rx) = mpsc::channel(4);
        tx.send("https://example.com".to_string()).await.unwrap();
        drop(tx);

        runner.run(rx).await;
    }

    #[tokio::test]
    async fn fatal_error_trips_cancellation_for_all_workers() {
        let mut mock = MockDriver::new();
        mock.expect_witness()
            .returning(|_| Err(ProbeError::BrowserNotFound));
        mock.expect_close().returning(|| ());

        let runner = Runner::new(Arc::new(mock), vec![Arc::new(NullWriter)], test_options(3));
        let (tx, rx) = mpsc::channel(8);
        for i in 0..8 {
            tx.send(format!("https://example.com/{i}")).await.unwrap();
        }
        drop(tx);

        runner.run(rx).await;
        assert!(runner.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn every_writer_gets_one_call_per_successful_target() {
        const TARGET_COUNT: usize = 5;

        let mut mock = MockDriver::new();
        mock.expect_witness().returning(|url| {
            let mut result = ProbeResult::new(url);
            result.response_code = 200;
            Ok(result)
        });
        mock.expect_close().returning(|| ());

        let counter_a = Arc::new(AtomicUsize::new(0));
        let counter_b = Arc::new(AtomicUsize::new(0));
        let writers: Vec<SharedWriter> = vec![
            Arc::new(CountingWriter { calls: counter_a.clone() }),
            Arc::new(CountingWriter { calls: counter_b.clone() }),
        ];

        let runner = Runner::new(Arc::new(mock), writers, test_options(2));
        let (tx, rx) = mpsc::channel(TARGET_COUNT);
        for i in 0..TARGET_COUNT {
            tx.send(format!("https://example.com/{i}")).await.unwrap();
        }
        drop(tx);

        runner.run(rx).await;

        assert_eq!(counter_a.load(Ordering::SeqCst), TARGET_COUNT);
        assert_eq!(counter_b.load(Ordering::SeqCst), TARGET_COUNT);
    }
}
