//! Progress sinks. A sink failure never affects the upload it reports on.

use crate::models::upload::{ProgressEvent, UploadStatus};
use futures::FutureExt as _;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("progress receiver dropped")]
    Closed,
    #[error("{0}")]
    Sink(String),
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent) -> Result<(), ProgressError>;
}

/// Forward every event into an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        self.tx
            .send(event.clone())
            .map_err(|_| ProgressError::Closed)
    }
}

/// Log events through `tracing`.
#[derive(Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn report(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        match event.status {
            UploadStatus::Failed => warn!(
                file = %event.filename,
                "[{}/{}] failed: {}",
                event.current_index,
                event.total_count,
                event.error_detail.as_deref().unwrap_or("unknown error")
            ),
            status => info!(
                file = %event.filename,
                "[{}/{}] {:?}",
                event.current_index,
                event.total_count,
                status
            ),
        }
        Ok(())
    }
}

/// Adapt a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(&ProgressEvent) -> Result<(), ProgressError> + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        (self.0)(event)
    }
}

/// Deliver to several sinks; one failing sink does not starve the others.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ProgressSink for FanoutSink {
    fn report(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        for sink in &self.sinks {
            emit(sink.as_ref(), event);
        }
        Ok(())
    }
}

/// Report to `sink`, swallowing and logging errors and panics.
pub fn emit(sink: &dyn ProgressSink, event: &ProgressEvent) {
    match catch_unwind(AssertUnwindSafe(|| sink.report(event))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(file = %event.filename, "progress sink error: {}", err),
        Err(_) => warn!(file = %event.filename, "progress sink panicked"),
    }
}

/// Run `fut`, turning a panic into `None`.
pub(crate) async fn catch_panic<F, T>(fut: F) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(fut).catch_unwind().await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn event(status: UploadStatus) -> ProgressEvent {
        ProgressEvent {
            filename: "a.jpg".into(),
            current_index: 1,
            total_count: 2,
            status,
            error_detail: None,
        }
    }

    #[test]
    fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new();
        sink.report(&event(UploadStatus::Uploading)).unwrap();
        assert_eq!(rx.try_recv().unwrap().status, UploadStatus::Uploading);

        drop(rx);
        assert!(matches!(
            sink.report(&event(UploadStatus::Completed)),
            Err(ProgressError::Closed)
        ));
    }

    #[test]
    fn emit_swallows_errors_and_panics() {
        let failing = FnSink(|_: &ProgressEvent| Err::<(), _>(ProgressError::Sink("boom".into())));
        emit(&failing, &event(UploadStatus::Uploading));

        let panicking = FnSink(|_: &ProgressEvent| -> Result<(), ProgressError> {
            panic!("sink exploded")
        });
        emit(&panicking, &event(UploadStatus::Uploading));
    }

    #[test]
    fn fanout_reaches_healthy_sinks_after_a_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = {
            let seen = seen.clone();
            FnSink(move |e: &ProgressEvent| {
                seen.lock().unwrap().push(e.status);
                Ok::<(), ProgressError>(())
            })
        };
        let fanout = FanoutSink::new()
            .with(Arc::new(FnSink(|_: &ProgressEvent| -> Result<(), ProgressError> {
                panic!("first sink")
            })))
            .with(Arc::new(recorder));

        fanout.report(&event(UploadStatus::Completed)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![UploadStatus::Completed]);
    }

    #[tokio::test]
    async fn catch_panic_converts_panics() {
        assert_eq!(catch_panic(async { 7 }).await, Some(7));
        let caught: Option<()> = catch_panic(async { panic!("task") }).await;
        assert!(caught.is_none());
    }
}
