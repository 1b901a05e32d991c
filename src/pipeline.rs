use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::Utc;
use crossbeam_channel::Sender;
use log::{debug, info, warn};

use crate::{
    counting_config::CountingConfig,
    error::CounterError,
    persistence::{RunResult, RunStore, new_run_id, persist},
    sources::FrameSource,
    systems::{
        RunContext, counters::Counts, crossing::CrossingEvent, side_classifier::BoundaryLine,
    },
    tracking::Frame,
};

/// Cloneable flag for asking a running pipeline to finish early.
/// The run still ends with a valid result for the frames seen so far.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        StopHandle::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What an overlay renderer needs to draw one frame
pub struct FrameOverlay<'a> {
    pub frame: &'a Frame,
    pub line: &'a BoundaryLine,
    pub counts: Counts,
}

/// Side channel for anything that wants to watch a run. Purely
/// observational; nothing an observer does can change the counts.
pub trait FrameObserver {
    fn on_event(&mut self, _event: &CrossingEvent) {}

    fn on_frame(&mut self, _overlay: &FrameOverlay) {}
}

impl FrameObserver for Sender<CrossingEvent> {
    fn on_event(&mut self, event: &CrossingEvent) {
        if self.send(*event).is_err() {
            debug!("Crossing event receiver has gone away");
        }
    }
}

impl<T: FrameObserver + ?Sized> FrameObserver for &mut T {
    fn on_event(&mut self, event: &CrossingEvent) {
        (**self).on_event(event)
    }

    fn on_frame(&mut self, overlay: &FrameOverlay) {
        (**self).on_frame(overlay)
    }
}

/// Wraps a closure so it can receive crossing events
pub struct EventCallback<F: FnMut(&CrossingEvent)>(pub F);

impl<F: FnMut(&CrossingEvent)> FrameObserver for EventCallback<F> {
    fn on_event(&mut self, event: &CrossingEvent) {
        (self.0)(event)
    }
}

/// Logs the running totals every `every` frames, in place of drawing them
pub struct LogOverlay {
    every: u64,
}

impl LogOverlay {
    pub fn new(every: u64) -> Self {
        LogOverlay {
            every: every.max(1),
        }
    }
}

impl FrameObserver for LogOverlay {
    fn on_frame(&mut self, overlay: &FrameOverlay) {
        if overlay.frame.index % self.every == 0 {
            debug!(
                "Frame {}: {} detections; IN: {} | OUT: {}",
                overlay.frame.index,
                overlay.frame.detections.len(),
                overlay.counts.in_count,
                overlay.counts.out_count
            );
        }
    }
}

/// Drives one counting run: pulls frames in order, feeds every detection
/// through the crossing rule, and summarises the result.
pub struct FramePipeline<'a> {
    config: CountingConfig,
    user: String,
    stop: StopHandle,
    observers: Vec<Box<dyn FrameObserver + 'a>>,
}

impl<'a> FramePipeline<'a> {
    pub fn new(config: &CountingConfig, user: &str) -> Self {
        FramePipeline {
            config: config.clone(),
            user: String::from(user),
            stop: StopHandle::new(),
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl FrameObserver + 'a) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Use an existing handle, e.g. one already shared with a timer or signal handler
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Consume `source` until it ends, the frame cap is hit, or a stop is
    /// requested. Fails only if the source yields no frame at all.
    pub fn run<S>(&mut self, source: &mut S) -> Result<RunResult, CounterError>
    where
        S: FrameSource + ?Sized,
    {
        let started_at = Utc::now();
        let source_name = String::from(source.name());

        let first = match source.next() {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                return Err(CounterError::SourceUnavailable {
                    name: source_name,
                    reason: e.to_string(),
                });
            }
            None => {
                return Err(CounterError::SourceUnavailable {
                    name: source_name,
                    reason: String::from("no frames"),
                });
            }
        };

        info!(
            "Source \"{}\" is {}x{}; starting run",
            source_name, first.width, first.height
        );
        let mut ctx = RunContext::new(self.config.boundary_for_frame(first.width, first.height));

        let mut frames_processed: u64 = 0;
        let mut dropped_detections: u64 = 0;
        let mut cancelled = false;
        let mut pending = Some(first);

        loop {
            if self.stop.is_stopped() {
                info!("Stop requested after {} frames", frames_processed);
                cancelled = true;
                break;
            }
            if self
                .config
                .max_frames
                .is_some_and(|max| frames_processed >= max)
            {
                info!("Reached frame limit of {}", frames_processed);
                break;
            }

            let frame = match pending.take().map(Ok).or_else(|| source.next()) {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    warn!(
                        "Source \"{}\" failed after {} frames, finishing early: {}",
                        source_name, frames_processed, e
                    );
                    cancelled = true;
                    break;
                }
                None => break,
            };

            dropped_detections += self.process_frame(&mut ctx, &frame);
            frames_processed += 1;
        }

        let counts = ctx.counts();
        let result = RunResult {
            run_id: new_run_id(&started_at),
            user: self.user.clone(),
            source_name,
            in_count: counts.in_count,
            out_count: counts.out_count,
            frames_processed,
            dropped_detections,
            tracks_seen: ctx.tracks().len(),
            cancelled,
            started_at,
            completed_at: Utc::now(),
        };
        info!(
            "Run {} finished after {} frames: IN {} | OUT {} ({} tracks, {} dropped detections)",
            result.run_id,
            frames_processed,
            result.in_count,
            result.out_count,
            result.tracks_seen,
            dropped_detections
        );
        Ok(result)
    }

    /// [`run`](Self::run), then hand the result to `store`. On a store
    /// failure the error carries the result for a retry.
    pub fn run_and_persist<S>(
        &mut self,
        source: &mut S,
        store: &mut dyn RunStore,
    ) -> Result<RunResult, CounterError>
    where
        S: FrameSource + ?Sized,
    {
        let result = self.run(source)?;
        persist(store, &result)?;
        Ok(result)
    }

    /// Returns how many detections were dropped as malformed
    fn process_frame(&mut self, ctx: &mut RunContext, frame: &Frame) -> u64 {
        let mut dropped = 0;
        for detection in frame.detections.iter() {
            match ctx.process_detection(detection, frame.index) {
                Ok(Some(event)) => {
                    for observer in self.observers.iter_mut() {
                        observer.on_event(&event);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Dropping detection: {}", e);
                    dropped += 1;
                }
            }
        }

        let overlay = FrameOverlay {
            frame,
            line: ctx.line(),
            counts: ctx.counts(),
        };
        for observer in self.observers.iter_mut() {
            observer.on_frame(&overlay);
        }
        dropped
    }
}
