//! Capture loop state machine.
//!
//! Each tick captures the content region, compares it with the previous
//! page, persists it when it changed, and turns the page. The document has
//! ended once the region stays unchanged for `idle_threshold` ticks.

use image::RgbaImage;
use std::time::Instant;

use crate::automation::abort::CancelToken;
use crate::automation::config::CaptureConfig;
use crate::automation::detection::images_similar;
use crate::automation::sink::{CapturedPage, PageSink};
use crate::calibration::{Region, Viewer};
use crate::error::SessionError;
use crate::ocr::preprocess::crop_region;

/// Capture loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Not started yet
    Idle,
    /// Turning and capturing pages
    Capturing,
    /// End of document reached
    Done,
    /// Stopped by cancellation
    Aborted,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::Capturing => write!(f, "Capturing"),
            CaptureState::Done => write!(f, "Done"),
            CaptureState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Result of a capture loop that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Number of distinct pages persisted
    pub pages: u32,
    /// `true` if the end of the document was reached, `false` if cancelled
    pub completed: bool,
}

/// Capture loop context holding state and progress.
pub struct CaptureContext<'a, V: Viewer, P: PageSink> {
    pub state: CaptureState,
    viewer: &'a mut V,
    sink: &'a mut P,
    region: Region,
    config: CaptureConfig,
    cancel: CancelToken,
    previous: Option<RgbaImage>,
    idle_ticks: u32,
    pages_persisted: u32,
    ticks: u32,
    start_time: Instant,
}

impl<'a, V: Viewer, P: PageSink> CaptureContext<'a, V, P> {
    pub fn new(
        viewer: &'a mut V,
        sink: &'a mut P,
        region: Region,
        config: CaptureConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            state: CaptureState::Idle,
            viewer,
            sink,
            region,
            config,
            cancel,
            previous: None,
            idle_ticks: 0,
            pages_persisted: 0,
            ticks: 0,
            start_time: Instant::now(),
        }
    }

    pub fn pages_persisted(&self) -> u32 {
        self.pages_persisted
    }

    /// Advances the state machine by one step.
    ///
    /// Returns `Ok(true)` while capturing should continue and `Ok(false)`
    /// once the loop reached `Done` or `Aborted`.
    pub fn step(&mut self) -> Result<bool, SessionError> {
        match self.state {
            CaptureState::Idle => {
                log::info!(
                    "Capturing pages (stops after {} unchanged pages)...",
                    self.config.idle_threshold
                );
                self.start_time = Instant::now();
                self.state = CaptureState::Capturing;
                Ok(true)
            }
            CaptureState::Capturing => self.tick(),
            CaptureState::Done | CaptureState::Aborted => Ok(false),
        }
    }

    fn tick(&mut self) -> Result<bool, SessionError> {
        if self.cancel.is_cancelled() {
            log::info!("Stopped by user after {} page(s)", self.pages_persisted);
            self.state = CaptureState::Aborted;
            return Ok(false);
        }

        self.ticks += 1;
        let frame = self.viewer.capture_frame().ok_or(SessionError::FrameLost {
            pages_persisted: self.pages_persisted,
        })?;
        let page = crop_region(&frame, &self.region);

        let unchanged = self
            .previous
            .as_ref()
            .is_some_and(|prev| images_similar(prev, &page, self.config.similarity_threshold));

        if unchanged {
            self.idle_ticks += 1;
            log::info!(
                "  (Same page, {}/{})",
                self.idle_ticks,
                self.config.idle_threshold
            );
        } else {
            self.idle_ticks = 0;
            self.persist(page)?;
        }

        if !self.viewer.advance_page() {
            log::warn!("Page advance failed on tick {}", self.ticks);
        }
        self.cancel.sleep(self.config.settle());

        if self.idle_ticks >= self.config.idle_threshold {
            log::info!(
                "End of document: {} page(s) in {:.1}s",
                self.pages_persisted,
                self.start_time.elapsed().as_secs_f32()
            );
            self.state = CaptureState::Done;
            return Ok(false);
        }
        Ok(true)
    }

    fn persist(&mut self, image: RgbaImage) -> Result<(), SessionError> {
        let number = self.pages_persisted + 1;
        let page = CapturedPage { number, image };
        let path = self
            .sink
            .persist(&page)
            .map_err(|e| SessionError::Persist {
                page: number,
                message: format!("{:#}", e),
            })?;
        self.pages_persisted = number;
        log::info!("  Page {}: {}", number, path.display());
        self.previous = Some(page.image);
        Ok(())
    }

    /// Runs the loop to completion.
    pub fn run(mut self) -> Result<CaptureOutcome, SessionError> {
        while self.step()? {}
        Ok(CaptureOutcome {
            pages: self.pages_persisted,
            completed: self.state == CaptureState::Done,
        })
    }
}

/// Captures pages from the current position until the document ends or
/// `cancel` is requested.
pub fn capture_pages<V: Viewer, P: PageSink>(
    viewer: &mut V,
    sink: &mut P,
    region: Region,
    config: &CaptureConfig,
    cancel: &CancelToken,
) -> Result<CaptureOutcome, SessionError> {
    CaptureContext::new(viewer, sink, region, config.clone(), cancel.clone()).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::viewer::testing::{ScriptedViewer, solid};
    use anyhow::anyhow;
    use std::path::PathBuf;

    /// Records persisted pages in memory.
    #[derive(Default)]
    struct MemorySink {
        pages: Vec<CapturedPage>,
        cancel_after: Option<(usize, CancelToken)>,
        fail_on: Option<u32>,
    }

    impl PageSink for MemorySink {
        fn persist(&mut self, page: &CapturedPage) -> anyhow::Result<PathBuf> {
            if self.fail_on == Some(page.number) {
                return Err(anyhow!("disk full"));
            }
            self.pages.push(page.clone());
            if let Some((after, token)) = &self.cancel_after {
                if self.pages.len() == *after {
                    token.request();
                }
            }
            Ok(PathBuf::from(format!("page_{:04}.png", page.number)))
        }
    }

    fn config() -> CaptureConfig {
        CaptureConfig {
            settle_ms: 0,
            ..Default::default()
        }
    }

    fn region() -> Region {
        Region::new(10, 10, 90, 90).unwrap()
    }

    fn distinct_pages(count: u8) -> Vec<RgbaImage> {
        (0..count).map(|i| solid(100, 100, i * 60)).collect()
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", CaptureState::Idle), "Idle");
        assert_eq!(format!("{}", CaptureState::Aborted), "Aborted");
    }

    #[test]
    fn test_captures_until_pages_repeat() {
        let mut viewer = ScriptedViewer::new(distinct_pages(5));
        let mut sink = MemorySink::default();

        let outcome =
            capture_pages(&mut viewer, &mut sink, region(), &config(), &CancelToken::new())
                .unwrap();

        assert_eq!(
            outcome,
            CaptureOutcome {
                pages: 5,
                completed: true
            }
        );
        assert_eq!(viewer.captures, 8);
        assert_eq!(viewer.advances, 8);
        let numbers: Vec<u32> = sink.pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(sink.pages[0].image.dimensions(), (80, 80));
    }

    #[test]
    fn test_single_page_document() {
        let mut viewer = ScriptedViewer::new(distinct_pages(1));
        let mut sink = MemorySink::default();

        let outcome =
            capture_pages(&mut viewer, &mut sink, region(), &config(), &CancelToken::new())
                .unwrap();

        assert_eq!(outcome.pages, 1);
        assert!(outcome.completed);
        assert_eq!(viewer.captures, 4);
    }

    #[test]
    fn test_change_resets_idle_count() {
        // A page that repeats twice, then a new page, then the end
        let frames = distinct_pages(3);
        let pages = vec![
            frames[0].clone(),
            frames[0].clone(),
            frames[0].clone(),
            frames[1].clone(),
            frames[2].clone(),
        ];
        let mut viewer = ScriptedViewer::new(pages);
        let mut sink = MemorySink::default();

        let outcome =
            capture_pages(&mut viewer, &mut sink, region(), &config(), &CancelToken::new())
                .unwrap();

        assert_eq!(outcome.pages, 3);
        assert_eq!(viewer.captures, 8);
    }

    #[test]
    fn test_cancel_keeps_persisted_pages() {
        let mut viewer = ScriptedViewer::new(distinct_pages(4));
        let cancel = CancelToken::new();
        let mut sink = MemorySink {
            cancel_after: Some((2, cancel.clone())),
            ..Default::default()
        };

        let outcome = capture_pages(&mut viewer, &mut sink, region(), &config(), &cancel).unwrap();

        assert_eq!(
            outcome,
            CaptureOutcome {
                pages: 2,
                completed: false
            }
        );
        assert_eq!(sink.pages.len(), 2);
        assert_eq!(viewer.captures, 2);
    }

    #[test]
    fn test_lost_frame_reports_progress() {
        let mut viewer = ScriptedViewer::new(distinct_pages(5));
        viewer.lose_frame_after = Some(3);
        let mut sink = MemorySink::default();

        let result = capture_pages(&mut viewer, &mut sink, region(), &config(), &CancelToken::new());

        assert_eq!(result, Err(SessionError::FrameLost { pages_persisted: 3 }));
        assert_eq!(sink.pages.len(), 3);
    }

    #[test]
    fn test_persist_failure_ends_session() {
        let mut viewer = ScriptedViewer::new(distinct_pages(5));
        let mut sink = MemorySink {
            fail_on: Some(2),
            ..Default::default()
        };

        let result = capture_pages(&mut viewer, &mut sink, region(), &config(), &CancelToken::new());

        assert_eq!(
            result,
            Err(SessionError::Persist {
                page: 2,
                message: "disk full".to_string()
            })
        );
    }

    #[test]
    fn test_step_after_finish_is_noop() {
        let mut viewer = ScriptedViewer::new(distinct_pages(1));
        let mut sink = MemorySink::default();
        let mut ctx = CaptureContext::new(
            &mut viewer,
            &mut sink,
            region(),
            config(),
            CancelToken::new(),
        );
        while ctx.step().unwrap() {}
        assert_eq!(ctx.state, CaptureState::Done);
        assert!(!ctx.step().unwrap());
        assert_eq!(ctx.pages_persisted(), 1);
    }
}
