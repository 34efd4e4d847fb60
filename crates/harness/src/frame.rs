//! Content frame resolution
//!
//! The host shell injects legacy screens into a named frame some time after
//! navigation. The frame element existing and its document being queryable
//! happen at different moments, so both are awaited separately.

use std::time::Duration;

use tracing::{debug, info};

use crate::browser::FrameHandle;
use crate::config::Timeouts;
use crate::error::{HarnessError, HarnessResult};
use crate::session::Session;
use crate::wait::Deadline;

#[derive(Debug, Clone)]
pub struct FrameResolver {
    name: String,
    attach_timeout: Duration,
    content_timeout: Duration,
    poll_interval: Duration,
}

impl FrameResolver {
    pub fn new(name: impl Into<String>, timeouts: &Timeouts) -> Self {
        Self {
            name: name.into(),
            attach_timeout: timeouts.frame_attach,
            content_timeout: timeouts.frame_content,
            poll_interval: timeouts.poll_interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attach_timeout(&self) -> Duration {
        self.attach_timeout
    }

    fn unavailable(&self, reason: impl Into<String>) -> HarnessError {
        HarnessError::FrameUnavailable {
            frame: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Resolve the frame with the configured attach timeout.
    pub async fn resolve_default(&self, session: &mut Session) -> HarnessResult<FrameHandle> {
        self.resolve(session, self.attach_timeout).await
    }

    /// Wait for the frame element (bounded by `timeout`), then for its
    /// content. Fails rather than handing back a frame that cannot be queried.
    pub async fn resolve(
        &self,
        session: &mut Session,
        timeout: Duration,
    ) -> HarnessResult<FrameHandle> {
        let deadline = Deadline::after(timeout, self.poll_interval);
        loop {
            match session.page().frame_attached(&self.name).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) if e.is_transient() => debug!(frame = %self.name, "attach probe: {e}"),
                Err(e) => return Err(e.into()),
            }
            if !deadline.tick().await {
                return Err(self.unavailable(format!(
                    "frame element not attached within {} ms",
                    deadline.elapsed().as_millis()
                )));
            }
        }
        debug!(frame = %self.name, "frame attached after {} ms", deadline.elapsed().as_millis());

        let deadline = Deadline::after(self.content_timeout, self.poll_interval);
        let mut last = String::from("content not loaded");
        loop {
            match session.page().frame_content(&self.name).await {
                Ok(Some(handle)) => {
                    info!(frame = %handle.name, content = %handle.content_id, "Content frame ready");
                    session.set_frame(handle.clone());
                    return Ok(handle);
                }
                Ok(None) => last = "content not loaded".to_string(),
                Err(e) if e.is_transient() => last = e.to_string(),
                Err(e) => return Err(e.into()),
            }
            if !deadline.tick().await {
                return Err(self.unavailable(format!(
                    "attached but content not queryable within {} ms ({last})",
                    deadline.elapsed().as_millis()
                )));
            }
        }
    }
}
