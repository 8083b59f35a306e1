use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustfft::FftPlanner;

use super::analyser::AnalyserNode;
use super::element::SharedElement;
use crate::error::{VisError, VisResult};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// The device connection. Starts suspended until the element begins playing.
#[derive(Debug)]
pub struct AudioContext {
    id: u64,
    state: ContextState,
}

impl AudioContext {
    fn open() -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("Opened audio context #{}", id);
        Self {
            id,
            state: ContextState::Suspended,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) {
        if self.state == ContextState::Suspended {
            self.state = ContextState::Running;
        }
    }

    fn suspend(&mut self) {
        if self.state == ContextState::Running {
            self.state = ContextState::Suspended;
        }
    }

    fn close(&mut self) {
        if self.state != ContextState::Closed {
            log::debug!("Closed audio context #{}", self.id);
            self.state = ContextState::Closed;
        }
    }
}

/// Source node tapped from the bound element. One per context.
pub struct SourceNode {
    element: SharedElement,
    connected: bool,
}

/// Routes channel 0 to the left analyser and channel 1 to the right one.
pub struct ChannelSplitter {
    pub left: AnalyserNode,
    pub right: AnalyserNode,
}

impl ChannelSplitter {
    fn new(planner: &mut FftPlanner<f32>, resolution: usize) -> Self {
        Self {
            left: AnalyserNode::new(planner, resolution),
            right: AnalyserNode::new(planner, resolution),
        }
    }
}

/// Result of [`AudioGraphHandle::acquire_or_create`].
pub struct Acquired {
    pub graph: AudioGraphHandle,
    pub reused: bool,
}

/// Audio graph for one playback session: context, source, and at most one
/// splitter/analyser wiring.
pub struct AudioGraphHandle {
    context: AudioContext,
    source: SourceNode,
    splitter: Option<ChannelSplitter>,
}

impl AudioGraphHandle {
    fn create(element: &SharedElement) -> Self {
        Self {
            context: AudioContext::open(),
            source: SourceNode {
                element: Arc::clone(element),
                connected: false,
            },
            splitter: None,
        }
    }

    /// Reuse `existing` when it is still open and tapped from `element`,
    /// otherwise close it and open a fresh context and source. Any previous
    /// wiring is disconnected either way.
    pub fn acquire_or_create(existing: Option<AudioGraphHandle>, element: &SharedElement) -> Acquired {
        match existing {
            Some(mut graph) if graph.is_open() && graph.is_bound_to(element) => {
                graph.disconnect();
                Acquired { graph, reused: true }
            }
            Some(mut stale) => {
                stale.close();
                Acquired {
                    graph: Self::create(element),
                    reused: false,
                }
            }
            None => Acquired {
                graph: Self::create(element),
                reused: false,
            },
        }
    }

    pub fn is_open(&self) -> bool {
        self.context.state() != ContextState::Closed
    }

    pub fn is_bound_to(&self, element: &SharedElement) -> bool {
        Arc::ptr_eq(&self.source.element, element)
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn is_wired(&self) -> bool {
        self.source.connected && self.splitter.is_some()
    }

    pub fn resolution(&self) -> Option<usize> {
        self.splitter.as_ref().map(|s| s.left.resolution())
    }

    /// Disconnect the current wiring, then connect source → splitter →
    /// analyser pair at `resolution`.
    pub fn wire(&mut self, planner: &mut FftPlanner<f32>, resolution: usize) -> VisResult<()> {
        if !self.is_open() {
            return Err(VisError::ContextClosed);
        }
        self.disconnect();
        self.splitter = Some(ChannelSplitter::new(planner, resolution));
        self.source.connected = true;
        log::debug!(
            "Wired audio context #{} at resolution {}",
            self.context.id(),
            resolution
        );
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.source.connected = false;
        self.splitter = None;
    }

    pub fn resume(&mut self) {
        self.context.resume();
    }

    pub fn suspend(&mut self) {
        self.context.suspend();
    }

    pub fn close(&mut self) {
        self.disconnect();
        self.context.close();
    }

    /// Push the element's current output through the splitter. A context that
    /// is not running delivers silence. Returns the analysers, if wired.
    pub fn pull(&mut self) -> Option<&mut ChannelSplitter> {
        if !self.source.connected {
            return None;
        }
        let running = self.context.state() == ContextState::Running;
        let splitter = self.splitter.as_mut()?;
        if running {
            self.source
                .element
                .tap(splitter.left.input_mut(), splitter.right.input_mut());
        } else {
            splitter.left.input_mut().fill(0.0);
            splitter.right.input_mut().fill(0.0);
        }
        Some(splitter)
    }
}

impl Drop for AudioGraphHandle {
    fn drop(&mut self) {
        self.close();
    }
}
