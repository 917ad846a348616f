//! Pipeline registry
//!
//! The host typically runs several video views at once; the registry maps a
//! view identifier to its pipeline so transport callbacks can route frames
//! without holding pipeline references themselves. Replacing or removing an
//! entry disposes the pipeline it held.

use crate::pipeline::VideoPipeline;
use bytes::Bytes;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Host-side identifier of one video view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u64);

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "view-{}", self.0)
    }
}

/// Shared map of live pipelines, keyed by view
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: Mutex<HashMap<ViewId, Arc<VideoPipeline>>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline for a view. An existing pipeline under the same
    /// id is disposed and returned.
    pub fn register(
        &self,
        id: ViewId,
        pipeline: Arc<VideoPipeline>,
    ) -> Option<Arc<VideoPipeline>> {
        let replaced = self.pipelines.lock().unwrap().insert(id, pipeline);
        if let Some(old) = &replaced {
            warn!("PipelineRegistry: replacing live pipeline for {}", id);
            old.dispose();
        } else {
            info!("PipelineRegistry: registered {}", id);
        }
        replaced
    }

    /// Look up the pipeline for a view
    pub fn get(&self, id: ViewId) -> Option<Arc<VideoPipeline>> {
        self.pipelines.lock().unwrap().get(&id).cloned()
    }

    /// Remove and dispose the pipeline for a view
    pub fn remove(&self, id: ViewId) -> bool {
        let removed = self.pipelines.lock().unwrap().remove(&id);
        match removed {
            Some(pipeline) => {
                info!("PipelineRegistry: removed {}", id);
                pipeline.dispose();
                true
            }
            None => false,
        }
    }

    /// Route one encoded frame to a view's pipeline.
    ///
    /// Returns `false` when the view is unknown or the pipeline dropped the
    /// frame.
    pub fn submit_frame(&self, id: ViewId, payload: Bytes) -> bool {
        let Some(pipeline) = self.get(id) else {
            debug!("PipelineRegistry: frame for unknown {}", id);
            return false;
        };
        pipeline.submit_frame(payload)
    }

    /// Number of registered pipelines
    pub fn len(&self) -> usize {
        self.pipelines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose and drop every registered pipeline
    pub fn clear(&self) {
        let drained: Vec<_> = self.pipelines.lock().unwrap().drain().collect();
        for (id, pipeline) in drained {
            debug!("PipelineRegistry: disposing {}", id);
            pipeline.dispose();
        }
    }
}
