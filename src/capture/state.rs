use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Liveness handle for one countdown run. Cancelling is idempotent.
#[derive(Debug, Clone)]
pub struct CountdownHandle {
    id: u64,
    token: CancellationToken,
}

impl CountdownHandle {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }
}

#[derive(Debug, Clone)]
pub enum AutoCaptureState {
    Idle,
    CountingDown {
        remaining_secs: u32,
        handle: CountdownHandle,
    },
    Capturing,
}

impl Default for AutoCaptureState {
    fn default() -> Self {
        AutoCaptureState::Idle
    }
}

/// Serializable view of [`AutoCaptureState`] for status snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CapturePhase {
    Idle,
    CountingDown { remaining_secs: u32 },
    Capturing,
}

impl Default for CapturePhase {
    fn default() -> Self {
        CapturePhase::Idle
    }
}

impl AutoCaptureState {
    pub fn phase(&self) -> CapturePhase {
        match self {
            AutoCaptureState::Idle => CapturePhase::Idle,
            AutoCaptureState::CountingDown { remaining_secs, .. } => CapturePhase::CountingDown {
                remaining_secs: *remaining_secs,
            },
            AutoCaptureState::Capturing => CapturePhase::Capturing,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, AutoCaptureState::Idle)
    }
}
