//! Video-stream state arbitration.
//!
//! The DMA engine is strictly serialized between the two streams, with
//! still capture taking priority: video yields the engine when a still
//! burst starts and resumes when it ends. All of that policy lives in
//! [`next_video_state`], a pure function over the current states and
//! the event that triggered re-evaluation; callers apply the returned
//! state to the hardware separately.

use crate::state::StreamState;

/// Event that triggers a re-evaluation of the video stream's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionCause {
    VideoStop,
    VideoStart,
    /// A video dequeue found nothing done; start DMA on demand.
    VideoDqbuf,
    StillStop,
    StillStart,
}

/// Whether the still stream currently claims the DMA engine.
pub fn is_still_capturing(still: StreamState) -> bool {
    matches!(still, StreamState::StreamOn | StreamState::Dma)
}

/// Computes the next video-stream state. Total over its whole input
/// domain: cross-stream transitions never fail.
pub fn next_video_state(
    video: StreamState,
    still: StreamState,
    cause: TransitionCause,
) -> StreamState {
    use StreamState::*;

    match cause {
        TransitionCause::VideoStop => StreamOff,
        TransitionCause::VideoStart => {
            if is_still_capturing(still) {
                StreamOn
            } else {
                Dma
            }
        }
        TransitionCause::StillStop => {
            if video == StreamOn {
                Dma
            } else {
                video
            }
        }
        TransitionCause::StillStart => {
            if video == Dma {
                StreamOn
            } else {
                video
            }
        }
        TransitionCause::VideoDqbuf => {
            if video == StreamOn && !is_still_capturing(still) {
                Dma
            } else {
                video
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StreamState::*;
    use TransitionCause::*;

    const STATES: [StreamState; 3] = [StreamOff, StreamOn, Dma];

    #[test]
    fn video_stop_always_stops() {
        for video in STATES {
            for still in STATES {
                assert_eq!(next_video_state(video, still, VideoStop), StreamOff);
            }
        }
    }

    #[test]
    fn video_start_yields_to_still() {
        for video in STATES {
            assert_eq!(next_video_state(video, StreamOff, VideoStart), Dma);
            assert_eq!(next_video_state(video, StreamOn, VideoStart), StreamOn);
            assert_eq!(next_video_state(video, Dma, VideoStart), StreamOn);
        }
    }

    #[test]
    fn still_start_demotes_active_video_dma() {
        for still in STATES {
            assert_eq!(next_video_state(Dma, still, StillStart), StreamOn);
            assert_eq!(next_video_state(StreamOn, still, StillStart), StreamOn);
            assert_eq!(next_video_state(StreamOff, still, StillStart), StreamOff);
        }
    }

    #[test]
    fn still_stop_resumes_pending_video() {
        for still in STATES {
            assert_eq!(next_video_state(StreamOn, still, StillStop), Dma);
            assert_eq!(next_video_state(StreamOff, still, StillStop), StreamOff);
            assert_eq!(next_video_state(Dma, still, StillStop), Dma);
        }
    }

    #[test]
    fn dqbuf_starts_dma_only_when_still_is_idle() {
        assert_eq!(next_video_state(StreamOn, StreamOff, VideoDqbuf), Dma);
        assert_eq!(next_video_state(StreamOn, StreamOn, VideoDqbuf), StreamOn);
        assert_eq!(next_video_state(StreamOn, Dma, VideoDqbuf), StreamOn);
        for still in STATES {
            assert_eq!(next_video_state(StreamOff, still, VideoDqbuf), StreamOff);
            assert_eq!(next_video_state(Dma, still, VideoDqbuf), Dma);
        }
    }
}
