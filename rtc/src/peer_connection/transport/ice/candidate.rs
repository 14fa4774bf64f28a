use std::collections::VecDeque;

use log::trace;

const ATTRIBUTE_PREFIX: &str = "a=";

/// PendingIceCandidate is a remote candidate waiting for both current
/// descriptions.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingIceCandidate {
    pub(crate) mline_index: usize,
    pub(crate) candidate: String,
}

/// normalize_candidate turns `a=candidate:...` and `candidate:...` alike
/// into the `candidate:` form handed to the ICE agent.
pub(crate) fn normalize_candidate(candidate: &str) -> String {
    candidate
        .trim()
        .strip_prefix(ATTRIBUTE_PREFIX)
        .unwrap_or(candidate.trim())
        .to_owned()
}

/// PendingIceCandidates buffers remote candidates in arrival order.
#[derive(Default, Debug)]
pub(crate) struct PendingIceCandidates {
    candidates: VecDeque<PendingIceCandidate>,
}

impl PendingIceCandidates {
    pub(crate) fn push(&mut self, mline_index: usize, candidate: String) {
        trace!("buffering candidate for mline {mline_index}: {candidate}");
        self.candidates.push_back(PendingIceCandidate {
            mline_index,
            candidate,
        });
    }

    /// take empties the queue, oldest first
    pub(crate) fn take(&mut self) -> Vec<PendingIceCandidate> {
        self.candidates.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.candidates.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
