/// RTCIceCandidateEvent carries one local candidate to signal to the peer.
///
/// `candidate` is in `candidate:` form, without the `a=` prefix.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct RTCIceCandidateEvent {
    pub mline_index: usize,
    pub candidate: String,
}
